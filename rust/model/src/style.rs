// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Surface style (material appearance) resolved per face

use serde::{Deserialize, Serialize};

/// Per-face material appearance: diffuse color plus optional transparency.
///
/// Transparency is in `[0, 1]` where `1.0` is fully transparent. `None`
/// means the style carries no transparency component at all, which is
/// distinct from an explicit `Some(0.0)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Style {
    /// Style name as authored in the source model
    pub name: String,
    /// Diffuse RGB, each channel in `[0, 1]`
    pub diffuse: [f64; 3],
    /// Transparency in `[0, 1]`, if the style defines one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transparency: Option<f64>,
}

impl Style {
    /// Create an opaque style
    pub fn opaque(name: impl Into<String>, diffuse: [f64; 3]) -> Self {
        Self {
            name: name.into(),
            diffuse,
            transparency: None,
        }
    }

    /// Whether the style defines a transparency component
    pub fn has_transparency(&self) -> bool {
        self.transparency.is_some()
    }

    /// Transparency value, or `0.0` for styles without one
    pub fn transparency_or_zero(&self) -> f64 {
        self.transparency.unwrap_or(0.0)
    }
}
