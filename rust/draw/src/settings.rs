// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Drawing export settings
//!
//! Mirrors the options of the drawing exporter one-to-one; the CLI exposes
//! every field as a kebab-cased flag. [`DrawSettings::validate`] runs before
//! any file or model access so that configuration errors are rejected
//! eagerly.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How storey height lines are annotated on sections and elevations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreyHeights {
    /// No storey height annotation
    None,
    /// Level lines across the full sheet width
    Full,
    /// Short level ticks on the left edge only
    Left,
}

impl StoreyHeights {
    /// The accepted configuration spellings
    pub const ALLOWED: [&'static str; 3] = ["none", "full", "left"];
}

impl FromStr for StoreyHeights {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Self::None),
            "full" => Ok(Self::Full),
            "left" => Ok(Self::Left),
            other => Err(Error::Config(format!(
                "storey_heights should be one of {{'{}'}}, got '{other}'",
                Self::ALLOWED.join("', '")
            ))),
        }
    }
}

/// Settings for one drawing export run.
///
/// Defaults produce an A3 portrait floorplan set at 1:100 with cells enabled,
/// matching the exporter's historical behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawSettings {
    /// Paper width in mm
    pub width: f64,
    /// Paper height in mm
    pub height: f64,
    /// Drawing scale (e.g. `0.01` for 1:100)
    pub scale: f64,
    /// Derive elevation drawings from the model bounding box
    pub auto_elevation: bool,
    /// Derive section drawings through the model bounding box center
    pub auto_section: bool,
    /// Derive one floorplan per building storey
    pub auto_floorplan: bool,
    /// Annotate space names at space centroids
    pub space_names: bool,
    /// Annotate space areas at space centroids
    pub space_areas: bool,
    /// Draw door swing arcs on floorplans
    pub door_arcs: bool,
    /// Weld meshes into closed shells before hidden-line removal; costlier
    /// but correct for non-manifold input
    pub subtract_before_hlr: bool,
    /// Cache resolved geometry on disk, keyed by model + settings
    pub cache: bool,
    /// Directory for the geometry cache
    pub cache_dir: String,
    /// Emit a CSS block for per-entity-type styling
    pub css: bool,
    /// Storey height annotation mode: `none`, `full` or `left`
    pub storey_heights: String,
    /// Comma-separated entity types to include (overrides `exclude_entities`)
    pub include_entities: String,
    /// Comma-separated entity types to exclude
    pub exclude_entities: String,
    /// Minimum projected feature size in paper mm; negative disables
    pub profile_threshold: f64,
    /// Reconstruct closed cells from the hidden-line output and merge them
    /// back into the drawing
    pub cells: bool,
}

impl Default for DrawSettings {
    fn default() -> Self {
        Self {
            width: 297.0,
            height: 420.0,
            scale: 1.0 / 100.0,
            auto_elevation: false,
            auto_section: false,
            auto_floorplan: true,
            space_names: false,
            space_areas: false,
            door_arcs: false,
            subtract_before_hlr: false,
            cache: false,
            cache_dir: "cache".to_string(),
            css: true,
            storey_heights: "none".to_string(),
            include_entities: String::new(),
            exclude_entities: "IfcOpeningElement".to_string(),
            profile_threshold: -1.0,
            cells: true,
        }
    }
}

impl DrawSettings {
    /// Validate the configuration. Must pass before any processing begins.
    pub fn validate(&self) -> Result<()> {
        self.storey_heights()?;
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(Error::Config(format!(
                "scale must be finite and positive, got {}",
                self.scale
            )));
        }
        if !(self.width > 0.0 && self.height > 0.0) {
            return Err(Error::Config(format!(
                "paper size must be positive, got {} x {}",
                self.width, self.height
            )));
        }
        Ok(())
    }

    /// Parsed storey height annotation mode
    pub fn storey_heights(&self) -> Result<StoreyHeights> {
        StoreyHeights::from_str(&self.storey_heights)
    }

    /// Entity types to include, empty when unset
    pub fn include_list(&self) -> Vec<String> {
        split_entity_list(&self.include_entities)
    }

    /// Entity types to exclude; ignored when an include list is given
    pub fn exclude_list(&self) -> Vec<String> {
        split_entity_list(&self.exclude_entities)
    }
}

fn split_entity_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
