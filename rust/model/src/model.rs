// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Model document: products, storeys and unit scale
//!
//! A [`Model`] is the parsed, tessellated form of one IFC file as produced by
//! the upstream parser/tessellator. Coordinates are in model units; multiply
//! by [`Model::unit_scale`] to obtain metres.

use crate::error::{Error, Result};
use crate::geometry::{Placement, TriMesh};
use crate::style::Style;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A building storey with its elevation in model units
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Storey {
    pub name: String,
    pub elevation: f64,
}

/// One IFC product instance with resolved placement and tessellated geometry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// IFC GlobalId
    pub guid: String,
    /// IFC entity type name, e.g. `"IfcWall"`
    pub ifc_type: String,
    /// Product name, if authored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Index into [`Model::storeys`] for spatial containment, if contained
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storey: Option<usize>,
    /// Local-to-world placement
    #[serde(default)]
    pub placement: Placement,
    /// Tessellated geometry in local coordinates
    pub mesh: TriMesh,
    /// Style table referenced by `mesh.face_styles`
    pub styles: Vec<Style>,
}

/// A parsed, tessellated model document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    /// Model name (usually the project name)
    pub name: String,
    /// Multiplier converting model-unit lengths to metres
    #[serde(default = "default_unit_scale")]
    pub unit_scale: f64,
    #[serde(default)]
    pub storeys: Vec<Storey>,
    #[serde(default)]
    pub products: Vec<Product>,
    /// Source path, set when loaded from disk. Used for cache keying.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

fn default_unit_scale() -> f64 {
    1.0
}

impl Model {
    /// Load a model document from a JSON file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let mut model: Model = serde_json::from_slice(&data)?;
        model.source = Some(path.to_path_buf());
        model.validate()?;
        Ok(model)
    }

    /// Validate structural consistency of the document
    pub fn validate(&self) -> Result<()> {
        if !(self.unit_scale.is_finite() && self.unit_scale > 0.0) {
            return Err(Error::Invalid(format!(
                "unit_scale must be finite and positive, got {}",
                self.unit_scale
            )));
        }
        for product in &self.products {
            if let Some(storey) = product.storey {
                if storey >= self.storeys.len() {
                    return Err(Error::Invalid(format!(
                        "product {} references storey {} but model has {}",
                        product.guid,
                        storey,
                        self.storeys.len()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Storey elevations in metres, ascending
    pub fn storey_elevations(&self) -> Vec<(String, f64)> {
        let mut elevations: Vec<(String, f64)> = self
            .storeys
            .iter()
            .map(|s| (s.name.clone(), s.elevation * self.unit_scale))
            .collect();
        elevations.sort_by(|a, b| a.1.total_cmp(&b.1));
        elevations
    }
}
