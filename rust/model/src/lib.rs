// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # ifcplot Model Document
//!
//! Data model for the tessellated building models consumed by the drawing
//! pipeline. A model document is the output contract of the upstream
//! IFC parser/tessellator: products with resolved placements, triangulated
//! styled meshes, storey elevations, spatial containment and a unit scale.
//!
//! Documents are serialized as JSON via [serde](https://docs.rs/serde) and
//! loaded with [`Model::from_path`].

pub mod error;
pub mod geometry;
pub mod model;
pub mod style;

// Re-export nalgebra types for convenience
pub use nalgebra::{Matrix4, Point2, Point3, Vector2, Vector3};

pub use error::{Error, Result};
pub use geometry::{Placement, TriMesh};
pub use model::{Model, Product, Storey};
pub use style::Style;
