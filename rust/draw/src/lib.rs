// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # ifcplot-draw
//!
//! 2D vector drawing generation from triangulated building models.
//!
//! ## Overview
//!
//! This crate turns a resolved [`Model`](ifcplot_model::Model) into finished
//! SVG construction drawings:
//!
//! - **Hidden-line rendering**: per-drawing-plane projection with exact
//!   interval-based occlusion and section cuts
//! - **Spatial index**: a bounding volume hierarchy answering ray queries
//!   against every indexed element face
//! - **Cell reconstruction**: closed regions rebuilt from the hidden-line
//!   segment soup
//! - **Document merge**: cells classified by ray casting and shaded by
//!   depth, substituted back into the drawing
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ifcplot_draw::{draw, write_output, DrawSettings};
//! use ifcplot_model::Model;
//!
//! let model = Model::from_path("building.json")?;
//! let settings = DrawSettings::default();
//! let svg = draw(&settings, &[model], |_| {})?;
//! write_output("building.svg", &svg)?;
//! ```

pub mod adapter;
pub mod cells;
pub mod dom;
pub mod error;
pub mod hlr;
pub mod merge;
pub mod pipeline;
pub mod plane;
pub mod settings;
pub mod tree;

pub use adapter::{ElementIterator, GeometryCache, ResolvedElement};
pub use cells::{cells_to_svg, line_segments_to_cells, svg_to_line_segments, Cell, CELL_TOLERANCE};
pub use dom::{Document, Element};
pub use error::{Error, Result};
pub use hlr::{PlaneSpec, SvgSerializer};
pub use merge::{merge_documents, merge_documents_with_progress};
pub use pipeline::{draw, write_output, Progress};
pub use plane::{Bounds, DrawingKind, DrawingPlane};
pub use settings::{DrawSettings, StoreyHeights};
pub use tree::{ElementTree, ElementTreeBuilder, RayHit};
