// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Result type for drawing pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the drawing pipeline.
///
/// Per-element geometry failures are not represented here: a product that
/// fails to resolve or project is skipped and counted, never fatal.
#[derive(Error, Debug)]
pub enum Error {
    /// Rejected configuration, raised before any file or model access
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Projection-group / cell-group mismatch while merging documents.
    /// This is a pipeline invariant violation, not bad input.
    #[error(
        "projection group count {projections} does not match cell group count {cells}; \
         this is a pipeline inconsistency, not a problem with the input model"
    )]
    GroupCountMismatch { projections: usize, cells: usize },

    /// Malformed vector document or missing reconstruction attributes
    #[error("Vector document error: {0}")]
    Document(String),

    /// Geometry cache failure
    #[error("Geometry cache error: {0}")]
    Cache(String),

    #[error("Model error: {0}")]
    Model(#[from] ifcplot_model::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<cacache::Error> for Error {
    fn from(err: cacache::Error) -> Self {
        Error::Cache(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Cache(format!("cache payload: {err}"))
    }
}
