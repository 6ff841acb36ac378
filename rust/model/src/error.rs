// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Result type for model document operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading or validating a model document
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error reading model document: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed model document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid model document: {0}")]
    Invalid(String),
}
