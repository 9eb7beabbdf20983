/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use shared::variable::InvalidVariableName;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A contract of an operation was violated by its caller.
    #[error("precondition violated: {0}")]
    PreconditionViolation(String),
    /// On-disk data was written by an incompatible version.
    #[error("{0}")]
    IncompatibleFormat(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The query was cancelled or timed out.
    #[error("the query was cancelled")]
    Cancelled,
    #[error("parse error: {0}")]
    Parse(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<InvalidVariableName> for EngineError {
    fn from(err: InvalidVariableName) -> Self {
        EngineError::InvalidInput(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Returns a `PreconditionViolation` unless `condition` holds.
pub fn check(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(EngineError::PreconditionViolation(message()))
    }
}
