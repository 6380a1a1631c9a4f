//! Error types for lap processing, modelling and strategy simulation.

use thiserror::Error;

use crate::data::Compound;

#[derive(Error, Debug)]
pub enum Error {
    /// A raw lap row is missing a required field or carries a value that
    /// cannot be interpreted.
    #[error("data schema error at row {row}: {reason}")]
    DataSchema { row: usize, reason: String },

    #[error("no degradation model for {0}")]
    UnknownCompound(Compound),

    /// A named strategy could not be simulated; the whole comparison is
    /// abandoned.
    #[error("strategy {name:?} failed: {source}")]
    Strategy {
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("invalid stint plan: {0}")]
    InvalidStintPlan(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("regression fit failed: {0}")]
    Regression(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn schema(row: usize, reason: impl Into<String>) -> Self {
        Error::DataSchema {
            row,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
