use thiserror::Error;

/// Failure kinds of the ISC computation core.
///
/// Every kind is terminal for the pipeline: dropping a spatial unit or a
/// subject on error would leave a hole in the significance map, so errors
/// propagate to the caller instead.
#[derive(Debug, Error)]
pub enum IscError {
    #[error("subject {subject} has {actual} samples, expected {expected}")]
    Alignment {
        subject: String,
        expected: usize,
        actual: usize,
    },

    #[error("subject {subject} is missing spatial unit {unit}")]
    MissingData { subject: String, unit: String },

    #[error("time series at spatial unit {unit} has zero variance")]
    DegenerateSeries { unit: String },

    #[error("{actual} samples are too few for null generation (minimum {minimum})")]
    InsufficientSamples { actual: usize, minimum: usize },

    #[error("null distribution contains no draws")]
    EmptyNull,
}

pub type Result<T> = std::result::Result<T, IscError>;
