use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("descriptor dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),
    #[error("descriptors come from different models: {left} vs {right}")]
    ModelMismatch { left: String, right: String },
    #[error("quality score must be within [0, 1], got {0}")]
    InvalidQuality(f32),
    #[error("invalid decision policy: {0}")]
    InvalidPolicy(String),
}
