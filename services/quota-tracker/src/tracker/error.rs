use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuotaError {
    #[error("feature {0} has no configured quota")]
    UnknownFeature(String),
    #[error("invalid quota for feature {feature}: {reason}")]
    InvalidLimit { feature: String, reason: String },
}
