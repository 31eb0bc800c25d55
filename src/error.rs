use thiserror::Error;

/// Possible errors that arise due to issues with the loss input fields or configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UmLossError {
    #[error("Input fields have mismatched dimensions: {0}")]
    WrongDimension(String),
    #[error("Non finite value: {0}")]
    NonFiniteValue(String),
    #[error("Points have no features: the embedding has zero channels and coordinates are disabled")]
    EmptyFeatures,
    #[error("Nearest neighbour search failed: {0}")]
    NearestNeighbour(String),
    #[error("Value cannot be represented in the embedding's float type: {0}")]
    NumericCast(String),
}
