use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("no outstanding RADIUS request with id {0}")]
    UnknownCorrelation(u8),
    #[error("invalid group address: {0}")]
    InvalidGroupAddress(String),
}
