//! Delegation-provider errors.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DelegationError>;

#[derive(Debug, Error)]
pub enum DelegationError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("configuration error: {0}")]
    Config(String),
}
