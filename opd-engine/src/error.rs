use std::time::Duration;

use thiserror::Error;

use crate::store::ResourceId;
use crate::token::{TokenId, TokenState};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("resource not found: {0}")]
    ResourceNotFound(ResourceId),

    #[error("token not found: {0}")]
    TokenNotFound(TokenId),

    #[error("invalid priority category: {0}")]
    InvalidCategory(String),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: TokenState, to: TokenState },

    #[error("invalid capacity {0}: a slot must hold at least one token")]
    InvalidCapacity(usize),

    #[error("timed out after {0:?} waiting for the resource lock")]
    Timeout(Duration),

    #[error("token store failure: {0}")]
    Store(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AllocError>;
