//! Storage seams consumed by the engine.
//!
//! The engine never owns persistence. It reads capacity from a
//! [`ResourceStore`] and reads/writes token records through a [`TokenStore`].
//! Both are injected as trait objects; in-memory implementations are provided
//! for tests and the standalone server.

mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::token::{Token, TokenDraft, TokenId, TokenState};

pub use memory::{InMemoryResourceStore, InMemoryTokenStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(u64);

impl ResourceId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A capacity-bounded allocation target (one appointment slot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub capacity: usize,
}

#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fails with `ResourceNotFound` if the resource does not exist.
    async fn capacity(&self, id: ResourceId) -> Result<usize>;

    /// Register a new resource. Fails with `InvalidCapacity` for zero.
    async fn create(&self, capacity: usize) -> Result<Resource>;

    /// Every registered resource, ordered by id.
    async fn list(&self) -> Result<Vec<Resource>>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Persist a decided draft, assigning its id and creation sequence.
    async fn create(&self, draft: TokenDraft) -> Result<Token>;

    async fn get(&self, id: TokenId) -> Result<Option<Token>>;

    /// Overwrite an existing token record. Fails with `TokenNotFound` if the
    /// id was never created.
    async fn update(&self, token: &Token) -> Result<()>;

    async fn count_by_resource_and_state(
        &self,
        resource: ResourceId,
        state: TokenState,
    ) -> Result<usize>;

    /// Matching tokens in no particular order; callers sort by explicit keys.
    async fn list_by_resource_and_state(
        &self,
        resource: ResourceId,
        state: TokenState,
    ) -> Result<Vec<Token>>;
}
