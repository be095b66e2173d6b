//! In-memory stores backed by DashMap.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{Resource, ResourceId, ResourceStore, TokenStore};
use crate::error::{AllocError, Result};
use crate::token::{Sequence, Token, TokenDraft, TokenId, TokenState};

#[derive(Debug, Default)]
pub struct InMemoryResourceStore {
    resources: DashMap<ResourceId, Resource>,
    next_id: AtomicU64,
}

impl InMemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn capacity(&self, id: ResourceId) -> Result<usize> {
        self.resources
            .get(&id)
            .map(|r| r.capacity)
            .ok_or(AllocError::ResourceNotFound(id))
    }

    async fn create(&self, capacity: usize) -> Result<Resource> {
        if capacity == 0 {
            return Err(AllocError::InvalidCapacity(capacity));
        }
        let id = ResourceId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let resource = Resource { id, capacity };
        self.resources.insert(id, resource);
        Ok(resource)
    }

    async fn list(&self) -> Result<Vec<Resource>> {
        let mut resources: Vec<Resource> = self.resources.iter().map(|r| *r.value()).collect();
        resources.sort_by_key(|r| r.id);
        Ok(resources)
    }
}

/// Token records keyed by id. Ids and creation sequences come from a single
/// counter, so both are strictly increasing in creation order.
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    tokens: DashMap<TokenId, Token>,
    next_seq: AtomicU64,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn create(&self, draft: TokenDraft) -> Result<Token> {
        let seq = self.next_seq.fetch_add(1, Ordering::AcqRel) + 1;
        let token = draft.into_token(TokenId::new(seq), Sequence::new(seq));
        self.tokens.insert(token.id(), token.clone());
        Ok(token)
    }

    async fn get(&self, id: TokenId) -> Result<Option<Token>> {
        Ok(self.tokens.get(&id).map(|t| t.clone()))
    }

    async fn update(&self, token: &Token) -> Result<()> {
        let mut entry = self
            .tokens
            .get_mut(&token.id())
            .ok_or(AllocError::TokenNotFound(token.id()))?;
        *entry = token.clone();
        Ok(())
    }

    async fn count_by_resource_and_state(
        &self,
        resource: ResourceId,
        state: TokenState,
    ) -> Result<usize> {
        Ok(self
            .tokens
            .iter()
            .filter(|t| t.resource_id() == resource && t.state() == state)
            .count())
    }

    async fn list_by_resource_and_state(
        &self,
        resource: ResourceId,
        state: TokenState,
    ) -> Result<Vec<Token>> {
        Ok(self
            .tokens
            .iter()
            .filter(|t| t.resource_id() == resource && t.state() == state)
            .map(|t| t.clone())
            .collect())
    }
}
