//! AllocationCoordinator: per-resource serialization of engine calls.
//!
//! This coordinator owns:
//! - One exclusive lock per resource (DashMap of tokio mutexes)
//! - The injected resource and token stores
//! - Timeout policy for lock acquisition
//!
//! Every operation that reads or writes a resource's occupancy runs while
//! holding that resource's lock. Different resources never share a lock.
//!
//! Once a lock is acquired the critical section runs on its own task, which
//! owns the guard. Dropping the caller's future therefore cannot leave a
//! preemption half-applied: the operation either completes or never started.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::config::EngineConfig;
use crate::engine::{self, Admitted};
use crate::error::{AllocError, Result};
use crate::priority::PriorityClass;
use crate::store::{
    InMemoryResourceStore, InMemoryTokenStore, Resource, ResourceId, ResourceStore, TokenStore,
};
use crate::token::{Outcome, RequestMetadata, Token, TokenDraft, TokenId, TokenState};

/// Result of a release.
#[derive(Debug, Clone, Serialize)]
pub struct Released {
    pub token: Token,
    /// Waiting token moved into the freed unit, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promoted: Option<TokenId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Occupancy {
    pub resource_id: ResourceId,
    pub active: usize,
    pub capacity: usize,
}

impl Occupancy {
    pub fn is_full(&self) -> bool {
        self.active >= self.capacity
    }
}

/// Consistent view of one slot.
#[derive(Debug, Clone, Serialize)]
pub struct Schedule {
    pub resource_id: ResourceId,
    pub capacity: usize,
    /// Occupants in creation order.
    pub occupying: Vec<Token>,
    /// Waiting tokens in promotion order.
    pub waiting: Vec<Token>,
}

struct Inner {
    resources: Arc<dyn ResourceStore>,
    tokens: Arc<dyn TokenStore>,
    locks: DashMap<ResourceId, Arc<Mutex<()>>>,
    config: EngineConfig,
}

impl Inner {
    fn lock_for(&self, resource: ResourceId) -> Arc<Mutex<()>> {
        self.locks.entry(resource).or_default().value().clone()
    }
}

/// Cheaply clonable handle; clones share locks and stores.
#[derive(Clone)]
pub struct AllocationCoordinator {
    inner: Arc<Inner>,
}

impl AllocationCoordinator {
    pub fn new(
        resources: Arc<dyn ResourceStore>,
        tokens: Arc<dyn TokenStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                resources,
                tokens,
                locks: DashMap::new(),
                config,
            }),
        }
    }

    /// Coordinator over fresh in-memory stores.
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(
            Arc::new(InMemoryResourceStore::new()),
            Arc::new(InMemoryTokenStore::new()),
            config,
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub async fn open_resource(&self, capacity: usize) -> Result<Resource> {
        let resource = self.inner.resources.create(capacity).await?;
        tracing::info!(resource = %resource.id, capacity, "Slot opened");
        Ok(resource)
    }

    /// Admit a new token using the configured timeout.
    pub async fn submit(
        &self,
        resource: ResourceId,
        class: PriorityClass,
        metadata: RequestMetadata,
    ) -> Result<Admitted> {
        self.submit_within(resource, class, metadata, self.inner.config.operation_timeout)
            .await
    }

    pub async fn submit_within(
        &self,
        resource: ResourceId,
        class: PriorityClass,
        metadata: RequestMetadata,
        timeout: Option<Duration>,
    ) -> Result<Admitted> {
        let capacity = self.inner.resources.capacity(resource).await?;
        let draft = TokenDraft::new(resource, class, metadata);

        self.exclusive(resource, timeout, move |inner| async move {
            engine::admit(inner.tokens.as_ref(), capacity, draft).await
        })
        .await
    }

    /// Move a token into a terminal state using the configured timeout.
    ///
    /// Releasing an occupant as `Fulfilled` or `Cancelled` promotes at most
    /// one waiting token before returning. `NoShow` vacates the unit but
    /// promotes nobody.
    pub async fn release(&self, token_id: TokenId, outcome: Outcome) -> Result<Released> {
        self.release_within(token_id, outcome, self.inner.config.operation_timeout)
            .await
    }

    pub async fn release_within(
        &self,
        token_id: TokenId,
        outcome: Outcome,
        timeout: Option<Duration>,
    ) -> Result<Released> {
        // resource_id never changes, so it is safe to read before locking
        let resource = self.token(token_id).await?.resource_id();
        let capacity = self.inner.resources.capacity(resource).await?;

        self.exclusive(resource, timeout, move |inner| async move {
            let mut token = inner
                .tokens
                .get(token_id)
                .await?
                .ok_or(AllocError::TokenNotFound(token_id))?;

            let was_occupying = token.state() == TokenState::Occupying;
            token.transition(outcome.state())?;
            inner.tokens.update(&token).await?;
            tracing::info!(
                %resource,
                token = %token_id,
                state = %token.state(),
                was_occupying,
                "Token released"
            );

            let promoted = if was_occupying && outcome.triggers_backfill() {
                engine::reallocate(inner.tokens.as_ref(), resource, capacity).await?
            } else {
                None
            };

            Ok(Released { token, promoted })
        })
        .await
    }

    pub async fn occupancy(&self, resource: ResourceId) -> Result<Occupancy> {
        let capacity = self.inner.resources.capacity(resource).await?;
        self.exclusive(
            resource,
            self.inner.config.operation_timeout,
            move |inner| async move {
                let active = inner
                    .tokens
                    .count_by_resource_and_state(resource, TokenState::Occupying)
                    .await?;
                Ok(Occupancy {
                    resource_id: resource,
                    active,
                    capacity,
                })
            },
        )
        .await
    }

    /// Waiting token ids in promotion order.
    pub async fn list_waiting(&self, resource: ResourceId) -> Result<Vec<TokenId>> {
        let schedule = self.schedule(resource).await?;
        Ok(schedule.waiting.iter().map(Token::id).collect())
    }

    pub async fn schedule(&self, resource: ResourceId) -> Result<Schedule> {
        self.schedule_within(resource, self.inner.config.operation_timeout)
            .await
    }

    /// Wait for every slot's in-flight operation to finish and return a final
    /// schedule per slot, in slot order.
    ///
    /// Lock waits are unbounded here. Operations submitted after a slot has
    /// been drained still run; callers stop accepting work first.
    pub async fn drain(&self) -> Result<Vec<Schedule>> {
        let resources = self.inner.resources.list().await?;
        let mut schedules = Vec::with_capacity(resources.len());
        for resource in resources {
            let schedule = self.schedule_within(resource.id, None).await?;
            tracing::info!(
                resource = %schedule.resource_id,
                capacity = schedule.capacity,
                occupying = schedule.occupying.len(),
                waiting = schedule.waiting.len(),
                "Slot drained"
            );
            schedules.push(schedule);
        }
        Ok(schedules)
    }

    async fn schedule_within(
        &self,
        resource: ResourceId,
        timeout: Option<Duration>,
    ) -> Result<Schedule> {
        let capacity = self.inner.resources.capacity(resource).await?;
        self.exclusive(
            resource,
            timeout,
            move |inner| async move {
                let mut occupying = inner
                    .tokens
                    .list_by_resource_and_state(resource, TokenState::Occupying)
                    .await?;
                occupying.sort_by_key(Token::created_at);

                let mut waiting = inner
                    .tokens
                    .list_by_resource_and_state(resource, TokenState::Waiting)
                    .await?;
                engine::promotion_order(&mut waiting);

                Ok(Schedule {
                    resource_id: resource,
                    capacity,
                    occupying,
                    waiting,
                })
            },
        )
        .await
    }

    /// Fulfilled tokens in the order they were completed.
    pub async fn history(&self, resource: ResourceId) -> Result<Vec<Token>> {
        self.inner.resources.capacity(resource).await?;
        let mut fulfilled = self
            .inner
            .tokens
            .list_by_resource_and_state(resource, TokenState::Fulfilled)
            .await?;
        fulfilled.sort_by_key(|t| (t.completed_at(), t.created_at()));
        Ok(fulfilled)
    }

    pub async fn token(&self, token_id: TokenId) -> Result<Token> {
        self.inner
            .tokens
            .get(token_id)
            .await?
            .ok_or(AllocError::TokenNotFound(token_id))
    }

    /// Run `section` while holding `resource`'s lock.
    ///
    /// `timeout` bounds only the wait for the lock. Once acquired, the section
    /// runs to completion on a spawned task that owns the guard.
    async fn exclusive<F, Fut, T>(
        &self,
        resource: ResourceId,
        timeout: Option<Duration>,
        section: F,
    ) -> Result<T>
    where
        F: FnOnce(Arc<Inner>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let guard = self.acquire(resource, timeout).await?;
        let inner = Arc::clone(&self.inner);

        let task = tokio::spawn(async move {
            let _guard = guard;
            section(inner).await
        });

        task.await.map_err(|e| {
            tracing::error!(%resource, error = %e, "Critical section aborted");
            AllocError::Internal(format!("critical section aborted: {e}"))
        })?
    }

    async fn acquire(
        &self,
        resource: ResourceId,
        timeout: Option<Duration>,
    ) -> Result<OwnedMutexGuard<()>> {
        let lock = self.inner.lock_for(resource);
        let Some(limit) = timeout else {
            return Ok(lock.lock_owned().await);
        };

        match tokio::time::timeout(limit, lock.lock_owned()).await {
            Ok(guard) => {
                tracing::debug!(%resource, "Resource lock acquired");
                Ok(guard)
            }
            Err(_) => {
                tracing::warn!(%resource, timeout = ?limit, "Timed out waiting for resource lock");
                Err(AllocError::Timeout(limit))
            }
        }
    }
}
