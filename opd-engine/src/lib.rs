//! opd-engine: priority admission, emergency preemption and waitlist backfill
//! for capacity-bounded clinic slots.

mod config;
mod error;
mod priority;
mod token;

pub mod coordinator;
pub mod engine;
pub mod service;
pub mod store;
pub mod transport;

/// Engine version from Cargo.toml, reported by the health check.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub use config::EngineConfig;
pub use coordinator::{AllocationCoordinator, Occupancy, Released, Schedule};
pub use engine::{Admission, Admitted};
pub use error::{AllocError, Result};
pub use priority::PriorityClass;
pub use service::AllocationService;
pub use store::{
    InMemoryResourceStore, InMemoryTokenStore, Resource, ResourceId, ResourceStore, TokenStore,
};
pub use token::{
    Outcome, RequestMetadata, Sequence, Token, TokenDraft, TokenId, TokenState, WaitReason,
};
