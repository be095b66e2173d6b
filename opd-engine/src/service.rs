//! AllocationService: transport-facing wrapper around the coordinator.
//!
//! This service owns:
//! - The AllocationCoordinator (admission, release, queries)
//! - Shutdown coordination: transports watch the flag, the server drains
//!   every slot once it stops accepting requests
//! - The embedding server's version, if any
//!
//! Transports (HTTP, or anything else) delegate to this service.

use tokio::sync::watch;

use crate::config::EngineConfig;
use crate::coordinator::{AllocationCoordinator, Schedule};
use crate::error::Result;

pub struct AllocationService {
    coordinator: AllocationCoordinator,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    server_version: Option<String>,
}

impl AllocationService {
    pub fn new(coordinator: AllocationCoordinator) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            coordinator,
            shutdown_tx,
            shutdown_rx,
            server_version: None,
        }
    }

    /// Service over fresh in-memory stores.
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(AllocationCoordinator::in_memory(config))
    }

    pub fn with_server_version(mut self, version: impl Into<String>) -> Self {
        self.server_version = Some(version.into());
        self
    }

    pub fn coordinator(&self) -> &AllocationCoordinator {
        &self.coordinator
    }

    pub fn server_version(&self) -> Option<&str> {
        self.server_version.as_deref()
    }

    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Mark the service as shutting down and wait for every slot to settle.
    ///
    /// Returns the final schedule of each slot. Safe to call after
    /// `trigger_shutdown`.
    pub async fn shutdown(&self) -> Result<Vec<Schedule>> {
        self.trigger_shutdown();
        let schedules = self.coordinator.drain().await?;
        let waiting: usize = schedules.iter().map(|s| s.waiting.len()).sum();
        if waiting > 0 {
            tracing::warn!(
                slots = schedules.len(),
                waiting,
                "Shutting down with tokens still waitlisted"
            );
        }
        Ok(schedules)
    }
}
