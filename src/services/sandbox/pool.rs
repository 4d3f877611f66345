//! Container Pool Implementation
//!
//! A fixed-capacity free list of pre-warmed container IDs for one image and
//! runtime configuration. Callers keep one pool per configuration; entries
//! carry no metadata.
//!
//! The pool is a cache, not a semaphore: `acquire` and `release` never wait.
//! IDs come back out in the order they were released.

use super::context::ExecContext;
use super::exceptions::{SandboxError, SandboxResult};
use super::runtime::ContainerRuntime;
use crate::utils::timeout::{with_timeout, TimeoutConfig};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct PoolState {
    idle: VecDeque<String>,
    closed: bool,
}

/// Pre-warmed container IDs for one (image, runtime) pair
pub struct ContainerPool {
    runtime: Arc<dyn ContainerRuntime>,
    capacity: usize,
    cleanup_timeout: Duration,
    state: Mutex<PoolState>,
}

impl ContainerPool {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, capacity: usize) -> Self {
        Self {
            runtime,
            capacity,
            cleanup_timeout: TimeoutConfig::default().cleanup_timeout,
            state: Mutex::new(PoolState {
                idle: VecDeque::with_capacity(capacity),
                closed: false,
            }),
        }
    }

    pub fn with_cleanup_timeout(mut self, timeout: Duration) -> Self {
        self.cleanup_timeout = timeout;
        self
    }

    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a warm container if one is idle.
    ///
    /// `Ok(None)` means the pool is empty and the caller should create a
    /// container on demand.
    pub fn acquire(&self, ctx: &ExecContext) -> SandboxResult<Option<String>> {
        let mut state = self.state();
        if state.closed {
            return Err(SandboxError::PoolClosed);
        }
        if let Some(id) = state.idle.pop_front() {
            return Ok(Some(id));
        }
        drop(state);

        match ctx.err() {
            Some(err) => Err(SandboxError::Context(err)),
            None => Ok(None),
        }
    }

    /// Return a container to the pool.
    ///
    /// Discarded silently once the pool is closed. When the pool is full the
    /// container is cleaned up instead, so the pool never holds more than its
    /// capacity.
    pub async fn release(&self, container_id: String) {
        if let Some(discarded) = self.offer(container_id).await {
            tracing::debug!(container_id = %discarded, "Container pool closed, discarding released container");
        }
    }

    /// Like [`release`](Self::release), but a closed pool hands the container
    /// back so the caller can remove it.
    ///
    /// The closed check and the insert happen under one lock, so a container
    /// is either pooled (and cleaned up by `close`) or returned, never lost.
    pub async fn offer(&self, container_id: String) -> Option<String> {
        let overflow = {
            let mut state = self.state();
            if state.closed {
                return Some(container_id);
            }
            if state.idle.len() < self.capacity {
                state.idle.push_back(container_id);
                return None;
            }
            container_id
        };

        tracing::debug!(
            container_id = %overflow,
            capacity = self.capacity,
            "Container pool full, cleaning up released container"
        );
        self.cleanup_one(&overflow).await;
        None
    }

    /// Close the pool and clean up every idle container. Idempotent.
    pub async fn close(&self) {
        let drained: Vec<String> = {
            let mut state = self.state();
            if state.closed {
                return;
            }
            state.closed = true;
            state.idle.drain(..).collect()
        };

        tracing::info!(
            runtime = self.runtime.name(),
            containers = drained.len(),
            "Closing container pool"
        );

        for container_id in drained {
            self.cleanup_one(&container_id).await;
        }
    }

    async fn cleanup_one(&self, container_id: &str) {
        let ctx = ExecContext::background().with_timeout(self.cleanup_timeout);
        let cleanup = self.runtime.cleanup(&ctx, container_id);
        if let Err(e) = with_timeout(self.cleanup_timeout, cleanup).await {
            tracing::warn!(container_id, error = %e, "Failed to clean up pooled container");
        }
    }

    /// Number of idle containers
    pub fn size(&self) -> usize {
        self.state().idle.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}
