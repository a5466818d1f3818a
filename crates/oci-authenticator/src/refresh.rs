//! Interval-based credential refresh with swap-on-refresh
//!
//! The policy owns the only mutable state in the auth layer: the current
//! signer backend and when it was last refreshed. Both live behind one
//! `tokio::sync::Mutex`. The lock is held for the staleness check and the
//! refresh itself, never while a request is in flight; callers clone the
//! `Arc` out and sign without it.
//!
//! States:
//! - Fresh: `now - last_refresh < refresh_interval`
//! - Stale: interval elapsed, or `last_refresh` unset

use std::sync::Arc;
use std::time::Duration;

use oci_auth::SignerBackend;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

struct PolicyState {
    backend: Arc<dyn SignerBackend>,
    last_refresh: Option<Instant>,
}

/// Wraps a signer backend with a time-interval refresh rule.
pub struct RefreshPolicy {
    state: Mutex<PolicyState>,
    refresh_interval: Duration,
}

impl RefreshPolicy {
    /// Start Fresh: the backend was just built.
    pub fn new(backend: Arc<dyn SignerBackend>, refresh_interval: Duration) -> Self {
        Self {
            state: Mutex::new(PolicyState {
                backend,
                last_refresh: Some(Instant::now()),
            }),
            refresh_interval,
        }
    }

    /// Override the initial refresh timestamp. `None` makes the first check stale.
    pub fn with_last_refresh(mut self, last_refresh: Option<Instant>) -> Self {
        self.state.get_mut().last_refresh = last_refresh;
        self
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Whether a backend refreshed at `last_refresh` is stale at `now`.
    pub fn is_stale_at(&self, last_refresh: Option<Instant>, now: Instant) -> bool {
        match last_refresh {
            None => true,
            Some(at) => now.saturating_duration_since(at) >= self.refresh_interval,
        }
    }

    pub async fn is_stale(&self) -> bool {
        let state = self.state.lock().await;
        self.is_stale_at(state.last_refresh, Instant::now())
    }

    /// The backend to sign with right now.
    pub async fn current(&self) -> Arc<dyn SignerBackend> {
        self.state.lock().await.backend.clone()
    }

    /// Refresh if stale. Returns whether a new backend was installed.
    ///
    /// Staleness is re-checked under the lock so concurrent callers that all
    /// saw a stale backend trigger a single refresh. Failures are logged and
    /// leave the backend and timestamp untouched.
    pub async fn refresh_if_needed(&self) -> bool {
        let mut state = self.state.lock().await;
        if !self.is_stale_at(state.last_refresh, Instant::now()) {
            return false;
        }

        let kind = state.backend.kind();
        debug!(backend = %kind, "signer is stale, refreshing");
        match state.backend.refresh().await {
            Ok(backend) => {
                state.backend = backend;
                state.last_refresh = Some(Instant::now());
                record_refresh(kind.label(), "interval", "success");
                info!(backend = %kind, "signer refreshed");
                true
            }
            Err(e) => {
                record_refresh(kind.label(), "interval", "failure");
                warn!(backend = %kind, error = %e, "signer refresh failed, keeping current credentials");
                false
            }
        }
    }

    /// Refresh regardless of staleness and return the new backend.
    ///
    /// On failure the current backend is kept and the error returned.
    pub async fn force_refresh(&self) -> oci_auth::Result<Arc<dyn SignerBackend>> {
        let mut state = self.state.lock().await;
        let kind = state.backend.kind();
        match state.backend.refresh().await {
            Ok(backend) => {
                state.backend = backend.clone();
                state.last_refresh = Some(Instant::now());
                record_refresh(kind.label(), "unauthorized", "success");
                info!(backend = %kind, "signer force-refreshed");
                Ok(backend)
            }
            Err(e) => {
                record_refresh(kind.label(), "unauthorized", "failure");
                Err(e)
            }
        }
    }
}

fn record_refresh(backend: &'static str, trigger: &'static str, outcome: &'static str) {
    metrics::counter!(
        "oci_auth_refresh_total",
        "backend" => backend,
        "trigger" => trigger,
        "outcome" => outcome
    )
    .increment(1);
}
