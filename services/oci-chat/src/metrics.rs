//! Prometheus recorder for the auth counters
//!
//! The authenticator emits:
//!
//! - `oci_auth_refresh_total` (counter): labels `backend`, `trigger`, `outcome`
//! - `oci_auth_unauthorized_retries_total` (counter): label `backend`
//!
//! A one-shot CLI has no scrape endpoint, so `--print-metrics` renders the
//! text exposition to stderr after the reply.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")
}
