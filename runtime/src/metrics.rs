//! Prometheus metrics bootstrap.
//!
//! Installs the global `metrics` recorder backed by
//! `metrics-exporter-prometheus` and serves the scrape endpoint. Counters are
//! recorded through the `metrics` macros from anywhere in the process.
//!
//! # Example
//!
//! ```rust,no_run
//! use studio_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server bound to `addr` once started.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the recorder and spawn the scrape listener.
    ///
    /// Must run inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Build`] if the listener cannot be built and
    /// [`MetricsError::Install`] if another recorder is already installed.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        describe_runtime_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();
        let addr = self.addr;
        metrics::set_global_recorder(recorder)
            .map_err(|e| MetricsError::Install(e.to_string()))?;

        // ExporterError implements neither Debug nor Display.
        tokio::spawn(async move {
            if exporter.await.is_err() {
                tracing::error!(addr = %addr, "Metrics exporter stopped");
            }
        });

        self.handle = Some(handle);
        tracing::info!(addr = %self.addr, "Metrics available at http://{}/metrics", self.addr);
        Ok(())
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the server hasn't been started.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register descriptions of the metrics this crate emits.
pub fn describe_runtime_metrics() {
    describe_counter!(
        "studio_transaction_retries_total",
        "Transactions re-run after a transient write conflict"
    );
    describe_counter!(
        "studio_transaction_retries_exhausted_total",
        "Transactions that still conflicted after the retry budget"
    );
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record one retry of `operation`.
    pub fn record_retry(operation: &'static str) {
        counter!("studio_transaction_retries_total", "operation" => operation).increment(1);
    }

    /// Record that `operation` ran out of retries.
    pub fn record_exhausted(operation: &'static str) {
        counter!("studio_transaction_retries_exhausted_total", "operation" => operation)
            .increment(1);
    }
}
