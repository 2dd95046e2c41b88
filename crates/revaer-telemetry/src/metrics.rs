//! Prometheus-backed metrics registry and snapshot helpers for the job pipeline.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the progress/speed counters the download and upload executors emit, queue depth,
//!   per-phase active-job gauges, and the health monitor's recovery counter.

use std::convert::TryFrom;

use anyhow::{Context, Result};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

/// Prometheus-backed metrics registry shared across the job pipeline's processes.
#[derive(Clone)]
pub struct Metrics {
    inner: std::sync::Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    bytes_downloaded_total: IntCounter,
    bytes_uploaded_total: IntCounterVec,
    queue_depth: IntGauge,
    active_downloads: IntGauge,
    active_uploads: IntGauge,
    stale_recoveries_total: IntCounter,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Total bytes downloaded across all jobs since process start.
    pub bytes_downloaded_total: u64,
    /// Current number of queued jobs awaiting dispatch.
    pub queue_depth: i64,
    /// Current number of jobs actively downloading.
    pub active_downloads: i64,
    /// Current number of jobs actively uploading.
    pub active_uploads: i64,
    /// Total stale jobs recovered by the health monitor since process start.
    pub stale_recoveries_total: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the job pipeline's collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let bytes_downloaded_total = IntCounter::with_opts(Opts::new(
            "download_bytes_total",
            "Total bytes downloaded by torrent jobs",
        ))?;
        let bytes_uploaded_total = IntCounterVec::new(
            Opts::new("upload_bytes_total", "Total bytes uploaded, by storage provider"),
            &["provider"],
        )?;
        let queue_depth =
            IntGauge::with_opts(Opts::new("job_queue_depth", "Jobs queued awaiting dispatch"))?;
        let active_downloads = IntGauge::with_opts(Opts::new(
            "active_downloads",
            "Jobs currently in the download phase",
        ))?;
        let active_uploads = IntGauge::with_opts(Opts::new(
            "active_uploads",
            "Jobs currently in the upload phase",
        ))?;
        let stale_recoveries_total = IntCounter::with_opts(Opts::new(
            "stale_recoveries_total",
            "Stale jobs re-dispatched by the health monitor",
        ))?;

        registry.register(Box::new(bytes_downloaded_total.clone()))?;
        registry.register(Box::new(bytes_uploaded_total.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;
        registry.register(Box::new(active_downloads.clone()))?;
        registry.register(Box::new(active_uploads.clone()))?;
        registry.register(Box::new(stale_recoveries_total.clone()))?;

        Ok(Self {
            inner: std::sync::Arc::new(MetricsInner {
                registry,
                bytes_downloaded_total,
                bytes_uploaded_total,
                queue_depth,
                active_downloads,
                active_uploads,
                stale_recoveries_total,
            }),
        })
    }

    /// Add `delta` bytes to the cumulative download counter.
    pub fn inc_bytes_downloaded(&self, delta: u64) {
        self.inner.bytes_downloaded_total.inc_by(delta);
    }

    /// Add `delta` bytes to the cumulative upload counter for `provider` (`"googledrive"` or
    /// `"s3"`).
    pub fn inc_bytes_uploaded(&self, provider: &str, delta: u64) {
        self.inner.bytes_uploaded_total.with_label_values(&[provider]).inc_by(delta);
    }

    /// Set the queue-depth gauge to the number of jobs currently awaiting dispatch.
    pub fn set_queue_depth(&self, depth: i64) {
        self.inner.queue_depth.set(depth);
    }

    /// Mark one more job as actively downloading.
    pub fn inc_active_downloads(&self) {
        self.inner.active_downloads.inc();
    }

    /// Mark one fewer job as actively downloading.
    pub fn dec_active_downloads(&self) {
        self.inner.active_downloads.dec();
    }

    /// Mark one more job as actively uploading.
    pub fn inc_active_uploads(&self) {
        self.inner.active_uploads.inc();
    }

    /// Mark one fewer job as actively uploading.
    pub fn dec_active_uploads(&self) {
        self.inner.active_uploads.dec();
    }

    /// Increment the count of stale jobs the health monitor has recovered.
    pub fn inc_stale_recovery(&self) {
        self.inner.stale_recoveries_total.inc();
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .context("failed to encode Prometheus metrics")?;
        String::from_utf8(buffer).context("metrics output was not valid UTF-8")
    }

    /// Take a point-in-time snapshot of the most relevant gauges and counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            bytes_downloaded_total: self.inner.bytes_downloaded_total.get(),
            queue_depth: self.inner.queue_depth.get(),
            active_downloads: self.inner.active_downloads.get(),
            active_uploads: self.inner.active_uploads.get(),
            stale_recoveries_total: self.inner.stale_recoveries_total.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_snapshot_reflects_updates() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.inc_bytes_downloaded(1_024);
        metrics.inc_bytes_uploaded("googledrive", 512);
        metrics.inc_bytes_uploaded("s3", 256);
        metrics.set_queue_depth(3);
        metrics.inc_active_downloads();
        metrics.inc_active_uploads();
        metrics.inc_stale_recovery();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.bytes_downloaded_total, 1_024);
        assert_eq!(snapshot.queue_depth, 3);
        assert_eq!(snapshot.active_downloads, 1);
        assert_eq!(snapshot.active_uploads, 1);
        assert_eq!(snapshot.stale_recoveries_total, 1);

        metrics.dec_active_downloads();
        metrics.dec_active_uploads();
        let settled = metrics.snapshot();
        assert_eq!(settled.active_downloads, 0);
        assert_eq!(settled.active_uploads, 0);

        let rendered = metrics.render()?;
        assert!(rendered.contains("download_bytes_total"));
        assert!(rendered.contains("upload_bytes_total"));
        assert!(rendered.contains("stale_recoveries_total"));
        Ok(())
    }
}
