//! Metrics helpers and per-cache telemetry bookkeeping.
//!
//! Counters are always kept in-process on [`CacheMetrics`]; with the `metrics` feature the same
//! events are also emitted through the `metrics` facade, labelled by key set host.

// std
use std::sync::atomic::{AtomicU64, Ordering};
#[cfg(feature = "prometheus")] use std::sync::OnceLock;
// crates.io
#[cfg(feature = "metrics")] use metrics::Label;
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::{Deserialize, Serialize};
#[cfg(feature = "metrics")] use smallvec::SmallVec;
// self
use crate::_prelude::*;

#[cfg(feature = "metrics")]
type LabelSet = SmallVec<[Label; 2]>;

#[cfg(feature = "metrics")]
const METRIC_LOOKUPS_TOTAL: &str = "jwks_utils_cache_lookups_total";
#[cfg(feature = "metrics")]
const METRIC_HITS_TOTAL: &str = "jwks_utils_cache_hits_total";
#[cfg(feature = "metrics")]
const METRIC_STALE_TOTAL: &str = "jwks_utils_cache_stale_total";
#[cfg(feature = "metrics")]
const METRIC_FETCH_TOTAL: &str = "jwks_utils_fetch_total";
#[cfg(feature = "metrics")]
const METRIC_FETCH_DURATION: &str = "jwks_utils_fetch_duration_seconds";
#[cfg(feature = "metrics")]
const METRIC_EVICTIONS_TOTAL: &str = "jwks_utils_cache_evictions_total";
#[cfg(feature = "metrics")]
const METRIC_REJECTIONS_TOTAL: &str = "jwks_utils_cache_rejections_total";

/// Shared Prometheus handle installed by [`install_default_exporter`].
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Thread-safe telemetry accumulator owned by a key set cache.
#[derive(Debug, Default)]
pub struct CacheMetrics {
	lookups: AtomicU64,
	cache_hits: AtomicU64,
	stale_serves: AtomicU64,
	fetch_successes: AtomicU64,
	fetch_errors: AtomicU64,
	evictions: AtomicU64,
	rejections: AtomicU64,
	last_fetch_micros: AtomicU64,
}
impl CacheMetrics {
	/// Create a new metrics accumulator.
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Record a remote lookup answered from a fresh cache entry.
	pub fn record_hit(&self, host: &str) {
		self.lookups.fetch_add(1, Ordering::Relaxed);
		self.cache_hits.fetch_add(1, Ordering::Relaxed);

		#[cfg(feature = "metrics")]
		{
			let labels = host_labels(host);

			metrics::counter!(METRIC_LOOKUPS_TOTAL, labels.iter()).increment(1);
			metrics::counter!(METRIC_HITS_TOTAL, labels.iter()).increment(1);
		}
		#[cfg(not(feature = "metrics"))]
		let _ = host;
	}

	/// Record a remote lookup that had to wait for the network.
	pub fn record_miss(&self, host: &str) {
		self.lookups.fetch_add(1, Ordering::Relaxed);

		#[cfg(feature = "metrics")]
		metrics::counter!(METRIC_LOOKUPS_TOTAL, host_labels(host).iter()).increment(1);
		#[cfg(not(feature = "metrics"))]
		let _ = host;
	}

	/// Record a lookup answered from a stale entry after a failed fetch.
	pub fn record_stale_serve(&self, host: &str) {
		self.stale_serves.fetch_add(1, Ordering::Relaxed);

		#[cfg(feature = "metrics")]
		metrics::counter!(METRIC_STALE_TOTAL, host_labels(host).iter()).increment(1);
		#[cfg(not(feature = "metrics"))]
		let _ = host;
	}

	/// Record a successful fetch and its latency.
	pub fn record_fetch_success(&self, host: &str, duration: Duration) {
		self.fetch_successes.fetch_add(1, Ordering::Relaxed);
		self.last_fetch_micros.store(duration.as_micros() as u64, Ordering::Relaxed);

		#[cfg(feature = "metrics")]
		{
			metrics::counter!(METRIC_FETCH_TOTAL, status_labels(host, "success").iter())
				.increment(1);
			metrics::histogram!(METRIC_FETCH_DURATION, host_labels(host).iter())
				.record(duration.as_secs_f64());
		}
		#[cfg(not(feature = "metrics"))]
		let _ = host;
	}

	/// Record a failed fetch.
	pub fn record_fetch_error(&self, host: &str) {
		self.fetch_errors.fetch_add(1, Ordering::Relaxed);

		#[cfg(feature = "metrics")]
		metrics::counter!(METRIC_FETCH_TOTAL, status_labels(host, "error").iter()).increment(1);
		#[cfg(not(feature = "metrics"))]
		let _ = host;
	}

	/// Record an entry removed to make room under the size ceiling.
	pub fn record_eviction(&self) {
		self.evictions.fetch_add(1, Ordering::Relaxed);

		#[cfg(feature = "metrics")]
		metrics::counter!(METRIC_EVICTIONS_TOTAL).increment(1);
	}

	/// Record a key set refused because it alone exceeds the size ceiling.
	pub fn record_rejection(&self) {
		self.rejections.fetch_add(1, Ordering::Relaxed);

		#[cfg(feature = "metrics")]
		metrics::counter!(METRIC_REJECTIONS_TOTAL).increment(1);
	}

	/// Take a point-in-time snapshot for status reporting.
	pub fn snapshot(&self) -> CacheMetricsSnapshot {
		CacheMetricsSnapshot {
			lookups: self.lookups.load(Ordering::Relaxed),
			cache_hits: self.cache_hits.load(Ordering::Relaxed),
			stale_serves: self.stale_serves.load(Ordering::Relaxed),
			fetch_successes: self.fetch_successes.load(Ordering::Relaxed),
			fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
			evictions: self.evictions.load(Ordering::Relaxed),
			rejections: self.rejections.load(Ordering::Relaxed),
			last_fetch_micros: match self.last_fetch_micros.load(Ordering::Relaxed) {
				0 => None,
				value => Some(value),
			},
		}
	}
}

/// Read-only snapshot of cache telemetry counters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheMetricsSnapshot {
	/// Remote lookups observed.
	pub lookups: u64,
	/// Remote lookups served from a fresh entry.
	pub cache_hits: u64,
	/// Lookups served from a stale entry after a failed fetch.
	pub stale_serves: u64,
	/// Successful fetches.
	pub fetch_successes: u64,
	/// Failed fetches.
	pub fetch_errors: u64,
	/// Entries evicted under size pressure.
	pub evictions: u64,
	/// Key sets refused for exceeding the size ceiling on their own.
	pub rejections: u64,
	/// Microsecond latency of the most recent successful fetch.
	pub last_fetch_micros: Option<u64>,
}
impl CacheMetricsSnapshot {
	/// Ratio of cache hits over remote lookups.
	pub fn hit_rate(&self) -> f64 {
		if self.lookups == 0 { 0.0 } else { self.cache_hits as f64 / self.lookups as f64 }
	}

	/// Ratio of stale serves over remote lookups.
	pub fn stale_ratio(&self) -> f64 {
		if self.lookups == 0 { 0.0 } else { self.stale_serves as f64 / self.lookups as f64 }
	}
}

/// Install the default Prometheus recorder backed by `metrics`.
///
/// Multiple invocations are safe; subsequent calls become no-ops once the recorder is installed.
#[cfg(feature = "prometheus")]
pub fn install_default_exporter() -> Result<()> {
	if PROMETHEUS_HANDLE.get().is_some() {
		return Ok(());
	}

	let handle = PrometheusBuilder::new()
		.install_recorder()
		.map_err(|err| Error::Validation { field: "metrics", reason: err.to_string() })?;
	let _ = PROMETHEUS_HANDLE.set(handle);

	Ok(())
}

/// Access the global Prometheus exporter handle when installed.
#[cfg(feature = "prometheus")]
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
	PROMETHEUS_HANDLE.get()
}

#[cfg(feature = "metrics")]
fn host_labels(host: &str) -> LabelSet {
	let mut labels = LabelSet::new();

	labels.push(Label::new("host", host.to_owned()));

	labels
}

#[cfg(feature = "metrics")]
fn status_labels(host: &str, status: &'static str) -> LabelSet {
	let mut labels = host_labels(host);

	labels.push(Label::new("status", status));

	labels
}
