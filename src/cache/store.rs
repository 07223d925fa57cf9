//! In-process key set cache keyed by source URI.
//!
//! Entries are served as authoritative while younger than `stale_after`, kept as a fallback for
//! failed fetches until `failure_grace` has passed, and evicted oldest-first whenever the total
//! body size would exceed `size_ceiling_bytes`.

// std
use std::collections::HashMap;
// crates.io
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
// self
use crate::{
	_prelude::*,
	cache::entry::{CacheEntry, CacheEntrySnapshot},
	jwk::JwkSet,
	metrics::{CacheMetrics, CacheMetricsSnapshot},
};

/// Default window during which an entry is served without revalidation.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(60 * 60);
/// Default window during which an entry survives failed refreshes.
pub const DEFAULT_FAILURE_GRACE: Duration = Duration::from_secs(60 * 60 * 24);
/// Default ceiling on the summed body size of all entries (20 MB).
pub const DEFAULT_SIZE_CEILING_BYTES: u64 = 20_000_000;

/// Cache tuning knobs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
	/// How long an entry may be served without revalidation.
	#[serde(default = "default_stale_after")]
	pub stale_after: Duration,
	/// How long an entry may still be served once refresh attempts fail.
	#[serde(default = "default_failure_grace")]
	pub failure_grace: Duration,
	/// Ceiling on the summed body size of all entries.
	#[serde(default = "default_size_ceiling_bytes")]
	pub size_ceiling_bytes: u64,
}
impl CacheConfig {
	/// Validate the configuration against the documented constraints.
	pub fn validate(&self) -> Result<()> {
		if self.stale_after.is_zero() {
			return Err(Error::Validation {
				field: "stale_after",
				reason: "Must be greater than zero.".into(),
			});
		}
		if self.failure_grace < self.stale_after {
			return Err(Error::Validation {
				field: "failure_grace",
				reason: "Must be greater than or equal to stale_after.".into(),
			});
		}
		if self.size_ceiling_bytes == 0 {
			return Err(Error::Validation {
				field: "size_ceiling_bytes",
				reason: "Must be greater than zero.".into(),
			});
		}

		Ok(())
	}
}
impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			stale_after: DEFAULT_STALE_AFTER,
			failure_grace: DEFAULT_FAILURE_GRACE,
			size_ceiling_bytes: DEFAULT_SIZE_CEILING_BYTES,
		}
	}
}

/// Size-bounded mapping from source URI to the key set last retrieved from it.
///
/// Every operation takes the lock for its own duration only and never suspends.
#[derive(Debug)]
pub struct KeySetCache {
	config: CacheConfig,
	state: RwLock<CacheState>,
	metrics: Arc<CacheMetrics>,
}
impl KeySetCache {
	/// Build a cache with the supplied configuration.
	pub fn new(config: CacheConfig) -> Result<Self> {
		config.validate()?;

		Ok(Self { config, state: RwLock::new(CacheState::default()), metrics: CacheMetrics::new() })
	}

	/// Active configuration.
	pub fn config(&self) -> &CacheConfig {
		&self.config
	}

	/// Telemetry accumulator shared with resolvers using this cache.
	pub fn metrics(&self) -> Arc<CacheMetrics> {
		self.metrics.clone()
	}

	/// Store the key set retrieved from `uri`, replacing any previous entry for it.
	///
	/// Returns `false` without touching the cache when `size_bytes` alone exceeds the ceiling.
	/// Otherwise the oldest entries are evicted until the new one fits.
	pub fn put(&self, uri: &str, jwks: Arc<JwkSet>, size_bytes: u64) -> bool {
		let ceiling = self.config.size_ceiling_bytes;

		if size_bytes > ceiling {
			tracing::warn!(uri, size_bytes, ceiling, "key set exceeds cache ceiling; not cached");

			self.metrics.record_rejection();

			return false;
		}

		let now = Instant::now();
		let mut state = self.state.write();
		let previous = state.remove(uri);

		while state.total_bytes + size_bytes > ceiling {
			match state.evict_oldest() {
				Some(evicted) => {
					tracing::debug!(uri = evicted.uri(), size = evicted.size_bytes(), "evicted key set");

					self.metrics.record_eviction();
				},
				None => break,
			}
		}

		let fetched_at = previous.map_or(now, |entry| entry.fetched_at().max(now));

		state.insert(CacheEntry::new(uri, jwks, size_bytes, fetched_at));

		true
	}

	/// Whether an entry for `uri` exists and is younger than `stale_after`.
	pub fn is_fresh(&self, uri: &str) -> bool {
		self.fresh(uri).is_some()
	}

	/// Key set for `uri` when it is fresh.
	pub fn fresh(&self, uri: &str) -> Option<Arc<JwkSet>> {
		let now = Instant::now();
		let state = self.state.read();

		state
			.entries
			.get(uri)
			.filter(|entry| entry.is_fresh(now, self.config.stale_after))
			.map(|entry| entry.jwks().clone())
	}

	/// Drop the entry for `uri` when it has outlived the failure grace.
	///
	/// Returns whether an entry was removed.
	pub fn prune_if_expired(&self, uri: &str) -> bool {
		let now = Instant::now();
		let mut state = self.state.write();
		let expired = state
			.entries
			.get(uri)
			.is_some_and(|entry| entry.is_expired(now, self.config.failure_grace));

		if expired {
			state.remove(uri);

			tracing::debug!(uri, "pruned key set past failure grace");
		}

		expired
	}

	/// Plain lookup without freshness filtering.
	pub fn get(&self, uri: &str) -> Option<CacheEntry> {
		self.state.read().entries.get(uri).cloned()
	}

	/// Whether an entry for `uri` exists.
	pub fn contains(&self, uri: &str) -> bool {
		self.state.read().entries.contains_key(uri)
	}

	/// Number of cached entries.
	pub fn len(&self) -> usize {
		self.state.read().entries.len()
	}

	/// Whether the cache holds no entries.
	pub fn is_empty(&self) -> bool {
		self.state.read().entries.is_empty()
	}

	/// Summed body size of all entries.
	pub fn total_bytes(&self) -> u64 {
		self.state.read().total_bytes
	}

	/// Reporting view of every entry, oldest first.
	pub fn entries(&self) -> Vec<CacheEntrySnapshot> {
		let now = Instant::now();
		let state = self.state.read();
		let mut entries: Vec<&CacheEntry> = state.entries.values().collect();

		entries.sort_by_key(|entry| entry.fetched_at());

		entries.into_iter().map(|entry| entry.snapshot(now)).collect()
	}

	/// Evict the oldest entry, returning its URI.
	pub fn evict_oldest(&self) -> Option<String> {
		let evicted = self.state.write().evict_oldest()?;

		self.metrics.record_eviction();

		Some(evicted.uri().to_owned())
	}

	/// Remove every entry.
	pub fn clear(&self) {
		let mut state = self.state.write();

		state.entries.clear();
		state.total_bytes = 0;
	}

	/// Aggregate status for operational reporting.
	pub fn status(&self) -> CacheStatus {
		let (entries, total_bytes) = {
			let state = self.state.read();

			(state.entries.len(), state.total_bytes)
		};

		CacheStatus {
			entries,
			total_bytes,
			size_ceiling_bytes: self.config.size_ceiling_bytes,
			metrics: self.metrics.snapshot(),
		}
	}
}
impl Default for KeySetCache {
	fn default() -> Self {
		Self {
			config: CacheConfig::default(),
			state: RwLock::new(CacheState::default()),
			metrics: CacheMetrics::new(),
		}
	}
}

/// Aggregate cache status.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheStatus {
	/// Number of cached entries.
	pub entries: usize,
	/// Summed body size of all entries.
	pub total_bytes: u64,
	/// Configured size ceiling.
	pub size_ceiling_bytes: u64,
	/// Telemetry counters.
	pub metrics: CacheMetricsSnapshot,
}

#[derive(Debug, Default)]
struct CacheState {
	entries: HashMap<String, CacheEntry>,
	total_bytes: u64,
}
impl CacheState {
	fn insert(&mut self, entry: CacheEntry) {
		self.total_bytes += entry.size_bytes();

		if let Some(replaced) = self.entries.insert(entry.uri().to_owned(), entry) {
			self.total_bytes -= replaced.size_bytes();
		}
	}

	fn remove(&mut self, uri: &str) -> Option<CacheEntry> {
		let removed = self.entries.remove(uri)?;

		self.total_bytes -= removed.size_bytes();

		Some(removed)
	}

	fn evict_oldest(&mut self) -> Option<CacheEntry> {
		let oldest = self
			.entries
			.values()
			.min_by_key(|entry| entry.fetched_at())
			.map(|entry| entry.uri().to_owned())?;

		self.remove(&oldest)
	}
}

fn default_stale_after() -> Duration {
	DEFAULT_STALE_AFTER
}

fn default_failure_grace() -> Duration {
	DEFAULT_FAILURE_GRACE
}

fn default_size_ceiling_bytes() -> u64 {
	DEFAULT_SIZE_CEILING_BYTES
}
