//! Cache entry definitions.

// crates.io
use serde::{Deserialize, Serialize};
// self
use crate::{_prelude::*, jwk::JwkSet};

/// A key set retrieved from one URI, stamped with its retrieval time.
#[derive(Clone, Debug)]
pub struct CacheEntry {
	uri: Arc<str>,
	jwks: Arc<JwkSet>,
	fetched_at: Instant,
	fetched_at_wallclock: DateTime<Utc>,
	size_bytes: u64,
}
impl CacheEntry {
	/// Create an entry stamped at `fetched_at`.
	pub fn new(
		uri: impl Into<Arc<str>>,
		jwks: Arc<JwkSet>,
		size_bytes: u64,
		fetched_at: Instant,
	) -> Self {
		Self { uri: uri.into(), jwks, fetched_at, fetched_at_wallclock: Utc::now(), size_bytes }
	}

	/// Source URI of the key set.
	pub fn uri(&self) -> &str {
		&self.uri
	}

	/// Cached key set.
	pub fn jwks(&self) -> &Arc<JwkSet> {
		&self.jwks
	}

	/// Monotonic retrieval time.
	pub fn fetched_at(&self) -> Instant {
		self.fetched_at
	}

	/// Wall-clock retrieval time, for reporting only.
	pub fn fetched_at_wallclock(&self) -> DateTime<Utc> {
		self.fetched_at_wallclock
	}

	/// Size of the response body the key set was parsed from.
	pub fn size_bytes(&self) -> u64 {
		self.size_bytes
	}

	/// Time elapsed since retrieval.
	pub fn age(&self, now: Instant) -> Duration {
		now.saturating_duration_since(self.fetched_at)
	}

	/// Whether the entry may still be served without revalidation.
	pub fn is_fresh(&self, now: Instant, stale_after: Duration) -> bool {
		self.age(now) < stale_after
	}

	/// Whether the entry has outlived the failure grace window.
	pub fn is_expired(&self, now: Instant, failure_grace: Duration) -> bool {
		self.age(now) > failure_grace
	}

	/// Capture a reporting view of the entry.
	pub fn snapshot(&self, now: Instant) -> CacheEntrySnapshot {
		CacheEntrySnapshot {
			uri: self.uri.to_string(),
			size_bytes: self.size_bytes,
			key_count: self.jwks.len(),
			fetched_at: self.fetched_at_wallclock,
			age: self.age(now),
		}
	}
}

/// Reporting view of a cache entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntrySnapshot {
	/// Source URI of the key set.
	pub uri: String,
	/// Size of the response body the key set was parsed from.
	pub size_bytes: u64,
	/// Number of elements in the key sequence.
	pub key_count: usize,
	/// Wall-clock retrieval time.
	pub fetched_at: DateTime<Utc>,
	/// Age at capture time.
	pub age: Duration,
}
