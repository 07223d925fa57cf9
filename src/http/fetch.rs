//! Bounded-timeout retrieval of a JWK Set that refreshes the cache on success.

// crates.io
use tokio::time;
use url::Url;
// self
use crate::{_prelude::*, cache::store::KeySetCache, http::client::Transport, jwk::JwkSet};

/// Fetch the key set published at `url` and store it in `cache`.
///
/// The deadline covers the whole exchange regardless of what the transport enforces. A body that
/// is not a JWK Set fails with [`Error::InvalidKeySet`] and is discarded. A key set too large for
/// the cache is still returned to the caller.
#[tracing::instrument(skip(transport, cache, url), fields(url = %url))]
pub async fn fetch_key_set<T>(
	transport: &T,
	cache: &KeySetCache,
	url: &Url,
	timeout: Duration,
) -> Result<Arc<JwkSet>>
where
	T: Transport,
{
	let host = url.host_str().unwrap_or_default();
	let metrics = cache.metrics();
	let start = Instant::now();
	let outcome = match time::timeout(timeout, transport.get(url, timeout)).await {
		Ok(outcome) => outcome,
		Err(_) => Err(Error::Timeout { url: url.clone(), timeout }),
	};
	let body = match outcome {
		Ok(body) => body,
		Err(err) => {
			tracing::debug!(error = %err, "key set fetch failed");

			metrics.record_fetch_error(host);

			return Err(err);
		},
	};
	let Some(jwks) = JwkSet::parse(&body) else {
		tracing::debug!(size = body.len(), "response body is not a JWK Set");

		metrics.record_fetch_error(host);

		return Err(Error::InvalidKeySet { url: url.clone() });
	};
	let jwks = Arc::new(jwks);

	metrics.record_fetch_success(host, start.elapsed());

	if !cache.put(url.as_str(), jwks.clone(), body.len() as u64) {
		tracing::warn!(size = body.len(), "serving uncached key set");
	}

	Ok(jwks)
}
