//! Key resolution for signed tokens.
//!
//! The resolver decides where the verification key comes from (the header's own `jwk`, a
//! caller-supplied hint, or a JWK Set published at a `jku`/hint URI) and cross-checks the result
//! against the header's embedded key before handing it out.
//!
//! Remote lookups race the cache against the network: the fetch is spawned first, then a fresh
//! cache entry holding the requested `kid` answers immediately while the fetch keeps running to
//! refresh the cache. Otherwise the caller waits for the fetch, falling back to a cached key set
//! still inside its failure grace when the fetch fails for any reason.

// crates.io
use serde::{Deserialize, Serialize};
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	cache::store::{CacheConfig, KeySetCache},
	header::JoseHeader,
	http::{
		client::{HttpTransport, Transport},
		fetch::fetch_key_set,
	},
	jwk::{self, Jwk, JwkSet},
	security,
};

/// Default deadline for a remote key set fetch.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1_000);

/// Caller-supplied trust information about where the key lives.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Hint {
	/// No hint; the header alone drives resolution.
	#[default]
	None,
	/// URI of a JWK Set to look the `kid` up in.
	Uri(String),
	/// A single trusted key.
	Key(Jwk),
	/// A trusted key set to look the `kid` up in.
	KeySet(JwkSet),
	/// Anything else, including `true`; always rejected.
	Unrecognized(Value),
}
impl Hint {
	/// Classify an arbitrary JSON value.
	///
	/// `null` and `false` mean no hint. Key sets are recognised before single keys.
	pub fn from_value(value: Value) -> Self {
		match value {
			Value::Null | Value::Bool(false) => Self::None,
			Value::String(uri) => Self::Uri(uri),
			value if jwk::is_key_set(&value) =>
				JwkSet::from_value(value).map_or(Self::Unrecognized(Value::Null), Self::KeySet),
			value if jwk::is_key(&value) =>
				Jwk::from_value(value).map_or(Self::Unrecognized(Value::Null), Self::Key),
			value => Self::Unrecognized(value),
		}
	}
}
impl From<Value> for Hint {
	fn from(value: Value) -> Self {
		Self::from_value(value)
	}
}
impl From<bool> for Hint {
	fn from(value: bool) -> Self {
		Self::from_value(Value::Bool(value))
	}
}
impl From<&str> for Hint {
	fn from(value: &str) -> Self {
		Self::Uri(value.to_owned())
	}
}
impl From<String> for Hint {
	fn from(value: String) -> Self {
		Self::Uri(value)
	}
}
impl From<Jwk> for Hint {
	fn from(value: Jwk) -> Self {
		Self::Key(value)
	}
}
impl From<JwkSet> for Hint {
	fn from(value: JwkSet) -> Self {
		Self::KeySet(value)
	}
}
impl<H> From<Option<H>> for Hint
where
	H: Into<Hint>,
{
	fn from(value: Option<H>) -> Self {
		value.map_or(Self::None, Into::into)
	}
}

/// Per-call resolution options.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveOptions {
	/// Deadline for a remote key set fetch.
	#[serde(default = "default_timeout")]
	pub timeout: Duration,
}
impl ResolveOptions {
	/// Validate the options.
	pub fn validate(&self) -> Result<()> {
		if self.timeout.is_zero() {
			return Err(Error::Validation {
				field: "timeout",
				reason: "Must be greater than zero.".into(),
			});
		}

		Ok(())
	}

	/// Override the fetch deadline.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;

		self
	}
}
impl Default for ResolveOptions {
	fn default() -> Self {
		Self { timeout: DEFAULT_TIMEOUT }
	}
}

/// Builder for [`KeyResolver`].
#[derive(Debug, Default)]
pub struct ResolverBuilder {
	cache: Option<Arc<KeySetCache>>,
	cache_config: Option<CacheConfig>,
	options: ResolveOptions,
}
impl ResolverBuilder {
	/// Create a builder with default configuration.
	pub fn new() -> Self {
		Self::default()
	}

	/// Share an existing cache, e.g. between resolvers with different options.
	pub fn cache(mut self, cache: Arc<KeySetCache>) -> Self {
		self.cache = Some(cache);

		self
	}

	/// Configure the cache this resolver creates; ignored when [`Self::cache`] is set.
	pub fn cache_config(mut self, config: CacheConfig) -> Self {
		self.cache_config = Some(config);

		self
	}

	/// Default fetch deadline for calls that do not pass options.
	pub fn timeout(mut self, timeout: Duration) -> Self {
		self.options.timeout = timeout;

		self
	}

	/// Finalise the configuration with the default HTTPS transport.
	pub fn build(self) -> Result<KeyResolver> {
		let transport = HttpTransport::new()?;

		self.build_with_transport(transport)
	}

	/// Finalise the configuration with a caller-supplied transport.
	pub fn build_with_transport<T>(self, transport: T) -> Result<KeyResolver<T>>
	where
		T: Transport,
	{
		self.options.validate()?;

		let cache = match (self.cache, self.cache_config) {
			(Some(cache), _) => cache,
			(None, Some(config)) => Arc::new(KeySetCache::new(config)?),
			(None, None) => Arc::new(KeySetCache::default()),
		};

		Ok(KeyResolver { cache, transport: Arc::new(transport), options: self.options })
	}
}

/// Resolves the key that should verify a signature.
#[derive(Debug)]
pub struct KeyResolver<T = HttpTransport> {
	cache: Arc<KeySetCache>,
	transport: Arc<T>,
	options: ResolveOptions,
}
impl KeyResolver {
	/// Build a resolver with the default transport, cache, and options.
	pub fn new() -> Result<Self> {
		ResolverBuilder::new().build()
	}

	/// Create a [`ResolverBuilder`] for advanced configuration.
	pub fn builder() -> ResolverBuilder {
		ResolverBuilder::new()
	}
}
impl<T> KeyResolver<T>
where
	T: Transport,
{
	/// Key set cache backing remote lookups.
	pub fn cache(&self) -> &Arc<KeySetCache> {
		&self.cache
	}

	/// Default options applied by [`Self::resolve_key_for_signature`].
	pub fn options(&self) -> &ResolveOptions {
		&self.options
	}

	/// Resolve the key for a compact JWS using the resolver's default options.
	///
	/// `Ok(None)` means resolution succeeded but no key carries the requested `kid`.
	pub async fn resolve_key_for_signature(
		&self,
		signature: &str,
		hint: impl Into<Hint>,
	) -> Result<Option<Jwk>> {
		let hint = hint.into();
		let header = JoseHeader::decode(signature)?;

		self.resolve_header(&header, hint, &self.options).await
	}

	/// Resolve the key for a compact JWS with per-call options.
	pub async fn resolve_with_options(
		&self,
		signature: &str,
		hint: impl Into<Hint>,
		options: &ResolveOptions,
	) -> Result<Option<Jwk>> {
		let hint = hint.into();

		options.validate()?;

		let header = JoseHeader::decode(signature)?;

		self.resolve_header(&header, hint, options).await
	}

	/// Resolve the key for an already decoded header.
	#[tracing::instrument(
		skip(self, header, hint, options),
		fields(
			kid = header.kid().unwrap_or_default(),
			jku = header.jku().unwrap_or_default()
		)
	)]
	pub async fn resolve_header(
		&self,
		header: &JoseHeader,
		hint: Hint,
		options: &ResolveOptions,
	) -> Result<Option<Jwk>> {
		let resolved = match plan(header, hint) {
			Ok(Plan::Resolved(key)) => Ok(key),
			Ok(Plan::Remote(uri)) =>
				self.resolve_remote(&uri, header.kid(), options.timeout).await,
			Err(err) => Err(err),
		};

		reconcile(header, resolved)
	}

	/// Resolve without touching the network.
	///
	/// Remote lookups are answered from a cached key set still inside its failure grace, or
	/// resolve to `None` when there is none.
	pub fn resolve_local(&self, signature: &str, hint: impl Into<Hint>) -> Result<Option<Jwk>> {
		let hint = hint.into();
		let header = JoseHeader::decode(signature)?;
		let resolved = match plan(&header, hint) {
			Ok(Plan::Resolved(key)) => Ok(key),
			Ok(Plan::Remote(uri)) => self.cached_lookup(&uri, header.kid()),
			Err(err) => Err(err),
		};

		reconcile(&header, resolved)
	}

	async fn resolve_remote(
		&self,
		uri: &str,
		kid: Option<&str>,
		timeout: Duration,
	) -> Result<Option<Jwk>> {
		let url = security::force_https(uri)?;
		let key = url.as_str().to_owned();
		let host = url.host_str().unwrap_or_default().to_owned();
		let metrics = self.cache.metrics();
		let fetch = {
			let transport = self.transport.clone();
			let cache = self.cache.clone();

			tokio::spawn(async move { fetch_key_set(&*transport, &cache, &url, timeout).await })
		};

		// Checked before the first suspension point so a fresh entry never loses to the fetch.
		if let Some(jwks) = self.cache.fresh(&key)
			&& let Some(found) = jwk::find_key_by_id(kid, &jwks)
		{
			tracing::debug!(uri = %key, "key served from fresh cache");

			metrics.record_hit(&host);

			return Ok(Some(found));
		}

		metrics.record_miss(&host);

		let outcome = match fetch.await {
			Ok(outcome) => outcome,
			Err(err) => Err(Error::Task(err)),
		};

		match outcome {
			Ok(jwks) => Ok(jwk::find_key_by_id(kid, &jwks)),
			Err(err) => {
				self.cache.prune_if_expired(&key);

				let Some(entry) = self.cache.get(&key) else {
					return Err(err);
				};

				if err.is_recoverable() {
					tracing::warn!(uri = %key, error = %err, "fetch failed, serving cached key set");
				} else {
					tracing::error!(
						uri = %key,
						error = %err,
						"transport refused fetch, serving cached key set"
					);
				}

				metrics.record_stale_serve(&host);

				Ok(jwk::find_key_by_id(kid, entry.jwks()))
			},
		}
	}

	fn cached_lookup(&self, uri: &str, kid: Option<&str>) -> Result<Option<Jwk>> {
		let url = security::force_https(uri)?;
		let failure_grace = self.cache.config().failure_grace;
		let key = self
			.cache
			.get(url.as_str())
			.filter(|entry| !entry.is_expired(Instant::now(), failure_grace))
			.and_then(|entry| jwk::find_key_by_id(kid, entry.jwks()));

		Ok(key)
	}
}
impl<T> Clone for KeyResolver<T> {
	fn clone(&self) -> Self {
		Self {
			cache: self.cache.clone(),
			transport: self.transport.clone(),
			options: self.options.clone(),
		}
	}
}

#[derive(Debug)]
enum Plan {
	Resolved(Option<Jwk>),
	Remote(String),
}

fn plan(header: &JoseHeader, hint: Hint) -> Result<Plan> {
	let kid = header.kid();

	match hint {
		Hint::None => match header.jku().filter(|jku| !jku.is_empty()) {
			Some(jku) => Ok(Plan::Remote(jku.to_owned())),
			None => Ok(Plan::Resolved(header.jwk.clone().and_then(Jwk::from_value))),
		},
		Hint::Uri(uri) => Ok(Plan::Remote(uri)),
		Hint::KeySet(jwks) => Ok(Plan::Resolved(jwk::find_key_by_id(kid, &jwks))),
		Hint::Key(key) if key.members().get(jwk::KEY_ID_FIELD) == header.kid.as_ref() =>
			Ok(Plan::Resolved(Some(key))),
		Hint::Key(_) | Hint::Unrecognized(_) => Err(Error::InvalidHint),
	}
}

/// Cross-check the resolved key against the header's embedded `jwk`.
///
/// Earlier failures pass through untouched; a disagreement replaces a successful resolution.
fn reconcile(header: &JoseHeader, resolved: Result<Option<Jwk>>) -> Result<Option<Jwk>> {
	let key = resolved?;

	if let Some(embedded) = &header.jwk
		&& !key.as_ref().is_some_and(|key| key == embedded)
	{
		tracing::debug!(kid = header.kid().unwrap_or_default(), "resolved key mismatch");

		return Err(Error::KeyMismatch);
	}

	Ok(key)
}

fn default_timeout() -> Duration {
	DEFAULT_TIMEOUT
}
