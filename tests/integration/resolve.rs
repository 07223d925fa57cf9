//! End-to-end resolution against a mock JWK Set endpoint.

// std
use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::{Duration, Instant},
};
// crates.io
use jwks_utils::{
	Error, Hint, JwkSet, KeyResolver, ResolveOptions, Result, find_key_by_id, is_key_set,
};
use serde_json::Value;
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{method, path},
};
// self
use crate::support::{self, JWKS_URI, LoopbackTransport};

async fn mount_key_set(server: &MockServer) {
	Mock::given(method("GET"))
		.and(path("/jwks_uri"))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_string(support::key_set_body())
				.insert_header("content-type", "application/json"),
		)
		.mount(server)
		.await;
}

fn resolver(
	server: &MockServer,
	timeout: Duration,
) -> (KeyResolver<LoopbackTransport>, LoopbackTransport) {
	let transport = LoopbackTransport::new(&server.uri());
	let resolver = KeyResolver::builder()
		.timeout(timeout)
		.build_with_transport(transport.clone())
		.expect("resolver");

	(resolver, transport)
}

#[tokio::test]
async fn key_set_hint_resolves_without_network() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;
	let (resolver, transport) = resolver(&server, Duration::from_secs(1));
	let hint: Value = serde_json::from_str(&support::key_set_body())?;

	assert!(is_key_set(&hint));

	let token = support::sign(None, Some("secondary"), None);
	let key = resolver.resolve_key_for_signature(&token, Hint::from_value(hint)).await?;

	assert_eq!(key.as_ref().and_then(|key| key.kid()), Some("secondary"));
	assert!(transport.seen().is_empty());

	Ok(())
}

#[tokio::test]
async fn jwk_header_alone_resolves_to_embedded_key() -> Result<()> {
	let server = MockServer::start().await;
	let (resolver, _) = resolver(&server, Duration::from_secs(1));
	let token = support::sign(None, None, Some(support::typed_key(0)));
	let key = resolver.resolve_key_for_signature(&token, false).await?.expect("embedded key");

	assert_eq!(key, support::published_keys()[0]);

	Ok(())
}

#[tokio::test]
async fn jku_header_is_fetched_then_served_from_cache() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;
	let counter = Arc::new(AtomicUsize::new(0));
	let counter_handle = counter.clone();
	let body = support::key_set_body();

	Mock::given(method("GET"))
		.and(path("/jwks_uri"))
		.respond_with(move |_: &wiremock::Request| {
			let template = ResponseTemplate::new(200).set_body_string(body.clone());

			match counter_handle.fetch_add(1, Ordering::SeqCst) {
				0 => template,
				_ => template.set_delay(Duration::from_secs(3)),
			}
		})
		.mount(&server)
		.await;

	let (resolver, transport) = resolver(&server, Duration::from_secs(10));
	let token = support::sign(Some(JWKS_URI), Some("primary"), None);
	let first = resolver.resolve_key_for_signature(&token, false).await?;

	assert_eq!(first.as_ref().and_then(|key| key.kid()), Some("primary"));
	assert!(resolver.cache().is_fresh(JWKS_URI));

	let started = Instant::now();
	let second = resolver.resolve_key_for_signature(&token, false).await?;

	assert!(started.elapsed() < Duration::from_secs(1), "cache path waited on the fetch");
	assert_eq!(second, first);
	assert_eq!(resolver.cache().status().metrics.cache_hits, 1);
	assert!(transport.seen().iter().all(|url| url.scheme() == "https"));

	Ok(())
}

#[tokio::test]
async fn plaintext_jku_is_upgraded_to_https() -> Result<()> {
	let server = MockServer::start().await;

	mount_key_set(&server).await;

	let (resolver, transport) = resolver(&server, Duration::from_secs(1));
	let token = support::sign(Some("http://keys.example/jwks_uri"), Some("primary"), None);

	assert!(resolver.resolve_key_for_signature(&token, false).await?.is_some());
	assert_eq!(transport.seen()[0].as_str(), JWKS_URI);
	assert!(resolver.cache().contains(JWKS_URI));

	Ok(())
}

#[tokio::test]
async fn uri_hint_is_fetched() -> Result<()> {
	let server = MockServer::start().await;

	mount_key_set(&server).await;

	let (resolver, _) = resolver(&server, Duration::from_secs(1));
	let token = support::sign(None, Some("secondary"), None);
	let key = resolver.resolve_key_for_signature(&token, JWKS_URI).await?;

	assert_eq!(key.as_ref().and_then(|key| key.kid()), Some("secondary"));

	let missing = resolver
		.resolve_key_for_signature(&support::sign(None, Some("unknown"), None), JWKS_URI)
		.await?;

	assert!(missing.is_none(), "an unknown kid is not an error");

	Ok(())
}

#[tokio::test]
async fn jku_and_jwk_headers_must_agree() -> Result<()> {
	let server = MockServer::start().await;

	mount_key_set(&server).await;

	let (resolver, _) = resolver(&server, Duration::from_secs(1));
	let agree = support::sign(Some(JWKS_URI), Some("primary"), Some(support::typed_key(0)));
	let disagree = support::sign(Some(JWKS_URI), Some("primary"), Some(support::typed_key(1)));
	let key = resolver.resolve_key_for_signature(&agree, false).await?.expect("key");

	assert_eq!(key, support::published_keys()[0]);
	assert!(key.to_jsonwebtoken().is_ok());

	let err = resolver.resolve_key_for_signature(&disagree, false).await.unwrap_err();

	assert!(matches!(err, Error::KeyMismatch));
	assert_eq!(err.to_string(), "JWK did not match jwk JOSE header");

	Ok(())
}

#[tokio::test]
async fn true_hint_is_invalid() -> Result<()> {
	let server = MockServer::start().await;
	let (resolver, transport) = resolver(&server, Duration::from_secs(1));
	let token = support::sign(Some(JWKS_URI), Some("primary"), Some(support::typed_key(1)));
	let err = resolver.resolve_key_for_signature(&token, true).await.unwrap_err();

	assert!(matches!(err, Error::InvalidHint));
	assert!(transport.seen().is_empty());

	Ok(())
}

#[tokio::test]
async fn slow_endpoint_without_cache_times_out() -> Result<()> {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/jwks_uri_slow"))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_string(support::key_set_body())
				.set_delay(Duration::from_secs(5)),
		)
		.mount(&server)
		.await;

	let (resolver, _) = resolver(&server, Duration::from_secs(10));
	let token = support::sign(Some("https://keys.example/jwks_uri_slow"), Some("primary"), None);
	let options = ResolveOptions::default().with_timeout(Duration::from_millis(200));
	let started = Instant::now();
	let err = resolver.resolve_with_options(&token, false, &options).await.unwrap_err();

	assert!(matches!(err, Error::Timeout { .. }), "unexpected {err:?}");
	assert!(started.elapsed() < Duration::from_secs(3));

	Ok(())
}

#[tokio::test]
async fn unparseable_bodies_fail_with_invalid_key_set() -> Result<()> {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/jwks_uri_broken"))
		.respond_with(ResponseTemplate::new(200).set_body_string(""))
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/jwks_uri_invalid"))
		.respond_with(ResponseTemplate::new(200).set_body_string("{}"))
		.mount(&server)
		.await;

	let (resolver, _) = resolver(&server, Duration::from_secs(1));

	for uri in ["https://keys.example/jwks_uri_broken", "https://keys.example/jwks_uri_invalid"] {
		let token = support::sign(Some(uri), Some("primary"), None);
		let err = resolver.resolve_key_for_signature(&token, false).await.unwrap_err();

		assert!(matches!(err, Error::InvalidKeySet { .. }), "unexpected {err:?}");
		assert!(!resolver.cache().contains(uri));
	}

	Ok(())
}

#[tokio::test]
async fn upstream_error_status_surfaces_without_cache() -> Result<()> {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/jwks_uri"))
		.respond_with(ResponseTemplate::new(503))
		.mount(&server)
		.await;

	let (resolver, _) = resolver(&server, Duration::from_secs(1));
	let token = support::sign(Some(JWKS_URI), Some("primary"), None);
	let err = resolver.resolve_key_for_signature(&token, false).await.unwrap_err();

	assert!(matches!(err, Error::HttpStatus { status, .. } if status.as_u16() == 503));

	Ok(())
}

#[tokio::test]
async fn local_resolution_reuses_fetched_key_set() -> Result<()> {
	let server = MockServer::start().await;

	mount_key_set(&server).await;

	let (resolver, transport) = resolver(&server, Duration::from_secs(1));
	let token = support::sign(Some(JWKS_URI), Some("secondary"), None);

	assert!(resolver.resolve_local(&token, false)?.is_none());

	resolver.resolve_key_for_signature(&token, false).await?;

	let cached = resolver.cache().get(JWKS_URI).expect("cached entry");
	let expected = find_key_by_id(Some("secondary"), cached.jwks().as_ref());

	assert_eq!(resolver.resolve_local(&token, false)?, expected);
	assert_eq!(transport.seen().len(), 1);

	let snapshot = resolver.cache().entries();

	assert_eq!(snapshot.len(), 1);
	let published = JwkSet::parse(support::key_set_body().as_bytes()).expect("published key set");

	assert_eq!(snapshot[0].key_count, published.len());

	Ok(())
}
