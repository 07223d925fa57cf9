//! Shared fixtures: a loopback transport onto the mock server and token minting.

// std
use std::{
	future::Future,
	sync::{Arc, Mutex},
	time::Duration,
};
// crates.io
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use jwks_utils::{Error, Result, Transport};
use serde_json::{Value, json};
use url::Url;

pub const JWKS_URI: &str = "https://keys.example/jwks_uri";

/// RSA public keys as published by the mock endpoint.
pub fn published_keys() -> Vec<Value> {
	vec![
		json!({
			"kty": "RSA",
			"alg": "RS256",
			"use": "sig",
			"kid": "primary",
			"n": "AQIDBAUGBwgJCgsMDQ4PEBESExQVFhcYGRobHB0eHyAhIiMkJSYnKCkqKywtLi8wMTIzNDU2Nzg5Ojs8PT4_QEFCQ0RFRkdISUpLTE1OT1BRUlNUVVZXWFlaW1xdXl9gYWJjZGVmZ2hpamtsbW5vcHFyc3R1dnd4eXp7fH1-f4A",
			"e": "AQAB"
		}),
		json!({
			"kty": "RSA",
			"alg": "RS256",
			"use": "sig",
			"kid": "secondary",
			"n": "AQABAgMEBQYHCAkKCwwNDg8QERITFBUWFxgZGhscHR4fICEiIyQlJicoKSorLC0uLzAxMjM0NTY3ODk6Ozw9Pj9AQUJDREVGR0hJSktMTU5PUFFSU1RVVldYWVpbXF1eX2BhYmNkZWZnaGlqa2xtbm9wcXJzdHV2d3h5ent8fX5_gA",
			"e": "AQAB"
		}),
	]
	.into_iter()
	// Normalise through the typed model so header and key set serialise identically.
	.map(|key| {
		let typed: jsonwebtoken::jwk::Jwk = serde_json::from_value(key).expect("typed jwk");

		serde_json::to_value(typed).expect("jwk value")
	})
	.collect()
}

pub fn key_set_body() -> String {
	json!({ "keys": published_keys() }).to_string()
}

pub fn typed_key(index: usize) -> jsonwebtoken::jwk::Jwk {
	serde_json::from_value(published_keys()[index].clone()).expect("typed jwk")
}

/// Mint an HS256 token carrying the given header parameters.
pub fn sign(
	jku: Option<&str>,
	kid: Option<&str>,
	jwk: Option<jsonwebtoken::jwk::Jwk>,
) -> String {
	let mut header = Header::new(Algorithm::HS256);

	header.jku = jku.map(str::to_owned);
	header.kid = kid.map(str::to_owned);
	header.jwk = jwk;

	jsonwebtoken::encode(
		&header,
		&json!({ "sub": "FOO BAR" }),
		&EncodingKey::from_secret(b"DEAD BEEF"),
	)
	.expect("token")
}

/// Routes every HTTPS request to the plaintext mock origin, keeping path and query.
#[derive(Clone, Debug)]
pub struct LoopbackTransport {
	client: reqwest::Client,
	origin: Url,
	seen: Arc<Mutex<Vec<Url>>>,
}
impl LoopbackTransport {
	pub fn new(origin: &str) -> Self {
		Self {
			client: reqwest::Client::new(),
			origin: Url::parse(origin).expect("origin"),
			seen: Arc::default(),
		}
	}

	pub fn seen(&self) -> Vec<Url> {
		self.seen.lock().expect("seen").clone()
	}
}
impl Transport for LoopbackTransport {
	fn get(&self, url: &Url, timeout: Duration) -> impl Future<Output = Result<Vec<u8>>> + Send {
		assert_eq!(url.scheme(), "https", "plaintext retrieval attempted for {url}");

		self.seen.lock().expect("seen").push(url.clone());

		let mut target = self.origin.clone();

		target.set_path(url.path());
		target.set_query(url.query());

		let request = self.client.get(target).timeout(timeout);
		let url = url.clone();

		async move {
			let response = request.send().await.map_err(|err| classify(err, &url, timeout))?;
			let status = response.status();

			if !status.is_success() {
				return Err(Error::HttpStatus { status, url, body: None });
			}

			let bytes = response.bytes().await.map_err(|err| classify(err, &url, timeout))?;

			Ok(bytes.to_vec())
		}
	}
}

fn classify(err: reqwest::Error, url: &Url, timeout: Duration) -> Error {
	if err.is_timeout() { Error::Timeout { url: url.clone(), timeout } } else { Error::Transport(err) }
}
