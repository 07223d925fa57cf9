//! JOSE header extraction from compact JWS/JWT strings.

// crates.io
use base64::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
// self
use crate::_prelude::*;

/// Protected header fields consumed during key resolution.
///
/// Only `jwk`, `jku`, and `kid` drive resolution; everything else is preserved in `extra`.
/// Members are kept as raw JSON so that a well-formed header with oddly typed members still
/// decodes. The accessors expose string members only.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JoseHeader {
	/// Signature algorithm.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub alg: Option<Value>,
	/// Key embedded by the signer, kept as raw JSON for structural comparison.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub jwk: Option<Value>,
	/// URL of a JWK Set holding the signing key.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub jku: Option<Value>,
	/// Identifier of the signing key.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub kid: Option<Value>,
	/// Remaining header members.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}
impl JoseHeader {
	/// Decode the protected header of a compact serialization (`header.payload.signature`).
	pub fn decode(signature: &str) -> Result<Self> {
		let mut segments = signature.trim().split('.');
		let encoded = match (segments.next(), segments.next(), segments.next(), segments.next()) {
			(Some(header), Some(_), Some(_), None) if !header.is_empty() => header,
			_ => return Err(Error::Decode("Expected three dot-separated segments.".into())),
		};
		let raw = BASE64_URL_SAFE_NO_PAD
			.decode(encoded.trim_end_matches('='))
			.map_err(|err| Error::Decode(format!("Header is not base64url: {err}.")))?;
		let value: Value = serde_json::from_slice(&raw)
			.map_err(|err| Error::Decode(format!("Header is not JSON: {err}.")))?;

		if !value.is_object() {
			return Err(Error::Decode("Header must be a JSON object.".into()));
		}

		serde_json::from_value(value)
			.map_err(|err| Error::Decode(format!("Header has malformed members: {err}.")))
	}

	/// Signature algorithm, when it is a string.
	pub fn alg(&self) -> Option<&str> {
		self.alg.as_ref().and_then(Value::as_str)
	}

	/// Key set URL, when it is a string.
	pub fn jku(&self) -> Option<&str> {
		self.jku.as_ref().and_then(Value::as_str)
	}

	/// Key identifier, when it is a string.
	///
	/// A non-string identifier reads as `None` here and therefore matches no published key.
	pub fn kid(&self) -> Option<&str> {
		self.kid.as_ref().and_then(Value::as_str)
	}
}
