//! JWK and JWK Set model plus the predicates used to classify untrusted JSON.
//!
//! Keys are kept as raw JSON objects: only `kty` and `kid` are interpreted, every other member is
//! carried through untouched so that structural comparison sees the whole key.

// crates.io
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
// self
use crate::_prelude::*;

/// Member holding the key type tag.
pub const KEY_TYPE_FIELD: &str = "kty";
/// Member holding the optional key identifier.
pub const KEY_ID_FIELD: &str = "kid";
/// Member holding the key sequence of a JWK Set.
pub const KEYS_FIELD: &str = "keys";

/// A single JSON Web Key.
///
/// Equality is structural over all members and insensitive to member order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Jwk(Map<String, Value>);
impl Jwk {
	/// Wrap a JSON value, accepting any object regardless of its members.
	pub fn from_value(value: Value) -> Option<Self> {
		match value {
			Value::Object(members) => Some(Self(members)),
			_ => None,
		}
	}

	/// Key type tag, when it is a string.
	pub fn kty(&self) -> Option<&str> {
		self.0.get(KEY_TYPE_FIELD).and_then(Value::as_str)
	}

	/// Key identifier, when it is a string.
	pub fn kid(&self) -> Option<&str> {
		self.0.get(KEY_ID_FIELD).and_then(Value::as_str)
	}

	/// Raw members of the key.
	pub fn members(&self) -> &Map<String, Value> {
		&self.0
	}

	/// Clone the key into a JSON value.
	pub fn to_value(&self) -> Value {
		Value::Object(self.0.clone())
	}

	/// Convert into the typed `jsonwebtoken` representation for signature verification.
	pub fn to_jsonwebtoken(&self) -> Result<jsonwebtoken::jwk::Jwk> {
		Ok(serde_json::from_value(self.to_value())?)
	}
}
impl From<Jwk> for Value {
	fn from(value: Jwk) -> Self {
		Value::Object(value.0)
	}
}
impl PartialEq<Value> for Jwk {
	fn eq(&self, other: &Value) -> bool {
		matches!(other, Value::Object(members) if *members == self.0)
	}
}

/// A JSON Web Key Set.
///
/// The `keys` sequence is kept verbatim, including elements that are not keys; lookups skip them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
	keys: Vec<Value>,
}
impl JwkSet {
	/// Build a key set from a JSON value when it satisfies [`is_key_set`].
	pub fn from_value(value: Value) -> Option<Self> {
		if !is_key_set(&value) {
			return None;
		}

		match value {
			Value::Object(mut members) => match members.remove(KEYS_FIELD) {
				Some(Value::Array(keys)) => Some(Self { keys }),
				_ => None,
			},
			_ => None,
		}
	}

	/// Parse a response body into a key set.
	///
	/// Returns `None` for bodies that are not JSON or are JSON without a usable key.
	pub fn parse(body: &[u8]) -> Option<Self> {
		serde_json::from_slice::<Value>(body).ok().and_then(Self::from_value)
	}

	/// Raw key sequence in declared order.
	pub fn keys(&self) -> &[Value] {
		&self.keys
	}

	/// Number of elements in the key sequence.
	pub fn len(&self) -> usize {
		self.keys.len()
	}

	/// Whether the key sequence is empty.
	pub fn is_empty(&self) -> bool {
		self.keys.is_empty()
	}

	/// Elements of the sequence that qualify as keys.
	pub fn usable_keys(&self) -> impl Iterator<Item = &Value> {
		self.keys.iter().filter(|key| is_key(key))
	}
}

/// Whether `candidate` is a JWK: an object carrying a truthy `kty` member.
pub fn is_key(candidate: &Value) -> bool {
	candidate.get(KEY_TYPE_FIELD).is_some_and(is_truthy)
}

/// Whether `candidate` is a JWK Set: a `keys` sequence holding at least one JWK.
pub fn is_key_set(candidate: &Value) -> bool {
	candidate.get(KEYS_FIELD).and_then(Value::as_array).is_some_and(|keys| keys.iter().any(is_key))
}

/// Pick the first key in declared order whose `kid` equals `kid` exactly.
///
/// An absent or empty identifier never matches.
pub fn find_key_by_id(kid: Option<&str>, jwks: &JwkSet) -> Option<Jwk> {
	let kid = kid.filter(|kid| !kid.is_empty())?;

	jwks.usable_keys()
		.find(|key| key.get(KEY_ID_FIELD).and_then(Value::as_str) == Some(kid))
		.cloned()
		.and_then(Jwk::from_value)
}

fn is_truthy(value: &Value) -> bool {
	match value {
		Value::Null => false,
		Value::Bool(flag) => *flag,
		Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
		Value::String(text) => !text.is_empty(),
		Value::Array(_) | Value::Object(_) => true,
	}
}
