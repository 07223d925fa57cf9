//! Resolve the JWK that verifies a JWS/JWT signature, whether it is embedded in the header,
//! supplied as a trust hint, or published in a JWK Set behind an HTTPS `jku`.
//!
//! Remote key sets live in a bounded, in-process cache that keeps serving through upstream
//! failures.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod cache;
pub mod header;
pub mod http;
pub mod jwk;
pub mod metrics;
pub mod security;

mod error;
mod resolver;
mod _prelude {
	pub use std::{sync::Arc, time::Duration};

	pub use chrono::{DateTime, Utc};
	pub use tokio::time::Instant;

	pub use crate::{Error, Result};
}

#[cfg(feature = "prometheus")] pub use crate::metrics::install_default_exporter;
pub use crate::{
	cache::store::{CacheConfig, CacheStatus, KeySetCache},
	error::{Error, Result},
	header::JoseHeader,
	http::client::{HttpTransport, Transport},
	jwk::{Jwk, JwkSet, find_key_by_id, is_key, is_key_set},
	resolver::{DEFAULT_TIMEOUT, Hint, KeyResolver, ResolveOptions, ResolverBuilder},
};
