//! HTTP transport and JWK Set retrieval.

pub mod client;
pub mod fetch;
