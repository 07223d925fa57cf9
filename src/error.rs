//! Crate-wide error types and `Result` alias.

// std
use std::time::Duration;

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for key resolution.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Serde(#[from] serde_json::Error),
	#[error(transparent)]
	Url(#[from] url::ParseError),

	#[error("Could not decode JOSE header: {0}")]
	Decode(String),
	#[error("Unrecognized key hint.")]
	InvalidHint,
	#[error("JWK did not match jwk JOSE header")]
	KeyMismatch,

	#[error("Request to {url} timed out after {timeout:?}.")]
	Timeout { url: url::Url, timeout: Duration },
	#[error(transparent)]
	Transport(#[from] reqwest::Error),
	#[error("Upstream HTTP status {status} from {url}: {body:?}")]
	HttpStatus { status: http::StatusCode, url: url::Url, body: Option<String> },
	#[error("Could not parse retrieved JWK Set from {url}")]
	InvalidKeySet { url: url::Url },
	#[error("Background fetch task failed: {0}")]
	Task(#[from] tokio::task::JoinError),

	#[error("Security violation: {0}")]
	Security(String),
	#[error("Validation failed for {field}: {reason}")]
	Validation { field: &'static str, reason: String },
}
impl Error {
	/// Whether the failure stems from the upstream endpoint rather than from caller input or
	/// transport configuration.
	pub fn is_recoverable(&self) -> bool {
		matches!(
			self,
			Self::Timeout { .. }
				| Self::Transport(_)
				| Self::HttpStatus { .. }
				| Self::InvalidKeySet { .. }
				| Self::Task(_)
		)
	}
}
