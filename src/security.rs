//! HTTPS enforcement for remote JWK Set retrieval.
//!
//! # Threat Model
//! A `jku` value comes from an unauthenticated header and a URI hint may come from configuration
//! of uneven quality. Neither is allowed to steer retrieval onto plaintext transport: the scheme
//! is rewritten to `https` before any request, and redirects that downgrade are refused.

// crates.io
use reqwest::redirect::{Attempt, Policy};
use url::Url;
// self
use crate::_prelude::*;

/// Maximum redirect depth followed during retrieval.
pub const MAX_REDIRECTS: usize = 10;

/// Rewrite `uri` so that it uses the `https` scheme, whatever scheme it was given with.
///
/// Inputs without a scheme are treated as `https://` authorities.
pub fn force_https(uri: &str) -> Result<Url> {
	let trimmed = uri.trim();
	// Only a `://` ahead of the first delimiter separates a scheme.
	let prefix_end = trimmed.find(['/', '?', '#']).unwrap_or(trimmed.len());
	let rewritten = match trimmed.find("://").filter(|at| *at < prefix_end) {
		Some(at) if is_scheme(&trimmed[..at]) => format!("https://{}", &trimmed[at + 3..]),
		Some(_) => return Err(Error::Security(format!("Malformed key set URI '{trimmed}'."))),
		None => match trimmed.find(':').filter(|at| *at < prefix_end) {
			// `scheme:opaque` with no authority, e.g. `http:example.com/keys`.
			Some(at)
				if is_scheme(&trimmed[..at])
					&& !trimmed[at + 1..].starts_with(|c: char| c.is_ascii_digit()) =>
				format!("https://{}", trimmed[at + 1..].trim_start_matches('/')),
			_ => format!("https://{trimmed}"),
		},
	};
	let url = Url::parse(&rewritten)?;

	enforce_https(&url)?;

	if url.host_str().is_none_or(str::is_empty) {
		return Err(Error::Validation {
			field: "jku",
			reason: "Must include a host component.".into(),
		});
	}

	Ok(url)
}

/// Ensure the provided URL uses HTTPS.
pub fn enforce_https(url: &Url) -> Result<()> {
	if url.scheme() == "https" {
		Ok(())
	} else {
		Err(Error::Security(format!("Key set URL {url} must use HTTPS.")))
	}
}

/// Redirect policy that follows at most [`MAX_REDIRECTS`] hops and never leaves HTTPS.
pub fn redirect_policy() -> Policy {
	Policy::custom(follow_https_only)
}

fn follow_https_only(attempt: Attempt<'_>) -> reqwest::redirect::Action {
	if attempt.url().scheme() != "https" {
		tracing::warn!(target = %attempt.url(), "refusing redirect away from https");

		let reason = format!("Redirect to {} would leave HTTPS.", attempt.url());

		attempt.error(reason)
	} else if attempt.previous().len() >= MAX_REDIRECTS {
		attempt.error(format!("Exceeded {MAX_REDIRECTS} redirects."))
	} else {
		attempt.follow()
	}
}

fn is_scheme(candidate: &str) -> bool {
	let mut chars = candidate.chars();

	chars.next().is_some_and(|c| c.is_ascii_alphabetic())
		&& chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
