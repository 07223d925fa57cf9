//! HTTP transport used to retrieve JWK Sets.

// std
use std::future::Future;
// crates.io
use http::header::ACCEPT;
use reqwest::Client;
use url::Url;
// self
use crate::{_prelude::*, security};

/// Connect timeout applied by the default client.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Buffered GET contract consumed by the fetcher.
///
/// Implementations return the full response body of a successful (2xx) response and map a
/// request that outlives `timeout` to [`Error::Timeout`].
pub trait Transport: Send + Sync + 'static {
	/// Issue a GET for `url` and buffer the whole body.
	fn get(&self, url: &Url, timeout: Duration) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// Default transport backed by `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpTransport {
	client: Client,
}
impl HttpTransport {
	/// Build the transport with the default client configuration.
	pub fn new() -> Result<Self> {
		let client = Client::builder()
			.redirect(security::redirect_policy())
			.https_only(true)
			.user_agent(format!("jwks-utils/{}", env!("CARGO_PKG_VERSION")))
			.connect_timeout(DEFAULT_CONNECT_TIMEOUT)
			.build()?;

		Ok(Self { client })
	}

	/// Wrap a caller-configured client.
	pub fn with_client(client: Client) -> Self {
		Self { client }
	}
}
impl Transport for HttpTransport {
	async fn get(&self, url: &Url, timeout: Duration) -> Result<Vec<u8>> {
		security::enforce_https(url)?;

		let start = Instant::now();
		let response = self
			.client
			.get(url.clone())
			.header(ACCEPT, "application/json")
			.timeout(timeout)
			.send()
			.await
			.map_err(|err| classify(err, url, timeout))?;
		let status = response.status();

		if !status.is_success() {
			let body = response.text().await.ok();

			return Err(Error::HttpStatus { status, url: url.clone(), body });
		}

		let bytes = response.bytes().await.map_err(|err| classify(err, url, timeout))?;

		tracing::debug!(%url, %status, elapsed = ?start.elapsed(), size = bytes.len(), "key set retrieved");

		Ok(bytes.to_vec())
	}
}

fn classify(err: reqwest::Error, url: &Url, timeout: Duration) -> Error {
	if err.is_timeout() { Error::Timeout { url: url.clone(), timeout } } else { Error::Transport(err) }
}
