//! Signatures for remote resources.
//!
//! A URL is fingerprinted from its cheap caching metadata when the server
//! provides any: the entity tag first, then the last-modified date. Only
//! when neither header is present is the body downloaded and hashed.

use std::io::Read;
use std::time::Duration;

use cachejar_common::{ContentHasher, Signature};
use cachejar_config::RemoteConfig;
use once_cell::sync::OnceCell;
use reqwest::header::{HeaderMap, HeaderName, ETAG, LAST_MODIFIED};

use crate::error::SignatureError;

/// A response to a signature request, reduced to what fingerprinting needs.
pub struct RemoteResponse {
    /// HTTP status code.
    pub status: u16,
    /// Value of the `ETag` header, if any.
    pub etag: Option<String>,
    /// Value of the `Last-Modified` header, if any.
    pub last_modified: Option<String>,
    /// The response body, read only when no caching header is present.
    pub body: Box<dyn Read + Send>,
}

/// Performs the HTTP request behind a URL signature.
///
/// Implementations must surface transport failures as
/// [`SignatureError::RemoteFetch`]; error statuses may be returned as a
/// normal response, since [`remote_signature`] checks them.
pub trait RemoteFetch: Send + Sync {
    /// Issues a request for `url`.
    fn fetch(&self, url: &str) -> Result<RemoteResponse, SignatureError>;
}

/// Blocking HTTP fetcher backed by `reqwest`.
///
/// The client is built on first use, so constructing a fetcher never fails
/// and costs nothing for callers that only fingerprint local sources.
pub struct HttpFetcher {
    config: RemoteConfig,
    client: OnceCell<reqwest::blocking::Client>,
}

impl HttpFetcher {
    /// Creates a fetcher with the given remote settings.
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            config,
            client: OnceCell::new(),
        }
    }

    fn client(&self, url: &str) -> Result<&reqwest::blocking::Client, SignatureError> {
        self.client.get_or_try_init(|| {
            reqwest::blocking::Client::builder()
                .user_agent(self.config.user_agent.as_str())
                .timeout(self.config.timeout_secs.map(Duration::from_secs))
                .build()
                .map_err(|e| SignatureError::RemoteFetch {
                    url: url.to_string(),
                    status: None,
                    reason: format!("cannot build HTTP client: {e}"),
                })
        })
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(RemoteConfig::default())
    }
}

impl RemoteFetch for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<RemoteResponse, SignatureError> {
        let response = self
            .client(url)?
            .get(url)
            .send()
            .map_err(|e| SignatureError::RemoteFetch {
                url: url.to_string(),
                status: e.status().map(|s| s.as_u16()),
                reason: e.to_string(),
            })?;
        let etag = header_text(response.headers(), ETAG);
        let last_modified = header_text(response.headers(), LAST_MODIFIED);
        Ok(RemoteResponse {
            status: response.status().as_u16(),
            etag,
            last_modified,
            body: Box::new(response),
        })
    }
}

fn header_text(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Computes the signature of a remote resource.
///
/// Non-2xx statuses and transport failures are errors; a URL that cannot be
/// fetched never yields a signature.
pub fn remote_signature(fetcher: &dyn RemoteFetch, url: &str) -> Result<Signature, SignatureError> {
    let mut response = fetcher.fetch(url)?;
    if !(200..300).contains(&response.status) {
        return Err(SignatureError::RemoteFetch {
            url: url.to_string(),
            status: Some(response.status),
            reason: format!("HTTP status {}", response.status),
        });
    }
    if let Some(etag) = response.etag.take() {
        return Ok(Signature::new(format!("etag:{etag}")));
    }
    if let Some(modified) = response.last_modified.take() {
        return Ok(Signature::new(format!("modified:{modified}")));
    }

    let mut hasher = ContentHasher::new();
    std::io::copy(&mut response.body, &mut hasher).map_err(|e| SignatureError::RemoteFetch {
        url: url.to_string(),
        status: Some(response.status),
        reason: format!("failed to read body: {e}"),
    })?;
    Ok(Signature::new(format!("body:{}", hasher.finish())))
}
