//! The signature engine: one entry point for every kind of source.

use std::fmt;

use cachejar_common::Signature;
use cachejar_config::RemoteConfig;

use crate::error::SignatureError;
use crate::local::local_signature;
use crate::remote::{remote_signature, HttpFetcher, RemoteFetch};
use crate::source::Source;

/// Computes signatures for local and remote sources.
///
/// The engine holds no record of earlier results: every call inspects the
/// source afresh, so the result depends only on the source's current state.
pub struct SignatureEngine {
    fetcher: Box<dyn RemoteFetch>,
}

impl SignatureEngine {
    /// Creates an engine that uses `fetcher` for URL sources.
    pub fn new(fetcher: impl RemoteFetch + 'static) -> Self {
        Self {
            fetcher: Box::new(fetcher),
        }
    }

    /// Creates an engine that fetches URLs over HTTP with the given settings.
    pub fn http(config: &RemoteConfig) -> Self {
        Self::new(HttpFetcher::new(config.clone()))
    }

    /// Computes the current signature of `source`.
    pub fn signature(&self, source: &Source) -> Result<Signature, SignatureError> {
        let sig = match source {
            Source::Local(path) => local_signature(path)?,
            Source::Remote(url) => remote_signature(self.fetcher.as_ref(), url)?,
        };
        tracing::debug!(%source, signature = %sig, "computed signature");
        Ok(sig)
    }
}

impl Default for SignatureEngine {
    fn default() -> Self {
        Self::http(&RemoteConfig::default())
    }
}

impl fmt::Debug for SignatureEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureEngine").finish_non_exhaustive()
    }
}

/// Computes the signature of `source` with a default HTTP engine.
pub fn signature(source: impl Into<Source>) -> Result<Signature, SignatureError> {
    SignatureEngine::default().signature(&source.into())
}
