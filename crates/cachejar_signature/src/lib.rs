//! Source fingerprinting for freshness-aware caching.
//!
//! A [`Signature`] captures the current state of a [`Source`]: a local file
//! (modification time and size), a local directory tree (every contained
//! file, at any depth), or a remote URL (entity tag, last-modified date, or a
//! hash of the body). Signatures are computed on demand and never remembered.

#![warn(missing_docs)]

pub mod engine;
pub mod error;
pub mod local;
pub mod remote;
pub mod source;

pub use cachejar_common::Signature;
pub use engine::{signature, SignatureEngine};
pub use error::SignatureError;
pub use local::{directory_signature, file_signature, local_signature};
pub use remote::{remote_signature, HttpFetcher, RemoteFetch, RemoteResponse};
pub use source::Source;
