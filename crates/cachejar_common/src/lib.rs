//! Shared foundational types used across the cachejar crates.
//!
//! This crate provides the XXH3 content hash used for directory and remote
//! fingerprints, and the opaque [`Signature`] token compared by the cache.

#![warn(missing_docs)]

pub mod hash;
pub mod signature;

pub use hash::{ContentHash, ContentHasher};
pub use signature::Signature;
