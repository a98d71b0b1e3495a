//! Persistent, freshness-aware object cache.
//!
//! Objects are stored per application in `root/appid/` and keyed by the
//! source they were derived from (a file, a directory tree, or a URL), the
//! object's type, and any construction arguments. Every lookup recomputes
//! the source's signature and compares it with the one recorded when the
//! object was stored; a mismatch evicts the entry.
//!
//! ```no_run
//! use cachejar::{CacheArgs, CacheFactory};
//!
//! # fn main() -> Result<(), cachejar::CacheError> {
//! let factory = CacheFactory::new("/tmp/cachejar-demo")?;
//! let jar = factory.cachejar("loader")?;
//! let args = CacheArgs::new().kwarg("format", "turtle");
//!
//! let triples: Vec<String> = match jar.object_for("data/fhir.ttl", &args)? {
//!     Some(cached) => cached,
//!     None => {
//!         let parsed = vec!["<a> <b> <c> .".to_string()];
//!         jar.update("data/fhir.ttl", &parsed, &args)?;
//!         parsed
//!     }
//! };
//! # let _ = triples;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod artifact;
pub mod error;
pub mod factory;
pub mod index;
pub mod jar;
pub mod key;

pub use cachejar_common::Signature;
pub use cachejar_signature::{signature, SignatureEngine, SignatureError, Source};
pub use error::CacheError;
pub use factory::{default_factory, jar, set_default_factory, CacheFactory};
pub use index::{CacheEntry, CacheIndex, INDEX_FILE};
pub use jar::{CacheJar, CleanScope};
pub use key::{ArgValue, CacheArgs, CacheKey};
