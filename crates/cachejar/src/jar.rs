//! Per-application cache jars.
//!
//! A [`CacheJar`] ties together one application's index, its artifact store,
//! and the signature engine. Every mutating call rewrites the index before
//! returning, so on-disk state is durable whenever control is back with the
//! caller.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use cachejar_signature::{SignatureEngine, Source};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::artifact::ArtifactStore;
use crate::error::CacheError;
use crate::factory::Registry;
use crate::index::{CacheEntry, CacheIndex, INDEX_FILE};
use crate::key::{CacheArgs, CacheKey};

/// Selects the entries removed by [`CacheJar::clean`].
#[derive(Debug, Clone)]
pub enum CleanScope {
    /// Every entry in the jar.
    All,
    /// Every entry for a source, whatever its type and arguments.
    Source(Source),
    /// Every entry for a source and type, whatever its arguments.
    Type {
        /// The source.
        source: Source,
        /// The target type name.
        type_name: String,
    },
    /// Exactly one key.
    Key(CacheKey),
}

impl CleanScope {
    /// Every entry for `source`.
    pub fn source(source: impl Into<Source>) -> Self {
        Self::Source(source.into())
    }

    /// Every entry for `source` cached as `T`.
    pub fn of_type<T: ?Sized>(source: impl Into<Source>) -> Self {
        Self::Type {
            source: source.into(),
            type_name: std::any::type_name::<T>().to_string(),
        }
    }

    /// The single entry for `source`, `T`, and `args`.
    pub fn key<T: ?Sized>(source: impl Into<Source>, args: &CacheArgs) -> Self {
        Self::Key(CacheKey::for_type::<T>(&source.into(), args))
    }
}

/// The cache of one application, stored in `root/appid/`.
///
/// Obtain jars from [`CacheFactory::cachejar`](crate::CacheFactory::cachejar);
/// the factory hands out one shared instance per application id. After
/// [`clear(true)`](Self::clear) the instance is retired: cache operations on
/// it fail with [`CacheError::Removed`] and the factory creates a new jar on
/// the next request.
pub struct CacheJar {
    appid: String,
    dir: PathBuf,
    index_path: PathBuf,
    store: ArtifactStore,
    engine: Arc<SignatureEngine>,
    registry: Weak<Registry>,
    /// Explicit per-jar setting; `None` inherits the factory default.
    disabled: Mutex<Option<bool>>,
    /// Set under the index lock once the directory has been removed.
    removed: AtomicBool,
    index: Mutex<CacheIndex>,
}

impl CacheJar {
    pub(crate) fn open(
        appid: &str,
        dir: PathBuf,
        engine: Arc<SignatureEngine>,
        registry: Weak<Registry>,
    ) -> Result<Self, CacheError> {
        let index_path = dir.join(INDEX_FILE);
        let index = CacheIndex::load(&index_path)?;
        Ok(Self {
            appid: appid.to_string(),
            store: ArtifactStore::new(&dir),
            dir,
            index_path,
            engine,
            registry,
            disabled: Mutex::new(None),
            removed: AtomicBool::new(false),
            index: Mutex::new(index),
        })
    }

    /// The application id.
    pub fn appid(&self) -> &str {
        &self.appid
    }

    /// The directory holding this jar's index and artifacts.
    pub fn cache_directory(&self) -> &Path {
        &self.dir
    }

    /// Path of the index file.
    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Returns whether caching is switched off for this jar.
    ///
    /// An explicit [`set_disabled`](Self::set_disabled) wins; otherwise the
    /// owning factory's default is read at the time of the call.
    pub fn disabled(&self) -> bool {
        match *self.disabled.lock() {
            Some(explicit) => explicit,
            None => self
                .registry
                .upgrade()
                .is_some_and(|r| r.default_disabled.load(Ordering::Relaxed)),
        }
    }

    /// Sets the jar's own `disabled` flag. The value sticks regardless of
    /// later changes to the factory default.
    pub fn set_disabled(&self, disabled: bool) {
        *self.disabled.lock() = Some(disabled);
    }

    /// Drops the explicit flag so the jar follows the factory default again.
    pub fn reset_disabled(&self) {
        *self.disabled.lock() = None;
    }

    /// Stores `obj` as the value for `source`, `T`, and `args`.
    ///
    /// The source must be resolvable: a missing file or an unreachable URL
    /// is an error. Updating an existing key rewrites its artifact in place;
    /// if the index then fails to save, the in-memory entry still records
    /// the new signature so that it describes what the artifact holds.
    /// Does nothing while the jar is disabled.
    pub fn update<T: Serialize + ?Sized>(
        &self,
        source: impl Into<Source>,
        obj: &T,
        args: &CacheArgs,
    ) -> Result<(), CacheError> {
        self.ensure_live()?;
        if self.disabled() {
            return Ok(());
        }
        let source = source.into();
        let signature = self.engine.signature(&source)?;
        let type_name = std::any::type_name::<T>();
        let encoded = CacheKey::new(&source, type_name, args).encode()?;

        let mut index = self.index.lock();
        self.ensure_live()?;
        let (artifact, fresh) = match index.get(&encoded) {
            Some(entry) => (entry.artifact.clone(), false),
            None => (self.store.fresh_name(|n| index.contains_artifact(n)), true),
        };
        self.store.write(&artifact, type_name, obj)?;

        index.insert(
            encoded.clone(),
            CacheEntry {
                artifact: artifact.clone(),
                signature,
                type_name: type_name.to_string(),
            },
        );
        if let Err(e) = index.save(&self.index_path) {
            if fresh {
                index.remove(&encoded);
                if let Err(cleanup) = self.store.remove(&artifact) {
                    tracing::warn!(appid = %self.appid, %artifact, error = %cleanup, "failed to remove unindexed artifact");
                }
            }
            return Err(e);
        }
        tracing::debug!(appid = %self.appid, %source, %artifact, "cache updated");
        Ok(())
    }

    /// Returns the cached value for `source`, `T`, and `args` if the source
    /// is unchanged since it was stored.
    ///
    /// A changed or vanished source evicts the entry and yields `None`. An
    /// artifact that is referenced by the index but cannot be decoded is an
    /// error, never a miss. Always `None` while the jar is disabled.
    pub fn object_for<T: DeserializeOwned>(
        &self,
        source: impl Into<Source>,
        args: &CacheArgs,
    ) -> Result<Option<T>, CacheError> {
        self.ensure_live()?;
        if self.disabled() {
            return Ok(None);
        }
        let source = source.into();
        let type_name = std::any::type_name::<T>();
        let encoded = CacheKey::new(&source, type_name, args).encode()?;

        let mut index = self.index.lock();
        self.ensure_live()?;
        let Some(entry) = index.get(&encoded).cloned() else {
            tracing::debug!(appid = %self.appid, %source, "cache miss");
            return Ok(None);
        };

        let current = match self.engine.signature(&source) {
            Ok(signature) => Some(signature),
            Err(e) if e.is_unresolvable() => {
                tracing::warn!(appid = %self.appid, %source, "source vanished, evicting");
                None
            }
            Err(e) => return Err(e.into()),
        };
        if current.as_ref() != Some(&entry.signature) {
            tracing::debug!(appid = %self.appid, %source, artifact = %entry.artifact, "stale entry evicted");
            self.evict(&mut index, &[encoded])?;
            return Ok(None);
        }

        tracing::debug!(appid = %self.appid, %source, "cache hit");
        self.store.read(&entry.artifact, type_name).map(Some)
    }

    /// Removes the entries selected by `scope` and returns how many were removed.
    pub fn clean(&self, scope: CleanScope) -> Result<usize, CacheError> {
        let mut index = self.index.lock();
        self.ensure_live()?;
        let targets = self.select(&index, &scope)?;
        let removed = self.evict(&mut index, &targets)?;
        tracing::debug!(appid = %self.appid, ?scope, removed, "cache cleaned");
        Ok(removed)
    }

    /// Removes every entry.
    ///
    /// With `remove_completely`, also deletes the index file and the
    /// directory, and unregisters the application id from its factory. The
    /// directory must contain nothing but the index and its artifacts;
    /// otherwise [`CacheError::ForeignFiles`] is returned and nothing is
    /// deleted. Once the directory is gone this handle is retired.
    pub fn clear(&self, remove_completely: bool) -> Result<(), CacheError> {
        {
            let mut index = self.index.lock();
            self.ensure_live()?;
            let foreign = index.foreign_files(&self.dir)?;
            if !foreign.is_empty() {
                return Err(CacheError::ForeignFiles {
                    dir: self.dir.clone(),
                    files: foreign,
                });
            }

            let all: Vec<String> = index.iter().map(|(k, _)| k.clone()).collect();
            self.evict(&mut index, &all)?;

            if remove_completely {
                match std::fs::remove_file(&self.index_path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(CacheError::io(&self.index_path, e)),
                }
                match std::fs::remove_dir(&self.dir) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(CacheError::io(&self.dir, e)),
                }
                self.removed.store(true, Ordering::Release);
            }
        }

        if remove_completely {
            self.forget();
        }
        tracing::debug!(appid = %self.appid, remove_completely, "cache cleared");
        Ok(())
    }

    /// Re-reads the index from disk, discarding the in-memory copy.
    pub fn reload(&self) -> Result<(), CacheError> {
        let fresh = CacheIndex::load(&self.index_path)?;
        let mut index = self.index.lock();
        self.ensure_live()?;
        *index = fresh;
        Ok(())
    }

    /// Checks that every referenced artifact exists and that the directory
    /// holds nothing else.
    pub fn verify(&self) -> Result<(), CacheError> {
        let index = self.index.lock();
        self.ensure_live()?;
        let missing = index.missing_artifacts(&self.dir);
        if !missing.is_empty() {
            return Err(CacheError::CorruptIndex {
                path: self.index_path.clone(),
                reason: format!("missing artifacts: {}", missing.join(", ")),
            });
        }
        let foreign = index.foreign_files(&self.dir)?;
        if !foreign.is_empty() {
            return Err(CacheError::ForeignFiles {
                dir: self.dir.clone(),
                files: foreign,
            });
        }
        Ok(())
    }

    /// Keys of every live entry.
    pub fn keys(&self) -> Result<Vec<CacheKey>, CacheError> {
        let index = self.index.lock();
        index
            .iter()
            .map(|(encoded, _)| self.decode(encoded))
            .collect()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.index.lock().len()
    }

    /// Returns `true` if the jar holds no entries.
    pub fn is_empty(&self) -> bool {
        self.index.lock().is_empty()
    }

    /// Returns `true` once [`clear(true)`](Self::clear) has removed this jar.
    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    fn ensure_live(&self) -> Result<(), CacheError> {
        if self.is_removed() {
            return Err(CacheError::Removed {
                appid: self.appid.clone(),
            });
        }
        Ok(())
    }

    fn decode(&self, encoded: &str) -> Result<CacheKey, CacheError> {
        CacheKey::decode(encoded).map_err(|e| CacheError::CorruptIndex {
            path: self.index_path.clone(),
            reason: format!("undecodable key: {e}"),
        })
    }

    fn select(&self, index: &CacheIndex, scope: &CleanScope) -> Result<Vec<String>, CacheError> {
        let mut targets = Vec::new();
        match scope {
            CleanScope::All => targets.extend(index.iter().map(|(k, _)| k.clone())),
            CleanScope::Key(key) => {
                let encoded = key.encode()?;
                if index.get(&encoded).is_some() {
                    targets.push(encoded);
                }
            }
            CleanScope::Source(source) => {
                let id = source.identifier();
                for (encoded, _) in index.iter() {
                    if self.decode(encoded)?.source == id {
                        targets.push(encoded.clone());
                    }
                }
            }
            CleanScope::Type { source, type_name } => {
                let id = source.identifier();
                for (encoded, _) in index.iter() {
                    let key = self.decode(encoded)?;
                    if key.source == id && key.type_name == *type_name {
                        targets.push(encoded.clone());
                    }
                }
            }
        }
        Ok(targets)
    }

    /// Deletes the artifacts of `keys`, then their entries, then persists the
    /// index once. Entries whose artifact could not be deleted are kept.
    fn evict(&self, index: &mut CacheIndex, keys: &[String]) -> Result<usize, CacheError> {
        let mut removed = Vec::with_capacity(keys.len());
        let mut failure = None;
        for encoded in keys {
            let Some(entry) = index.get(encoded) else {
                continue;
            };
            match self.store.remove(&entry.artifact) {
                Ok(_) => removed.push(encoded.as_str()),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        for encoded in &removed {
            index.remove(encoded);
        }
        if !removed.is_empty() {
            index.save(&self.index_path)?;
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(removed.len()),
        }
    }

    fn forget(&self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut jars = registry.jars.write();
            let is_self = jars
                .get(&self.appid)
                .is_some_and(|jar| std::ptr::eq(Arc::as_ptr(jar), self));
            if is_self {
                jars.remove(&self.appid);
            }
        }
    }
}

impl std::fmt::Debug for CacheJar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheJar")
            .field("appid", &self.appid)
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}
