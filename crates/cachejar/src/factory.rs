//! Cache roots, the application registry, and the process-wide default factory.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cachejar_config::{discover_config, CacheConfig};
use cachejar_signature::SignatureEngine;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::error::CacheError;
use crate::index::{CacheIndex, INDEX_FILE};
use crate::jar::CacheJar;

/// State shared between a factory and the jars it created.
pub(crate) struct Registry {
    pub(crate) default_disabled: AtomicBool,
    pub(crate) jars: RwLock<HashMap<String, Arc<CacheJar>>>,
}

/// Owner of a cache root and of one [`CacheJar`] per application id.
///
/// Independent factories rooted in different directories never share state,
/// which makes them suitable for isolation and testing. Most callers use the
/// process-wide instance returned by [`default_factory`].
pub struct CacheFactory {
    root: PathBuf,
    engine: Arc<SignatureEngine>,
    registry: Arc<Registry>,
}

impl CacheFactory {
    /// Opens the cache rooted at `root`, fetching URLs over HTTP.
    ///
    /// Fails if any existing application index under `root` is corrupt or
    /// references artifacts that no longer exist.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, CacheError> {
        Self::with_engine(root, SignatureEngine::default())
    }

    /// Opens the cache rooted at `root` with a custom signature engine.
    pub fn with_engine(root: impl AsRef<Path>, engine: SignatureEngine) -> Result<Self, CacheError> {
        let root = root.as_ref();
        let root = std::path::absolute(root).map_err(|e| CacheError::io(root, e))?;
        validate_root(&root)?;
        tracing::debug!(root = %root.display(), "cache factory opened");
        Ok(Self {
            root,
            engine: Arc::new(engine),
            registry: Arc::new(Registry {
                default_disabled: AtomicBool::new(false),
                jars: RwLock::new(HashMap::new()),
            }),
        })
    }

    /// Opens the cache described by `config`.
    pub fn from_config(config: &CacheConfig) -> Result<Self, CacheError> {
        let factory = Self::with_engine(config.resolved_root(), SignatureEngine::http(&config.remote))?;
        factory.set_default_disabled(config.cache.disabled);
        Ok(factory)
    }

    /// The cache root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the jar for `appid`, creating and registering it on first use.
    ///
    /// Repeated calls with the same id return the same instance for as long
    /// as the id stays registered. The jar's directory is created on its
    /// first write, not here.
    pub fn cachejar(&self, appid: &str) -> Result<Arc<CacheJar>, CacheError> {
        validate_appid(appid)?;
        if let Some(jar) = self.registry.jars.read().get(appid) {
            if !jar.is_removed() {
                return Ok(Arc::clone(jar));
            }
        }

        let mut jars = self.registry.jars.write();
        if let Some(jar) = jars.get(appid) {
            if !jar.is_removed() {
                return Ok(Arc::clone(jar));
            }
        }
        let jar = Arc::new(CacheJar::open(
            appid,
            self.root.join(appid),
            Arc::clone(&self.engine),
            Arc::downgrade(&self.registry),
        )?);
        jars.insert(appid.to_string(), Arc::clone(&jar));
        tracing::debug!(appid, "cache jar registered");
        Ok(jar)
    }

    /// Returns the directory of `appid` if the id is registered or has an
    /// index on disk. Never creates anything.
    pub fn cache_directory(&self, appid: &str) -> Option<PathBuf> {
        validate_appid(appid).ok()?;
        let dir = self.root.join(appid);
        let known = self.registry.jars.read().contains_key(appid) || dir.join(INDEX_FILE).is_file();
        known.then_some(dir)
    }

    /// Clears the jar of `appid`; see [`CacheJar::clear`].
    pub fn clear(&self, appid: &str, remove_completely: bool) -> Result<(), CacheError> {
        self.cachejar(appid)?.clear(remove_completely)
    }

    /// Registered application ids together with those found on disk, sorted.
    pub fn appids(&self) -> Result<Vec<String>, CacheError> {
        let mut ids: BTreeSet<String> = self.registry.jars.read().keys().cloned().collect();
        for dir in app_directories(&self.root)? {
            if let Some(name) = dir.file_name().and_then(|n| n.to_str()) {
                ids.insert(name.to_string());
            }
        }
        Ok(ids.into_iter().collect())
    }

    /// The default `disabled` value inherited by jars without an explicit setting.
    pub fn default_disabled(&self) -> bool {
        self.registry.default_disabled.load(Ordering::Relaxed)
    }

    /// Changes the inherited default. Jars with an explicit setting are unaffected.
    pub fn set_default_disabled(&self, disabled: bool) {
        self.registry
            .default_disabled
            .store(disabled, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for CacheFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheFactory")
            .field("root", &self.root)
            .field("default_disabled", &self.default_disabled())
            .finish_non_exhaustive()
    }
}

/// Rejects ids that are not a single plain path component.
fn validate_appid(appid: &str) -> Result<(), CacheError> {
    let reason = if appid.is_empty() {
        "must not be empty"
    } else if appid == "." || appid == ".." {
        "must not be a relative directory reference"
    } else if appid.contains(&['/', '\\', '\0'][..]) {
        "must not contain path separators"
    } else {
        return Ok(());
    };
    Err(CacheError::InvalidAppId {
        appid: appid.to_string(),
        reason: reason.to_string(),
    })
}

/// Subdirectories of `root` that hold an index file.
fn app_directories(root: &Path) -> Result<Vec<PathBuf>, CacheError> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(CacheError::io(root, e)),
    };
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| CacheError::io(root, e))?;
        let path = entry.path();
        if path.is_dir() && path.join(INDEX_FILE).is_file() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Loads every application index under `root` and checks that each one
/// only references artifacts that exist.
fn validate_root(root: &Path) -> Result<(), CacheError> {
    for dir in app_directories(root)? {
        let index_path = dir.join(INDEX_FILE);
        let index = CacheIndex::load(&index_path)?;
        let missing = index.missing_artifacts(&dir);
        if !missing.is_empty() {
            return Err(CacheError::CorruptIndex {
                path: index_path,
                reason: format!("missing artifacts: {}", missing.join(", ")),
            });
        }
    }
    Ok(())
}

static DEFAULT_FACTORY: Lazy<RwLock<Option<Arc<CacheFactory>>>> = Lazy::new(|| RwLock::new(None));

/// Returns the process-wide factory, creating it on first use from
/// [`discover_config`].
///
/// Unrelated call sites in one process share this instance and therefore
/// observe one cache.
pub fn default_factory() -> Result<Arc<CacheFactory>, CacheError> {
    if let Some(factory) = DEFAULT_FACTORY.read().as_ref() {
        return Ok(Arc::clone(factory));
    }
    let mut slot = DEFAULT_FACTORY.write();
    if let Some(factory) = slot.as_ref() {
        return Ok(Arc::clone(factory));
    }
    let factory = Arc::new(CacheFactory::from_config(&discover_config()?)?);
    *slot = Some(Arc::clone(&factory));
    Ok(factory)
}

/// Replaces the process-wide factory and returns the previous one, if any.
pub fn set_default_factory(factory: CacheFactory) -> Option<Arc<CacheFactory>> {
    DEFAULT_FACTORY.write().replace(Arc::new(factory))
}

/// Returns the jar for `appid` from the process-wide factory.
pub fn jar(appid: &str) -> Result<Arc<CacheJar>, CacheError> {
    default_factory()?.cachejar(appid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::CacheArgs;

    fn data_file(dir: &Path) -> PathBuf {
        let path = dir.join("source.txt");
        std::fs::write(&path, "contents").unwrap();
        path
    }

    #[test]
    fn one_jar_per_appid() {
        let dir = tempfile::tempdir().unwrap();
        let factory = CacheFactory::new(dir.path().join("cache")).unwrap();
        let a = factory.cachejar("app").unwrap();
        let b = factory.cachejar("app").unwrap();
        let other = factory.cachejar("other").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &other));
        assert_eq!(a.appid(), "app");
    }

    #[test]
    fn cache_directory_is_lazy() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("cache");
        let factory = CacheFactory::new(&root).unwrap();
        assert!(factory.cache_directory("app").is_none());

        let jar = factory.cachejar("app").unwrap();
        assert_eq!(factory.cache_directory("app"), Some(root.join("app")));
        assert!(!root.exists(), "nothing is written before the first update");

        jar.update(data_file(dir.path()), &1u32, &CacheArgs::new()).unwrap();
        assert!(root.join("app").join(INDEX_FILE).is_file());
    }

    #[test]
    fn rejects_bad_appids() {
        let dir = tempfile::tempdir().unwrap();
        let factory = CacheFactory::new(dir.path()).unwrap();
        for appid in ["", ".", "..", "a/b", "a\\b"] {
            assert!(
                matches!(factory.cachejar(appid), Err(CacheError::InvalidAppId { .. })),
                "{appid:?} should be rejected"
            );
            assert!(factory.cache_directory(appid).is_none());
        }
    }

    #[test]
    fn entries_survive_a_new_factory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("cache");
        let source = data_file(dir.path());
        let args = CacheArgs::new().arg("v");
        CacheFactory::new(&root)
            .unwrap()
            .cachejar("app")
            .unwrap()
            .update(&source, &"payload".to_string(), &args)
            .unwrap();

        let factory = CacheFactory::new(&root).unwrap();
        assert_eq!(factory.appids().unwrap(), vec!["app".to_string()]);
        let back: Option<String> = factory.cachejar("app").unwrap().object_for(&source, &args).unwrap();
        assert_eq!(back.as_deref(), Some("payload"));
    }

    #[test]
    fn separate_roots_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let source = data_file(dir.path());
        let first = CacheFactory::new(dir.path().join("one")).unwrap();
        let second = CacheFactory::new(dir.path().join("two")).unwrap();

        first.cachejar("app").unwrap().update(&source, &7i64, &CacheArgs::new()).unwrap();
        let jar = second.cachejar("app").unwrap();
        assert!(jar.object_for::<i64>(&source, &CacheArgs::new()).unwrap().is_none());
        assert!(second.cache_directory("app").is_some());
        assert_ne!(first.root(), second.root());
    }

    #[test]
    fn damaged_index_fails_construction() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("cache");
        let factory = CacheFactory::new(&root).unwrap();
        let jar = factory.cachejar("app").unwrap();
        jar.update(data_file(dir.path()), &1u8, &CacheArgs::new()).unwrap();

        let mut text = std::fs::read_to_string(jar.index_path()).unwrap();
        text.push_str("dirt");
        std::fs::write(jar.index_path(), text).unwrap();

        assert!(matches!(
            CacheFactory::new(&root).unwrap_err(),
            CacheError::CorruptIndex { .. }
        ));
    }

    #[test]
    fn missing_artifact_fails_construction() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("cache");
        let factory = CacheFactory::new(&root).unwrap();
        let jar = factory.cachejar("app").unwrap();
        jar.update(data_file(dir.path()), &1u8, &CacheArgs::new()).unwrap();

        for entry in std::fs::read_dir(jar.cache_directory()).unwrap() {
            let path = entry.unwrap().path();
            if path.file_name().and_then(|n| n.to_str()) != Some(INDEX_FILE) {
                std::fs::remove_file(path).unwrap();
            }
        }
        let err = CacheFactory::new(&root).unwrap_err();
        assert!(err.to_string().contains("missing artifacts"), "{err}");
    }

    #[test]
    fn from_config_applies_settings() {
        let dir = tempfile::tempdir().unwrap();
        let text = format!(
            "[cache]\nroot = {:?}\ndisabled = true\n",
            dir.path().join("configured")
        );
        let config = cachejar_config::load_config_from_str(&text).unwrap();
        let factory = CacheFactory::from_config(&config).unwrap();

        assert_eq!(factory.root(), dir.path().join("configured"));
        assert!(factory.default_disabled());
        assert!(factory.cachejar("app").unwrap().disabled());
    }

    #[test]
    fn clear_through_factory() {
        let dir = tempfile::tempdir().unwrap();
        let factory = CacheFactory::new(dir.path().join("cache")).unwrap();
        let jar = factory.cachejar("app").unwrap();
        jar.update(data_file(dir.path()), &1u8, &CacheArgs::new()).unwrap();

        factory.clear("app", false).unwrap();
        assert!(jar.is_empty());
        assert!(factory.cache_directory("app").is_some());

        factory.clear("app", true).unwrap();
        assert!(factory.cache_directory("app").is_none());
        assert!(factory.appids().unwrap().is_empty());
    }

    #[test]
    fn replaceable_default_factory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("default");
        set_default_factory(CacheFactory::new(&root).unwrap());

        let shared = default_factory().unwrap();
        assert_eq!(shared.root(), root);
        assert!(Arc::ptr_eq(&jar("app").unwrap(), &shared.cachejar("app").unwrap()));
        assert!(Arc::ptr_eq(&shared, &default_factory().unwrap()));
    }
}
