//! The per-application cache index.
//!
//! The index is stored as `index.json` in the application's cache directory.
//! It maps canonical key encodings to the artifact holding the object, the
//! source signature recorded when the object was written, and the object's
//! type name. The file carries a format version and a checksum over its
//! entries, so truncation, appended bytes, and hand edits are detected on
//! load instead of being silently accepted.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use cachejar_common::{ContentHash, Signature};
use serde::{Deserialize, Serialize};

use crate::artifact::{is_artifact_name, write_atomic};
use crate::error::CacheError;
use crate::key::CacheKey;

/// Name of the index file within an application's cache directory.
pub const INDEX_FILE: &str = "index.json";

/// Current index format version. Increment on breaking changes to the layout.
const INDEX_FORMAT_VERSION: u32 = 1;

/// Cached state for a single key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// File name of the artifact within the cache directory.
    pub artifact: String,

    /// Source signature at the time the object was written.
    pub signature: Signature,

    /// Name of the cached object's type.
    #[serde(rename = "type")]
    pub type_name: String,
}

/// On-disk layout of `index.json`.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct IndexFile {
    format_version: u32,
    checksum: ContentHash,
    entries: BTreeMap<String, CacheEntry>,
}

#[derive(Serialize)]
struct IndexFileRef<'a> {
    format_version: u32,
    checksum: ContentHash,
    entries: &'a BTreeMap<String, CacheEntry>,
}

/// In-memory view of one application's index.
#[derive(Debug, Clone, Default)]
pub struct CacheIndex {
    entries: BTreeMap<String, CacheEntry>,
}

fn entries_checksum(entries: &BTreeMap<String, CacheEntry>) -> Result<ContentHash, CacheError> {
    let bytes = serde_json::to_vec(entries).map_err(|e| CacheError::Serialization {
        reason: e.to_string(),
    })?;
    Ok(ContentHash::from_bytes(&bytes))
}

impl CacheIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the index file at `path`.
    ///
    /// A missing file yields an empty index. Anything else that cannot be
    /// fully verified (malformed text, wrong version, checksum mismatch, an
    /// undecodable key, an invalid or shared artifact name) is reported as
    /// [`CacheError::CorruptIndex`].
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        let corrupt = |reason: String| CacheError::CorruptIndex {
            path: path.to_path_buf(),
            reason,
        };

        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                return Err(corrupt("index is not valid UTF-8".to_string()))
            }
            Err(e) => return Err(CacheError::io(path, e)),
        };

        let file: IndexFile = serde_json::from_str(&text).map_err(|e| corrupt(e.to_string()))?;
        if file.format_version != INDEX_FORMAT_VERSION {
            return Err(corrupt(format!(
                "unsupported format version {} (expected {INDEX_FORMAT_VERSION})",
                file.format_version
            )));
        }
        let actual = entries_checksum(&file.entries)?;
        if actual != file.checksum {
            return Err(corrupt(format!(
                "checksum mismatch: expected {}, got {actual}",
                file.checksum
            )));
        }

        let mut seen = HashSet::new();
        for (encoded, entry) in &file.entries {
            CacheKey::decode(encoded).map_err(|e| corrupt(format!("undecodable key: {e}")))?;
            if !is_artifact_name(&entry.artifact) {
                return Err(corrupt(format!("invalid artifact name {:?}", entry.artifact)));
            }
            if !seen.insert(entry.artifact.as_str()) {
                return Err(corrupt(format!(
                    "artifact {} is referenced by more than one key",
                    entry.artifact
                )));
            }
        }

        Ok(Self {
            entries: file.entries,
        })
    }

    /// Writes the index to `path`, replacing any previous file atomically.
    ///
    /// Creates the parent directory if it doesn't exist.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        let file = IndexFileRef {
            format_version: INDEX_FORMAT_VERSION,
            checksum: entries_checksum(&self.entries)?,
            entries: &self.entries,
        };
        let json = serde_json::to_string_pretty(&file).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        write_atomic(path, json.as_bytes())
    }

    /// Returns the entry for an encoded key.
    pub fn get(&self, encoded_key: &str) -> Option<&CacheEntry> {
        self.entries.get(encoded_key)
    }

    /// Inserts or replaces the entry for an encoded key.
    pub fn insert(&mut self, encoded_key: String, entry: CacheEntry) -> Option<CacheEntry> {
        self.entries.insert(encoded_key, entry)
    }

    /// Removes the entry for an encoded key.
    pub fn remove(&mut self, encoded_key: &str) -> Option<CacheEntry> {
        self.entries.remove(encoded_key)
    }

    /// Iterates over `(encoded key, entry)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &CacheEntry)> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the index has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if some entry uses `name` as its artifact.
    pub fn contains_artifact(&self, name: &str) -> bool {
        self.entries.values().any(|e| e.artifact == name)
    }

    /// Names of every referenced artifact.
    pub fn artifact_names(&self) -> BTreeSet<&str> {
        self.entries.values().map(|e| e.artifact.as_str()).collect()
    }

    /// Returns referenced artifacts that are absent from `dir`.
    pub fn missing_artifacts(&self, dir: &Path) -> Vec<String> {
        self.entries
            .values()
            .filter(|e| !dir.join(&e.artifact).is_file())
            .map(|e| e.artifact.clone())
            .collect()
    }

    /// Returns the names of files in `dir` that are neither the index file
    /// nor a referenced artifact. A missing directory has no foreign files.
    pub fn foreign_files(&self, dir: &Path) -> Result<Vec<String>, CacheError> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::io(dir, e)),
        };

        let known = self.artifact_names();
        let mut foreign = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CacheError::io(dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name != INDEX_FILE && !known.contains(name.as_str()) {
                foreign.push(name);
            }
        }
        foreign.sort();
        Ok(foreign)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::CacheArgs;
    use cachejar_signature::Source;
    use std::io::Write;

    fn entry(artifact: &str) -> CacheEntry {
        CacheEntry {
            artifact: artifact.to_string(),
            signature: Signature::new("1700000000.000000000:4"),
            type_name: "TestObj".to_string(),
        }
    }

    fn encoded(source: &str) -> String {
        CacheKey::new(&Source::parse(source), "TestObj", &CacheArgs::new())
            .encode()
            .unwrap()
    }

    #[test]
    fn new_index_is_empty() {
        let index = CacheIndex::new();
        assert!(index.is_empty());
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(INDEX_FILE);
        let mut index = CacheIndex::new();
        index.insert(encoded("/data/datafile"), entry("a1.bin"));
        index.insert(encoded("/data/datafile2"), entry("b2.bin"));
        index.save(&path).unwrap();

        let loaded = CacheIndex::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get(&encoded("/data/datafile")), Some(&entry("a1.bin")));
    }

    #[test]
    fn load_nonexistent_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = CacheIndex::load(&dir.path().join(INDEX_FILE)).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn appended_bytes_are_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(INDEX_FILE);
        let mut index = CacheIndex::new();
        index.insert(encoded("/data/datafile"), entry("a1.bin"));
        index.save(&path).unwrap();

        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"dirt").unwrap();
        drop(f);

        let err = CacheIndex::load(&path).unwrap_err();
        assert!(matches!(err, CacheError::CorruptIndex { .. }));
    }

    #[test]
    fn edited_entries_fail_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(INDEX_FILE);
        let mut index = CacheIndex::new();
        index.insert(encoded("/data/datafile"), entry("a1.bin"));
        index.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, text.replace("a1.bin", "a2.bin")).unwrap();

        match CacheIndex::load(&path).unwrap_err() {
            CacheError::CorruptIndex { reason, .. } => assert!(reason.contains("checksum")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn garbage_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(INDEX_FILE);
        std::fs::write(&path, "not valid json {{{").unwrap();
        assert!(matches!(
            CacheIndex::load(&path).unwrap_err(),
            CacheError::CorruptIndex { .. }
        ));
        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(
            CacheIndex::load(&path).unwrap_err(),
            CacheError::CorruptIndex { .. }
        ));
    }

    /// Writes an index file with a valid checksum around arbitrary entries.
    fn write_raw(path: &Path, entries: &BTreeMap<String, CacheEntry>) {
        let file = IndexFileRef {
            format_version: INDEX_FORMAT_VERSION,
            checksum: entries_checksum(entries).unwrap(),
            entries,
        };
        std::fs::write(path, serde_json::to_string(&file).unwrap()).unwrap();
    }

    #[test]
    fn shared_artifact_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(INDEX_FILE);
        let mut entries = BTreeMap::new();
        entries.insert(encoded("/a"), entry("same.bin"));
        entries.insert(encoded("/b"), entry("same.bin"));
        write_raw(&path, &entries);
        assert!(matches!(
            CacheIndex::load(&path).unwrap_err(),
            CacheError::CorruptIndex { .. }
        ));
    }

    #[test]
    fn traversal_artifact_name_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(INDEX_FILE);
        let mut entries = BTreeMap::new();
        entries.insert(encoded("/a"), entry("../outside.bin"));
        write_raw(&path, &entries);
        assert!(matches!(
            CacheIndex::load(&path).unwrap_err(),
            CacheError::CorruptIndex { .. }
        ));
    }

    #[test]
    fn undecodable_key_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(INDEX_FILE);
        let mut entries = BTreeMap::new();
        entries.insert("not a key".to_string(), entry("a.bin"));
        write_raw(&path, &entries);
        assert!(matches!(
            CacheIndex::load(&path).unwrap_err(),
            CacheError::CorruptIndex { .. }
        ));
    }

    #[test]
    fn save_leaves_no_temporary_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(INDEX_FILE);
        let mut index = CacheIndex::new();
        for i in 0..3 {
            index.insert(encoded(&format!("/data/{i}")), entry(&format!("{i}.bin")));
            index.save(&path).unwrap();
        }
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from(INDEX_FILE)]);
    }

    #[test]
    fn save_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("deeply").join("nested").join("app");
        CacheIndex::new().save(&nested.join(INDEX_FILE)).unwrap();
        assert!(nested.join(INDEX_FILE).exists());
    }

    #[test]
    fn foreign_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = CacheIndex::new();
        index.insert(encoded("/a"), entry("a.bin"));
        index.insert(encoded("/b"), entry("b.bin"));
        index.save(&dir.path().join(INDEX_FILE)).unwrap();
        std::fs::write(dir.path().join("a.bin"), b"x").unwrap();
        std::fs::write(dir.path().join("foo"), b"I'm foreign").unwrap();

        assert_eq!(index.foreign_files(dir.path()).unwrap(), vec!["foo"]);
        assert_eq!(index.missing_artifacts(dir.path()), vec!["b.bin"]);
        assert!(index.contains_artifact("a.bin"));
        assert!(!index.contains_artifact("foo"));
    }

    #[test]
    fn foreign_files_of_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = CacheIndex::new();
        assert!(index.foreign_files(&dir.path().join("absent")).unwrap().is_empty());
    }
}
