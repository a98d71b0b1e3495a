//! Binary artifact storage.
//!
//! Each cached object lives in its own file inside the application's cache
//! directory, named by a random identifier unrelated to its key. The file
//! starts with a header carrying magic bytes, the format version, the
//! object's type name, and a checksum of the payload, followed by the
//! bincode-encoded object.

use std::io::Write;
use std::path::{Path, PathBuf};

use cachejar_common::ContentHash;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::index::INDEX_FILE;

/// Magic bytes identifying a cachejar artifact.
const ARTIFACT_MAGIC: [u8; 4] = *b"CJAR";

/// Current artifact format version. Increment on breaking changes to
/// the header or payload format.
const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// File extension of artifact files.
pub const ARTIFACT_EXT: &str = "bin";

/// Header prepended to every artifact for validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactHeader {
    /// Magic bytes: must be `b"CJAR"`.
    pub magic: [u8; 4],

    /// Artifact format version.
    pub format_version: u32,

    /// Type name of the stored object.
    pub type_name: String,

    /// Content hash of the payload data.
    pub checksum: ContentHash,
}

/// Reads and writes artifacts in one cache directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Creates a store over `dir`. The directory is created on first write.
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    /// Returns the file path of the named artifact.
    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Generates an artifact name that is neither `taken` nor present on disk.
    pub fn fresh_name(&self, taken: impl Fn(&str) -> bool) -> String {
        loop {
            let name = format!("{:032x}.{ARTIFACT_EXT}", rand::random::<u128>());
            if !taken(&name) && !self.artifact_path(&name).exists() {
                return name;
            }
        }
    }

    /// Serializes `obj` into the named artifact, replacing any previous content.
    ///
    /// The file is replaced atomically; a failed write leaves the old
    /// artifact untouched.
    pub fn write<T: Serialize + ?Sized>(
        &self,
        name: &str,
        type_name: &str,
        obj: &T,
    ) -> Result<(), CacheError> {
        let payload = bincode::serde::encode_to_vec(obj, bincode::config::standard())
            .map_err(|e| CacheError::Serialization {
                reason: e.to_string(),
            })?;

        let header = ArtifactHeader {
            magic: ARTIFACT_MAGIC,
            format_version: ARTIFACT_FORMAT_VERSION,
            type_name: type_name.to_string(),
            checksum: ContentHash::from_bytes(&payload),
        };
        let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
            .map_err(|e| CacheError::Serialization {
                reason: e.to_string(),
            })?;

        // 4-byte header length (little-endian) + header + payload
        let header_len = header_bytes.len() as u32;
        let mut output = Vec::with_capacity(4 + header_bytes.len() + payload.len());
        output.extend_from_slice(&header_len.to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(&payload);

        write_atomic(&self.artifact_path(name), &output)
    }

    /// Reads and decodes the named artifact.
    ///
    /// Never degrades to a miss: a missing file, a bad header, a type or
    /// checksum mismatch, or an undecodable payload is an error.
    pub fn read<T: DeserializeOwned>(&self, name: &str, type_name: &str) -> Result<T, CacheError> {
        let path = self.artifact_path(name);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CacheError::CorruptIndex {
                    path,
                    reason: "referenced artifact is missing".to_string(),
                })
            }
            Err(e) => return Err(CacheError::io(path, e)),
        };
        let fail = |reason: String| CacheError::Deserialization {
            path: path.clone(),
            reason,
        };

        if raw.len() < 4 {
            return Err(fail("truncated header".to_string()));
        }
        let header_len = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
        if raw.len() < 4 + header_len {
            return Err(fail("truncated header".to_string()));
        }

        let (header, _): (ArtifactHeader, usize) = bincode::serde::decode_from_slice(
            &raw[4..4 + header_len],
            bincode::config::standard(),
        )
        .map_err(|e| fail(format!("invalid header: {e}")))?;

        if header.magic != ARTIFACT_MAGIC {
            return Err(fail("missing magic bytes".to_string()));
        }
        if header.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(fail(format!(
                "format version {} (expected {ARTIFACT_FORMAT_VERSION})",
                header.format_version
            )));
        }
        if header.type_name != type_name {
            return Err(fail(format!(
                "holds {} but {type_name} was requested",
                header.type_name
            )));
        }

        let payload = &raw[4 + header_len..];
        let actual = ContentHash::from_bytes(payload);
        if actual != header.checksum {
            return Err(fail(format!(
                "checksum mismatch: expected {}, got {actual}",
                header.checksum
            )));
        }

        let (obj, used): (T, usize) =
            bincode::serde::decode_from_slice(payload, bincode::config::standard())
                .map_err(|e| fail(e.to_string()))?;
        if used != payload.len() {
            return Err(fail(format!(
                "{} trailing bytes after payload",
                payload.len() - used
            )));
        }
        Ok(obj)
    }

    /// Deletes the named artifact. Returns `false` if it was already gone.
    pub fn remove(&self, name: &str) -> Result<bool, CacheError> {
        let path = self.artifact_path(name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }
}

/// Returns `true` if `name` can safely be used as an artifact file name.
pub(crate) fn is_artifact_name(name: &str) -> bool {
    !name.is_empty()
        && name != INDEX_FILE
        && !name.starts_with('.')
        && !name.contains(&['/', '\\', '\0'][..])
}

/// Writes `bytes` to `path` through a temporary file in the same directory,
/// so readers only ever see the old or the new content.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| CacheError::io(dir, e))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| CacheError::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| CacheError::io(path, e))?;
    tmp.as_file().sync_all().map_err(|e| CacheError::io(path, e))?;
    tmp.persist(path).map_err(|e| CacheError::io(path, e.error))?;
    Ok(())
}
