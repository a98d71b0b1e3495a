//! Signatures for local files and directory trees.
//!
//! Files are fingerprinted from metadata only (modification time and size),
//! never from their contents. Touching a file therefore changes its
//! signature even when the bytes are unchanged. Filesystems with coarse
//! timestamps may not distinguish two writes of the same length that land
//! within one clock tick; that is a known limitation of metadata-based
//! freshness.
//!
//! Symbolic links inside a directory tree are not followed. A link
//! contributes its own metadata, so creating, removing, or retargeting it
//! changes the tree's signature, and a dangling link is fingerprinted like
//! any other entry. Changes behind a link, including anything inside a
//! linked directory, are not seen. A source path that is itself a link is
//! resolved before fingerprinting.

use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use cachejar_common::{ContentHasher, Signature};
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::error::SignatureError;

/// Computes the signature of a local file or directory.
///
/// Dispatches on the kind of filesystem object found at `path`.
pub fn local_signature(path: &Path) -> Result<Signature, SignatureError> {
    let metadata = std::fs::metadata(path).map_err(|e| SignatureError::from_io(path, e))?;
    if metadata.is_dir() {
        directory_signature(path)
    } else {
        Ok(metadata_signature(&metadata))
    }
}

/// Computes the signature of a single file from its modification time and size.
pub fn file_signature(path: &Path) -> Result<Signature, SignatureError> {
    let metadata = std::fs::metadata(path).map_err(|e| SignatureError::from_io(path, e))?;
    Ok(metadata_signature(&metadata))
}

fn metadata_signature(metadata: &std::fs::Metadata) -> Signature {
    // Platforms without mtime support collapse to the epoch; size still counts.
    let (secs, nanos) = match metadata.modified().map(|t| t.duration_since(UNIX_EPOCH)) {
        Ok(Ok(d)) => (d.as_secs() as i128, d.subsec_nanos()),
        Ok(Err(before)) => (-(before.duration().as_secs() as i128), before.duration().subsec_nanos()),
        Err(_) => (0, 0),
    };
    Signature::new(format!("{secs}.{nanos:09}:{}", metadata.len()))
}

/// Computes the signature of a directory tree.
///
/// Every file and symbolic link below `root`, at any depth, contributes its
/// path relative to `root` and its own signature. The pairs are sorted by
/// relative path before hashing, so enumeration order never affects the
/// result. Empty subdirectories contribute nothing.
pub fn directory_signature(root: &Path) -> Result<Signature, SignatureError> {
    let mut files: Vec<(String, PathBuf, bool)> = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }
        let is_link = file_type.is_symlink();
        let path = entry.into_path();
        let relative = relative_key(root, &path);
        files.push((relative, path, is_link));
    }

    let mut listing = files
        .par_iter()
        .map(|(relative, path, is_link)| {
            let sig = if *is_link {
                link_signature(path)
            } else {
                file_signature(path)
            };
            sig.map(|sig| (relative.as_str(), sig))
        })
        .collect::<Result<Vec<_>, _>>()?;
    listing.sort_by(|a, b| a.0.cmp(b.0));

    let mut hasher = ContentHasher::new();
    for (relative, sig) in &listing {
        hasher.update(relative.as_bytes());
        hasher.update(&[0]);
        hasher.update(sig.as_str().as_bytes());
        hasher.update(&[0]);
    }
    tracing::trace!(root = %root.display(), files = listing.len(), "directory signature");
    Ok(Signature::new(format!("dir:{}", hasher.finish())))
}

/// Signature of a symbolic link itself, never of its target.
fn link_signature(path: &Path) -> Result<Signature, SignatureError> {
    let metadata = std::fs::symlink_metadata(path).map_err(|e| SignatureError::from_io(path, e))?;
    Ok(Signature::new(format!("link:{}", metadata_signature(&metadata))))
}

/// Renders `path` relative to `root` with `/` separators on every platform.
fn relative_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn walk_error(root: &Path, err: walkdir::Error) -> SignatureError {
    let path = err.path().unwrap_or(root).to_path_buf();
    match err.into_io_error() {
        Some(io) => SignatureError::from_io(path, io),
        None => SignatureError::Io {
            path,
            source: std::io::Error::other("filesystem loop detected"),
        },
    }
}
