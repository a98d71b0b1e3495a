//! XXH3-128 digests for directory listings, response bodies, and cache files.

use std::fmt;
use std::io;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use xxhash_rust::xxh3::{xxh3_128, Xxh3};

/// A 128-bit XXH3 digest.
///
/// Folds an ordered listing of per-file signatures into one directory token,
/// fingerprints response bodies that carry no caching headers, and checksums
/// index and artifact payloads. Serialized as 32 lowercase hex digits.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash(u128);

impl ContentHash {
    /// Hashes a byte slice in one shot.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(xxh3_128(data))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_string();
        write!(f, "ContentHash({}..)", &hex[..8])
    }
}

impl FromStr for ContentHash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 32 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(format!("expected 32 hex digits, got {s:?}"));
        }
        u128::from_str_radix(s, 16)
            .map(Self)
            .map_err(|e| e.to_string())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Streaming counterpart of [`ContentHash::from_bytes`].
///
/// Implements [`io::Write`] so a reader can be drained into it with
/// [`io::copy`].
pub struct ContentHasher(Xxh3);

impl ContentHasher {
    /// Creates an empty hasher.
    pub fn new() -> Self {
        Self(Xxh3::new())
    }

    /// Feeds bytes into the hasher.
    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    /// Returns the digest of all bytes fed so far.
    pub fn finish(&self) -> ContentHash {
        ContentHash(self.0.digest128())
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl io::Write for ContentHasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_listing_same_digest() {
        let listing = b"data1.txt\x001700000000.000000000:9\x00";
        assert_eq!(ContentHash::from_bytes(listing), ContentHash::from_bytes(listing));
        assert_ne!(
            ContentHash::from_bytes(listing),
            ContentHash::from_bytes(b"data2.txt\x001700000000.000000000:9\x00")
        );
    }

    #[test]
    fn hex_text_roundtrip() {
        let h = ContentHash::from_bytes(b"index entries");
        let text = h.to_string();
        assert_eq!(text.len(), 32);
        assert!(text.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(text.parse::<ContentHash>().unwrap(), h);
        assert!(format!("{h:?}").starts_with(&format!("ContentHash({}", &text[..8])));
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!("abc".parse::<ContentHash>().is_err());
        assert!("zz".repeat(16).parse::<ContentHash>().is_err());
    }

    #[test]
    fn streaming_matches_one_shot() {
        let mut hasher = ContentHasher::new();
        hasher.update(b"version ");
        hasher.update(b"one");
        assert_eq!(hasher.finish(), ContentHash::from_bytes(b"version one"));

        let mut hasher = ContentHasher::default();
        let mut body: &[u8] = b"streamed body";
        std::io::copy(&mut body, &mut hasher).unwrap();
        assert_eq!(hasher.finish(), ContentHash::from_bytes(b"streamed body"));
    }

    #[test]
    fn serializes_as_hex_string() {
        let h = ContentHash::from_bytes(b"checksum");
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, format!("\"{h}\""));
        let back: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);
        assert!(serde_json::from_str::<ContentHash>("\"not-hex\"").is_err());
    }
}
