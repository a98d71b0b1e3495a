//! The opaque signature token recorded alongside every cache entry.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A fingerprint of a source's state at one moment.
///
/// Signatures are only ever compared for equality. They are produced anew on
/// every request and never remembered by the code that computes them, so two
/// signatures of the same source are equal exactly when the observable state
/// of that source is the same.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    /// Wraps a token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_textual() {
        assert_eq!(Signature::new("etag:\"abc\""), Signature::new("etag:\"abc\""));
        assert_ne!(Signature::new("etag:a"), Signature::new("modified:a"));
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&Signature::new("1700000000.000000000:4")).unwrap();
        assert_eq!(json, "\"1700000000.000000000:4\"");
        let back: Signature = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_str(), "1700000000.000000000:4");
    }
}
