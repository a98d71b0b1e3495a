//! Canonical cache keys.
//!
//! A key is the source identifier, the target type name, the positional
//! arguments in order, and the keyword arguments sorted by name. Every
//! argument value carries a type tag in its encoding, so values that would
//! print identically (`1` and `"1"`, a tuple and a list, an empty list and
//! no argument at all) never collide.
//!
//! Type names come from [`std::any::type_name`], whose output is not
//! guaranteed to be stable across compiler versions. After a toolchain
//! upgrade that renders a name differently, entries stored under the old
//! name are never matched again; they stay on disk until removed with
//! [`CleanScope::Source`](crate::CleanScope::Source) or a full clear.

use std::collections::BTreeMap;

use cachejar_signature::Source;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// A type-tagged construction argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ArgValue {
    /// The absence of a value.
    None,
    /// A boolean.
    Bool(bool),
    /// A signed integer. Unsigned values that fit are normalized here.
    Int(i64),
    /// An unsigned integer above `i64::MAX`.
    UInt(u64),
    /// A float, encoded as text so that NaN and infinities survive.
    Float(#[serde(with = "float_text")] f64),
    /// A string.
    Str(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// A variable-length sequence.
    List(Vec<ArgValue>),
    /// A fixed-length sequence.
    Tuple(Vec<ArgValue>),
    /// A mapping with string keys, kept sorted.
    Map(BTreeMap<String, ArgValue>),
}

mod float_text {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

impl ArgValue {
    /// Builds a tuple value.
    pub fn tuple<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ArgValue>,
    {
        Self::Tuple(items.into_iter().map(Into::into).collect())
    }

    /// Builds a raw byte value.
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(data.into())
    }
}

macro_rules! signed_arg {
    ($($t:ty),*) => {$(
        impl From<$t> for ArgValue {
            fn from(v: $t) -> Self {
                Self::Int(i64::from(v))
            }
        }
    )*};
}

macro_rules! unsigned_arg {
    ($($t:ty),*) => {$(
        impl From<$t> for ArgValue {
            fn from(v: $t) -> Self {
                match i64::try_from(v) {
                    Ok(v) => Self::Int(v),
                    Err(_) => Self::UInt(v as u64),
                }
            }
        }
    )*};
}

signed_arg!(i8, i16, i32, i64, u8, u16, u32);
unsigned_arg!(u64, usize);

impl From<bool> for ArgValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f32> for ArgValue {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<f64> for ArgValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ArgValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl<T: Into<ArgValue>> From<Vec<T>> for ArgValue {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ArgValue>> From<Option<T>> for ArgValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::None, Into::into)
    }
}

impl<V: Into<ArgValue>> From<BTreeMap<String, V>> for ArgValue {
    fn from(v: BTreeMap<String, V>) -> Self {
        Self::Map(v.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

/// Positional and keyword arguments that qualify a cache slot.
///
/// ```
/// use cachejar::CacheArgs;
///
/// let args = CacheArgs::new().arg("turtle").kwarg("depth", 3).kwarg("base", "http://x/");
/// assert_eq!(args.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheArgs {
    positional: Vec<ArgValue>,
    keyword: BTreeMap<String, ArgValue>,
}

impl CacheArgs {
    /// Creates an empty argument set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument.
    pub fn arg(mut self, value: impl Into<ArgValue>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Sets a keyword argument, replacing any earlier value for `name`.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.keyword.insert(name.into(), value.into());
        self
    }

    /// Positional arguments in call order.
    pub fn positional(&self) -> &[ArgValue] {
        &self.positional
    }

    /// Keyword arguments sorted by name.
    pub fn keyword(&self) -> &BTreeMap<String, ArgValue> {
        &self.keyword
    }

    /// Total number of arguments.
    pub fn len(&self) -> usize {
        self.positional.len() + self.keyword.len()
    }

    /// Returns `true` if there are no arguments at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The identity of one cache slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheKey {
    /// Source identifier (absolute path or URL).
    pub source: String,
    /// Name of the cached object's type.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Positional arguments in order.
    pub args: Vec<ArgValue>,
    /// Keyword arguments as `(name, value)` pairs sorted by name.
    pub kwargs: Vec<(String, ArgValue)>,
}

impl CacheKey {
    /// Builds the key for `source`, a target type name, and arguments.
    pub fn new(source: &Source, type_name: &str, args: &CacheArgs) -> Self {
        Self {
            source: source.identifier(),
            type_name: type_name.to_string(),
            args: args.positional.clone(),
            kwargs: args
                .keyword
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Builds the key for `source` and the Rust type `T`.
    ///
    /// The type name is whatever [`std::any::type_name`] reports for `T`
    /// under the current compiler.
    pub fn for_type<T: ?Sized>(source: &Source, args: &CacheArgs) -> Self {
        Self::new(source, std::any::type_name::<T>(), args)
    }

    /// Returns the canonical text encoding used as the index key.
    pub fn encode(&self) -> Result<String, CacheError> {
        serde_json::to_string(self).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })
    }

    /// Parses a canonical encoding back into a key.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
