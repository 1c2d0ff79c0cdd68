use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Payload key holding the applicant identifier.
pub const SUBJECT_ID: &str = "subjectId";
/// Payload key holding the event discriminator.
pub const EVENT: &str = "event";
/// Payload key holding the recorded status.
pub const STATUS: &str = "status";

/// Scalar payload value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadValue {
    Text(String),
    Integer(i64),
    Bool(bool),
}

impl PayloadValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for PayloadValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<String> for PayloadValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for PayloadValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<i64> for PayloadValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<bool> for PayloadValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Opaque key/value map carried by a ledger entry.
///
/// The ledger never interprets payloads beyond the `subjectId`, `event` and
/// `status` keys. Key order carries no meaning; digests are computed over a
/// canonical encoding.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(BTreeMap<String, PayloadValue>);

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PayloadValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<PayloadValue>,
    ) -> Option<PayloadValue> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&PayloadValue> {
        self.0.get(key)
    }

    /// Text value under `key`, if present and textual.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(PayloadValue::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Copy every field of `other` into `self`, overwriting duplicates.
    pub fn merge(&mut self, other: Payload) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PayloadValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn subject_id(&self) -> Option<&str> {
        self.get_str(SUBJECT_ID)
    }

    pub fn event(&self) -> Option<&str> {
        self.get_str(EVENT)
    }

    pub fn status(&self) -> Option<&str> {
        self.get_str(STATUS)
    }
}

impl<K: Into<String>, V: Into<PayloadValue>> FromIterator<(K, V)> for Payload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
