use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Repository-assigned identifier for any stored object.
///
/// Ids are opaque strings. The store assigns one at `persist()` time (a
/// UUID v7, so ids are unique and never reused within a repository) and it
/// is immutable thereafter. Callers that already hold an id from the
/// protocol layer wrap it with [`ObjectId::new`].
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(String);

impl ObjectId {
    /// Wrap an existing id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh id. UUID v7 keeps ids roughly time-ordered, which
    /// makes scan output stable enough to read in logs.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the id, yielding the underlying string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ObjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = ObjectId::generate();
        let b = ObjectId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn wrapping_preserves_the_string() {
        let id = ObjectId::new("doc-42");
        assert_eq!(id.as_str(), "doc-42");
        assert_eq!(id.to_string(), "doc-42");
    }

    #[test]
    fn from_impls_agree() {
        assert_eq!(ObjectId::from("x"), ObjectId::from("x".to_string()));
    }

    #[test]
    fn serde_roundtrip() {
        let id = ObjectId::new("serde-test");
        let json = serde_json::to_string(&id).unwrap();
        let parsed: ObjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }
}
