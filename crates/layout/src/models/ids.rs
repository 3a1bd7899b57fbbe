use derive_more::{Display, From};
use std::borrow::Borrow;

/// Identifier of a book, as understood by the content source.
#[derive(Debug, Display, From, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(transparent))]
pub struct BookId(String);
impl BookId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl From<&str> for BookId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Identifier of a single chapter. Opaque; ordering between chapters comes
/// from the chapter list, never from the identifier.
#[derive(Debug, Display, From, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(transparent))]
pub struct ChapterId(String);
impl ChapterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl From<&str> for ChapterId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}
impl Borrow<str> for ChapterId {
    fn borrow(&self) -> &str {
        &self.0
    }
}
