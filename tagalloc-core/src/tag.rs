//! Four-byte allocation tags.

use std::fmt;

use serde::{Serialize, Serializer};
use thiserror::Error;

/// An opaque 4-byte identifier attached to an allocation.
///
/// Tags are compared byte for byte and never interpreted as text. Non-ASCII
/// bytes are escaped when a tag is displayed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Tag([u8; 4]);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Tag must be exactly 4 bytes, got {0}")]
pub struct TagLengthError(pub usize);

impl Tag {
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl From<[u8; 4]> for Tag {
    fn from(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }
}

impl From<&[u8; 4]> for Tag {
    fn from(bytes: &[u8; 4]) -> Self {
        Self(*bytes)
    }
}

impl TryFrom<&[u8]> for Tag {
    type Error = TagLengthError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        <[u8; 4]>::try_from(bytes)
            .map(Self)
            .map_err(|_| TagLengthError(bytes.len()))
    }
}

impl TryFrom<&str> for Tag {
    type Error = TagLengthError;

    fn try_from(text: &str) -> Result<Self, Self::Error> {
        Self::try_from(text.as_bytes())
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.escape_ascii())
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag(\"{}\")", self.0.escape_ascii())
    }
}

impl Serialize for Tag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_compare_by_exact_bytes() {
        assert_eq!(Tag::from(b"AAAA"), Tag::new(*b"AAAA"));
        assert_ne!(Tag::from(b"AAAA"), Tag::from(b"AAA\0"));
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert_eq!(Tag::try_from("ABC"), Err(TagLengthError(3)));
        assert_eq!(Tag::try_from(&b"ABCDE"[..]), Err(TagLengthError(5)));
        assert_eq!(Tag::try_from("FlAr"), Ok(Tag::new(*b"FlAr")));
    }

    #[test]
    fn embedded_nul_is_kept_and_escaped() {
        let tag = Tag::new([b'A', 0, b'B', 0xff]);
        assert_eq!(tag.as_bytes(), &[b'A', 0, b'B', 0xff]);
        assert_eq!(tag.to_string(), "A\\x00B\\xff");
    }
}
