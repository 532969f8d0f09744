//! Format identities shared by the signature matcher and the detection pipeline.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Tag naming a recognised format (`zip`, `base64`, `pdf`, ...).
///
/// The tag space is open: signature libraries and module tables may
/// introduce tags that have no associated constant here. Tags are stored
/// lowercase so that `ZIP` and `zip` name the same format.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct FormatTag(Cow<'static, str>);

impl FormatTag {
    /// The terminal "nothing matched" tag.
    pub const UNKNOWN: FormatTag = FormatTag(Cow::Borrowed("unknown"));
    pub const BASE64: FormatTag = FormatTag(Cow::Borrowed("base64"));
    pub const GZIP: FormatTag = FormatTag(Cow::Borrowed("gzip"));
    pub const ZIP: FormatTag = FormatTag(Cow::Borrowed("zip"));
    pub const PDF: FormatTag = FormatTag(Cow::Borrowed("pdf"));

    pub fn new(tag: impl AsRef<str>) -> Self {
        let tag = tag.as_ref().trim();
        if tag.bytes().any(|b| b.is_ascii_uppercase()) {
            FormatTag(Cow::Owned(tag.to_ascii_lowercase()))
        } else {
            FormatTag(Cow::Owned(tag.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        *self == Self::UNKNOWN
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for FormatTag {
    fn from(value: String) -> Self {
        FormatTag::new(value)
    }
}

impl From<&str> for FormatTag {
    fn from(value: &str) -> Self {
        FormatTag::new(value)
    }
}

impl From<FormatTag> for String {
    fn from(value: FormatTag) -> Self {
        value.0.into_owned()
    }
}

/// Identity of a recognised format: its tag plus a free-form version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormatId {
    pub tag: FormatTag,
    #[serde(default)]
    pub version: String,
}

impl FormatId {
    pub fn new(tag: impl Into<FormatTag>, version: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            version: version.into(),
        }
    }

    /// A format id with an empty version.
    pub fn tag_only(tag: impl Into<FormatTag>) -> Self {
        Self::new(tag, String::new())
    }

    pub fn unknown() -> Self {
        Self::tag_only(FormatTag::UNKNOWN)
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.tag.is_unknown()
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version.is_empty() {
            write!(f, "{}", self.tag)
        } else {
            write!(f, "{} {}", self.tag, self.version)
        }
    }
}

/// A set of format tags, ordered for deterministic iteration and output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormatSet(BTreeSet<FormatTag>);

impl FormatSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    pub fn insert(&mut self, tag: FormatTag) -> bool {
        self.0.insert(tag)
    }

    pub fn remove(&mut self, tag: &FormatTag) -> bool {
        self.0.remove(tag)
    }

    pub fn contains(&self, tag: &FormatTag) -> bool {
        self.0.contains(tag)
    }

    /// Returns `true` if the two sets share at least one tag.
    pub fn intersects(&self, other: &FormatSet) -> bool {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small.iter().any(|tag| large.contains(tag))
    }

    /// Remove every tag of `other` from this set.
    pub fn remove_all(&mut self, other: &FormatSet) {
        if other.is_empty() {
            return;
        }
        self.0.retain(|tag| !other.contains(tag));
    }

    pub fn extend(&mut self, other: &FormatSet) {
        self.0.extend(other.iter().cloned());
    }

    pub fn iter(&self) -> impl Iterator<Item = &FormatTag> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<FormatTag> for FormatSet {
    fn from_iter<I: IntoIterator<Item = FormatTag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<&'a str> for FormatSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self(iter.into_iter().map(FormatTag::new).collect())
    }
}

impl IntoIterator for FormatSet {
    type Item = FormatTag;
    type IntoIter = std::collections::btree_set::IntoIter<FormatTag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a FormatSet {
    type Item = &'a FormatTag;
    type IntoIter = std::collections::btree_set::Iter<'a, FormatTag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
