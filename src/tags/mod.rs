//! Tag keys, values and immutable tag contexts.
//!
//! A [`TagContext`] is the set of dimension key/value pairs attached to one
//! recording. Contexts are never mutated: [`TagContext::with`] and
//! [`TagContextBuilder`] return new contexts, so a context can be shared
//! freely between threads and reused across recordings.

use crate::core::{Result, VigilError};
use std::fmt;
use std::sync::Arc;

/// Maximum length of a tag key or value.
pub const MAX_TAG_LENGTH: usize = 255;

/// Name of a dimension, e.g. `method`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagKey(Arc<str>);

/// Value of a dimension, e.g. `doWork`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagValue(Arc<str>);

fn is_printable(s: &str) -> bool {
    s.chars().all(|c| (' '..='~').contains(&c))
}

impl TagKey {
    /// Creates a new TagKey after validation
    pub fn new<S: AsRef<str>>(name: S) -> Result<Self> {
        let name = name.as_ref();
        if name.is_empty() {
            return Err(VigilError::invalid_tag("tag key cannot be empty"));
        }
        if name.len() > MAX_TAG_LENGTH {
            return Err(VigilError::invalid_tag(format!(
                "tag key cannot exceed {} characters, got {}",
                MAX_TAG_LENGTH,
                name.len()
            )));
        }
        if !is_printable(name) {
            return Err(VigilError::invalid_tag(format!(
                "tag key '{}' contains non-printable characters",
                name.escape_debug()
            )));
        }
        Ok(TagKey(Arc::from(name)))
    }

    /// Returns the string representation of the key
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TagValue {
    /// Creates a new TagValue after validation. Empty values are allowed.
    pub fn new<S: AsRef<str>>(value: S) -> Result<Self> {
        let value = value.as_ref();
        if value.len() > MAX_TAG_LENGTH {
            return Err(VigilError::invalid_tag(format!(
                "tag value cannot exceed {} characters, got {}",
                MAX_TAG_LENGTH,
                value.len()
            )));
        }
        if !is_printable(value) {
            return Err(VigilError::invalid_tag(format!(
                "tag value '{}' contains non-printable characters",
                value.escape_debug()
            )));
        }
        Ok(TagValue(Arc::from(value)))
    }

    /// Returns the string representation of the value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable ordered set of unique tag key/value pairs.
///
/// Entries keep the order in which they were added. Lookups are linear, which
/// beats hashing for the handful of tags a recording carries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagContext {
    entries: Arc<[(TagKey, TagValue)]>,
}

impl TagContext {
    /// The context with no tags.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Start a chained builder from the empty context.
    pub fn builder() -> TagContextBuilder {
        TagContextBuilder::default()
    }

    /// Returns a new context with `key = value` appended.
    ///
    /// Fails with [`VigilError::InvalidTag`] if the key is already present.
    pub fn with(&self, key: TagKey, value: TagValue) -> Result<Self> {
        if self.get(&key).is_some() {
            return Err(VigilError::invalid_tag(format!(
                "tag key '{}' is already present in this context",
                key
            )));
        }
        let mut entries = Vec::with_capacity(self.entries.len() + 1);
        entries.extend(self.entries.iter().cloned());
        entries.push((key, value));
        Ok(Self {
            entries: entries.into(),
        })
    }

    /// Looks up the value for `key`.
    pub fn get(&self, key: &TagKey) -> Option<&TagValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&TagKey, &TagValue)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// Number of tags in the context.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the context has no tags.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Projects this context onto `keys`, in the order of `keys`.
    ///
    /// Keys missing from the context map to `None`.
    pub fn project(&self, keys: &[TagKey]) -> Vec<Option<TagValue>> {
        keys.iter().map(|key| self.get(key).cloned()).collect()
    }
}

/// Chained builder for [`TagContext`].
///
/// Validation errors are deferred to [`TagContextBuilder::build`], which
/// reports the first one encountered.
#[derive(Debug, Default)]
pub struct TagContextBuilder {
    context: TagContext,
    error: Option<VigilError>,
}

impl TagContextBuilder {
    /// Start from an existing context instead of the empty one.
    pub fn from_context(context: &TagContext) -> Self {
        Self {
            context: context.clone(),
            error: None,
        }
    }

    /// Add `key = value`.
    pub fn put<K: AsRef<str>, V: AsRef<str>>(mut self, key: K, value: V) -> Self {
        if self.error.is_some() {
            return self;
        }
        let next = TagKey::new(key)
            .and_then(|key| TagValue::new(value).map(|value| (key, value)))
            .and_then(|(key, value)| self.context.with(key, value));
        match next {
            Ok(context) => self.context = context,
            Err(e) => self.error = Some(e),
        }
        self
    }

    /// Build the context, or return the first invalid tag.
    pub fn build(self) -> Result<TagContext> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.context),
        }
    }
}
