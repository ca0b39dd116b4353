//! Hierarchical record keys.
//!
//! A key is a `/`-delimited path with a leading `/`, e.g.
//! `/pod/default/web-0/6f1c…` or `/node-1/default/web-0/container_cpu_usage_seconds_total/app/…`.
//! Segments are escaped so they never contain the delimiter: `%` becomes
//! `%25` and `/` becomes `%2F`. Because a parent path is a byte prefix of
//! every child path, prefix scans over the sorted store return whole
//! subtrees in key order.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Path delimiter between segments.
pub const DELIMITER: char = '/';

/// Errors raised while building or parsing a key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("key needs at least one segment")]
    NoSegments,

    #[error("segment {0} is empty; omit trailing unknown segments instead")]
    EmptySegment(usize),

    #[error("malformed key {0:?}")]
    Malformed(String),
}

/// A hierarchical store key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(String);

impl Key {
    /// Build a full record key from ordered path segments.
    ///
    /// Every segment must be non-empty. Callers that only know a leading
    /// part of the path pass the longest known prefix instead of padding
    /// with empty strings, so `/kind` stays a true prefix of `/kind/ns`.
    pub fn build<I, S>(segments: I) -> Result<Self, KeyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let key = Self::join(segments)?;
        if key.0.is_empty() {
            return Err(KeyError::NoSegments);
        }
        Ok(key)
    }

    /// Build a scan prefix. Same construction as [`Key::build`], but zero
    /// segments is allowed and selects every key.
    pub fn prefix<I, S>(segments: I) -> Result<Self, KeyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::join(segments)
    }

    /// Build a scan prefix that matches only descendants of the given path.
    ///
    /// `/pod/default/` matches `/pod/default/web-0/…` but not
    /// `/pod/default-canary/…`, which the bare prefix `/pod/default` would.
    pub fn subtree<I, S>(segments: I) -> Result<Self, KeyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut key = Self::join(segments)?;
        key.0.push(DELIMITER);
        Ok(key)
    }

    /// Wrap a key string read back from the store without re-escaping it.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Append one more segment, returning the extended key.
    pub fn child(&self, segment: &str) -> Result<Self, KeyError> {
        if segment.is_empty() {
            return Err(KeyError::EmptySegment(self.depth()));
        }
        let mut raw = self.0.trim_end_matches(DELIMITER).to_string();
        raw.push(DELIMITER);
        raw.push_str(&escape(segment));
        Ok(Self(raw))
    }

    /// Split the key back into unescaped segments.
    pub fn segments(&self) -> Result<Vec<String>, KeyError> {
        if self.0.is_empty() {
            return Ok(Vec::new());
        }
        let body = self
            .0
            .strip_prefix(DELIMITER)
            .ok_or_else(|| KeyError::Malformed(self.0.clone()))?;
        body.split(DELIMITER)
            .filter(|s| !s.is_empty())
            .map(|s| unescape(s).ok_or_else(|| KeyError::Malformed(self.0.clone())))
            .collect()
    }

    /// Number of segments in the key.
    pub fn depth(&self) -> usize {
        self.0.split(DELIMITER).filter(|s| !s.is_empty()).count()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn into_string(self) -> String {
        self.0
    }

    fn join<I, S>(segments: I) -> Result<Self, KeyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut raw = String::new();
        for (index, segment) in segments.into_iter().enumerate() {
            let segment = segment.as_ref();
            if segment.is_empty() {
                return Err(KeyError::EmptySegment(index));
            }
            raw.push(DELIMITER);
            raw.push_str(&escape(segment));
        }
        Ok(Self(raw))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn escape(segment: &str) -> String {
    if !segment.contains(['%', DELIMITER]) {
        return segment.to_string();
    }
    let mut out = String::with_capacity(segment.len() + 4);
    for c in segment.chars() {
        match c {
            '%' => out.push_str("%25"),
            DELIMITER => out.push_str("%2F"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(segment: &str) -> Option<String> {
    if !segment.contains('%') {
        return Some(segment.to_string());
    }
    let mut out = String::with_capacity(segment.len());
    let mut rest = segment;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let code = rest.get(pos + 1..pos + 3)?;
        match code {
            "25" => out.push('%'),
            "2F" | "2f" => out.push(DELIMITER),
            _ => return None,
        }
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    Some(out)
}
