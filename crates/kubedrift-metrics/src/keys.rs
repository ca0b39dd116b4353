//! Store keys for metric samples.
//!
//! `/{node}/{namespace}/{pod}/{metric}/{container}/{suffix}`, where absent
//! labels become [`MISSING_SEGMENT`] and the suffix keeps repeated scrapes
//! of one series from overwriting each other.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use kubedrift_store::{Key, KeyError};

use crate::sample::{CONTAINER_LABEL, MetricSample, NAMESPACE_LABEL, POD_LABEL};

/// Segment written in place of a missing label.
pub const MISSING_SEGMENT: &str = "none";

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A fresh uniqueness suffix: 16 hex digits of wall-clock milliseconds
/// followed by 8 of a process-wide sequence number.
pub fn unique_suffix() -> String {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{now_ms:016x}{:08x}", seq as u32)
}

/// Key for one sample scraped from `node`, with a fresh suffix.
pub fn sample_key(node: &str, sample: &MetricSample) -> Result<Key, KeyError> {
    sample_key_with_suffix(node, sample, &unique_suffix())
}

pub fn sample_key_with_suffix(
    node: &str,
    sample: &MetricSample,
    suffix: &str,
) -> Result<Key, KeyError> {
    Key::build([
        node,
        label_or_missing(sample, NAMESPACE_LABEL),
        label_or_missing(sample, POD_LABEL),
        sample.name.as_str(),
        label_or_missing(sample, CONTAINER_LABEL),
        suffix,
    ])
}

fn label_or_missing<'a>(sample: &'a MetricSample, name: &str) -> &'a str {
    sample.label(name).unwrap_or(MISSING_SEGMENT)
}

/// Scan prefix for samples under `node`, narrowed by whichever of
/// namespace, pod and metric are given (in that order).
pub fn series_subtree(node: &str, rest: &[&str]) -> Result<Key, KeyError> {
    Key::subtree(std::iter::once(node).chain(rest.iter().copied()))
}
