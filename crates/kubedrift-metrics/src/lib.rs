//! kubedrift-metrics — node metric samples from scrape to store key.
//!
//! Decodes Prometheus text exposition bodies into samples, filters them
//! through the metric allow-list, and builds the keys they are stored under.
//!
//! # Pipeline
//!
//! ```text
//! scrape body
//!   └── exposition::Decoder → Vec<MetricSample> per family
//!         └── MetricAllowList::retain() → allowed samples only
//!               └── keys::sample_key() → /{node}/{ns}/{pod}/{metric}/{container}/{suffix}
//! ```

pub mod allowlist;
pub mod error;
pub mod exposition;
pub mod keys;
pub mod sample;

pub use allowlist::{CADVISOR_METRICS, MetricAllowList};
pub use error::{DecodeError, DecodeResult};
pub use exposition::{Decoder, decode};
pub use keys::{MISSING_SEGMENT, sample_key, series_subtree, unique_suffix};
pub use sample::MetricSample;
