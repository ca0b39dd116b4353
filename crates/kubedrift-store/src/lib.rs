//! kubedrift-store — embedded record store for kubedrift.
//!
//! Backed by [redb](https://docs.rs/redb), keeps drift records and metric
//! samples in one sorted table keyed by hierarchical paths.
//!
//! # Key space
//!
//! ```text
//! /{kind}/{namespace}/{name}/{uid}                          drift records
//! /{node}/{namespace}/{pod}/{metric}/{container}/{suffix}   metric samples
//! ```
//!
//! Values are opaque bytes (JSON in practice). The `DriftStore` is
//! `Clone` + `Send` + `Sync` (backed by `Arc<Database>`) and can be shared
//! across async tasks.

pub mod error;
pub mod key;
pub mod store;
pub mod tables;

pub use error::{StoreError, StoreResult};
pub use key::{Key, KeyError};
pub use store::{DriftStore, Entry};
