//! kubedrift-drift — snapshots of cluster resources as flat records.
//!
//! Typed Pod, Node, Event and Deployment objects are flattened into
//! [`DriftRecord`]s (string maps only) and stored under
//! `/{kind}/{namespace}/{name}/{uid}`.
//!
//! ```text
//! Resource (from API JSON)
//!   └── flatten(&Resource, &FlattenOptions) → DriftRecord
//!         └── DriftRecorder::record() → DriftStore::put_json
//! ```

pub mod error;
pub mod flatten;
pub mod record;
pub mod recorder;
pub mod resources;

pub use error::{RecordError, RecordResult};
pub use flatten::{ConditionPolicy, FlattenOptions, flatten};
pub use record::{DriftRecord, FieldMap, ResourceKind, UnknownKind, drift_subtree, record_key};
pub use recorder::DriftRecorder;
pub use resources::Resource;
