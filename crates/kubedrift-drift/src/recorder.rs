//! Persists drift records as resources change.

use kubedrift_store::{DriftStore, Key};
use tracing::debug;

use crate::error::RecordResult;
use crate::flatten::{FlattenOptions, flatten};
use crate::record::{DriftRecord, ResourceKind, drift_subtree};
use crate::resources::Resource;

/// Flattens observed resources and writes them to the store.
///
/// This is the resource-change callback surface: whatever watches the
/// cluster hands each added or updated object to [`DriftRecorder::record`].
/// A record for the same uid is overwritten (last write wins).
#[derive(Clone)]
pub struct DriftRecorder {
    store: DriftStore,
    options: FlattenOptions,
}

impl DriftRecorder {
    pub fn new(store: DriftStore, options: FlattenOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> &FlattenOptions {
        &self.options
    }

    pub fn record(&self, resource: &Resource) -> RecordResult<Key> {
        let record = flatten(resource, &self.options)?;
        self.store.put_json(&record.key, &record)?;
        debug!(key = %record.key, kind = %record.kind, "drift record written");
        Ok(record.key)
    }

    /// Records of `kind`, optionally narrowed by namespace then name, in key order.
    pub fn query(&self, kind: ResourceKind, rest: &[&str]) -> RecordResult<Vec<DriftRecord>> {
        let prefix = drift_subtree(kind, rest)?;
        let records = self.store.scan_json::<DriftRecord>(prefix.as_str())?;
        Ok(records.into_iter().map(|(_, record)| record).collect())
    }
}
