//! redb table definitions for the record store.

use redb::TableDefinition;

/// Every drift record and metric sample, keyed by its hierarchical path.
///
/// Drift records live under `/{kind}/…`, metric samples under `/{node}/…`.
pub const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");
