//! redb table definitions for the Vigil state store.
//!
//! Record tables use `u64` id keys and `&[u8]` values (JSON-serialized
//! domain types).

use redb::TableDefinition;

/// Shape shared by every id-keyed record table.
pub type RecordTable = TableDefinition<'static, u64, &'static [u8]>;

/// Monitored hosts keyed by host id.
pub const HOSTS: RecordTable = TableDefinition::new("hosts");

/// Service kinds (HTTP, HTTPS, ...) keyed by service id.
pub const SERVICES: RecordTable = TableDefinition::new("services");

/// Host services keyed by host service id.
pub const HOST_SERVICES: RecordTable = TableDefinition::new("host_services");

/// Append-only event log keyed by event id (monotonic).
pub const EVENTS: RecordTable = TableDefinition::new("events");

/// Last allocated id per record table, keyed by table name.
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");
