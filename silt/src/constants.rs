//! Wire-level marker names and sentinels shared across the pipeline.

/// Marker column consumed by merge statements to route delete branches.
pub const DELETE_COLUMN_MARKER: &str = "__artie_delete";

/// Optional audit column carrying the pipeline's processing timestamp.
pub const UPDATED_AT_COLUMN_MARKER: &str = "__artie_updated_at";

/// Optional audit column carrying the source database's commit timestamp.
pub const DATABASE_UPDATED_AT_COLUMN_MARKER: &str = "__artie_db_updated_at";

/// Prefix embedded in temporary stage table names so a janitor can recognize
/// and expire stragglers.
pub const TEMP_TABLE_PREFIX: &str = "__artie";

/// Sentinel emitted by Debezium for TOAST columns whose value was not shipped
/// in the change event.
pub const TOAST_UNAVAILABLE_VALUE: &str = "__debezium_unavailable_value";

/// How long a temporary stage table may live before a janitor drops it.
pub const TEMP_TABLE_TTL_SECONDS: i64 = 6 * 60 * 60;
