use std::future::Future;

use silt_config::shared::DestinationKind;

use crate::buffer::TableData;
use crate::destination::ddl::AlterTableArgs;
use crate::destination::types::DwhTableConfig;
use crate::error::SiltResult;
use crate::typing::columns::Column;

/// Contract every warehouse destination implements.
///
/// The flush orchestrator drives these capabilities in a fixed order per
/// table: fetch the cached table config, apply schema additions, backfill
/// defaults, bulk-load a temporary stage table, merge (or append in history
/// mode), then expire deleted columns. Implementations must be idempotent
/// under retry; the pipeline is at-least-once and relies on merge semantics
/// for effective exactly-once rows.
pub trait Destination: Send + Sync + 'static {
    fn label(&self) -> DestinationKind;

    /// Destination-flavored fully qualified table name.
    fn to_fqn(&self, table_data: &TableData) -> String;

    /// Returns the warehouse-side schema, lazily fetched and cached. The
    /// returned value is a snapshot; mutations go through the destination.
    fn get_table_config(
        &self,
        table_data: &TableData,
    ) -> impl Future<Output = SiltResult<DwhTableConfig>> + Send;

    /// Applies one schema change (create, add, or drop) and updates the
    /// cached table config accordingly.
    fn alter_table(
        &self,
        args: AlterTableArgs<'_>,
    ) -> impl Future<Output = SiltResult<()>> + Send;

    /// Writes a column's default into existing NULL rows, at most once per
    /// column, using a durable marker to suppress repeats.
    fn backfill_column(
        &self,
        fqn: &str,
        column: &Column,
    ) -> impl Future<Output = SiltResult<()>> + Send;

    /// Creates the temporary stage table and bulk-loads the buffered rows.
    fn prepare_temporary_table(
        &self,
        table_data: &TableData,
        temp_table: &str,
    ) -> impl Future<Output = SiltResult<()>> + Send;

    /// Merges the stage table into the target: upsert plus delete handling,
    /// TOAST-aware, soft-delete-aware.
    fn merge(
        &self,
        table_data: &TableData,
        temp_table: &str,
    ) -> impl Future<Output = SiltResult<()>> + Send;

    /// Appends the stage table to the target without deduplication.
    fn append(
        &self,
        table_data: &TableData,
        temp_table: &str,
    ) -> impl Future<Output = SiltResult<()>> + Send;

    /// Rewrites the target keeping one row per primary key.
    fn dedupe(
        &self,
        fqn: &str,
        primary_keys: &[String],
    ) -> impl Future<Output = SiltResult<()>> + Send;

    /// Runs the deleted-column grace bookkeeping for this table and returns
    /// the columns whose absence outlasted the window.
    fn expire_drop_candidates(&self, fqn: &str, candidates: &[Column]) -> Vec<Column>;
}
