//! CDC event model and ingestion into table buffers.

pub mod debezium;

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::buffer::{Row, TableData};
use crate::constants::{
    DATABASE_UPDATED_AT_COLUMN_MARKER, DELETE_COLUMN_MARKER, TOAST_UNAVAILABLE_VALUE,
    UPDATED_AT_COLUMN_MARKER,
};
use crate::error::SiltResult;
use crate::queue::{AckToken, Message};
use crate::typing::columns::Column;
use crate::typing::ext::ExtendedTimeKind;
use crate::typing::value::Value;
use crate::typing::{parse_value, KindDetails, OptionalSchema, Settings};

/// Source-side operation that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

/// A parsed change event, normalized across CDC wire formats.
#[derive(Debug, Clone)]
pub struct Event {
    /// Source table name.
    pub table: String,
    pub operation: Operation,
    /// True for deletes and broker tombstones.
    pub deleted: bool,
    /// Primary-key values from the message key.
    pub pk: HashMap<String, serde_json::Value>,
    /// Row state after the change; empty for deletes.
    pub data: HashMap<String, serde_json::Value>,
    /// Caller-asserted column kinds from the envelope's schema block.
    pub optional_schema: Option<OptionalSchema>,
    /// Declared column defaults from the envelope's schema block; a new
    /// column with a default gets backfilled at the destination.
    pub column_defaults: HashMap<String, serde_json::Value>,
    /// Commit timestamp at the source database.
    pub source_ts: Option<DateTime<Utc>>,
    /// Timestamp at which the connector emitted the event.
    pub execution_ts: DateTime<Utc>,
}

/// Wire-format parser contract. Implementations turn an opaque broker message
/// into an [`Event`] without the pipeline interpreting envelopes itself.
pub trait FormatParser: Send + Sync {
    fn label(&self) -> &'static str;

    fn parse(&self, message: &Message) -> SiltResult<Event>;
}

impl Event {
    /// Applies this event to the table buffer.
    ///
    /// Deletes insert a primary-key-only row carrying the delete marker; with
    /// `softDelete` the merge turns that into an `UPDATE`, otherwise into a
    /// `DELETE`. Creates and updates insert the after-image. Every touched
    /// column evolves the buffer's schema through [`parse_value`].
    pub fn save(
        &self,
        settings: &Settings,
        table_data: &mut TableData,
        token: Option<AckToken>,
    ) -> SiltResult<()> {
        let topic_config = table_data.topic_config().clone();
        let schema = self.optional_schema.as_ref();

        let mut row = Row::new();

        if self.deleted {
            for (name, raw) in &self.pk {
                self.evolve_column(settings, table_data, schema, name, raw);
                row.insert(name.clone(), Value::from_json(raw.clone()));
            }
        } else {
            for (name, raw) in &self.data {
                self.evolve_column(settings, table_data, schema, name, raw);
                row.insert(name.clone(), Value::from_json(raw.clone()));
            }
            // Primary keys may be absent from the after-image; make sure they
            // always land in the row.
            for (name, raw) in &self.pk {
                if !row.contains_key(name) {
                    self.evolve_column(settings, table_data, schema, name, raw);
                    row.insert(name.clone(), Value::from_json(raw.clone()));
                }
            }
        }

        table_data.add_column(Column::new(DELETE_COLUMN_MARKER, KindDetails::Boolean));
        row.insert(
            DELETE_COLUMN_MARKER.to_string(),
            Value::Boolean(self.deleted),
        );

        if topic_config.include_artie_updated_at {
            table_data.add_column(Column::new(
                UPDATED_AT_COLUMN_MARKER,
                KindDetails::etime(ExtendedTimeKind::DateTime),
            ));
            row.insert(
                UPDATED_AT_COLUMN_MARKER.to_string(),
                Value::String(self.execution_ts.to_rfc3339()),
            );
        }

        if topic_config.include_database_updated_at {
            if let Some(source_ts) = self.source_ts {
                table_data.add_column(Column::new(
                    DATABASE_UPDATED_AT_COLUMN_MARKER,
                    KindDetails::etime(ExtendedTimeKind::DateTime),
                ));
                row.insert(
                    DATABASE_UPDATED_AT_COLUMN_MARKER.to_string(),
                    Value::String(source_ts.to_rfc3339()),
                );
            }
        }

        let pk = self.primary_key_string(&topic_config.primary_keys);
        table_data.insert_row(pk, row, token);

        Ok(())
    }

    /// Builds the batch deduplication key from the configured primary keys.
    /// Returns `None` when the table has no primary keys, which switches the
    /// buffer to synthetic keys.
    fn primary_key_string(&self, primary_keys: &[String]) -> Option<String> {
        if primary_keys.is_empty() {
            return None;
        }

        let parts: Vec<String> = primary_keys
            .iter()
            .map(|name| {
                let value = self
                    .pk
                    .get(name)
                    .or_else(|| self.data.get(name))
                    .cloned()
                    .unwrap_or(serde_json::Value::Null);
                format!("{name}={}", Value::from_json(value).to_key_string())
            })
            .collect();

        Some(parts.join(","))
    }

    fn evolve_column(
        &self,
        settings: &Settings,
        table_data: &mut TableData,
        schema: Option<&OptionalSchema>,
        name: &str,
        raw: &serde_json::Value,
    ) {
        let kind = parse_value(settings, name, schema, raw);
        let mut column = Column::new(name, kind);
        if raw.as_str() == Some(TOAST_UNAVAILABLE_VALUE) {
            column.set_toast(true);
        }
        if let Some(default) = self.column_defaults.get(name) {
            column.set_default_value(Value::from_json(default.clone()));
        }
        table_data.add_column(column);
    }
}
