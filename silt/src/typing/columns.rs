//! Column model: typed columns with defaults, backfill flags, and
//! per-destination name escaping.

use silt_config::shared::DestinationKind;

use crate::typing::value::Value;
use crate::typing::KindDetails;

/// SQL keywords that must be quoted when used as column names.
const RESERVED_KEYWORDS: &[&str] = &[
    "all", "and", "as", "between", "by", "case", "cast", "check", "column", "default", "distinct",
    "end", "from", "group", "having", "in", "join", "limit", "not", "offset", "or", "order",
    "select", "start", "table", "then", "union", "user", "when", "where",
];

/// A single typed column.
///
/// `name` is always the raw source name; escaping is computed per destination
/// at the point SQL is emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    pub kind: KindDetails,
    default_value: Option<Value>,
    backfilled: bool,
    toast: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: KindDetails) -> Self {
        Self {
            name: name.into(),
            kind,
            default_value: None,
            backfilled: false,
            toast: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default_value.as_ref()
    }

    pub fn set_default_value(&mut self, value: Value) {
        self.default_value = Some(value);
    }

    pub fn backfilled(&self) -> bool {
        self.backfilled
    }

    pub fn set_backfilled(&mut self, backfilled: bool) {
        self.backfilled = backfilled;
    }

    pub fn is_toast(&self) -> bool {
        self.toast
    }

    pub fn set_toast(&mut self, toast: bool) {
        self.toast = toast;
    }

    /// Whether this column needs its default written into existing NULL rows.
    pub fn should_backfill(&self) -> bool {
        !self.backfilled && self.default_value.as_ref().is_some_and(|v| !v.is_null())
    }

    /// Returns the column name escaped for the given destination.
    ///
    /// Reserved keywords are quoted in the destination's style: double quotes
    /// for Snowflake and Redshift (upper-cased for Snowflake when the driver
    /// asks for it), back-ticks for BigQuery.
    pub fn escaped_name(&self, destination: DestinationKind, uppercase: bool) -> String {
        if !RESERVED_KEYWORDS.contains(&self.name.to_lowercase().as_str()) {
            return self.name.clone();
        }

        match destination {
            DestinationKind::BigQuery => format!("`{}`", self.name),
            DestinationKind::Snowflake if uppercase => {
                format!("\"{}\"", self.name.to_uppercase())
            }
            _ => format!("\"{}\"", self.name),
        }
    }
}

/// An ordered set of columns keyed by lower-cased raw name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Columns {
    columns: Vec<Column>,
}

impl Columns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_columns(columns: Vec<Column>) -> Self {
        let mut set = Self::new();
        for column in columns {
            set.add(column);
        }
        set
    }

    /// Inserts the column, or merges it into the existing entry.
    ///
    /// Kind merging follows the upgrade rule: `Invalid` is replaced by any
    /// concrete kind, and disagreeing concrete kinds widen to `String`. The
    /// default value is preserved from the first non-nil sighting, the toast
    /// flag OR-merges, and `backfilled` keeps the existing (warehouse-side)
    /// truth.
    pub fn add(&mut self, column: Column) {
        let key = column.name.to_lowercase();
        let Some(existing) = self
            .columns
            .iter_mut()
            .find(|c| c.name.to_lowercase() == key)
        else {
            self.columns.push(column);
            return;
        };

        existing.kind = merge_kinds(&existing.kind, &column.kind);
        if existing.default_value.is_none() {
            existing.default_value = column.default_value;
        }
        existing.toast |= column.toast;
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        let key = name.to_lowercase();
        self.columns.iter().find(|c| c.name.to_lowercase() == key)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Column> {
        let key = name.to_lowercase();
        self.columns
            .iter_mut()
            .find(|c| c.name.to_lowercase() == key)
    }

    pub fn remove(&mut self, name: &str) -> Option<Column> {
        let key = name.to_lowercase();
        let idx = self
            .columns
            .iter()
            .position(|c| c.name.to_lowercase() == key)?;
        Some(self.columns.remove(idx))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column names usable in INSERT/SELECT lists, escaped per destination,
    /// in insertion order.
    pub fn escaped_names(&self, destination: DestinationKind, uppercase: bool) -> Vec<String> {
        self.columns
            .iter()
            .map(|c| c.escaped_name(destination, uppercase))
            .collect()
    }
}

fn merge_kinds(existing: &KindDetails, incoming: &KindDetails) -> KindDetails {
    match (existing, incoming) {
        (KindDetails::Invalid, concrete) => concrete.clone(),
        (concrete, KindDetails::Invalid) => concrete.clone(),
        (a, b) if a == b => a.clone(),
        _ => KindDetails::String,
    }
}

/// Set difference between the in-memory schema and the warehouse schema.
///
/// `to_add` are columns the warehouse lacks (always non-`Invalid`); `to_drop`
/// are *candidates* present only warehouse-side. Whether a candidate is
/// actually dropped is decided by the table-config grace bookkeeping.
pub fn diff(in_memory: &Columns, warehouse: &Columns) -> (Vec<Column>, Vec<Column>) {
    let to_add = in_memory
        .iter()
        .filter(|c| !warehouse.contains(c.name()) && c.kind != KindDetails::Invalid)
        .cloned()
        .collect();

    let to_drop = warehouse
        .iter()
        .filter(|c| !in_memory.contains(c.name()))
        .cloned()
        .collect();

    (to_add, to_drop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typing::ext::ExtendedTimeKind;

    #[test]
    fn add_merges_kinds_with_upgrade_rule() {
        let mut columns = Columns::new();
        columns.add(Column::new("age", KindDetails::Invalid));
        columns.add(Column::new("age", KindDetails::Integer));
        assert_eq!(columns.get("age").unwrap().kind, KindDetails::Integer);

        columns.add(Column::new("age", KindDetails::Float));
        assert_eq!(columns.get("age").unwrap().kind, KindDetails::String);
    }

    #[test]
    fn kind_merge_is_commutative() {
        let pairs = [
            (KindDetails::Invalid, KindDetails::Integer),
            (KindDetails::Integer, KindDetails::Float),
            (KindDetails::Boolean, KindDetails::Boolean),
            (
                KindDetails::etime(ExtendedTimeKind::Date),
                KindDetails::etime(ExtendedTimeKind::DateTime),
            ),
        ];

        for (a, b) in pairs {
            let mut forward = Columns::new();
            forward.add(Column::new("c", a.clone()));
            forward.add(Column::new("c", b.clone()));

            let mut backward = Columns::new();
            backward.add(Column::new("c", b));
            backward.add(Column::new("c", a));

            assert_eq!(
                forward.get("c").unwrap().kind,
                backward.get("c").unwrap().kind
            );
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut columns = Columns::new();
        columns.add(Column::new("UserID", KindDetails::Integer));
        assert!(columns.contains("userid"));
        assert_eq!(columns.len(), 1);

        columns.add(Column::new("userid", KindDetails::Integer));
        assert_eq!(columns.len(), 1);
    }

    #[test]
    fn first_default_value_sighting_wins() {
        let mut columns = Columns::new();
        let mut with_default = Column::new("flag", KindDetails::Boolean);
        with_default.set_default_value(Value::Boolean(true));

        columns.add(with_default);
        let mut other_default = Column::new("flag", KindDetails::Boolean);
        other_default.set_default_value(Value::Boolean(false));
        columns.add(other_default);

        assert_eq!(
            columns.get("flag").unwrap().default_value(),
            Some(&Value::Boolean(true))
        );
    }

    #[test]
    fn toast_flag_or_merges() {
        let mut columns = Columns::new();
        columns.add(Column::new("payload", KindDetails::Struct));
        let mut toasted = Column::new("payload", KindDetails::Struct);
        toasted.set_toast(true);
        columns.add(toasted);
        assert!(columns.get("payload").unwrap().is_toast());

        // A later un-toasted sighting does not clear the flag.
        columns.add(Column::new("payload", KindDetails::Struct));
        assert!(columns.get("payload").unwrap().is_toast());
    }

    #[test]
    fn reserved_names_escape_per_destination() {
        let column = Column::new("default", KindDetails::Boolean);
        assert_eq!(
            column.escaped_name(DestinationKind::Snowflake, true),
            "\"DEFAULT\""
        );
        assert_eq!(
            column.escaped_name(DestinationKind::Snowflake, false),
            "\"default\""
        );
        assert_eq!(
            column.escaped_name(DestinationKind::BigQuery, false),
            "`default`"
        );
        assert_eq!(
            column.escaped_name(DestinationKind::Redshift, false),
            "\"default\""
        );

        let plain = Column::new("first_name", KindDetails::String);
        assert_eq!(
            plain.escaped_name(DestinationKind::Snowflake, true),
            "first_name"
        );
    }

    #[test]
    fn diff_splits_additions_and_drop_candidates() {
        let mut in_memory = Columns::new();
        in_memory.add(Column::new("id", KindDetails::Integer));
        in_memory.add(Column::new("name", KindDetails::String));
        in_memory.add(Column::new("broken", KindDetails::Invalid));

        let mut warehouse = Columns::new();
        warehouse.add(Column::new("id", KindDetails::Integer));
        warehouse.add(Column::new("legacy", KindDetails::String));

        let (to_add, to_drop) = diff(&in_memory, &warehouse);
        assert_eq!(
            to_add.iter().map(|c| c.name()).collect::<Vec<_>>(),
            vec!["name"]
        );
        assert_eq!(
            to_drop.iter().map(|c| c.name()).collect::<Vec<_>>(),
            vec!["legacy"]
        );
    }
}
