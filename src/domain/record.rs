//! Untyped row form and the `Entity` trait every model implements.
//!
//! A `Record` is what crosses the persistence port: column name -> JSON value.
//! Typed models convert to and from it through serde.

use crate::domain::errors::DomainError;
use crate::domain::schema::{Column, TableSchema};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

pub type Record = Map<String, Value>;

/// A persisted model: one struct, one table.
///
/// Field names are column names. `Option` fields map to nullable columns and
/// non-`Option` fields take their `Default` value when a record omits them.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Type name used in logs and errors, e.g. `Client`.
    const NAME: &'static str;
    /// Table name, e.g. `clients`.
    const TABLE: &'static str;

    fn columns() -> Vec<Column>;

    /// Primary-key value of this instance.
    fn id(&self) -> &str;

    /// Refresh `updated_at`. Called by the store on every save.
    fn touch(&mut self, now: DateTime<Utc>);

    fn schema() -> TableSchema {
        TableSchema::new(Self::NAME, Self::TABLE, Self::columns())
    }

    fn to_record(&self) -> Result<Record, DomainError> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(DomainError::InvalidRecord(format!(
                "{} did not serialize to an object: {other}",
                Self::NAME
            ))),
        }
    }

    /// Build from a record. Keys that are not columns are logged and dropped.
    fn from_record(record: Record) -> Result<Self, DomainError> {
        let filtered = known_columns::<Self>(record);
        Ok(serde_json::from_value(Value::Object(filtered))?)
    }

    /// Overwrite known columns whose incoming value is not null.
    fn update_from_record(&mut self, record: &Record) -> Result<(), DomainError> {
        let schema = Self::schema();
        let mut merged = self.to_record()?;
        for (key, value) in record {
            if !value.is_null() && schema.has_column(key) {
                merged.insert(key.clone(), value.clone());
            }
        }
        *self = serde_json::from_value(Value::Object(merged))?;
        Ok(())
    }
}

/// Drop keys the entity's table does not have, warning once with their names.
pub(crate) fn known_columns<E: Entity>(record: Record) -> Record {
    let schema = E::schema();
    let (known, unknown): (Vec<_>, Vec<_>) = record
        .into_iter()
        .partition(|(key, _)| schema.has_column(key));
    if !unknown.is_empty() {
        let names: Vec<&str> = unknown.iter().map(|(k, _)| k.as_str()).collect();
        warn!(entity = E::NAME, keys = ?names, "ignoring unknown keys");
    }
    known.into_iter().collect()
}

/// Random primary key, as generated for clients, jobs and runs.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
