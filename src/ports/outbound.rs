//! Outbound ports. Application calls into infrastructure.
//!
//! Implemented by adapters.

use crate::domain::{DomainError, Entity, Record};
use crate::utils::time::current_time;
use serde_json::Value;

/// Conjunction of column equality tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    /// Matches every row.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions.push((column.to_string(), value.into()));
        self
    }

    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// A missing key compares equal to `null`. Numbers compare by value, so
    /// `12` matches a stored `12.0` as it does in SQL.
    pub fn matches(&self, record: &Record) -> bool {
        self.conditions
            .iter()
            .all(|(column, value)| same_value(record.get(column).unwrap_or(&Value::Null), value))
    }
}

fn same_value(stored: &Value, wanted: &Value) -> bool {
    match (stored, wanted) {
        (Value::Number(a), Value::Number(b)) => a == b || a.as_f64() == b.as_f64(),
        _ => stored == wanted,
    }
}

/// Persistence port. Untyped rows keyed by table name.
///
/// The primary key of a record is found through the table's schema.
#[async_trait::async_trait]
pub trait ModelStore: Send + Sync {
    /// Insert a new row. A duplicate primary key is a store error.
    async fn insert_record(&self, table: &str, record: &Record) -> Result<(), DomainError>;

    /// Overwrite the row with the record's primary key. Returns rows affected.
    async fn update_record(&self, table: &str, record: &Record) -> Result<u64, DomainError>;

    /// Returns rows affected.
    async fn delete_record(&self, table: &str, id: &str) -> Result<u64, DomainError>;

    /// Rows matching `filter`, in insertion order, at most `limit` of them.
    async fn find_records(
        &self,
        table: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<Record>, DomainError>;

    fn table_names(&self) -> Vec<String>;
}

/// Typed helpers over any [`ModelStore`].
#[async_trait::async_trait]
pub trait ModelStoreExt: ModelStore {
    async fn insert<E: Entity>(&self, entity: &E) -> Result<(), DomainError> {
        self.insert_record(E::TABLE, &entity.to_record()?).await
    }

    /// Refresh `updated_at` and write the entity back. The row must exist.
    async fn save<E: Entity>(&self, entity: &mut E) -> Result<(), DomainError> {
        entity.touch(current_time());
        let affected = self.update_record(E::TABLE, &entity.to_record()?).await?;
        if affected == 0 {
            return Err(DomainError::not_found(E::NAME, entity.id()));
        }
        Ok(())
    }

    async fn get<E: Entity>(&self, id: &str) -> Result<Option<E>, DomainError> {
        let schema = E::schema();
        let pk = schema
            .primary_key()
            .ok_or_else(|| DomainError::Schema(format!("{} has no primary key", E::TABLE)))?;
        let filter = Filter::new().where_eq(&pk.name, id);
        self.find_one::<E>(&filter).await
    }

    async fn find_one<E: Entity>(&self, filter: &Filter) -> Result<Option<E>, DomainError> {
        let mut rows = self.find_records(E::TABLE, filter, Some(1)).await?;
        match rows.pop() {
            Some(record) => Ok(Some(E::from_record(record)?)),
            None => Ok(None),
        }
    }

    async fn find_all<E: Entity>(&self, filter: &Filter) -> Result<Vec<E>, DomainError> {
        let rows = self.find_records(E::TABLE, filter, None).await?;
        rows.into_iter().map(E::from_record).collect()
    }

    /// Returns true if a row was removed.
    async fn delete<E: Entity>(&self, id: &str) -> Result<bool, DomainError> {
        Ok(self.delete_record(E::TABLE, id).await? > 0)
    }
}

impl<S: ModelStore + ?Sized> ModelStoreExt for S {}
