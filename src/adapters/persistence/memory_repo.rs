//! In-process model store. Implements ModelStore over per-table vectors.
//!
//! Used by tests and tooling that need the store contract without a database file.
//! Foreign keys are not enforced here.

use crate::domain::{DomainError, Record, Registry, TableSchema};
use crate::ports::{Filter, ModelStore};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// Raised for a second row with an existing primary key.
#[derive(Error, Debug)]
#[error("duplicate primary key {id} in {table}")]
pub struct DuplicateKey {
    pub table: String,
    pub id: String,
}

pub struct MemoryStore {
    registry: Registry,
    tables: RwLock<HashMap<String, Vec<Record>>>,
}

impl MemoryStore {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            tables: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record restricted to the table's columns, missing ones as null.
    fn shape(schema: &TableSchema, record: &Record) -> Record {
        schema
            .columns
            .iter()
            .map(|c| {
                let value = record.get(&c.name).cloned().unwrap_or(Value::Null);
                (c.name.clone(), value)
            })
            .collect()
    }

    fn key_of(schema: &TableSchema, record: &Record) -> Result<(String, String), DomainError> {
        let pk = schema
            .primary_key()
            .ok_or_else(|| DomainError::Schema(format!("{} has no primary key", schema.table)))?;
        match record.get(&pk.name) {
            Some(Value::String(id)) => Ok((pk.name.clone(), id.clone())),
            _ => Err(DomainError::InvalidRecord(format!(
                "{} record has no {}",
                schema.table, pk.name
            ))),
        }
    }
}

#[async_trait::async_trait]
impl ModelStore for MemoryStore {
    async fn insert_record(&self, table: &str, record: &Record) -> Result<(), DomainError> {
        let schema = self.registry.schema(table)?;
        let (pk, id) = Self::key_of(schema, record)?;
        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();
        if rows.iter().any(|r| r.get(&pk) == Some(&Value::String(id.clone()))) {
            return Err(DomainError::store(DuplicateKey {
                table: table.to_string(),
                id,
            }));
        }
        rows.push(Self::shape(schema, record));
        debug!(table, id = %id, "row inserted");
        Ok(())
    }

    async fn update_record(&self, table: &str, record: &Record) -> Result<u64, DomainError> {
        let schema = self.registry.schema(table)?;
        let (pk, id) = Self::key_of(schema, record)?;
        let mut tables = self.tables.write().await;
        let Some(rows) = tables.get_mut(table) else {
            return Ok(0);
        };
        match rows
            .iter_mut()
            .find(|r| r.get(&pk) == Some(&Value::String(id.clone())))
        {
            Some(row) => {
                *row = Self::shape(schema, record);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_record(&self, table: &str, id: &str) -> Result<u64, DomainError> {
        let schema = self.registry.schema(table)?;
        let pk = schema
            .primary_key()
            .ok_or_else(|| DomainError::Schema(format!("{table} has no primary key")))?;
        let mut tables = self.tables.write().await;
        let Some(rows) = tables.get_mut(table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|r| r.get(&pk.name).and_then(Value::as_str) != Some(id));
        Ok((before - rows.len()) as u64)
    }

    async fn find_records(
        &self,
        table: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<Record>, DomainError> {
        let schema = self.registry.schema(table)?;
        if let Some((name, _)) = filter
            .conditions()
            .iter()
            .find(|(name, _)| !schema.has_column(name))
        {
            return Err(DomainError::Schema(format!(
                "unknown column {name} in filter on {table}"
            )));
        }
        let tables = self.tables.read().await;
        let rows = tables.get(table).map(Vec::as_slice).unwrap_or_default();
        Ok(rows
            .iter()
            .filter(|r| filter.matches(r))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    fn table_names(&self) -> Vec<String> {
        self.registry.table_names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Client, Entity};
    use crate::ports::ModelStoreExt;

    fn store() -> MemoryStore {
        MemoryStore::new(Registry::with_models().unwrap())
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let store = store();
        let client = Client::new(Some("rig-01"), "10.0.0.4", true);
        store.insert(&client).await.unwrap();
        let err = store.insert(&client).await.unwrap_err();
        assert!(matches!(err, DomainError::Store(_)));
        assert!(err.to_string().contains(&client.id));
    }

    #[tokio::test]
    async fn save_requires_existing_row() {
        let store = store();
        let mut client = Client::new(Some("rig-01"), "10.0.0.4", true);
        let err = store.save(&mut client).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { entity: "Client", .. }));

        store.insert(&client).await.unwrap();
        client.active_jobs = 2;
        store.save(&mut client).await.unwrap();
        let loaded: Client = store.get(&client.id).await.unwrap().unwrap();
        assert_eq!(loaded.active_jobs, 2);
    }

    #[tokio::test]
    async fn filters_and_limits() {
        let store = store();
        for (host, daemon) in [("a", true), ("b", false), ("c", true)] {
            store
                .insert(&Client::new(Some(host), "10.0.0.1", daemon))
                .await
                .unwrap();
        }
        let daemons: Vec<Client> = store
            .find_all(&Filter::new().where_eq("daemon", true))
            .await
            .unwrap();
        assert_eq!(daemons.len(), 2);
        assert_eq!(daemons[0].hostname.as_deref(), Some("a"));

        let first = store
            .find_records(Client::TABLE, &Filter::new(), Some(1))
            .await
            .unwrap();
        assert_eq!(first.len(), 1);

        assert!(store
            .find_records(Client::TABLE, &Filter::new().where_eq("colour", "red"), None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn float_columns_match_integer_filters() {
        let store = store();
        let mut client = Client::new(Some("rig-01"), "10.0.0.4", true);
        client.total_duration = 12.0;
        store.insert(&client).await.unwrap();

        let found: Vec<Client> = store
            .find_all(&Filter::new().where_eq("total_duration", 12))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, client.id);
    }

    #[tokio::test]
    async fn delete_reports_removal() {
        let store = store();
        let client = Client::new(None, "10.0.0.4", true);
        store.insert(&client).await.unwrap();
        assert!(store.delete::<Client>(&client.id).await.unwrap());
        assert!(!store.delete::<Client>(&client.id).await.unwrap());
        assert!(store.get::<Client>(&client.id).await.unwrap().is_none());
    }
}
