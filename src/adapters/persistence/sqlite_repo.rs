//! SQLite-backed model store via libsql. Implements ModelStore for every registered table.
//!
//! One database file holds all tables. Column values are mapped by declared type:
//! booleans as 0/1, datetimes as RFC 3339 text, JSON documents as text.

use crate::domain::{Column, ColumnType, DomainError, Record, Registry, TableSchema};
use crate::ports::{Filter, ModelStore};
use libsql::params::Params;
use libsql::{Connection, Database};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// SQLite store. Safe to share via Arc; each call opens its own connection.
pub struct SqliteRepo {
    db: Database,
    db_path: PathBuf,
    registry: Registry,
}

impl SqliteRepo {
    /// Open (or create) the database file. Tables are not created; see [`SqliteRepo::create_all`].
    ///
    /// Sets WAL mode and synchronous=NORMAL.
    pub async fn connect(path: impl AsRef<Path>, registry: Registry) -> Result<Self, DomainError> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(DomainError::store)?;
        }
        let path_str = db_path.to_string_lossy();
        let db = libsql::Builder::new_local(path_str.as_ref())
            .build()
            .await
            .map_err(DomainError::store)?;
        let conn = db.connect().map_err(DomainError::store)?;

        // PRAGMA returns a row (new value); use query and consume rows (execute fails when rows are returned).
        let mut wal_rows = conn
            .query("PRAGMA journal_mode=WAL", ())
            .await
            .map_err(DomainError::store)?;
        while wal_rows.next().await.map_err(DomainError::store)?.is_some() {}
        let mut sync_rows = conn
            .query("PRAGMA synchronous=NORMAL", ())
            .await
            .map_err(DomainError::store)?;
        while sync_rows.next().await.map_err(DomainError::store)?.is_some() {}

        info!(path = %db_path.display(), tables = registry.len(), "SQLite connected with WAL mode");

        Ok(Self {
            db,
            db_path,
            registry,
        })
    }

    /// Create every registered table that does not exist yet. Existing tables are left alone.
    pub async fn create_all(&self) -> Result<(), DomainError> {
        let conn = self.conn().await?;
        for schema in self.registry.tables() {
            conn.execute(&schema.create_table_sql(), ())
                .await
                .map_err(DomainError::store)?;
            debug!(table = %schema.table, "table ensured");
        }
        info!(tables = ?self.registry.table_names(), "schema created");
        Ok(())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// New connection with foreign-key enforcement on (it is per connection in SQLite).
    async fn conn(&self) -> Result<Connection, DomainError> {
        let conn = self.db.connect().map_err(DomainError::store)?;
        conn.execute("PRAGMA foreign_keys=ON", ())
            .await
            .map_err(DomainError::store)?;
        Ok(conn)
    }

    fn primary_key(schema: &TableSchema) -> Result<&Column, DomainError> {
        schema
            .primary_key()
            .ok_or_else(|| DomainError::Schema(format!("{} has no primary key", schema.table)))
    }
}

/// JSON value -> SQLite value for a column.
fn to_sql(column: &Column, value: &Value) -> Result<libsql::Value, DomainError> {
    use libsql::Value as Sql;
    let mismatch = || {
        DomainError::InvalidRecord(format!(
            "column {} expects {:?}, got {}",
            column.name, column.column_type, value
        ))
    };
    Ok(match (column.column_type, value) {
        (_, Value::Null) => Sql::Null,
        (ColumnType::Json, v) => Sql::Text(v.to_string()),
        (ColumnType::Boolean, Value::Bool(b)) => Sql::Integer(i64::from(*b)),
        (ColumnType::Integer | ColumnType::BigInteger, Value::Number(n)) => {
            Sql::Integer(n.as_i64().ok_or_else(mismatch)?)
        }
        (ColumnType::Float, Value::Number(n)) => Sql::Real(n.as_f64().ok_or_else(mismatch)?),
        (ColumnType::Text | ColumnType::DateTime, Value::String(s)) => Sql::Text(s.clone()),
        _ => return Err(mismatch()),
    })
}

/// SQLite value -> JSON value for a column.
fn from_sql(column: &Column, value: libsql::Value) -> Result<Value, DomainError> {
    use libsql::Value as Sql;
    Ok(match (column.column_type, value) {
        (_, Sql::Null) => Value::Null,
        (ColumnType::Boolean, Sql::Integer(i)) => Value::Bool(i != 0),
        (ColumnType::Float, Sql::Integer(i)) => Value::from(i as f64),
        (_, Sql::Integer(i)) => Value::from(i),
        (_, Sql::Real(f)) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        (ColumnType::Json, Sql::Text(s)) => serde_json::from_str(&s)?,
        (_, Sql::Text(s)) => Value::String(s),
        (_, Sql::Blob(_)) => {
            return Err(DomainError::InvalidRecord(format!(
                "column {} holds a blob",
                column.name
            )))
        }
    })
}

fn id_param(id: &str) -> libsql::Value {
    libsql::Value::Text(id.to_string())
}

#[async_trait::async_trait]
impl ModelStore for SqliteRepo {
    async fn insert_record(&self, table: &str, record: &Record) -> Result<(), DomainError> {
        let schema = self.registry.schema(table)?;
        let names: Vec<&str> = schema.column_names().collect();
        let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();
        let values = schema
            .columns
            .iter()
            .map(|c| to_sql(c, record.get(&c.name).unwrap_or(&Value::Null)))
            .collect::<Result<Vec<_>, _>>()?;
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            names.join(", "),
            placeholders.join(", ")
        );
        let conn = self.conn().await?;
        conn.execute(&sql, Params::Positional(values))
            .await
            .map_err(DomainError::store)?;
        debug!(table, "row inserted");
        Ok(())
    }

    async fn update_record(&self, table: &str, record: &Record) -> Result<u64, DomainError> {
        let schema = self.registry.schema(table)?;
        let pk = Self::primary_key(schema)?;
        let id = to_sql(pk, record.get(&pk.name).unwrap_or(&Value::Null))?;

        let mut sets = Vec::new();
        let mut values = Vec::new();
        for column in schema.columns.iter().filter(|c| !c.primary_key) {
            values.push(to_sql(column, record.get(&column.name).unwrap_or(&Value::Null))?);
            sets.push(format!("{} = ?{}", column.name, values.len()));
        }
        values.push(id);
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            table,
            sets.join(", "),
            pk.name,
            values.len()
        );
        let conn = self.conn().await?;
        let affected = conn
            .execute(&sql, Params::Positional(values))
            .await
            .map_err(DomainError::store)?;
        debug!(table, affected, "row updated");
        Ok(affected)
    }

    async fn delete_record(&self, table: &str, id: &str) -> Result<u64, DomainError> {
        let schema = self.registry.schema(table)?;
        let pk = Self::primary_key(schema)?;
        let sql = format!("DELETE FROM {} WHERE {} = ?1", table, pk.name);
        let conn = self.conn().await?;
        let affected = conn
            .execute(&sql, Params::Positional(vec![id_param(id)]))
            .await
            .map_err(DomainError::store)?;
        debug!(table, id, affected, "row deleted");
        Ok(affected)
    }

    async fn find_records(
        &self,
        table: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<Record>, DomainError> {
        let schema = self.registry.schema(table)?;
        let names: Vec<&str> = schema.column_names().collect();

        let mut clauses = Vec::new();
        let mut values = Vec::new();
        for (name, value) in filter.conditions() {
            let column = schema.column(name).ok_or_else(|| {
                DomainError::Schema(format!("unknown column {name} in filter on {table}"))
            })?;
            if value.is_null() {
                clauses.push(format!("{name} IS NULL"));
            } else {
                values.push(to_sql(column, value)?);
                clauses.push(format!("{name} = ?{}", values.len()));
            }
        }

        let mut sql = format!("SELECT {} FROM {}", names.join(", "), table);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY rowid");
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let conn = self.conn().await?;
        let mut rows = conn
            .query(&sql, Params::Positional(values))
            .await
            .map_err(DomainError::store)?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await.map_err(DomainError::store)? {
            let mut record = Record::new();
            for (idx, column) in schema.columns.iter().enumerate() {
                let raw = row.get_value(idx as i32).map_err(DomainError::store)?;
                record.insert(column.name.clone(), from_sql(column, raw)?);
            }
            records.push(record);
        }
        Ok(records)
    }

    fn table_names(&self) -> Vec<String> {
        self.registry.table_names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn values_map_by_column_type() {
        let flag = Column::boolean("daemon");
        assert!(matches!(to_sql(&flag, &json!(true)), Ok(libsql::Value::Integer(1))));
        assert_eq!(from_sql(&flag, libsql::Value::Integer(0)).unwrap(), json!(false));

        let doc = Column::json("layers").nullable();
        assert!(matches!(
            to_sql(&doc, &json!([64, 32])),
            Ok(libsql::Value::Text(ref s)) if s == "[64,32]"
        ));
        assert_eq!(
            from_sql(&doc, libsql::Value::Text("[64,32]".into())).unwrap(),
            json!([64, 32])
        );
        assert!(matches!(to_sql(&doc, &Value::Null), Ok(libsql::Value::Null)));

        let real = Column::float("duration");
        assert_eq!(from_sql(&real, libsql::Value::Integer(3)).unwrap(), json!(3.0));
    }

    #[test]
    fn mismatched_value_is_invalid_record() {
        let count = Column::integer("run_number");
        assert!(matches!(
            to_sql(&count, &json!("three")),
            Err(DomainError::InvalidRecord(_))
        ));
    }
}
