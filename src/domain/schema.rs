//! Table descriptions and the explicit model registry.
//!
//! A `Registry` is built once at startup and handed by reference to whatever
//! maps entities onto a store. Nothing registers itself implicitly.

use crate::domain::errors::DomainError;
use crate::domain::record::Entity;
use crate::domain::{Client, Device, Job, Run};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Storage type of a column. Mapped onto SQLite affinities by [`ColumnType::sql_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    Integer,
    BigInteger,
    Float,
    Boolean,
    /// Timezone-aware instant, stored as RFC 3339 text in UTC.
    DateTime,
    /// Arbitrary JSON document, stored as text.
    Json,
}

impl ColumnType {
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Text | ColumnType::DateTime | ColumnType::Json => "TEXT",
            ColumnType::Integer | ColumnType::BigInteger | ColumnType::Boolean => "INTEGER",
            ColumnType::Float => "REAL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<ForeignKey>,
}

impl Column {
    /// Non-null column of the given type.
    pub fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
            primary_key: false,
            references: None,
        }
    }

    pub fn text(name: &str) -> Self {
        Self::new(name, ColumnType::Text)
    }

    pub fn integer(name: &str) -> Self {
        Self::new(name, ColumnType::Integer)
    }

    pub fn big_integer(name: &str) -> Self {
        Self::new(name, ColumnType::BigInteger)
    }

    pub fn float(name: &str) -> Self {
        Self::new(name, ColumnType::Float)
    }

    pub fn boolean(name: &str) -> Self {
        Self::new(name, ColumnType::Boolean)
    }

    pub fn datetime(name: &str) -> Self {
        Self::new(name, ColumnType::DateTime)
    }

    pub fn json(name: &str) -> Self {
        Self::new(name, ColumnType::Json)
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn references(mut self, table: &str, column: &str) -> Self {
        self.references = Some(ForeignKey {
            table: table.into(),
            column: column.into(),
        });
        self
    }

    fn definition(&self) -> String {
        let mut def = format!("{} {}", self.name, self.column_type.sql_type());
        if self.primary_key {
            def.push_str(" PRIMARY KEY");
        } else if !self.nullable {
            def.push_str(" NOT NULL");
        }
        if let Some(fk) = &self.references {
            def.push_str(&format!(" REFERENCES {}({})", fk.table, fk.column));
        }
        def
    }
}

/// Row shape of one entity's table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Entity type name, e.g. `Client`.
    pub entity: String,
    /// Table name, e.g. `clients`.
    pub table: String,
    pub columns: Vec<Column>,
}

impl TableSchema {
    pub fn new(entity: &str, table: &str, columns: Vec<Column>) -> Self {
        Self {
            entity: entity.into(),
            table: table.into(),
            columns,
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// The primary-key column. Every registered table has exactly one.
    pub fn primary_key(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.primary_key)
    }

    /// `CREATE TABLE IF NOT EXISTS` statement describing this table.
    pub fn create_table_sql(&self) -> String {
        let cols: Vec<String> = self.columns.iter().map(Column::definition).collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            self.table,
            cols.join(",\n    ")
        )
    }
}

/// Table name -> schema, in registration order.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    tables: Vec<TableSchema>,
    index: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every shared model, ordered so referenced tables come first.
    pub fn with_models() -> Result<Self, DomainError> {
        let mut registry = Self::new();
        registry
            .register::<Device>()?
            .register::<Client>()?
            .register::<Job>()?
            .register::<Run>()?;
        Ok(registry)
    }

    pub fn register<E: Entity>(&mut self) -> Result<&mut Self, DomainError> {
        self.register_schema(E::schema())
    }

    /// Add a table. Foreign keys must point at a table already registered.
    pub fn register_schema(&mut self, schema: TableSchema) -> Result<&mut Self, DomainError> {
        if self.index.contains_key(&schema.table) {
            return Err(DomainError::Schema(format!(
                "table {} registered twice",
                schema.table
            )));
        }
        let pk_count = schema.columns.iter().filter(|c| c.primary_key).count();
        if pk_count != 1 {
            return Err(DomainError::Schema(format!(
                "table {} must have exactly one primary key (found {})",
                schema.table, pk_count
            )));
        }
        for column in &schema.columns {
            let Some(fk) = &column.references else {
                continue;
            };
            let target = self.get(&fk.table).ok_or_else(|| {
                DomainError::Schema(format!(
                    "{}.{} references unregistered table {}",
                    schema.table, column.name, fk.table
                ))
            })?;
            if !target.has_column(&fk.column) {
                return Err(DomainError::Schema(format!(
                    "{}.{} references unknown column {}.{}",
                    schema.table, column.name, fk.table, fk.column
                )));
            }
        }
        self.index.insert(schema.table.clone(), self.tables.len());
        self.tables.push(schema);
        Ok(self)
    }

    pub fn get(&self, table: &str) -> Option<&TableSchema> {
        self.index.get(table).map(|&i| &self.tables[i])
    }

    /// Like [`Registry::get`] but an unknown table is a schema error.
    pub fn schema(&self, table: &str) -> Result<&TableSchema, DomainError> {
        self.get(table)
            .ok_or_else(|| DomainError::Schema(format!("unknown table {table}")))
    }

    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.table.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// DDL for every table, in registration order.
    pub fn create_all_sql(&self) -> Vec<String> {
        self.tables.iter().map(TableSchema::create_table_sql).collect()
    }
}
