//! SQL dialects
//!
//! MySQL and PostgreSQL share one logical schema (see [`crate::schema`]) and
//! differ only in:
//!
//! | | identity column | insert-or-skip |
//! |---|---|---|
//! | MySQL | `INT AUTO_INCREMENT PRIMARY KEY` | `INSERT IGNORE INTO ...` |
//! | PostgreSQL | `SERIAL PRIMARY KEY` | `INSERT ... ON CONFLICT (pk) DO NOTHING` |
//!
//! plus the bind placeholder syntax (`?` vs `$n`).

use serde::{Deserialize, Serialize};

use crate::schema::{ColumnType, SqlValue, TableDef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    MySql,
    Postgres,
}

/// What a statement does, so in-process targets can act on it without SQL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    CreateTable,
    /// Insert one row, skipping it when the primary key already exists
    Insert,
    /// Check whether a primary key exists
    Lookup,
}

/// Rendered SQL plus its bind parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub table: &'static TableDef,
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Dialect {
    pub const ALL: [Dialect; 2] = [Dialect::MySql, Dialect::Postgres];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::MySql => "mysql",
            Dialect::Postgres => "postgres",
        }
    }

    /// Declaration of the primary key column
    pub fn identity_column(&self) -> &'static str {
        match self {
            Dialect::MySql => "INT AUTO_INCREMENT PRIMARY KEY",
            Dialect::Postgres => "SERIAL PRIMARY KEY",
        }
    }

    pub fn column_type(&self, ty: ColumnType) -> String {
        match ty {
            ColumnType::Int => "INT".to_string(),
            ColumnType::VarChar(len) => format!("VARCHAR({})", len),
            ColumnType::Decimal { precision, scale } => format!("DECIMAL({}, {})", precision, scale),
            ColumnType::Date => "DATE".to_string(),
        }
    }

    /// Bind placeholder for the 1-based parameter `position`
    pub fn placeholder(&self, position: usize) -> String {
        match self {
            Dialect::MySql => "?".to_string(),
            Dialect::Postgres => format!("${}", position),
        }
    }

    fn placeholders(&self, count: usize) -> String {
        (1..=count)
            .map(|position| self.placeholder(position))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn create_table_sql(&self, table: &TableDef) -> String {
        let mut lines = Vec::with_capacity(table.columns.len() + 1);

        for (position, column) in table.columns.iter().enumerate() {
            let declaration = if position == 0 {
                self.identity_column().to_string()
            } else {
                self.column_type(column.ty)
            };
            lines.push(format!("    {} {}", column.name, declaration));
        }

        for (position, fk) in table.foreign_keys() {
            lines.push(format!(
                "    FOREIGN KEY ({}) REFERENCES {}({})",
                table.columns[position].name, fk.table, fk.column
            ));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
            table.name,
            lines.join(",\n")
        )
    }

    pub fn insert_sql(&self, table: &TableDef) -> String {
        let columns = table.column_names().join(", ");
        let values = self.placeholders(table.columns.len());

        match self {
            Dialect::MySql => format!(
                "INSERT IGNORE INTO {} ({}) VALUES ({})",
                table.name, columns, values
            ),
            Dialect::Postgres => format!(
                "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO NOTHING",
                table.name,
                columns,
                values,
                table.primary_key().name
            ),
        }
    }

    pub fn lookup_sql(&self, table: &TableDef) -> String {
        format!(
            "SELECT 1 FROM {} WHERE {} = {}",
            table.name,
            table.primary_key().name,
            self.placeholder(1)
        )
    }

    pub fn create_table(&self, table: &'static TableDef) -> Statement {
        Statement {
            kind: StatementKind::CreateTable,
            table,
            sql: self.create_table_sql(table),
            params: Vec::new(),
        }
    }

    pub fn insert(&self, table: &'static TableDef, params: Vec<SqlValue>) -> Statement {
        Statement {
            kind: StatementKind::Insert,
            table,
            sql: self.insert_sql(table),
            params,
        }
    }

    pub fn lookup(&self, table: &'static TableDef, key: i32) -> Statement {
        Statement {
            kind: StatementKind::Lookup,
            table,
            sql: self.lookup_sql(table),
            params: vec![SqlValue::Int(key)],
        }
    }

    /// Full DDL script for every table, in dependency order
    pub fn schema_script(&self) -> String {
        crate::schema::TABLES
            .iter()
            .map(|table| format!("{};\n", self.create_table_sql(table)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            other => Err(format!("Unknown dialect '{}' (expected mysql or postgres)", other)),
        }
    }
}
