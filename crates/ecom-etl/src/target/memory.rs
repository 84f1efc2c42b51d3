//! In-process target
//!
//! Interprets [`Statement`]s structurally instead of parsing SQL. Primary and
//! foreign keys are enforced the way each dialect's insert-or-skip statement
//! behaves: PostgreSQL reports a foreign key failure as an error, while
//! MySQL's `INSERT IGNORE` downgrades it to "0 rows affected". Values that
//! do not fit their column are rejected on both dialects.
//!
//! Used for `--dry-run` and by the pipeline tests.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::{Connector, TargetConnection, TargetError};
use crate::dialect::{Dialect, Statement, StatementKind};
use crate::schema::{table_by_name, SqlValue, TableDef};

/// Committed contents of an in-process target
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: BTreeMap<&'static str, BTreeMap<i32, Vec<SqlValue>>>,
    /// Every inserted row as `(table, primary key)`, in insertion order
    journal: Vec<(&'static str, i32)>,
}

impl MemoryStore {
    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables.get(table).map(BTreeMap::len).unwrap_or(0)
    }

    /// Rows of a table ordered by primary key
    pub fn rows(&self, table: &str) -> Vec<Vec<SqlValue>> {
        self.tables
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, table: &str, key: i32) -> bool {
        self.tables
            .get(table)
            .is_some_and(|rows| rows.contains_key(&key))
    }

    pub fn journal(&self) -> &[(&'static str, i32)] {
        &self.journal
    }

    fn insert(&mut self, dialect: Dialect, table: &'static TableDef, params: &[SqlValue]) -> Result<u64, TargetError> {
        if params.len() != table.columns.len() {
            return Err(TargetError::Store(format!(
                "{} expects {} values, got {}",
                table.name,
                table.columns.len(),
                params.len()
            )));
        }
        for (column, value) in table.columns.iter().zip(params) {
            column
                .ty
                .check(value)
                .map_err(|reason| TargetError::Store(format!("{}.{}: {}", table.name, column.name, reason)))?;
        }
        let key = int_param(table, params, 0)?;

        if !self.has_table(table.name) {
            return Err(TargetError::Store(format!("table {} does not exist", table.name)));
        }
        if self.contains(table.name, key) {
            return Ok(0);
        }

        for (position, fk) in table.foreign_keys() {
            let value = int_param(table, params, position)?;
            let referenced = table_by_name(fk.table).map(|t| t.name).unwrap_or(fk.table);
            if !self.contains(referenced, value) {
                return match dialect {
                    Dialect::MySql => Ok(0),
                    Dialect::Postgres => Err(TargetError::Constraint(format!(
                        "{}.{} = {} is not present in {}",
                        table.name, table.columns[position].name, value, fk.table
                    ))),
                };
            }
        }

        self.tables
            .entry(table.name)
            .or_default()
            .insert(key, params.to_vec());
        self.journal.push((table.name, key));
        Ok(1)
    }
}

fn int_param(table: &TableDef, params: &[SqlValue], position: usize) -> Result<i32, TargetError> {
    match params.get(position) {
        Some(SqlValue::Int(v)) => Ok(*v),
        other => Err(TargetError::Store(format!(
            "{}.{} must be an integer, got {:?}",
            table.name,
            table.columns.get(position).map(|c| c.name).unwrap_or("?"),
            other
        ))),
    }
}

type SharedStore = Arc<Mutex<MemoryStore>>;

fn lock(store: &SharedStore) -> Result<MutexGuard<'_, MemoryStore>, TargetError> {
    store
        .lock()
        .map_err(|_| TargetError::Store("store lock poisoned".to_string()))
}

/// Opens [`MemoryTarget`]s over one shared store
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    name: String,
    dialect: Dialect,
    store: SharedStore,
    reachable: bool,
}

impl MemoryConnector {
    pub fn new(name: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            name: name.into(),
            dialect,
            store: SharedStore::default(),
            reachable: true,
        }
    }

    /// A connector whose `connect` always fails
    pub fn unreachable(name: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            reachable: false,
            ..Self::new(name, dialect)
        }
    }

    /// Copy of the committed contents
    pub fn snapshot(&self) -> Result<MemoryStore, TargetError> {
        Ok(lock(&self.store)?.clone())
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn connect(&self) -> Result<Box<dyn TargetConnection>, TargetError> {
        if !self.reachable {
            return Err(TargetError::Store(format!("{} is unreachable", self.name)));
        }
        let pending = lock(&self.store)?.clone();
        debug!(target_name = %self.name, "Opened in-memory transaction");

        Ok(Box::new(MemoryTarget {
            name: self.name.clone(),
            dialect: self.dialect,
            store: Arc::clone(&self.store),
            pending: Some(pending),
        }))
    }
}

/// Connection to an in-process store
///
/// Writes go to a private copy that replaces the shared store on commit.
pub struct MemoryTarget {
    name: String,
    dialect: Dialect,
    store: SharedStore,
    pending: Option<MemoryStore>,
}

impl MemoryTarget {
    fn pending(&mut self) -> Result<&mut MemoryStore, TargetError> {
        self.pending.as_mut().ok_or(TargetError::Closed)
    }
}

#[async_trait]
impl TargetConnection for MemoryTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn execute(&mut self, statement: &Statement) -> Result<u64, TargetError> {
        let dialect = self.dialect;
        let pending = self.pending()?;

        match statement.kind {
            StatementKind::CreateTable => {
                pending.tables.entry(statement.table.name).or_default();
                Ok(0)
            },
            StatementKind::Insert => pending.insert(dialect, statement.table, &statement.params),
            StatementKind::Lookup => Err(TargetError::Store(
                "lookup statements return rows; use exists".to_string(),
            )),
        }
    }

    async fn exists(&mut self, statement: &Statement) -> Result<bool, TargetError> {
        let table = statement.table;
        let pending = self.pending()?;
        let key = int_param(table, &statement.params, 0)?;
        Ok(pending.contains(table.name, key))
    }

    async fn commit(&mut self) -> Result<(), TargetError> {
        let pending = self.pending.take().ok_or(TargetError::Closed)?;
        *lock(&self.store)? = pending;
        debug!(target_name = %self.name, "Committed in-memory transaction");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), TargetError> {
        if self.pending.take().is_some() {
            debug!(target_name = %self.name, "Discarded in-memory transaction");
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TargetError> {
        self.rollback().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::schema::{CATEGORY, PRODUCT, TABLES};
    use sqlx::types::BigDecimal;
    use std::str::FromStr;

    fn product_row(product_id: i32, category_id: i32) -> Vec<SqlValue> {
        vec![
            SqlValue::Int(product_id),
            SqlValue::Text("Laptop".to_string()),
            SqlValue::Int(category_id),
            SqlValue::Decimal(BigDecimal::from_str("999.99").unwrap()),
            SqlValue::Int(5),
        ]
    }

    async fn connect_with_schema(connector: &MemoryConnector) -> Box<dyn TargetConnection> {
        let mut conn = connector.connect().await.unwrap();
        for table in TABLES {
            conn.execute(&connector.dialect().create_table(table)).await.unwrap();
        }
        conn
    }

    #[tokio::test]
    async fn test_duplicate_key_is_skipped() {
        let connector = MemoryConnector::new("pg", Dialect::Postgres);
        let mut conn = connect_with_schema(&connector).await;
        let insert = Dialect::Postgres.insert(
            &CATEGORY,
            vec![SqlValue::Int(10), SqlValue::Text("Electronics".to_string())],
        );

        assert_eq!(conn.execute(&insert).await.unwrap(), 1);
        assert_eq!(conn.execute(&insert).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_parent_depends_on_dialect() {
        let postgres = MemoryConnector::new("pg", Dialect::Postgres);
        let mut conn = connect_with_schema(&postgres).await;
        let result = conn
            .execute(&Dialect::Postgres.insert(&PRODUCT, product_row(1, 99)))
            .await;
        assert!(matches!(result, Err(TargetError::Constraint(_))));

        let mysql = MemoryConnector::new("my", Dialect::MySql);
        let mut conn = connect_with_schema(&mysql).await;
        let affected = conn
            .execute(&Dialect::MySql.insert(&PRODUCT, product_row(1, 99)))
            .await
            .unwrap();
        assert_eq!(affected, 0);
        assert!(!conn.exists(&Dialect::MySql.lookup(&PRODUCT, 1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_uncommitted_work_is_discarded_on_close() {
        let connector = MemoryConnector::new("pg", Dialect::Postgres);
        let mut conn = connect_with_schema(&connector).await;
        conn.close().await.unwrap();

        assert!(!connector.snapshot().unwrap().has_table("Category"));
        assert!(matches!(
            conn.execute(&Dialect::Postgres.create_table(&CATEGORY)).await,
            Err(TargetError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_commit_publishes_rows() {
        let connector = MemoryConnector::new("pg", Dialect::Postgres);
        let mut conn = connect_with_schema(&connector).await;
        conn.execute(&Dialect::Postgres.insert(
            &CATEGORY,
            vec![SqlValue::Int(10), SqlValue::Text("Electronics".to_string())],
        ))
        .await
        .unwrap();
        conn.commit().await.unwrap();

        let store = connector.snapshot().unwrap();
        assert_eq!(store.row_count("Category"), 1);
        assert_eq!(store.journal(), &[("Category", 10)]);
    }

    #[tokio::test]
    async fn test_values_must_fit_their_columns() {
        for dialect in [Dialect::MySql, Dialect::Postgres] {
            let connector = MemoryConnector::new("store", dialect);
            let mut conn = connect_with_schema(&connector).await;

            let long_name = vec![SqlValue::Int(10), SqlValue::Text("x".repeat(256))];
            let result = conn.execute(&dialect.insert(&CATEGORY, long_name)).await;
            assert!(matches!(result, Err(TargetError::Store(ref m)) if m.contains("Category.category_name")));

            conn.execute(&dialect.insert(
                &CATEGORY,
                vec![SqlValue::Int(10), SqlValue::Text("Electronics".to_string())],
            ))
            .await
            .unwrap();
            let mut expensive = product_row(1, 10);
            expensive[3] = SqlValue::Decimal(BigDecimal::from_str("123456789").unwrap());
            let result = conn.execute(&dialect.insert(&PRODUCT, expensive)).await;
            assert!(matches!(result, Err(TargetError::Store(ref m)) if m.contains("Product.price")));
            assert!(!conn.exists(&dialect.lookup(&PRODUCT, 1)).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_unreachable_connector() {
        let connector = MemoryConnector::unreachable("down", Dialect::MySql);
        assert!(connector.connect().await.is_err());
    }
}
