// MySQL target
//
// DDL commits implicitly in MySQL and would end an open transaction, so
// `CREATE TABLE` runs on the pool before the data transaction starts. The
// transaction is opened by the first data statement.
//
// Every connection adds `NO_AUTO_VALUE_ON_ZERO` to its session `sql_mode`.
// Without it an explicit id of 0 in an `AUTO_INCREMENT` column is replaced by
// the next generated id.

use async_trait::async_trait;
use sqlx::mysql::{MySqlArguments, MySqlPoolOptions};
use sqlx::query::Query;
use sqlx::{Executor, MySql, MySqlPool, Transaction};
use std::time::Duration;
use tracing::{debug, info};

use super::{TargetConnection, TargetError};
use crate::config::TargetConfig;
use crate::dialect::{Dialect, Statement, StatementKind};
use crate::schema::SqlValue;

/// Appends to the server's mode instead of replacing it
const SESSION_SQL_MODE: &str =
    "SET SESSION sql_mode = CONCAT_WS(',', NULLIF(@@SESSION.sql_mode, ''), 'NO_AUTO_VALUE_ON_ZERO')";

pub struct MySqlTarget {
    name: String,
    pool: MySqlPool,
    tx: Option<Transaction<'static, MySql>>,
    finished: bool,
}

impl MySqlTarget {
    /// Open a single-connection pool
    pub async fn connect(config: &TargetConfig) -> Result<Self, TargetError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    conn.execute(SESSION_SQL_MODE).await?;
                    Ok(())
                })
            })
            .connect(&config.url)
            .await?;

        info!(target_name = %config.name, url = %config.redacted_url(), "Connected to MySQL");

        Ok(Self {
            name: config.name.clone(),
            pool,
            tx: None,
            finished: false,
        })
    }

    /// The run's transaction, started on first use
    async fn tx(&mut self) -> Result<&mut Transaction<'static, MySql>, TargetError> {
        if self.finished {
            return Err(TargetError::Closed);
        }
        if self.tx.is_none() {
            self.tx = Some(self.pool.begin().await?);
            debug!(target_name = %self.name, "Started transaction");
        }
        self.tx.as_mut().ok_or(TargetError::Closed)
    }
}

fn bind_params<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &[SqlValue],
) -> Query<'q, MySql, MySqlArguments> {
    for param in params {
        query = match param {
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.clone()),
            SqlValue::Decimal(v) => query.bind(v.clone()),
            SqlValue::Date(v) => query.bind(*v),
        };
    }
    query
}

#[async_trait]
impl TargetConnection for MySqlTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    async fn execute(&mut self, statement: &Statement) -> Result<u64, TargetError> {
        if statement.kind == StatementKind::CreateTable && self.tx.is_none() && !self.finished {
            let result = sqlx::query(&statement.sql).execute(&self.pool).await?;
            return Ok(result.rows_affected());
        }

        let tx = self.tx().await?;
        let result = bind_params(sqlx::query(&statement.sql), &statement.params)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn exists(&mut self, statement: &Statement) -> Result<bool, TargetError> {
        let tx = self.tx().await?;
        let row = bind_params(sqlx::query(&statement.sql), &statement.params)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(row.is_some())
    }

    async fn commit(&mut self) -> Result<(), TargetError> {
        if self.finished {
            return Err(TargetError::Closed);
        }
        self.finished = true;
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
            debug!(target_name = %self.name, "Committed transaction");
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), TargetError> {
        self.finished = true;
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
            debug!(target_name = %self.name, "Rolled back transaction");
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TargetError> {
        let rollback = self.rollback().await;
        self.pool.close().await;
        debug!(target_name = %self.name, "Closed connection pool");
        rollback
    }
}
