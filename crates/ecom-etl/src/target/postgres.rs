// PostgreSQL target

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use tracing::{debug, info};

use super::{TargetConnection, TargetError};
use crate::config::TargetConfig;
use crate::dialect::{Dialect, Statement};
use crate::schema::SqlValue;

pub struct PostgresTarget {
    name: String,
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PostgresTarget {
    /// Open a single-connection pool and start the run's transaction
    pub async fn connect(config: &TargetConfig) -> Result<Self, TargetError> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await?;

        let tx = pool.begin().await?;
        info!(target_name = %config.name, url = %config.redacted_url(), "Connected to PostgreSQL");

        Ok(Self {
            name: config.name.clone(),
            pool,
            tx: Some(tx),
        })
    }

    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, TargetError> {
        self.tx.as_mut().ok_or(TargetError::Closed)
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[SqlValue],
) -> Query<'q, Postgres, PgArguments> {
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
impl TargetConnection for PostgresTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn execute(&mut self, statement: &Statement) -> Result<u64, TargetError> {
        let tx = self.tx()?;
        let result = bind_params(sqlx::query(&statement.sql), &statement.params)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn exists(&mut self, statement: &Statement) -> Result<bool, TargetError> {
        let tx = self.tx()?;
        let row = bind_params(sqlx::query(&statement.sql), &statement.params)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(row.is_some())
    }

    async fn commit(&mut self) -> Result<(), TargetError> {
        let tx = self.tx.take().ok_or(TargetError::Closed)?;
        tx.commit().await?;
        debug!(target_name = %self.name, "Committed transaction");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), TargetError> {
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
