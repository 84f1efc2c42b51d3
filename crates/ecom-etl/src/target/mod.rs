//! Target connections
//!
//! A target is one relational store the batch is written to. The pipeline
//! talks to targets only through [`Connector`] and [`TargetConnection`], so
//! the same orchestration runs against MySQL, PostgreSQL, or the in-process
//! [`memory`] store.
//!
//! Every connection writes its rows in one transaction that `commit` or
//! `rollback` ends; `close` releases the underlying pool.

pub mod memory;
pub mod mysql;
pub mod postgres;

use async_trait::async_trait;
use sqlx::error::ErrorKind;
use thiserror::Error;

use crate::config::TargetConfig;
use crate::dialect::{Dialect, Statement};

pub use memory::{MemoryConnector, MemoryStore, MemoryTarget};
pub use mysql::MySqlTarget;
pub use postgres::PostgresTarget;

/// Errors reported by a target connection
#[derive(Error, Debug)]
pub enum TargetError {
    /// The store rejected a row (foreign key, not-null, unique, check)
    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),

    /// Errors raised by in-process stores
    #[error("store error: {0}")]
    Store(String),

    #[error("transaction already finished or connection closed")]
    Closed,
}

impl From<sqlx::Error> for TargetError {
    fn from(err: sqlx::Error) -> Self {
        let constraint = match &err {
            sqlx::Error::Database(db) => matches!(
                db.kind(),
                ErrorKind::ForeignKeyViolation
                    | ErrorKind::UniqueViolation
                    | ErrorKind::NotNullViolation
                    | ErrorKind::CheckViolation
            )
            .then(|| db.message().to_string()),
            _ => None,
        };

        match constraint {
            Some(message) => TargetError::Constraint(message),
            None => TargetError::Database(err),
        }
    }
}

/// An open connection to one target, owning a single transaction
#[async_trait]
pub trait TargetConnection: Send {
    fn name(&self) -> &str;

    fn dialect(&self) -> Dialect;

    /// Run a statement, returning the number of affected rows
    async fn execute(&mut self, statement: &Statement) -> Result<u64, TargetError>;

    /// Run a lookup statement, returning whether it matched a row
    async fn exists(&mut self, statement: &Statement) -> Result<bool, TargetError>;

    async fn commit(&mut self) -> Result<(), TargetError>;

    async fn rollback(&mut self) -> Result<(), TargetError>;

    /// Release the connection; uncommitted work is discarded
    async fn close(&mut self) -> Result<(), TargetError>;
}

/// Opens connections to one target
#[async_trait]
pub trait Connector: Send + Sync {
    fn name(&self) -> &str;

    fn dialect(&self) -> Dialect;

    async fn connect(&self) -> Result<Box<dyn TargetConnection>, TargetError>;
}

/// Connector for a real MySQL or PostgreSQL server
#[derive(Debug, Clone)]
pub struct SqlxConnector {
    config: TargetConfig,
}

impl SqlxConnector {
    pub fn new(config: TargetConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for SqlxConnector {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn dialect(&self) -> Dialect {
        self.config.dialect
    }

    async fn connect(&self) -> Result<Box<dyn TargetConnection>, TargetError> {
        match self.config.dialect {
            Dialect::MySql => Ok(Box::new(MySqlTarget::connect(&self.config).await?)),
            Dialect::Postgres => Ok(Box::new(PostgresTarget::connect(&self.config).await?)),
        }
    }
}
