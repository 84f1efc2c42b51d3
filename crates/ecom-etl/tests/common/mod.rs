//! Common test utilities for ecom-etl integration tests
//!
//! - document fixtures under `tests/fixtures/`
//! - [`TrackingConnector`]: an in-memory target that records how its
//!   connections were finished and can be told to fail at a given step

#![allow(dead_code)]

use async_trait::async_trait;
use ecom_etl::dialect::{Dialect, Statement, StatementKind};
use ecom_etl::target::{Connector, MemoryConnector, TargetConnection, TargetError};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Initialize tracing for tests (ignores repeated initialization)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ecom_etl=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Path of a checked-in fixture document
pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Write a document into `dir` and return its path
pub fn write_document(dir: &Path, name: &str, json: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, json).expect("Failed to write test document");
    path
}

/// Step at which a [`TrackingConnector`] connection fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    Connect,
    /// First statement of this kind on this table
    Statement(StatementKind, &'static str),
    Commit,
}

/// How connections were finished
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Lifecycle {
    pub connects: usize,
    pub commits: usize,
    pub rollbacks: usize,
    pub closes: usize,
}

/// Clones share the store and the lifecycle counters
#[derive(Clone)]
pub struct TrackingConnector {
    inner: MemoryConnector,
    fail_at: Option<FailPoint>,
    lifecycle: Arc<Mutex<Lifecycle>>,
}

impl TrackingConnector {
    pub fn new(name: &str, dialect: Dialect) -> Self {
        Self {
            inner: MemoryConnector::new(name, dialect),
            fail_at: None,
            lifecycle: Arc::default(),
        }
    }

    pub fn failing_at(name: &str, dialect: Dialect, fail_at: FailPoint) -> Self {
        Self {
            fail_at: Some(fail_at),
            ..Self::new(name, dialect)
        }
    }

    pub fn memory(&self) -> &MemoryConnector {
        &self.inner
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for TrackingConnector {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    async fn connect(&self) -> Result<Box<dyn TargetConnection>, TargetError> {
        if self.fail_at == Some(FailPoint::Connect) {
            return Err(TargetError::Store("connection refused".to_string()));
        }
        let inner = self.inner.connect().await?;
        self.lifecycle.lock().unwrap().connects += 1;

        Ok(Box::new(TrackingConnection {
            inner,
            fail_at: self.fail_at,
            lifecycle: Arc::clone(&self.lifecycle),
        }))
    }
}

struct TrackingConnection {
    inner: Box<dyn TargetConnection>,
    fail_at: Option<FailPoint>,
    lifecycle: Arc<Mutex<Lifecycle>>,
}

#[async_trait]
impl TargetConnection for TrackingConnection {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    async fn execute(&mut self, statement: &Statement) -> Result<u64, TargetError> {
        if self.fail_at == Some(FailPoint::Statement(statement.kind, statement.table.name)) {
            return Err(TargetError::Store(format!("injected failure on {}", statement.table.name)));
        }
        self.inner.execute(statement).await
    }

    async fn exists(&mut self, statement: &Statement) -> Result<bool, TargetError> {
        self.inner.exists(statement).await
    }

    async fn commit(&mut self) -> Result<(), TargetError> {
        if self.fail_at == Some(FailPoint::Commit) {
            return Err(TargetError::Store("injected commit failure".to_string()));
        }
        self.inner.commit().await?;
        self.lifecycle.lock().unwrap().commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), TargetError> {
        self.lifecycle.lock().unwrap().rollbacks += 1;
        self.inner.rollback().await
    }

    async fn close(&mut self) -> Result<(), TargetError> {
        self.lifecycle.lock().unwrap().closes += 1;
        self.inner.close().await
    }
}
