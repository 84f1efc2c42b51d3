//! Idempotent row loading
//!
//! Writes a [`NormalizedBatch`] into one target in the order categories,
//! products, orders, so every referenced row is written before the rows that
//! reference it. Rows whose primary key already exists are skipped, which
//! makes re-running the same batch a no-op.
//!
//! A skipped insert is confirmed with a primary key lookup. MySQL's
//! `INSERT IGNORE` reports a foreign key failure as "0 rows affected" just like
//! a duplicate key; the lookup tells the two apart so a dangling reference is
//! surfaced as a constraint violation on both dialects.

use ecom_common::{EtlError, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::models::{NormalizedBatch, Record};
use crate::target::{TargetConnection, TargetError};

/// Per-entity write counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityStats {
    pub attempted: usize,
    pub inserted: usize,
    /// Rows whose primary key already existed
    pub skipped: usize,
}

/// Write counts for one target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub categories: EntityStats,
    pub products: EntityStats,
    pub orders: EntityStats,
}

impl LoadStats {
    pub fn inserted(&self) -> usize {
        self.categories.inserted + self.products.inserted + self.orders.inserted
    }

    pub fn skipped(&self) -> usize {
        self.categories.skipped + self.products.skipped + self.orders.skipped
    }
}

/// Write every entity of `batch` into the connection's open transaction
///
/// Stops at the first failing row. Committing or rolling back is left to the
/// caller.
pub async fn load_batch(conn: &mut dyn TargetConnection, batch: &NormalizedBatch) -> Result<LoadStats> {
    let categories = load_records(conn, &batch.categories).await?;
    let products = load_records(conn, &batch.products).await?;
    let orders = load_records(conn, &batch.orders).await?;

    Ok(LoadStats {
        categories,
        products,
        orders,
    })
}

async fn load_records<R: Record>(conn: &mut dyn TargetConnection, records: &[R]) -> Result<EntityStats> {
    let table = R::table();
    let dialect = conn.dialect();
    let target = conn.name().to_string();
    let mut stats = EntityStats::default();

    for record in records {
        stats.attempted += 1;

        let insert = dialect.insert(table, record.values());
        let affected = conn
            .execute(&insert)
            .await
            .map_err(|e| write_error(&target, table.entity, record.key_label(), e))?;

        if affected > 0 {
            stats.inserted += 1;
            continue;
        }

        let lookup = dialect.lookup(table, record.primary_key());
        let present = conn
            .exists(&lookup)
            .await
            .map_err(|e| write_error(&target, table.entity, record.key_label(), e))?;

        if !present {
            return Err(EtlError::ConstraintViolation {
                target,
                entity: table.entity.to_string(),
                key: record.key_label(),
                reason: "row was rejected without an error; a referenced row is missing".to_string(),
            });
        }

        stats.skipped += 1;
        debug!(target_name = %target, entity = table.entity, key = %record.key_label(), "Row already present, skipped");
    }

    info!(
        target_name = %target,
        entity = table.entity,
        inserted = stats.inserted,
        skipped = stats.skipped,
        "Loaded rows"
    );
    Ok(stats)
}

fn write_error(target: &str, entity: &str, key: String, err: TargetError) -> EtlError {
    match err {
        TargetError::Constraint(reason) => EtlError::ConstraintViolation {
            target: target.to_string(),
            entity: entity.to_string(),
            key,
            reason,
        },
        other => EtlError::TargetWrite {
            target: target.to_string(),
            entity: entity.to_string(),
            key,
            reason: other.to_string(),
        },
    }
}
