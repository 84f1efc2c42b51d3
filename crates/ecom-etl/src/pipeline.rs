// ETL run orchestrator
//
// Loads and normalizes the documents once, then writes the batch to each
// target in turn. Source and normalization errors abort the run before any
// target is contacted; a failing target is rolled back and recorded, and the
// remaining targets still run. Every opened connection is closed.

use ecom_common::{EtlError, Result};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::dialect::Dialect;
use crate::loader::{self, LoadStats};
use crate::models::{BatchSummary, NormalizedBatch};
use crate::normalize;
use crate::schema;
use crate::source;
use crate::target::{Connector, TargetConnection};

/// Result of writing the batch to one target
#[derive(Debug)]
pub struct TargetOutcome {
    pub target: String,
    pub dialect: Dialect,
    pub result: Result<LoadStats>,
    pub duration_seconds: f64,
}

impl TargetOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Summary of one run across all targets
#[derive(Debug)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub batch: BatchSummary,
    pub outcomes: Vec<TargetOutcome>,
}

#[derive(Serialize)]
struct OutcomeView<'a> {
    target: &'a str,
    dialect: Dialect,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<&'a LoadStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    duration_seconds: f64,
}

#[derive(Serialize)]
struct ReportView<'a> {
    run_id: Uuid,
    success: bool,
    batch: &'a BatchSummary,
    targets: Vec<OutcomeView<'a>>,
}

impl PipelineReport {
    /// True when every target was written and committed
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(TargetOutcome::is_success)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &EtlError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.target.as_str(), e)))
    }

    pub fn outcome(&self, target: &str) -> Option<&TargetOutcome> {
        self.outcomes.iter().find(|o| o.target == target)
    }

    pub fn to_json(&self) -> Result<String> {
        let view = ReportView {
            run_id: self.run_id,
            success: self.is_success(),
            batch: &self.batch,
            targets: self
                .outcomes
                .iter()
                .map(|o| OutcomeView {
                    target: &o.target,
                    dialect: o.dialect,
                    success: o.is_success(),
                    stats: o.result.as_ref().ok(),
                    error: o.result.as_ref().err().map(ToString::to_string),
                    duration_seconds: o.duration_seconds,
                })
                .collect(),
        };
        Ok(serde_json::to_string_pretty(&view)?)
    }
}

/// Runs the ETL for one set of inputs
pub struct Pipeline {
    run_id: Uuid,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Load `inputs`, normalize them and write the batch to every target
    pub async fn run<P: AsRef<Path>>(
        &self,
        inputs: &[P],
        connectors: &[Box<dyn Connector>],
    ) -> Result<PipelineReport> {
        let span = info_span!("etl_run", run_id = %self.run_id);

        async {
            info!(documents = inputs.len(), targets = connectors.len(), "Starting ETL run");

            // Step 1: Read documents into the uniform table
            let table = source::load_sources(inputs)?;
            if table.is_empty() {
                warn!("Source documents contain no rows; targets only get the schema");
            }

            // Step 2: Build entities; nothing has been written yet
            let batch = normalize::normalize(&table)?;
            let summary = batch.summary();
            info!(
                categories = summary.categories,
                products = summary.products,
                orders = summary.orders,
                foreign_orders = normalize::foreign_orders(&batch),
                "Batch ready"
            );

            // Step 3: Write to each target
            self.load(&batch, connectors).await
        }
        .instrument(span)
        .await
    }

    /// Write an already normalized batch to every target, one after another
    pub async fn load(
        &self,
        batch: &NormalizedBatch,
        connectors: &[Box<dyn Connector>],
    ) -> Result<PipelineReport> {
        let mut outcomes = Vec::with_capacity(connectors.len());

        for connector in connectors {
            let span = info_span!(
                "target",
                run_id = %self.run_id,
                target_name = connector.name(),
                dialect = %connector.dialect()
            );
            let outcome = run_target(connector.as_ref(), batch).instrument(span).await;
            outcomes.push(outcome);
        }

        let report = PipelineReport {
            run_id: self.run_id,
            batch: batch.summary(),
            outcomes,
        };

        let failed = report.failures().count();
        if failed == 0 {
            info!(targets = report.outcomes.len(), "ETL run complete");
        } else {
            warn!(targets = report.outcomes.len(), failed, "ETL run finished with failures");
        }

        Ok(report)
    }
}

async fn run_target(connector: &dyn Connector, batch: &NormalizedBatch) -> TargetOutcome {
    let start_time = Instant::now();
    let target = connector.name().to_string();

    let result = match connector.connect().await {
        Ok(mut conn) => {
            let result = write_target(conn.as_mut(), batch).await;

            if result.is_err() {
                if let Err(e) = conn.rollback().await {
                    warn!(target_name = %target, error = %e, "Rollback failed");
                }
            }
            if let Err(e) = conn.close().await {
                warn!(target_name = %target, error = %e, "Failed to release connection");
            }

            result
        },
        Err(e) => Err(EtlError::TargetConnection {
            target: target.clone(),
            reason: e.to_string(),
        }),
    };

    let duration = start_time.elapsed();
    match &result {
        Ok(stats) => info!(
            target_name = %target,
            inserted = stats.inserted(),
            skipped = stats.skipped(),
            "Target loaded in {:.2}s",
            duration.as_secs_f64()
        ),
        Err(e) => error!(target_name = %target, error = %e, "Target failed"),
    }

    TargetOutcome {
        target,
        dialect: connector.dialect(),
        result,
        duration_seconds: duration.as_secs_f64(),
    }
}

async fn write_target(conn: &mut dyn TargetConnection, batch: &NormalizedBatch) -> Result<LoadStats> {
    let target = conn.name().to_string();
    schema::initialize(conn).await?;
    let stats = loader::load_batch(conn, batch).await?;

    conn.commit().await.map_err(|e| EtlError::Transaction {
        target,
        reason: e.to_string(),
    })?;

    Ok(stats)
}
