//! `ecom-etl run` command implementation
//!
//! Builds one connector per configured target and runs the pipeline.

use anyhow::Context;
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;

use crate::config::Config;
use crate::dialect::Dialect;
use crate::pipeline::{Pipeline, PipelineReport};
use crate::target::{Connector, MemoryConnector, SqlxConnector};

/// Options of the `run` subcommand
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub files: Vec<PathBuf>,
    pub mysql_url: Option<String>,
    pub postgres_url: Option<String>,
    pub connect_timeout: Option<u64>,
    pub dry_run: bool,
    pub json: bool,
    /// Also print one line per successfully loaded target
    pub verbose: bool,
}

/// Run the ETL; fails when the input is rejected or any target fails
pub async fn run(options: RunOptions) -> anyhow::Result<()> {
    let connectors = connectors(&options)?;
    let pipeline = Pipeline::new();

    let report = pipeline
        .run(options.files.as_slice(), &connectors)
        .await
        .context("ETL run aborted before any target was written")?;

    if options.json {
        println!("{}", report.to_json()?);
    } else {
        for (target, e) in report.failures() {
            eprintln!("{} {}: {}", "✗".red(), target, e);
        }
        for line in success_lines(&report, options.verbose) {
            println!("{}", line);
        }
    }

    if !report.is_success() {
        let failed: Vec<&str> = report.failures().map(|(target, _)| target).collect();
        anyhow::bail!("{} target(s) failed: {}", failed.len(), failed.join(", "));
    }
    Ok(())
}

fn connectors(options: &RunOptions) -> anyhow::Result<Vec<Box<dyn Connector>>> {
    if options.dry_run {
        info!("Dry run: writing to in-memory stores");
        return Ok(Dialect::ALL
            .iter()
            .map(|dialect| Box::new(MemoryConnector::new(dialect.as_str(), *dialect)) as Box<dyn Connector>)
            .collect());
    }

    let config = Config::load().with_overrides(
        options.mysql_url.clone(),
        options.postgres_url.clone(),
        options.connect_timeout,
    );
    config.validate()?;

    Ok(config
        .targets()
        .into_iter()
        .map(|target| Box::new(SqlxConnector::new(target)) as Box<dyn Connector>)
        .collect())
}

/// Per-target lines (verbose only) followed by the single confirmation
fn success_lines(report: &PipelineReport, verbose: bool) -> Vec<String> {
    if !report.is_success() {
        return Vec::new();
    }

    let mut lines = Vec::with_capacity(report.outcomes.len() + 1);
    for outcome in &report.outcomes {
        if let Ok(stats) = &outcome.result {
            if verbose {
                lines.push(format!(
                    "{} {}: {} inserted, {} already present",
                    "✓".green(),
                    outcome.target,
                    stats.inserted(),
                    stats.skipped()
                ));
            }
        }
    }

    lines.push(format!(
        "{} Data successfully loaded: {} categories, {} products, {} orders (run {})",
        "✓".green(),
        report.batch.categories,
        report.batch.products,
        report.batch.orders,
        report.run_id
    ));
    lines
}
