//! `ecom-etl validate` command implementation
//!
//! Checks each source partition of the given documents against a contract.

use colored::Colorize;
use std::path::PathBuf;

use crate::source;
use crate::validation::{self, TableContract};

/// Validate documents; fails when any partition violates the contract
pub fn run(files: &[PathBuf], contract: TableContract, source: Option<String>) -> anyhow::Result<()> {
    let table = source::load_sources(files)?;

    let sources = match source {
        Some(name) => vec![name],
        None => {
            let mut names: Vec<String> = Vec::new();
            for row in table.rows() {
                if !names.contains(&row.source) {
                    names.push(row.source.clone());
                }
            }
            names
        },
    };

    let mut invalid = 0;
    for name in sources {
        let report = validation::validate(&table, &contract.clone().for_source(name));

        if report.is_valid() {
            println!("{} {} ({} rows)", "✓".green(), report.source, report.rows);
        } else {
            invalid += 1;
            println!(
                "{} {} ({} rows, {} violations)",
                "✗".red(),
                report.source,
                report.rows,
                report.violations.len()
            );
            for violation in &report.violations {
                println!("  {}", violation);
            }
        }
    }

    if invalid > 0 {
        anyhow::bail!("{} source(s) violate the contract", invalid);
    }
    Ok(())
}
