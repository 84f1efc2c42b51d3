//! ecom-etl Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Flattens nested e-commerce product documents into `Category`, `Product`
//! and `Order` rows and loads them idempotently into MySQL and PostgreSQL.
//!
//! # Overview
//!
//! - **Source loading** ([`source`]): JSON documents into one uniform table
//! - **Normalization** ([`normalize`]): entities with full-tuple deduplication
//! - **Schema** ([`schema`], [`dialect`]): one logical schema, rendered per dialect
//! - **Loading** ([`loader`]): insert-or-skip in referential order
//! - **Orchestration** ([`pipeline`]): one transaction per target, isolated failures
//! - **Contracts** ([`validation`]): column, null, uniqueness and type checks
//!
//! # Example
//!
//! ```no_run
//! use ecom_etl::dialect::Dialect;
//! use ecom_etl::pipeline::Pipeline;
//! use ecom_etl::target::{Connector, MemoryConnector};
//!
//! # async fn example() -> ecom_common::Result<()> {
//! let connectors: Vec<Box<dyn Connector>> = vec![
//!     Box::new(MemoryConnector::new("mysql", Dialect::MySql)),
//!     Box::new(MemoryConnector::new("postgres", Dialect::Postgres)),
//! ];
//! let report = Pipeline::new().run(&["products.json"], &connectors).await?;
//! assert!(report.is_success());
//! # Ok(())
//! # }
//! ```

pub mod commands;
pub mod config;
pub mod dialect;
pub mod loader;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod schema;
pub mod source;
pub mod target;
pub mod validation;

// Re-export commonly used types
pub use config::Config;
pub use dialect::Dialect;
pub use ecom_common::{EtlError, Result};
pub use models::{Category, NormalizedBatch, Order, Product};
pub use pipeline::{Pipeline, PipelineReport};

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// ecom-etl - nested product documents into relational stores
#[derive(Parser, Debug)]
#[command(name = "ecom-etl")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load documents and write them to every configured target
    Run {
        /// JSON documents, processed in the given order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// MySQL connection URL
        #[arg(long, env = "MYSQL_URL")]
        mysql_url: Option<String>,

        /// PostgreSQL connection URL
        #[arg(long, env = "POSTGRES_URL")]
        postgres_url: Option<String>,

        /// Connection timeout in seconds
        #[arg(long, env = "ETL_CONNECT_TIMEOUT")]
        connect_timeout: Option<u64>,

        /// Write to in-memory stores of both dialects instead of real databases
        #[arg(long)]
        dry_run: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check documents against a source contract
    Validate {
        /// JSON documents
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Contract to check
        #[arg(short, long, value_enum, default_value_t = ContractKind::Nested)]
        contract: ContractKind,

        /// Source partition to check (defaults to every loaded source)
        #[arg(short, long)]
        source: Option<String>,
    },

    /// Print the DDL for a dialect
    Schema {
        /// Target dialect (mysql, postgres)
        #[arg(short, long)]
        dialect: Dialect,
    },
}

/// Built-in source contracts
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContractKind {
    Product,
    Customer,
    Order,
    /// Nested product rows consumed by `run`
    Nested,
}

impl ContractKind {
    pub fn contract(&self) -> validation::TableContract {
        match self {
            ContractKind::Product => validation::product_contract(),
            ContractKind::Customer => validation::customer_contract(),
            ContractKind::Order => validation::order_contract(),
            ContractKind::Nested => validation::nested_product_contract(),
        }
    }
}
