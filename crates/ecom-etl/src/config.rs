//! Configuration management
//!
//! Target URLs come from the environment (optionally via a `.env` file) and
//! can be overridden on the command line.

use ecom_common::{EtlError, Result};
use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;

/// Default connection timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Environment variable holding the MySQL URL.
pub const MYSQL_URL_VAR: &str = "MYSQL_URL";

/// Environment variable holding the PostgreSQL URL.
pub const POSTGRES_URL_VAR: &str = "POSTGRES_URL";

/// Environment variable holding the connection timeout in seconds.
pub const CONNECT_TIMEOUT_VAR: &str = "ETL_CONNECT_TIMEOUT";

/// Run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub mysql_url: Option<String>,
    pub postgres_url: Option<String>,
    pub connect_timeout_secs: u64,
}

/// Everything needed to connect to one target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    pub dialect: Dialect,
    pub url: String,
    pub connect_timeout_secs: u64,
}

impl Config {
    /// Load configuration from `.env`, the environment and defaults
    ///
    /// Not validated here: command line overrides are applied first, see
    /// [`Config::with_overrides`].
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(get: impl Fn(&str) -> Option<String>) -> Self {
        Config {
            mysql_url: get(MYSQL_URL_VAR).filter(|s| !s.trim().is_empty()),
            postgres_url: get(POSTGRES_URL_VAR).filter(|s| !s.trim().is_empty()),
            connect_timeout_secs: get(CONNECT_TIMEOUT_VAR)
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    /// Replace values that were given explicitly
    pub fn with_overrides(
        mut self,
        mysql_url: Option<String>,
        postgres_url: Option<String>,
        connect_timeout_secs: Option<u64>,
    ) -> Self {
        if mysql_url.is_some() {
            self.mysql_url = mysql_url;
        }
        if postgres_url.is_some() {
            self.postgres_url = postgres_url;
        }
        if let Some(timeout) = connect_timeout_secs {
            self.connect_timeout_secs = timeout;
        }
        self
    }

    /// Configured targets, MySQL first
    pub fn targets(&self) -> Vec<TargetConfig> {
        [
            (Dialect::MySql, &self.mysql_url),
            (Dialect::Postgres, &self.postgres_url),
        ]
        .into_iter()
        .filter_map(|(dialect, url)| {
            url.as_ref().map(|url| TargetConfig {
                name: dialect.as_str().to_string(),
                dialect,
                url: url.clone(),
                connect_timeout_secs: self.connect_timeout_secs,
            })
        })
        .collect()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout_secs == 0 {
            return Err(EtlError::Config(
                "Connect timeout must be greater than 0".to_string(),
            ));
        }

        let targets = self.targets();
        if targets.is_empty() {
            return Err(EtlError::Config(format!(
                "No target configured; set {} and/or {} or pass --mysql-url/--postgres-url",
                MYSQL_URL_VAR, POSTGRES_URL_VAR
            )));
        }

        for target in &targets {
            target.validate()?;
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mysql_url: None,
            postgres_url: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl TargetConfig {
    fn schemes(&self) -> &'static [&'static str] {
        match self.dialect {
            Dialect::MySql => &["mysql://", "mariadb://"],
            Dialect::Postgres => &["postgres://", "postgresql://"],
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(EtlError::Config(format!("{} URL cannot be empty", self.name)));
        }
        if !self.schemes().iter().any(|scheme| self.url.starts_with(scheme)) {
            return Err(EtlError::Config(format!(
                "{} URL must start with one of {:?}, got '{}'",
                self.name,
                self.schemes(),
                self.redacted_url()
            )));
        }
        Ok(())
    }

    /// URL with the password replaced, safe to log
    pub fn redacted_url(&self) -> String {
        let Some(scheme_end) = self.url.find("://").map(|i| i + 3) else {
            return self.url.clone();
        };
        let rest = &self.url[scheme_end..];
        let Some(at) = rest.rfind('@') else {
            return self.url.clone();
        };
        let credentials = &rest[..at];
        match credentials.find(':') {
            Some(colon) => format!(
                "{}{}:***{}",
                &self.url[..scheme_end],
                &credentials[..colon],
                &rest[at..]
            ),
            None => self.url.clone(),
        }
    }
}
