//! Import pipeline configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default number of normalized rows committed per bulk insert.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default number of processed rows between persisted checkpoints.
pub const DEFAULT_PROGRESS_INTERVAL: i64 = 1000;

/// Default rough row-count estimate, used only for percentage display.
pub const DEFAULT_TOTAL_ROWS_ESTIMATE: i64 = 2_000_000;

/// Default CSV source path for local development.
pub const DEFAULT_CSV_FILE_PATH: &str = "./data/customers.csv";

/// Import pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Path to the customer CSV source
    pub csv_path: PathBuf,
    /// Rows accumulated before a bulk insert
    pub batch_size: usize,
    /// Processed-row distance between persisted checkpoints
    pub progress_interval: i64,
    /// Rough source size estimate for percentage display, not authoritative
    pub total_rows_estimate: i64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from(DEFAULT_CSV_FILE_PATH),
            batch_size: DEFAULT_BATCH_SIZE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            total_rows_estimate: DEFAULT_TOTAL_ROWS_ESTIMATE,
        }
    }
}

impl ImportConfig {
    /// Load configuration from environment variables
    ///
    /// Recognized variables: `CSV_FILE_PATH`, `IMPORT_BATCH_SIZE`,
    /// `IMPORT_PROGRESS_INTERVAL`, `IMPORT_TOTAL_ROWS_ESTIMATE`.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("CSV_FILE_PATH") {
            config.csv_path = PathBuf::from(path);
        }
        if let Ok(size) = std::env::var("IMPORT_BATCH_SIZE") {
            config.batch_size = size.parse()?;
        }
        if let Ok(interval) = std::env::var("IMPORT_PROGRESS_INTERVAL") {
            config.progress_interval = interval.parse()?;
        }
        if let Ok(estimate) = std::env::var("IMPORT_TOTAL_ROWS_ESTIMATE") {
            config.total_rows_estimate = estimate.parse()?;
        }

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("Import batch_size must be greater than 0");
        }

        if self.progress_interval <= 0 {
            anyhow::bail!("Import progress_interval must be greater than 0");
        }

        Ok(())
    }
}
