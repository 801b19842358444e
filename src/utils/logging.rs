//! Logging helpers.
//!
//! Conditional logging macros check a module-level `ENABLE_LOGS` flag.
//!
//! Usage:
//! ```rust,ignore
//! // In your module, define the flag first:
//! const ENABLE_LOGS: bool = true;
//!
//! // Then use the macros (they're exported at the crate root):
//! use crate::{log_info, log_warn, log_error};
//!
//! log_info!("This will log if ENABLE_LOGS is true");
//! ```
//!
//! [`NarrativeLog`] is the human-readable test log that ends up next to the
//! reports: one `<timestamp>: <message>` line per state transition or anomaly.

use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::Local;

/// Macro for conditional info logging.
/// Checks the `ENABLE_LOGS` const in the calling module.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Macro for conditional warn logging.
/// Checks the `ENABLE_LOGS` const in the calling module.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Macro for conditional error logging.
/// Checks the `ENABLE_LOGS` const in the calling module.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Append-only, line-oriented test log.
///
/// The file is reopened for every line so that nothing sits in a buffer when
/// the machine dies at 0%.
#[derive(Debug, Clone)]
pub struct NarrativeLog {
    path: PathBuf,
}

impl NarrativeLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one line and mirrors it to the `log` facade. Write failures are
    /// reported but never propagate.
    pub fn line(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        log::info!("{message}");

        if let Err(err) = self.append(message) {
            log::error!("Failed to write to test log {}: {err:#}", self.path.display());
        }
    }

    fn append(&self, message: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;

        let timestamp = Local::now().format(TIMESTAMP_FORMAT);
        writeln!(file, "{timestamp}: {message}").context("failed to append log line")?;
        file.sync_data().context("failed to flush log line")?;
        Ok(())
    }
}
