// src/logging.rs

use crate::errors::{ParleyError, ParleyResult};
use flexi_logger::{Duplicate, FileSpec, Logger, LoggerHandle};

/// Starts the logger: everything at `level` and above goes to a log file
/// next to the working directory, warnings and errors are duplicated to
/// stderr so they stay visible behind the REPL.
pub fn init_logging(level: &str) -> ParleyResult<LoggerHandle> {
    Logger::try_with_str(level)
        .map_err(|e| ParleyError::config_error(format!("Invalid log level: {}", e)))?
        .log_to_file(FileSpec::default().basename("parley").suppress_timestamp())
        .duplicate_to_stderr(Duplicate::Warn)
        .start()
        .map_err(|e| ParleyError::config_error(format!("Failed to start logger: {}", e)))
}
