pub mod redactor;
pub mod macros;
pub mod config;

pub use redactor::*;
pub use config::*;

#[doc(hidden)]
pub use tracing as __tracing;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Logging setup with redaction of payment references and patient contact data
///
/// Billing events carry payment references (UPI transaction ids, card
/// approval codes) and free-text notes that may contain phone numbers or UPI
/// handles. Those values go through a [`PiiRedactor`] before they are attached
/// to a tracing event.
///
/// # Detected Data Types
///
/// - **Email Addresses**: user@example.com → u***@e***
/// - **UPI Handles**: ravi.k@okaxis → ***@okaxis
/// - **Card Numbers**: 4111-1111-1111-1234 → ****-****-****-1234
/// - **Phone Numbers**: +91 9876543210 → **********
/// - **Payment References**: TXN987654321 → ********4321
///
/// # Example
///
/// ```rust
/// use logger_redacted::{LoggerConfig, PiiRedactor, redacted_info};
///
/// let config = LoggerConfig::default();
/// let _ = logger_redacted::init(&config);
///
/// let redactor = PiiRedactor::from_logger_config(&config);
/// redacted_info!(redactor, "paid by ravi@okaxis", bill_version = 2, "Commit prepared");
/// ```
#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),

    #[error("A global tracing subscriber is already installed")]
    AlreadyInitialized,
}

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `config.log_level` when it is set.
///
/// # Errors
///
/// Returns [`LoggerError::InvalidFilter`] for an unparsable level directive and
/// [`LoggerError::AlreadyInitialized`] when a subscriber is already installed.
pub fn init(config: &LoggerConfig) -> Result<(), LoggerError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| LoggerError::InvalidFilter(e.to_string()))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|_| LoggerError::AlreadyInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_rejected() {
        let config = LoggerConfig {
            log_level: "debug".to_string(),
            ..Default::default()
        };

        // The first call may race with other tests; the second must fail either way.
        let _ = init(&config);
        assert!(matches!(init(&config), Err(LoggerError::AlreadyInitialized)));
    }

    #[test]
    fn test_invalid_filter() {
        let config = LoggerConfig {
            log_level: "billing=notalevel".to_string(),
            ..Default::default()
        };

        if std::env::var("RUST_LOG").is_err() {
            assert!(matches!(init(&config), Err(LoggerError::InvalidFilter(_))));
        }
    }
}
