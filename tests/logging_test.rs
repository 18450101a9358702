//! Logging initialization runs in its own test binary so it does not collide
//! with subscribers installed by unit tests.

use picova::config::PicovaConfig;
use picova::logging::{self, LoggingConfig, OutputFormat};
use tracing::Level;

#[test]
fn test_init_is_idempotent() {
    logging::init(LoggingConfig::new(Level::DEBUG).with_format(OutputFormat::Json)).unwrap();
    // A second subscriber cannot be installed; the call still succeeds.
    logging::init(LoggingConfig::new(Level::INFO)).unwrap();
    logging::init_from_config(&PicovaConfig::default()).unwrap();

    tracing::info!(records = 3, "logging initialized");
}
