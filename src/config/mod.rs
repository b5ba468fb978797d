//! Service configuration: the YAML/env schema and the logging settings.
pub mod config;
pub mod logging;

pub use config::*;
pub use logging::*;
