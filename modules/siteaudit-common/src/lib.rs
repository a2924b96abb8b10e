pub mod config;
pub mod error;
pub mod types;

pub use config::{AuditConfig, Environment, FanOutPolicy, GatePolicy};
pub use error::ConfigError;
pub use lighthouse_client::{LighthouseFlags, OutputFormat};
pub use types::*;
