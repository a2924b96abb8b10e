pub mod browser;
pub mod error;
pub mod flags;
pub mod lighthouse;

pub use browser::{ChromeInstance, ChromeLauncher};
pub use error::{LighthouseError, Result};
pub use flags::{LighthouseFlags, OutputFormat};
pub use lighthouse::{AuditOutcome, LighthouseCli};
