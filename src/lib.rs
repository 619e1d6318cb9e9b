// nuibuild - Headless build pipeline for packaging Python applications
// with the Nuitka compiler.
//
// This is the library crate containing the core business logic and data
// structures. The binary crate (main.rs) provides a minimal CLI driver.

pub mod config;
pub mod logging;
pub mod models;
pub mod services;

// Re-export commonly used types for convenience
pub use config::{ConfigError, ConfigStore};
pub use models::{BuildConfig, BuildTask, RuntimeOverrides, SharedBuildTask, TaskStatus};
pub use services::{BuildCoordinator, BuildEvent};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
