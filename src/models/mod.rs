//! Data models for the nuibuild core.
//!
//! - [`BuildConfig`]: the persisted configuration document (`config.yml`)
//! - [`RuntimeOverrides`]: session-only inputs that never touch the file
//! - [`BuildTask`]: one build attempt, from trigger to terminal status
//! - [`EmbeddedFile`]: source → destination mappings bundled into the build
//!
//! Config structs derive `Serialize`/`Deserialize` for YAML persistence;
//! the build task is shared as [`SharedBuildTask`] between its owning
//! runner (writer) and observers (readers).

pub mod build_task;
pub mod config;
pub mod embedded_file;

pub use build_task::{
    BUILD_LOG_FILENAME, BuildTask, LogEntry, LogLevel, LogSource, SharedBuildTask, TaskStatus,
};
pub use config::{BuildConfig, CompilerOptions, FlagValue, PythonConfig, RuntimeOverrides};
pub use embedded_file::{EmbeddedFile, FileKind, ValidationError};
