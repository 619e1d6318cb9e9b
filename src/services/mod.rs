//! Services module - Headless business logic for driving the compiler.
//!
//! Everything under here is framework-agnostic: no UI dependencies, all
//! inputs explicit, side effects limited to file I/O and subprocess
//! execution.
//!
//! # Components
//!
//! - [`command`]: deterministic rendering of a configuration snapshot into
//!   the compiler command line, plus the quote-aware inverse tokenizer
//! - [`runner`]: cancellable background execution of one rendered command,
//!   with per-line logging and a coarse progress estimate
//! - [`tailer`]: offset-based periodic reads of the growing build log
//! - [`coordinator`]: one-build-at-a-time orchestration with race-free
//!   cancel and shutdown across both workers
//! - [`discovery`]: best-effort probing of interpreters, toolchains and
//!   package mirrors
//! - [`analyzer`]: import scanning for plugin suggestions

pub mod analyzer;
pub mod command;
pub mod coordinator;
pub mod discovery;
pub mod runner;
pub mod tailer;

pub use analyzer::ImportAnalyzer;
pub use command::{render_command, split_command};
pub use coordinator::{BuildCoordinator, BuildEvent, CoordinatorError};
pub use discovery::{
    DiscoveredInterpreter, DiscoveredToolchain, InterpreterDiscovery, MirrorProbe, MirrorStatus,
    SystemDiscovery, ToolchainDiscovery, ToolchainKind,
};
pub use runner::{ProcessRunner, RunnerEvent, RunnerHandle};
pub use tailer::{LogTailer, TailerEvent, TailerHandle};
