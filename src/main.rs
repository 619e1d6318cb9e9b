//! nuibuild - Headless Nuitka build driver
//!
//! Minimal CLI entry point over the library crate. It loads the per-user
//! configuration, applies the session inputs from the command line, runs
//! one build through the coordinator and streams the build log to the
//! terminal until the build reaches a terminal state.
//!
//! # Execution Flow
//!
//! 1. Initialize logging → logs/nuibuild_<date>.log (plus console)
//! 2. Load `~/.nuibuild/config.yml` (defaults on load failure)
//! 3. Apply CLI arguments as session overrides
//! 4. Start the build and print log batches as they arrive
//! 5. Cancel on Ctrl-C; bounded shutdown either way
//!
//! # Usage
//!
//! `nuibuild <entry-file> <output-dir> [output-filename] [icon.ico]`

use anyhow::{Context, Result, bail};
use nuibuild::services::BuildEvent;
use nuibuild::{APP_NAME, BuildCoordinator, ConfigStore, VERSION};
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<()> {
    let _guard = nuibuild::logging::setup_logging("logs", "nuibuild", false, false)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || args.len() > 4 {
        bail!("usage: {APP_NAME} <entry-file> <output-dir> [output-filename] [icon.ico]");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(4)
        .thread_name("nuibuild-worker")
        .build()
        .context("failed to create tokio runtime")?;

    let result = runtime.block_on(run(&args));

    runtime.shutdown_timeout(Duration::from_secs(5));
    tracing::info!("Application shutdown complete");
    result
}

async fn run(args: &[String]) -> Result<()> {
    // A broken document is not fatal; fall back to in-memory defaults.
    let store = match ConfigStore::at_user_dir() {
        Ok(store) => store,
        Err(e) => {
            tracing::warn!("Could not load configuration ({e}), using defaults");
            eprintln!("warning: could not load configuration ({e}), using defaults");
            ConfigStore::with_defaults(".")
        }
    };
    let store = Arc::new(store);

    store.set_runtime(|r| {
        r.entry_file = args[0].clone();
        r.output_dir = args.get(1).cloned().unwrap_or_default();
        r.output_filename = args.get(2).cloned().unwrap_or_default();
        r.icon_path = args.get(3).cloned().unwrap_or_default();
    });

    let coordinator = Arc::new(BuildCoordinator::new(store));
    let (task, mut events) = coordinator
        .start_build()
        .context("failed to start build")?;

    println!("Running: {}", task.read().unwrap().command);

    let canceller = coordinator.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling build...");
            canceller.cancel().await;
        }
    });

    let mut failed_message = None;
    while let Some(event) = events.recv().await {
        match event {
            BuildEvent::LogBatch(lines) => {
                for line in lines {
                    println!("{line}");
                }
            }
            BuildEvent::TailError(message) => {
                eprintln!("warning: log read error: {message}");
            }
            BuildEvent::Finished { exit_code } => {
                println!("Build finished (exit code {exit_code})");
                break;
            }
            BuildEvent::Failed { message } => {
                failed_message = Some(message);
                break;
            }
        }
    }

    coordinator.shutdown().await;

    match failed_message {
        Some(message) => bail!("{message}"),
        None => Ok(()),
    }
}
