//! Configuration → command-line rendering.
//!
//! Pure functions: a configuration snapshot plus the session overrides in,
//! one shell-tokenizable string out. Rendering the same snapshot twice
//! yields a byte-identical command; nothing here reads the clock, the
//! environment or the filesystem.

use crate::models::{BuildConfig, FlagValue, RuntimeOverrides};

/// Module invoked on the interpreter (`<python> -m nuitka`).
pub const TOOL_MODULE: &str = "nuitka";

/// Render the full command line for one build attempt.
///
/// Emission order: base invocation, runtime overrides, the scalar
/// whitelist in stored order, plugin lists, embedded files, entry path.
/// Missing optional values are silently skipped, never an error.
pub fn render_command(config: &BuildConfig, overrides: &RuntimeOverrides) -> String {
    let mut parts: Vec<String> = vec![
        config.python.path.clone(),
        "-m".to_string(),
        TOOL_MODULE.to_string(),
    ];

    // Session overrides come first so they visibly win over anything the
    // document also carries.
    if !overrides.output_dir.is_empty() {
        parts.push(format!("--output-dir={}", quote_value(&overrides.output_dir)));
    }
    if !overrides.output_filename.is_empty() {
        let mut filename = overrides.output_filename.clone();
        if !filename.ends_with(".exe") {
            filename.push_str(".exe");
        }
        parts.push(format!("--output-filename={}", quote_value(&filename)));
    }
    if !overrides.icon_path.is_empty() {
        parts.push(format!(
            "--windows-icon-from-ico={}",
            quote_value(&overrides.icon_path)
        ));
    }

    for (key, value) in config.nuitka.whitelist_flags() {
        if is_absent(&value) {
            continue;
        }
        match value {
            // true is a bare flag; false was already filtered as absent.
            FlagValue::Bool(_) => parts.push(format!("--{key}")),
            FlagValue::Int(n) => parts.push(format!("--{key}={n}")),
            FlagValue::Str(s) => parts.push(format!("--{key}={}", quote_value(s))),
        }
    }

    for plugin in &config.nuitka.enabled_plugins {
        if !plugin.is_empty() {
            parts.push(format!("--enable-plugin={plugin}"));
        }
    }
    for plugin in &config.nuitka.disabled_plugins {
        if !plugin.is_empty() {
            parts.push(format!("--disable-plugin={plugin}"));
        }
    }

    for entry in &config.nuitka.embedded_files {
        // Entries missing either side are skipped, not rejected.
        if entry.source_path.is_empty() || entry.destination_path.is_empty() {
            continue;
        }
        parts.push(format!(
            "--include-data-files={}={}",
            quote_value(&entry.source_path),
            entry.destination_path
        ));
    }

    if !overrides.entry_file.is_empty() {
        parts.push(quote_value(&overrides.entry_file));
    }

    parts.join(" ")
}

/// Values the flag loop treats as "not specified".
///
/// Lets a field default to absent without a literal null: empty strings,
/// zero, false, and the case-insensitive strings `none`, `false`, `auto`.
fn is_absent(value: &FlagValue) -> bool {
    match value {
        FlagValue::Bool(b) => !b,
        FlagValue::Int(n) => *n == 0,
        FlagValue::Str(s) => {
            s.is_empty() || {
                let lower = s.to_ascii_lowercase();
                matches!(lower.as_str(), "none" | "false" | "auto")
            }
        }
    }
}

/// Normalize a value for embedding between quotes: path separators become
/// forward slashes and embedded double quotes are escaped.
fn normalize_value(value: &str) -> String {
    value.replace('\\', "/").replace('"', "\\\"")
}

fn quote_value(value: &str) -> String {
    format!("\"{}\"", normalize_value(value))
}

/// Quote-aware splitting of a rendered command.
///
/// The inverse of the quoting rules above: double quotes group, `\"`
/// inside quotes unescapes, whitespace outside quotes separates. Paths
/// with spaces survive the round trip.
pub fn split_command(command: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut saw_quotes = false;

    let mut chars = command.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => {
                in_quotes = !in_quotes;
                saw_quotes = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if saw_quotes || !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                    saw_quotes = false;
                }
            }
            c => current.push(c),
        }
    }
    if saw_quotes || !current.is_empty() {
        tokens.push(current);
    }

    tokens
}
