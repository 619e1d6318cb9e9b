//! Integration tests for command rendering
//!
//! Fixed snapshots for the documented flag semantics plus property tests
//! for the quoting rules.

use nuibuild::models::{BuildConfig, EmbeddedFile, RuntimeOverrides};
use nuibuild::services::{render_command, split_command};
use proptest::prelude::*;

fn quiet_config() -> BuildConfig {
    let mut config = BuildConfig::default();
    config.python.path = "python".to_string();
    config.nuitka.standalone = false;
    config.nuitka.remove_output = false;
    config.nuitka.show_progress = false;
    config.nuitka.assume_yes_for_downloads = false;
    config.nuitka.windows_console_mode = String::new();
    config
}

#[test]
fn test_sentinel_example_lto_auto_quiet_false() {
    let mut config = quiet_config();
    config.nuitka.lto = "auto".to_string();
    config.nuitka.quiet = false;
    config.nuitka.standalone = true;

    let cmd = render_command(&config, &RuntimeOverrides::default());
    assert_eq!(cmd, "python -m nuitka --standalone");
}

#[test]
fn test_output_filename_gets_exe_suffix() {
    let overrides = RuntimeOverrides {
        entry_file: "main.py".to_string(),
        output_dir: "C:\\out".to_string(),
        output_filename: "myapp".to_string(),
        icon_path: String::new(),
    };
    let cmd = render_command(&quiet_config(), &overrides);

    // Backslashes normalize to forward slashes inside the quotes.
    assert!(cmd.contains(r#"--output-dir="C:/out""#));
    assert!(cmd.contains(r#"--output-filename="myapp.exe""#));
    assert!(cmd.ends_with(r#""main.py""#));
}

#[test]
fn test_include_data_files_example() {
    let mut config = quiet_config();
    config.nuitka.embedded_files = vec![EmbeddedFile::new("/tmp/data.json", "data/config.json")];

    let cmd = render_command(&config, &RuntimeOverrides::default());
    assert!(cmd.contains(r#"--include-data-files="/tmp/data.json"=data/config.json"#));
}

#[test]
fn test_full_render_is_stable() {
    let mut config = quiet_config();
    config.nuitka.standalone = true;
    config.nuitka.jobs = 4;
    config.nuitka.lto = "yes".to_string();
    config.nuitka.product_name = "My App".to_string();
    config.nuitka.enabled_plugins = vec!["tk-inter".to_string()];
    let overrides = RuntimeOverrides {
        entry_file: "src/main.py".to_string(),
        output_dir: "dist".to_string(),
        output_filename: "app".to_string(),
        icon_path: "assets/app.ico".to_string(),
    };

    let cmd = render_command(&config, &overrides);
    assert_eq!(
        cmd,
        r#"python -m nuitka --output-dir="dist" --output-filename="app.exe" --windows-icon-from-ico="assets/app.ico" --jobs=4 --standalone --lto="yes" --product-name="My App" --enable-plugin=tk-inter "src/main.py""#
    );
    assert_eq!(render_command(&config, &overrides), cmd);
}

proptest! {
    /// Any printable value survives the quote/split round trip.
    #[test]
    fn prop_quoting_round_trips(value in "[ -~]{0,40}") {
        let mut config = quiet_config();
        config.nuitka.product_name = value.clone();

        let cmd = render_command(&config, &RuntimeOverrides::default());
        let tokens = split_command(&cmd);

        let flag = tokens.iter().find(|t| t.starts_with("--product-name="));
        let expected = value.replace('\\', "/");
        let is_sentinel = {
            let lower = expected.to_ascii_lowercase();
            expected.is_empty() || matches!(lower.as_str(), "none" | "false" | "auto")
        };
        match flag {
            Some(flag) => {
                prop_assert!(!is_sentinel);
                prop_assert_eq!(flag.as_str(), format!("--product-name={expected}"));
            }
            None => prop_assert!(is_sentinel),
        }
    }

    /// Splitting never loses the base invocation regardless of overrides.
    #[test]
    fn prop_base_tokens_always_first(
        entry in "[a-zA-Z0-9_/ .]{1,30}",
        out in "[a-zA-Z0-9_/ .]{0,30}",
    ) {
        let overrides = RuntimeOverrides {
            entry_file: entry,
            output_dir: out,
            output_filename: String::new(),
            icon_path: String::new(),
        };
        let cmd = render_command(&quiet_config(), &overrides);
        let tokens = split_command(&cmd);

        prop_assert!(tokens.len() >= 3);
        prop_assert_eq!(&tokens[0], "python");
        prop_assert_eq!(&tokens[1], "-m");
        prop_assert_eq!(&tokens[2], "nuitka");
    }
}
