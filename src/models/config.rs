use crate::models::EmbeddedFile;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Persisted configuration document (`config.yml`).
///
/// Two namespaces: the interpreter used to invoke the compiler, and the
/// whitelisted compiler options. Unknown keys under `nuitka` are kept
/// round-trippable on disk but never emitted as flags.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default)]
    pub python: PythonConfig,

    #[serde(default)]
    pub nuitka: CompilerOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PythonConfig {
    /// Path to the Python interpreter that runs the compiler module.
    #[serde(default = "default_python_path")]
    pub path: String,
}

fn default_python_path() -> String {
    "python".to_string()
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            path: default_python_path(),
        }
    }
}

/// A single whitelisted option value, viewed for flag emission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlagValue<'a> {
    Bool(bool),
    Int(i64),
    Str(&'a str),
}

/// The whitelisted compiler options.
///
/// Field order below is the emission order of the generated command line,
/// so rendering is deterministic by construction. List-valued options
/// (plugins, embedded files) are handled by dedicated emitters rather than
/// the generic flag loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CompilerOptions {
    #[serde(default)]
    pub jobs: i64,

    // Exactly one of standalone/onefile may be true; enforced by
    // ConfigStore::update, not by this struct.
    #[serde(default)]
    pub standalone: bool,
    #[serde(default)]
    pub onefile: bool,

    #[serde(default)]
    pub remove_output: bool,
    #[serde(default)]
    pub show_progress: bool,
    #[serde(default)]
    pub show_memory: bool,
    #[serde(default)]
    pub quiet: bool,

    #[serde(default)]
    pub lto: String,

    #[serde(default)]
    pub windows_console_mode: String,
    #[serde(default)]
    pub windows_icon_from_ico: String,
    #[serde(default)]
    pub windows_uac_admin: bool,
    #[serde(default)]
    pub windows_uac_uiaccess: bool,

    #[serde(default)]
    pub assume_yes_for_downloads: bool,

    #[serde(default)]
    pub clang: bool,
    #[serde(default)]
    pub mingw64: bool,
    #[serde(default)]
    pub low_memory: bool,

    #[serde(default)]
    pub output_filename: String,
    #[serde(default)]
    pub output_folder_name: String,
    #[serde(default)]
    pub output_dir: String,

    #[serde(default)]
    pub clean_cache: String,

    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub file_version: String,
    #[serde(default)]
    pub product_version: String,
    #[serde(default)]
    pub file_description: String,
    #[serde(default)]
    pub copyright: String,
    #[serde(default)]
    pub trademarks: String,

    #[serde(default)]
    pub enabled_plugins: Vec<String>,
    #[serde(default)]
    pub disabled_plugins: Vec<String>,
    #[serde(default)]
    pub embedded_files: Vec<EmbeddedFile>,

    /// Keys we do not recognize. Preserved when the file is rewritten,
    /// ignored by the command compiler.
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_yaml_ng::Value>,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            jobs: 0,
            standalone: true,
            onefile: false,
            remove_output: true,
            show_progress: true,
            show_memory: false,
            quiet: false,
            lto: "auto".to_string(),
            windows_console_mode: "auto".to_string(),
            windows_icon_from_ico: String::new(),
            windows_uac_admin: false,
            windows_uac_uiaccess: false,
            assume_yes_for_downloads: true,
            clang: false,
            mingw64: false,
            low_memory: false,
            output_filename: String::new(),
            output_folder_name: String::new(),
            output_dir: String::new(),
            clean_cache: String::new(),
            company_name: String::new(),
            product_name: String::new(),
            file_version: String::new(),
            product_version: String::new(),
            file_description: String::new(),
            copyright: String::new(),
            trademarks: String::new(),
            enabled_plugins: Vec::new(),
            disabled_plugins: Vec::new(),
            embedded_files: Vec::new(),
            extra: IndexMap::new(),
        }
    }
}

impl CompilerOptions {
    /// The scalar whitelist in emission order, paired with flag names.
    ///
    /// Plugin lists and embedded files are deliberately absent here; they
    /// have their own emitters in the command compiler.
    pub fn whitelist_flags(&self) -> Vec<(&'static str, FlagValue<'_>)> {
        vec![
            ("jobs", FlagValue::Int(self.jobs)),
            ("standalone", FlagValue::Bool(self.standalone)),
            ("onefile", FlagValue::Bool(self.onefile)),
            ("remove-output", FlagValue::Bool(self.remove_output)),
            ("show-progress", FlagValue::Bool(self.show_progress)),
            ("show-memory", FlagValue::Bool(self.show_memory)),
            ("quiet", FlagValue::Bool(self.quiet)),
            ("lto", FlagValue::Str(&self.lto)),
            (
                "windows-console-mode",
                FlagValue::Str(&self.windows_console_mode),
            ),
            (
                "windows-icon-from-ico",
                FlagValue::Str(&self.windows_icon_from_ico),
            ),
            ("windows-uac-admin", FlagValue::Bool(self.windows_uac_admin)),
            (
                "windows-uac-uiaccess",
                FlagValue::Bool(self.windows_uac_uiaccess),
            ),
            (
                "assume-yes-for-downloads",
                FlagValue::Bool(self.assume_yes_for_downloads),
            ),
            ("clang", FlagValue::Bool(self.clang)),
            ("mingw64", FlagValue::Bool(self.mingw64)),
            ("low-memory", FlagValue::Bool(self.low_memory)),
            ("output-filename", FlagValue::Str(&self.output_filename)),
            (
                "output-folder-name",
                FlagValue::Str(&self.output_folder_name),
            ),
            ("output-dir", FlagValue::Str(&self.output_dir)),
            ("clean-cache", FlagValue::Str(&self.clean_cache)),
            ("company-name", FlagValue::Str(&self.company_name)),
            ("product-name", FlagValue::Str(&self.product_name)),
            ("file-version", FlagValue::Str(&self.file_version)),
            ("product-version", FlagValue::Str(&self.product_version)),
            ("file-description", FlagValue::Str(&self.file_description)),
            ("copyright", FlagValue::Str(&self.copyright)),
            ("trademarks", FlagValue::Str(&self.trademarks)),
        ]
    }
}

/// Session-only values handed to the command compiler out of band.
///
/// These never reach the persisted document; they die with the in-memory
/// session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RuntimeOverrides {
    pub entry_file: String,
    pub output_dir: String,
    pub output_filename: String,
    pub icon_path: String,
}
