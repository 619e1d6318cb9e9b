//! Import scanning for plugin suggestions.
//!
//! A light line-based scan of the entry script (and, one level deep, the
//! local modules it imports) that maps well-known third-party imports to
//! the compiler plugins they need. Heuristic by design: unreadable files
//! simply contribute nothing.

use camino::Utf8Path;
use regex::Regex;
use std::collections::BTreeSet;

/// Imports that require a specific compiler plugin to work.
const IMPORT_TO_PLUGIN: &[(&str, &str)] = &[
    ("PyQt5", "qt-plugins"),
    ("PyQt6", "qt-plugins"),
    ("PySide2", "qt-plugins"),
    ("PySide6", "qt-plugins"),
    ("PIL", "pillow"),
    ("tkinter", "tk-inter"),
    ("pygame", "pygame"),
];

/// Scans Python sources for imports that map to compiler plugins.
pub struct ImportAnalyzer {
    import_pattern: Regex,
}

impl ImportAnalyzer {
    pub fn new() -> Self {
        Self {
            // `import x.y` / `from x.y import z`, leading whitespace allowed.
            import_pattern: Regex::new(r"^\s*(?:import|from)\s+([A-Za-z_][\w.]*)")
                .expect("invalid import regex"),
        }
    }

    /// Suggest plugins for `entry_file`, sorted and de-duplicated.
    ///
    /// Local modules imported by the entry file (a sibling `<name>.py`)
    /// are scanned too, one level deep. Anything unreadable is skipped.
    pub fn suggest_plugins(&self, entry_file: &Utf8Path) -> Vec<String> {
        let mut plugins = BTreeSet::new();

        let imports = self.scan_file(entry_file);
        let base_dir = entry_file.parent();

        for import in &imports {
            self.match_plugins(import, &mut plugins);

            // A top-level local module next to the entry file.
            if let Some(dir) = base_dir {
                let root = import.split('.').next().unwrap_or(import);
                let local = dir.join(format!("{root}.py"));
                if local.is_file() {
                    for nested in self.scan_file(&local) {
                        self.match_plugins(&nested, &mut plugins);
                    }
                }
            }
        }

        plugins.into_iter().collect()
    }

    fn scan_file(&self, path: &Utf8Path) -> Vec<String> {
        let Ok(contents) = std::fs::read_to_string(path) else {
            return Vec::new();
        };
        contents
            .lines()
            .filter_map(|line| {
                self.import_pattern
                    .captures(line)
                    .map(|c| c[1].to_string())
            })
            .collect()
    }

    /// Match an imported module against the table, both exactly and by
    /// top-level prefix (`PIL.Image` still means pillow).
    fn match_plugins(&self, import: &str, plugins: &mut BTreeSet<String>) {
        let root = import.split('.').next().unwrap_or(import);
        for (module, plugin) in IMPORT_TO_PLUGIN {
            if root == *module {
                plugins.insert((*plugin).to_string());
            }
        }
    }
}

impl Default for ImportAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
