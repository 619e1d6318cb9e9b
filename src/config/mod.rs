use crate::models::{BuildConfig, RuntimeOverrides};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::sync::RwLock;
use thiserror::Error;

/// File name of the persisted configuration document.
pub const CONFIG_FILENAME: &str = "config.yml";

/// Directory under the user's home that holds the document.
pub const CONFIG_DIRNAME: &str = ".nuibuild";

/// Errors raised by the configuration store.
///
/// Callers are expected to fall back to defaults on load failures instead
/// of treating them as fatal.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: Utf8PathBuf,
        source: serde_yaml_ng::Error,
    },

    #[error("failed to write config file {path}: {source}")]
    Write {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] serde_yaml_ng::Error),

    #[error("failed to delete config file {path}: {source}")]
    Delete {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("no home directory available (USERPROFILE/HOME unset)")]
    NoHomeDir,
}

struct StoreState {
    document: BuildConfig,
    runtime: RuntimeOverrides,
    /// Set by `delete()`; reads then observe defaults instead of
    /// re-creating the file behind the caller's back.
    deleted: bool,
}

/// Authoritative in-memory configuration with YAML persistence.
///
/// Explicitly constructed and injected wherever configuration is needed;
/// tests build isolated instances against temp directories. Durable
/// updates go through [`update`](Self::update), session-only values
/// through [`set_runtime`](Self::set_runtime).
///
/// All accessors go through an interior `RwLock`, so reads never observe
/// a half-applied update regardless of which thread performs it.
pub struct ConfigStore {
    config_path: Utf8PathBuf,
    inner: RwLock<StoreState>,
}

impl ConfigStore {
    /// Open (or create) the document under `config_dir`.
    ///
    /// First run writes the default document before loading it, so a
    /// freshly provisioned machine starts from the bundled defaults.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref().to_path_buf();
        let config_path = config_dir.join(CONFIG_FILENAME);

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).map_err(|source| ConfigError::Write {
                path: config_path.clone(),
                source,
            })?;
        }

        if !config_path.exists() {
            let defaults = BuildConfig::default();
            let yaml = serde_yaml_ng::to_string(&defaults)?;
            fs::write(&config_path, yaml).map_err(|source| ConfigError::Write {
                path: config_path.clone(),
                source,
            })?;
            tracing::info!("Created default configuration at {}", config_path);
        }

        let document = Self::load_document(&config_path)?;
        tracing::info!("Loaded configuration from {}", config_path);

        Ok(Self {
            config_path,
            inner: RwLock::new(StoreState {
                document,
                runtime: RuntimeOverrides::default(),
                deleted: false,
            }),
        })
    }

    /// Open the per-user document at `<home>/.nuibuild/config.yml`.
    pub fn at_user_dir() -> Result<Self, ConfigError> {
        let home = std::env::var("USERPROFILE")
            .or_else(|_| std::env::var("HOME"))
            .map_err(|_| ConfigError::NoHomeDir)?;
        Self::new(Utf8PathBuf::from(home).join(CONFIG_DIRNAME))
    }

    /// In-memory defaults, not backed by a readable file.
    ///
    /// The fallback when loading raised an error: the application keeps
    /// running as if no configuration existed.
    pub fn with_defaults<P: AsRef<Utf8Path>>(config_dir: P) -> Self {
        Self {
            config_path: config_dir.as_ref().join(CONFIG_FILENAME),
            inner: RwLock::new(StoreState {
                document: BuildConfig::default(),
                runtime: RuntimeOverrides::default(),
                deleted: false,
            }),
        }
    }

    fn load_document(path: &Utf8Path) -> Result<BuildConfig, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut document: BuildConfig =
            serde_yaml_ng::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        // The file is hand-editable; repair a document carrying both modes.
        if document.nuitka.standalone && document.nuitka.onefile {
            tracing::warn!("{path} enables both standalone and onefile, keeping standalone");
            document.nuitka.onefile = false;
        }

        Ok(document)
    }

    /// Re-read the document from disk, discarding in-memory durable edits
    /// but keeping the runtime overrides.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let document = Self::load_document(&self.config_path)?;
        let mut state = self.inner.write().unwrap();
        state.document = document;
        state.deleted = false;
        Ok(())
    }

    /// Snapshot of the durable document plus the runtime overrides.
    pub fn snapshot(&self) -> (BuildConfig, RuntimeOverrides) {
        let state = self.inner.read().unwrap();
        (state.document.clone(), state.runtime.clone())
    }

    /// Read-only access without cloning the whole document.
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&BuildConfig) -> R,
    {
        let state = self.inner.read().unwrap();
        f(&state.document)
    }

    /// Apply a durable update and persist it.
    ///
    /// The standalone/onefile exclusion is normalized as part of the same
    /// update: the pair never reaches disk with both set. Whichever mode
    /// the update switched on wins; re-asserting an already-active mode
    /// still forces the other off.
    pub fn update<F>(&self, f: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut BuildConfig),
    {
        let mut state = self.inner.write().unwrap();
        let was_onefile = state.document.nuitka.onefile;

        f(&mut state.document);

        let options = &mut state.document.nuitka;
        if options.standalone && options.onefile {
            if !was_onefile {
                // onefile was switched on by this update.
                options.standalone = false;
            } else {
                options.onefile = false;
            }
        }

        self.save_locked(&state)
    }

    /// Mutate the session-only overrides. Never touches the file.
    pub fn set_runtime<F>(&self, f: F)
    where
        F: FnOnce(&mut RuntimeOverrides),
    {
        let mut state = self.inner.write().unwrap();
        f(&mut state.runtime);
    }

    fn save_locked(&self, state: &StoreState) -> Result<(), ConfigError> {
        if state.deleted {
            return Ok(());
        }
        let yaml = serde_yaml_ng::to_string(&state.document)?;
        fs::write(&self.config_path, yaml).map_err(|source| ConfigError::Write {
            path: self.config_path.clone(),
            source,
        })?;
        tracing::debug!("Saved configuration to {}", self.config_path);
        Ok(())
    }

    /// Remove the on-disk document. Subsequent reads observe defaults.
    pub fn delete(&self) -> Result<(), ConfigError> {
        let mut state = self.inner.write().unwrap();
        if self.config_path.exists() {
            fs::remove_file(&self.config_path).map_err(|source| ConfigError::Delete {
                path: self.config_path.clone(),
                source,
            })?;
        }
        state.document = BuildConfig::default();
        state.deleted = true;
        tracing::info!("Deleted configuration file {}", self.config_path);
        Ok(())
    }

    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in_temp() -> (ConfigStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        let store = ConfigStore::new(&dir).unwrap();
        (store, temp)
    }

    #[test]
    fn test_first_run_creates_default_file() {
        let (store, _temp) = store_in_temp();
        assert!(store.config_path().exists());

        let (config, overrides) = store.snapshot();
        assert!(config.nuitka.standalone);
        assert_eq!(overrides, RuntimeOverrides::default());
    }

    #[test]
    fn test_update_persists_across_instances() {
        let temp = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();

        let store = ConfigStore::new(&dir).unwrap();
        store
            .update(|c| {
                c.nuitka.jobs = 8;
                c.python.path = "/usr/bin/python3".to_string();
            })
            .unwrap();

        let reopened = ConfigStore::new(&dir).unwrap();
        assert_eq!(reopened.read(|c| c.nuitka.jobs), 8);
        assert_eq!(reopened.read(|c| c.python.path.clone()), "/usr/bin/python3");
    }

    #[test]
    fn test_mode_exclusion_either_order() {
        let (store, _temp) = store_in_temp();

        store.update(|c| c.nuitka.onefile = true).unwrap();
        assert_eq!(store.read(|c| (c.nuitka.standalone, c.nuitka.onefile)), (false, true));

        store.update(|c| c.nuitka.standalone = true).unwrap();
        assert_eq!(store.read(|c| (c.nuitka.standalone, c.nuitka.onefile)), (true, false));
    }

    #[test]
    fn test_both_modes_in_document_repaired() {
        let temp = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        fs::write(
            dir.join(CONFIG_FILENAME),
            "python:\n  path: python\nnuitka:\n  standalone: true\n  onefile: true\n",
        )
        .unwrap();

        let store = ConfigStore::new(&dir).unwrap();
        assert_eq!(
            store.read(|c| (c.nuitka.standalone, c.nuitka.onefile)),
            (true, false)
        );

        // Re-asserting the already-active mode keeps the pair exclusive.
        store.update(|c| c.nuitka.standalone = true).unwrap();
        assert_eq!(
            store.read(|c| (c.nuitka.standalone, c.nuitka.onefile)),
            (true, false)
        );
        let contents = fs::read_to_string(store.config_path()).unwrap();
        assert!(contents.contains("onefile: false"));
    }

    #[test]
    fn test_update_enabling_both_keeps_one_mode() {
        let (store, _temp) = store_in_temp();

        store
            .update(|c| {
                c.nuitka.standalone = true;
                c.nuitka.onefile = true;
            })
            .unwrap();
        assert_eq!(
            store.read(|c| (c.nuitka.standalone, c.nuitka.onefile)),
            (false, true)
        );
    }

    #[test]
    fn test_runtime_overrides_not_persisted() {
        let temp = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();

        let store = ConfigStore::new(&dir).unwrap();
        store.set_runtime(|r| {
            r.entry_file = "main.py".to_string();
            r.output_dir = "/tmp/out".to_string();
        });
        // A durable update must not drag the overrides onto disk.
        store.update(|c| c.nuitka.quiet = true).unwrap();

        let contents = fs::read_to_string(store.config_path()).unwrap();
        assert!(!contents.contains("main.py"));

        let reopened = ConfigStore::new(&dir).unwrap();
        let (_, overrides) = reopened.snapshot();
        assert_eq!(overrides.entry_file, "");
    }

    #[test]
    fn test_reload_discards_memory_edits() {
        let (store, _temp) = store_in_temp();
        store.update(|c| c.nuitka.jobs = 4).unwrap();

        // Edit behind the store's back, then reload.
        let contents = fs::read_to_string(store.config_path()).unwrap();
        fs::write(store.config_path(), contents.replace("jobs: 4", "jobs: 2")).unwrap();
        store.reload().unwrap();
        assert_eq!(store.read(|c| c.nuitka.jobs), 2);
    }

    #[test]
    fn test_delete_falls_back_to_defaults() {
        let (store, _temp) = store_in_temp();
        store.update(|c| c.nuitka.jobs = 4).unwrap();

        store.delete().unwrap();
        assert!(!store.config_path().exists());
        assert_eq!(store.read(|c| c.nuitka.jobs), 0);

        // A durable update after delete must not resurrect the file.
        store.update(|c| c.nuitka.jobs = 9).unwrap();
        assert!(!store.config_path().exists());
    }

    #[test]
    fn test_parse_failure_is_raised() {
        let temp = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        fs::write(dir.join(CONFIG_FILENAME), "nuitka: [not, a, mapping").unwrap();

        assert!(matches!(
            ConfigStore::new(&dir),
            Err(ConfigError::Parse { .. })
        ));
    }
}
