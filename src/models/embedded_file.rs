use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// How an embedded entry maps onto the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// A single file
    #[default]
    File,
    /// An entire directory
    Directory,
    /// A glob pattern inside a directory
    Pattern,
}

/// Validation failures for an [`EmbeddedFile`] entry.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("source path does not exist: {0}")]
    SourceMissing(String),

    #[error("destination path must use forward slashes: {0}")]
    BackslashInDestination(String),

    #[error("destination path must be relative (no leading /): {0}")]
    AbsoluteDestination(String),

    #[error("pattern entries require a non-empty pattern")]
    MissingPattern,
}

/// A data file or directory to bundle into the compiled executable.
///
/// Maps a source path on disk to a destination path relative to the
/// program directory inside the distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedFile {
    #[serde(rename = "source-path", default)]
    pub source_path: String,

    #[serde(rename = "destination-path", default)]
    pub destination_path: String,

    #[serde(default)]
    pub kind: FileKind,

    /// Only meaningful for [`FileKind::Directory`] entries.
    #[serde(default)]
    pub recursive: bool,

    /// Required for [`FileKind::Pattern`] entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl EmbeddedFile {
    pub fn new(source_path: impl Into<String>, destination_path: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            destination_path: destination_path.into(),
            kind: FileKind::File,
            recursive: false,
            pattern: None,
        }
    }

    /// Check that this entry could actually be handed to the compiler.
    ///
    /// Pure predicate apart from the source-path existence check; it never
    /// touches the destination side.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !Path::new(&self.source_path).exists() {
            return Err(ValidationError::SourceMissing(self.source_path.clone()));
        }

        if self.destination_path.contains('\\') {
            return Err(ValidationError::BackslashInDestination(
                self.destination_path.clone(),
            ));
        }

        if self.destination_path.starts_with('/') {
            return Err(ValidationError::AbsoluteDestination(
                self.destination_path.clone(),
            ));
        }

        if self.kind == FileKind::Pattern && self.pattern.as_deref().unwrap_or("").is_empty() {
            return Err(ValidationError::MissingPattern);
        }

        Ok(())
    }
}
