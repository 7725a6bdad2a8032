//! Artifact Sink: holds the last delivered artifact for preview and saving.
//!
//! A success is written once to a temporary file that serves as the preview
//! handle. `save` copies the retained bytes to the output directory and may
//! be repeated; it never re-fetches. A failure carries its consolidated
//! message and the per-attempt causes behind it.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::info;

use crate::delivery::classify::MediaType;
use crate::delivery::{DeliveryFailure, DeliveryResult, Source};

/// Base name of every saved artifact.
pub const DEFAULT_FILE_STEM: &str = "propisi";

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write preview file: {0}")]
    Preview(#[source] std::io::Error),

    #[error("failed to save {path}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug)]
pub struct Artifact {
    bytes: Bytes,
    media_type: MediaType,
    source: Source,
    preview: NamedTempFile,
}

impl Artifact {
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    /// Viewable copy of the artifact, valid while the artifact is held.
    pub fn preview_path(&self) -> &Path {
        self.preview.path()
    }

    /// `<stem>.pdf`, or `<stem>.png` / `<stem>.jpg` for images.
    fn file_name_with(&self, stem: &str) -> String {
        format!("{stem}.{}", self.media_type.extension())
    }

    /// Writes the artifact to `dir/propisi.<ext>` and returns the path.
    ///
    /// Goes through a sibling temp file and a rename, so a reader never sees
    /// a partial file. Repeating the call rewrites identical bytes.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<PathBuf, SinkError> {
        self.save_as(dir, DEFAULT_FILE_STEM)
    }

    /// Like [`Artifact::save`] with a caller-chosen base name.
    pub fn save_as(&self, dir: impl AsRef<Path>, stem: &str) -> Result<PathBuf, SinkError> {
        let dir = dir.as_ref();
        let path = dir.join(self.file_name_with(stem));
        let save_err = |source| SinkError::Save {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(dir).map_err(save_err)?;
        let mut staged = NamedTempFile::new_in(dir).map_err(save_err)?;
        staged.write_all(&self.bytes).map_err(save_err)?;
        staged.as_file().sync_all().map_err(save_err)?;
        staged.persist(&path).map_err(|e| save_err(e.error))?;

        info!(path = %path.display(), size = self.bytes.len(), "artifact saved");
        Ok(path)
    }
}

/// What the caller can show after an operation completes.
#[derive(Debug, Clone)]
pub enum Presentation {
    Ready(Arc<Artifact>),
    Failed(DeliveryFailure),
}

impl Presentation {
    pub fn artifact(&self) -> Option<&Arc<Artifact>> {
        match self {
            Presentation::Ready(artifact) => Some(artifact),
            Presentation::Failed(_) => None,
        }
    }
}

/// Turns a delivery result into something previewable.
pub fn present(result: DeliveryResult) -> Result<Presentation, SinkError> {
    match result {
        DeliveryResult::Success {
            bytes,
            media_type,
            source,
        } => {
            let mut preview = tempfile::Builder::new()
                .prefix("propisi-preview-")
                .suffix(&format!(".{}", media_type.extension()))
                .tempfile()
                .map_err(SinkError::Preview)?;
            preview.write_all(&bytes).map_err(SinkError::Preview)?;
            preview.flush().map_err(SinkError::Preview)?;
            Ok(Presentation::Ready(Arc::new(Artifact {
                bytes,
                media_type,
                source,
                preview,
            })))
        }
        DeliveryResult::Failure(failure) => Ok(Presentation::Failed(failure)),
    }
}
