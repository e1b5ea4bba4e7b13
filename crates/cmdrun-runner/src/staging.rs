//! Copying embedded files into the working directory and removing them
//! again.

use std::path::{Path, PathBuf};

use cmdrun_common::{validate_file_name, EmbeddedFile};
use cmdrun_store::BlobStore;

use crate::error::StagingError;

type Cleanup = Box<dyn FnOnce() -> std::io::Result<()> + Send>;

/// Ordered releases that must each run exactly once.
///
/// Call [`CleanupStack::run`] on every exit path. Dropping a stack that was
/// never run releases it anyway.
#[derive(Default)]
pub struct CleanupStack {
    entries: Vec<(String, Cleanup)>,
}

impl CleanupStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a release. `label` identifies it in logs.
    pub fn push(
        &mut self,
        label: impl Into<String>,
        cleanup: impl FnOnce() -> std::io::Result<()> + Send + 'static,
    ) {
        self.entries.push((label.into(), Box::new(cleanup)));
    }

    /// Remove `path` when the stack runs.
    pub fn push_remove_file(&mut self, path: PathBuf) {
        let label = path.display().to_string();
        self.push(label, move || std::fs::remove_file(&path));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run every release in insertion order. Failures are logged.
    pub fn run(mut self) {
        self.release_all();
    }

    fn release_all(&mut self) {
        for (label, cleanup) in self.entries.drain(..) {
            match cleanup() {
                Ok(()) => tracing::trace!(cleanup = %label, "released"),
                Err(e) => tracing::warn!(cleanup = %label, error = %e, "cleanup failed"),
            }
        }
    }
}

impl Drop for CleanupStack {
    fn drop(&mut self) {
        self.release_all();
    }
}

impl std::fmt::Debug for CleanupStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(label, _)| label))
            .finish()
    }
}

/// Write every file into `workdir` as `<workdir>/<name>`.
///
/// Returns one removal per staged file. If any file fails, the files
/// already written are removed before the error is returned.
pub async fn stage_files(
    workdir: &Path,
    files: &[EmbeddedFile],
    blobs: &dyn BlobStore,
) -> Result<CleanupStack, StagingError> {
    let mut cleanup = CleanupStack::new();

    for file in files {
        // Dropping `cleanup` on the early returns removes earlier files.
        if validate_file_name(&file.name).is_err() {
            return Err(StagingError::InvalidName(file.name.clone()));
        }

        let content = blobs
            .file_content(file.id)
            .await
            .map_err(|source| StagingError::Fetch {
                name: file.name.clone(),
                source,
            })?;

        let path = workdir.join(&file.name);
        tokio::fs::write(&path, &content)
            .await
            .map_err(|source| StagingError::Write {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(path = %path.display(), bytes = content.len(), "staged file");
        cleanup.push_remove_file(path);
    }

    Ok(cleanup)
}
