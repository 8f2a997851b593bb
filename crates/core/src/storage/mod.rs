//! On-disk artifact storage.
//!
//! Layout under the data directory:
//!
//! ```text
//! cases/        durable artifacts, served publicly
//! staging/      in-progress downloads, one directory per run
//! recovered/    artifacts whose record could not be written
//! diagnostics/  failure snapshots
//! ```
//!
//! All operations are synchronous; moves within the data directory are
//! renames, so promoting an artifact never leaves a partial file behind.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::case::sanitize_file_stem;
use crate::config::StorageConfig;
use crate::session::DiagnosticSnapshot;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Artifact missing: {0}")]
    Missing(PathBuf),

    #[error("Artifact is empty: {0}")]
    Empty(PathBuf),

    #[error("Artifact name mismatch: expected {expected}, got {actual}")]
    NameMismatch { expected: String, actual: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Artifact storage rooted at a data directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    cases_dir: PathBuf,
    staging_dir: PathBuf,
    recovered_dir: PathBuf,
    diagnostics_dir: PathBuf,
    public_base_url: String,
    extension: String,
}

impl ArtifactStore {
    pub fn new(config: &StorageConfig) -> Self {
        let root = &config.data_dir;
        Self {
            cases_dir: root.join("cases"),
            staging_dir: root.join("staging"),
            recovered_dir: root.join("recovered"),
            diagnostics_dir: root.join("diagnostics"),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
            extension: config.artifact_extension.trim_start_matches('.').to_string(),
        }
    }

    /// Create the directory layout if missing.
    pub fn ensure_layout(&self) -> Result<(), StorageError> {
        for dir in [
            &self.cases_dir,
            &self.staging_dir,
            &self.recovered_dir,
            &self.diagnostics_dir,
        ] {
            fs::create_dir_all(dir).map_err(io_err(dir))?;
        }
        Ok(())
    }

    /// Directory served under `/static/`.
    pub fn cases_dir(&self) -> &Path {
        &self.cases_dir
    }

    /// Artifact file name for a case number.
    pub fn file_name_for(&self, case_number: &str) -> String {
        let stem = sanitize_file_stem(case_number);
        if self.extension.is_empty() {
            stem
        } else {
            format!("{}.{}", stem, self.extension)
        }
    }

    pub fn artifact_path(&self, file_name: &str) -> PathBuf {
        self.cases_dir.join(file_name)
    }

    /// Whether a non-empty artifact with this name is stored.
    pub fn contains(&self, file_name: &str) -> bool {
        is_non_empty_file(&self.artifact_path(file_name))
    }

    /// Public URL of a stored artifact.
    pub fn public_url(&self, file_name: &str) -> String {
        format!("{}/static/{}", self.public_base_url, file_name)
    }

    /// Path where a run should write its download. The run's staging
    /// directory is created.
    pub fn staging_path(&self, run_id: &str, file_name: &str) -> Result<PathBuf, StorageError> {
        let dir = self.staging_dir.join(run_id);
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        Ok(dir.join(file_name))
    }

    /// Remove a run's staging directory and anything left in it.
    pub fn discard_staging(&self, run_id: &str) {
        let dir = self.staging_dir.join(run_id);
        match fs::remove_dir_all(&dir) {
            Ok(()) => debug!(path = %dir.display(), "Staging directory removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %dir.display(), "Failed to remove staging directory: {}", e),
        }
    }

    /// Check a downloaded artifact: it must exist, be non-empty and carry
    /// the expected file name. Returns its size.
    pub fn verify_staged(&self, path: &Path, expected_name: &str) -> Result<u64, StorageError> {
        let actual = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if actual != expected_name {
            return Err(StorageError::NameMismatch {
                expected: expected_name.to_string(),
                actual,
            });
        }

        let metadata = match fs::metadata(path) {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Err(StorageError::Missing(path.to_path_buf())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::Missing(path.to_path_buf()))
            }
            Err(e) => return Err(io_err(path)(e)),
        };

        if metadata.len() == 0 {
            return Err(StorageError::Empty(path.to_path_buf()));
        }
        Ok(metadata.len())
    }

    /// Move a verified artifact into `cases/`, replacing any previous copy.
    pub fn promote(&self, staged: &Path, file_name: &str) -> Result<PathBuf, StorageError> {
        let target = self.artifact_path(file_name);
        move_file(staged, &target)?;
        debug!(path = %target.display(), "Artifact promoted");
        Ok(target)
    }

    /// Move an artifact into `recovered/` so a later run can persist it
    /// without downloading again.
    pub fn quarantine(&self, path: &Path) -> Result<PathBuf, StorageError> {
        let file_name = path
            .file_name()
            .ok_or_else(|| StorageError::Missing(path.to_path_buf()))?;
        let target = self.recovered_dir.join(file_name);
        move_file(path, &target)?;
        Ok(target)
    }

    /// A non-empty recovered artifact for this file name, if any.
    pub fn recovered(&self, file_name: &str) -> Option<PathBuf> {
        let path = self.recovered_dir.join(file_name);
        is_non_empty_file(&path).then_some(path)
    }

    /// Move a recovered artifact back into `cases/`.
    pub fn restore_recovered(&self, file_name: &str) -> Result<PathBuf, StorageError> {
        let source = self.recovered_dir.join(file_name);
        if !is_non_empty_file(&source) {
            return Err(StorageError::Missing(source));
        }
        self.promote(&source, file_name)
    }

    /// Write a failure snapshot (JSON plus PNG screenshot when present).
    /// Returns the path of the JSON file.
    pub fn write_diagnostic(&self, snapshot: &DiagnosticSnapshot) -> Result<PathBuf, StorageError> {
        fs::create_dir_all(&self.diagnostics_dir).map_err(io_err(&self.diagnostics_dir))?;

        let base = format!(
            "{}-{}-{}",
            sanitize_file_stem(&snapshot.case_number),
            snapshot.captured_at.format("%Y%m%dT%H%M%S%3f"),
            snapshot.step
        );

        let json_path = self.diagnostics_dir.join(format!("{}.json", base));
        let json = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        fs::write(&json_path, json).map_err(io_err(&json_path))?;

        if let Some(ref png) = snapshot.screenshot {
            let png_path = self.diagnostics_dir.join(format!("{}.png", base));
            if let Err(e) = fs::write(&png_path, png) {
                warn!(path = %png_path.display(), "Failed to write screenshot: {}", e);
            }
        }

        Ok(json_path)
    }
}

fn is_non_empty_file(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

fn move_file(from: &Path, to: &Path) -> Result<(), StorageError> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        // Cross-device: fall back to copy + remove.
        Err(_) if from.exists() => {
            fs::copy(from, to).map_err(io_err(to))?;
            fs::remove_file(from).map_err(io_err(from))?;
            Ok(())
        }
        Err(e) => Err(io_err(from)(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::PageState;
    use tempfile::TempDir;

    fn create_store(extension: &str) -> (TempDir, ArtifactStore) {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(&StorageConfig {
            data_dir: dir.path().to_path_buf(),
            public_base_url: "http://files.example/".to_string(),
            artifact_extension: extension.to_string(),
        });
        store.ensure_layout().unwrap();
        (dir, store)
    }

    #[test]
    fn test_file_name_for() {
        let (_dir, store) = create_store("pdf");
        assert_eq!(store.file_name_for("0001"), "0001.pdf");
        assert_eq!(store.file_name_for("a/b"), "a_b.pdf");

        let (_dir, bare) = create_store("");
        assert_eq!(bare.file_name_for("0001"), "0001");
    }

    #[test]
    fn test_public_url() {
        let (_dir, store) = create_store("pdf");
        assert_eq!(
            store.public_url("0001.pdf"),
            "http://files.example/static/0001.pdf"
        );
    }

    #[test]
    fn test_contains_requires_non_empty_file() {
        let (_dir, store) = create_store("pdf");
        assert!(!store.contains("x.pdf"));

        fs::write(store.artifact_path("x.pdf"), b"").unwrap();
        assert!(!store.contains("x.pdf"));

        fs::write(store.artifact_path("x.pdf"), b"%PDF").unwrap();
        assert!(store.contains("x.pdf"));
    }

    #[test]
    fn test_verify_staged() {
        let (_dir, store) = create_store("pdf");
        let path = store.staging_path("run-1", "0001.pdf").unwrap();

        assert!(matches!(
            store.verify_staged(&path, "0001.pdf"),
            Err(StorageError::Missing(_))
        ));

        fs::write(&path, b"").unwrap();
        assert!(matches!(
            store.verify_staged(&path, "0001.pdf"),
            Err(StorageError::Empty(_))
        ));

        fs::write(&path, b"%PDF-1.4").unwrap();
        assert_eq!(store.verify_staged(&path, "0001.pdf").unwrap(), 8);
        assert!(matches!(
            store.verify_staged(&path, "0002.pdf"),
            Err(StorageError::NameMismatch { .. })
        ));
    }

    #[test]
    fn test_promote_and_discard_staging() {
        let (_dir, store) = create_store("pdf");
        let staged = store.staging_path("run-1", "0001.pdf").unwrap();
        fs::write(&staged, b"data").unwrap();

        let target = store.promote(&staged, "0001.pdf").unwrap();
        assert_eq!(target, store.artifact_path("0001.pdf"));
        assert!(store.contains("0001.pdf"));
        assert!(!staged.exists());

        store.discard_staging("run-1");
        assert!(!staged.parent().unwrap().exists());
        // discarding twice is fine
        store.discard_staging("run-1");
    }

    #[test]
    fn test_quarantine_and_restore() {
        let (_dir, store) = create_store("pdf");
        let staged = store.staging_path("run-1", "0001.pdf").unwrap();
        fs::write(&staged, b"data").unwrap();

        let recovered = store.quarantine(&staged).unwrap();
        assert!(recovered.exists());
        assert_eq!(store.recovered("0001.pdf"), Some(recovered.clone()));

        let restored = store.restore_recovered("0001.pdf").unwrap();
        assert!(store.contains("0001.pdf"));
        assert!(!recovered.exists());
        assert_eq!(restored, store.artifact_path("0001.pdf"));
        assert!(store.recovered("0001.pdf").is_none());
    }

    #[test]
    fn test_restore_missing_fails() {
        let (_dir, store) = create_store("pdf");
        assert!(matches!(
            store.restore_recovered("none.pdf"),
            Err(StorageError::Missing(_))
        ));
    }

    #[test]
    fn test_write_diagnostic() {
        let (_dir, store) = create_store("pdf");
        let snapshot = DiagnosticSnapshot::new(
            "0001",
            "locating_result",
            "timed out",
            PageState {
                url: Some("https://portal/list".to_string()),
                title: None,
                page_source: Some("<html></html>".to_string()),
                screenshot: Some(vec![0x89, b'P', b'N', b'G']),
            },
        );

        let path = store.write_diagnostic(&snapshot).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("locating_result"));
        assert!(contents.contains("https://portal/list"));
        assert!(path.with_extension("png").exists());
    }
}
