use solaudit_core::{AnalyzerConfig, AuditError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, warn};

const SCRATCH_PREFIX: &str = "contract_";

/// Creates uniquely named scratch files holding submitted source text.
#[derive(Debug, Clone)]
pub struct ScratchFileManager {
    dir: PathBuf,
    suffix: String,
}

impl ScratchFileManager {
    pub fn new(dir: impl Into<PathBuf>, suffix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            suffix: suffix.into(),
        }
    }

    pub fn from_config(config: &AnalyzerConfig) -> Self {
        let dir = config
            .scratch_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        Self::new(dir, config.file_suffix.clone())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `source` to a fresh file. Creation is exclusive, so concurrent
    /// requests can never land on the same path.
    pub fn acquire(&self, source: &str) -> Result<ScratchFile> {
        std::fs::create_dir_all(&self.dir).map_err(AuditError::ScratchSetup)?;

        let mut file = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .suffix(&self.suffix)
            .tempfile_in(&self.dir)
            .map_err(AuditError::ScratchSetup)?;

        // On error `file` is dropped here, which removes the half-written file.
        file.write_all(source.as_bytes())
            .and_then(|_| file.flush())
            .map_err(AuditError::ScratchSetup)?;

        // Close our handle so the analysis tool sees a settled file.
        let path = file.into_temp_path();
        debug!(path = %path.display(), bytes = source.len(), "Scratch file created");

        Ok(ScratchFile { path })
    }
}

/// A scratch file owned by exactly one analysis run.
///
/// `release` deletes it. If the value is dropped without being released the
/// file is deleted by `Drop` instead, so each file is removed exactly once.
#[derive(Debug)]
pub struct ScratchFile {
    path: TempPath,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file. A failure is logged and returned for bookkeeping only;
    /// callers must not let it replace a result they already hold.
    pub fn release(self) -> std::io::Result<()> {
        let shown = self.path.display().to_string();
        match self.path.close() {
            Ok(()) => {
                debug!(path = %shown, "Scratch file removed");
                Ok(())
            }
            Err(e) => {
                warn!(path = %shown, error = %e, "Failed to remove scratch file");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (tempfile::TempDir, ScratchFileManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = ScratchFileManager::new(dir.path().join("scratch"), ".sol");
        (dir, manager)
    }

    #[test]
    fn test_acquire_writes_exact_bytes() {
        let (_dir, manager) = manager();
        let source = "pragma solidity ^0.8.0;\ncontract C { uint x; }\n";

        let scratch = manager.acquire(source).unwrap();
        assert_eq!(std::fs::read_to_string(scratch.path()).unwrap(), source);

        let name = scratch.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(SCRATCH_PREFIX));
        assert!(name.ends_with(".sol"));
        assert!(scratch.path().starts_with(manager.dir()));
    }

    #[test]
    fn test_paths_are_unique() {
        let (_dir, manager) = manager();
        let a = manager.acquire("contract A {}").unwrap();
        let b = manager.acquire("contract A {}").unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_release_removes_file() {
        let (_dir, manager) = manager();
        let scratch = manager.acquire("contract C {}").unwrap();
        let path = scratch.path().to_path_buf();

        scratch.release().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_removes_file() {
        let (_dir, manager) = manager();
        let path = {
            let scratch = manager.acquire("contract C {}").unwrap();
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_release_failure_is_reported_not_panicked() {
        let (_dir, manager) = manager();
        let scratch = manager.acquire("contract C {}").unwrap();
        std::fs::remove_file(scratch.path()).unwrap();

        let err = scratch.release().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn test_unusable_directory_is_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "occupied").unwrap();

        let manager = ScratchFileManager::new(&blocker, ".sol");
        let err = manager.acquire("contract C {}").unwrap_err();
        assert!(matches!(err, AuditError::ScratchSetup(_)));
    }
}
