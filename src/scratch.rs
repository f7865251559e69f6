//! Throwaway working directory for engine calls that write files.
//!
//! IQ-TREE drops `.iqtree`, `.log`, `.ckp.gz` and friends into the current
//! directory. [`ScratchDir::enter`] switches into a fresh temporary directory
//! and the guard switches back (and deletes it) when dropped, including on
//! early returns.
//!
//! The working directory is process-wide, so this is only sound while engine
//! calls are serialised, which the boundary already requires.

use std::env;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{trace, warn};

use crate::error::Result;

#[derive(Debug)]
pub struct ScratchDir {
    original: PathBuf,
    dir: TempDir,
}

impl ScratchDir {
    /// Create a temporary directory prefixed with `label` and make it the
    /// working directory.
    pub fn enter(label: &str) -> Result<Self> {
        let original = env::current_dir()?;
        let dir = tempfile::Builder::new().prefix(&format!("iqtree_{label}_")).tempdir()?;
        env::set_current_dir(dir.path())?;
        trace!(path = %dir.path().display(), "entered scratch directory");
        Ok(ScratchDir { original, dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = env::set_current_dir(&self.original) {
            warn!(error = %e, path = %self.original.display(), "failed to restore working directory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restores_directory_and_removes_files() {
        let before = env::current_dir().unwrap();
        let scratch_path;
        {
            let scratch = ScratchDir::enter("test").unwrap();
            scratch_path = scratch.path().to_path_buf();
            std::fs::write("report.iqtree", "log").unwrap();
            assert!(scratch_path.join("report.iqtree").exists());
        }
        assert_eq!(env::current_dir().unwrap(), before);
        assert!(!scratch_path.exists());
    }
}
