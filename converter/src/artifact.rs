use std::{
    fs,
    path::{Path, PathBuf},
};

/// Deletes a file or directory on drop unless it was kept. Guards outputs
/// that must not survive a failed attempt.
#[derive(Debug)]
pub(crate) struct PartialArtifact {
    path: PathBuf,
    keep: bool,
}

impl PartialArtifact {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            keep: false,
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn keep(mut self) -> PathBuf {
        self.keep = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for PartialArtifact {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        remove_path(&self.path);
    }
}

pub(crate) fn remove_path(path: &Path) {
    let removed = if path.is_dir() {
        fs::remove_dir_all(path)
    } else if path.exists() {
        fs::remove_file(path)
    } else {
        return;
    };
    match removed {
        Ok(()) => log::info!("removed partial artifact: {:?}", path),
        Err(e) => log::warn!("failed to remove {:?}: {}", path, e),
    }
}
