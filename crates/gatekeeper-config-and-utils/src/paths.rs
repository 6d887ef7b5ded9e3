//! File system paths for the gatekeeper.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Manages file system paths for the gatekeeper.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for runtime files (~/.gatekeeper)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.gatekeeper`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".gatekeeper"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.gatekeeper).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.gatekeeper/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Default location of the Google service-account key (~/.gatekeeper/service-account.json).
    pub fn service_account_file(&self) -> PathBuf {
        self.base_dir.join("service-account.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_with_base_dir() {
        let base = PathBuf::from("/tmp/test-gatekeeper");
        let paths = Paths::with_base_dir(base.clone());

        assert_eq!(paths.base_dir(), &base);
        assert_eq!(paths.config_file(), base.join("config.json"));
        assert_eq!(
            paths.service_account_file(),
            base.join("service-account.json")
        );
    }

    #[test]
    fn test_paths_default() {
        let paths = Paths::new().unwrap();
        let home = dirs::home_dir().unwrap();

        assert_eq!(paths.base_dir(), &home.join(".gatekeeper"));
    }

    #[test]
    fn test_ensure_dirs_creates_base() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("nested").join("gatekeeper");
        let paths = Paths::with_base_dir(base.clone());

        paths.ensure_dirs().unwrap();
        assert!(base.is_dir());
    }
}
