//! Resolution of the logical locations Cardpeek reads and writes.
//!
//! Everything lives under the user's home directory:
//! - `~/.cardpeek` - state directory (scripts, config, log, cached database)
//! - `~/.cardpeek/version` - installed script version marker
//! - `~/dot_cardpeek.tar.gz` - temporary copy of the asset bundle during provisioning

use crate::config::PathsConfig;
use crate::error::{CardpeekError, Result};
use std::path::{Path, PathBuf};

/// Concrete paths for one run, derived from a single home directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRegistry {
    home: PathBuf,
    state_dir: PathBuf,
}

impl PathRegistry {
    /// Resolve paths from the current user's home directory.
    pub fn discover() -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| CardpeekError::Config {
            message: "Could not determine home directory".to_string(),
        })?;
        Ok(Self::from_home(home))
    }

    /// Resolve paths below an explicit home directory.
    pub fn from_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let state_dir = home.join(PathsConfig::STATE_DIR_NAME);
        Self { home, state_dir }
    }

    pub fn home_dir(&self) -> &Path {
        &self.home
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Where older releases kept recorded sessions.
    pub fn legacy_replay_dir(&self) -> PathBuf {
        self.state_dir.join(PathsConfig::LEGACY_REPLAY_DIR_NAME)
    }

    pub fn replay_dir(&self) -> PathBuf {
        self.state_dir.join(PathsConfig::REPLAY_DIR_NAME)
    }

    pub fn version_file(&self) -> PathBuf {
        self.state_dir.join(PathsConfig::VERSION_FILE_NAME)
    }

    pub fn config_file(&self) -> PathBuf {
        self.state_dir.join(PathsConfig::CONFIG_FILE_NAME)
    }

    pub fn log_file(&self) -> PathBuf {
        self.state_dir.join(PathsConfig::LOG_FILE_NAME)
    }

    /// Cached copy of the ATR reference database.
    pub fn database_file(&self) -> PathBuf {
        self.state_dir.join(PathsConfig::DATABASE_FILE_NAME)
    }

    /// Temporary download target, renamed over [`Self::database_file`] on success.
    pub fn database_download_file(&self) -> PathBuf {
        self.state_dir.join(PathsConfig::DATABASE_DOWNLOAD_NAME)
    }

    /// Temporary archive written while materialising the asset bundle.
    pub fn bundle_archive(&self) -> PathBuf {
        self.home.join(PathsConfig::BUNDLE_ARCHIVE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_below_home() {
        let paths = PathRegistry::from_home("/home/alice");

        assert_eq!(paths.state_dir(), Path::new("/home/alice/.cardpeek"));
        assert_eq!(paths.version_file(), PathBuf::from("/home/alice/.cardpeek/version"));
        assert_eq!(
            paths.bundle_archive(),
            PathBuf::from("/home/alice/dot_cardpeek.tar.gz")
        );
        assert_eq!(paths.legacy_replay_dir(), PathBuf::from("/home/alice/.cardpeek/logs"));
        assert_eq!(paths.replay_dir(), PathBuf::from("/home/alice/.cardpeek/replay"));
    }

    #[test]
    fn test_download_file_is_sibling_of_database() {
        let paths = PathRegistry::from_home("/home/alice");
        // The swap is a rename, which is only atomic within one directory.
        assert_eq!(
            paths.database_file().parent(),
            paths.database_download_file().parent()
        );
    }
}
