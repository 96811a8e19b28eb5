//! Creation and migration of the local state directory.
//!
//! The state directory holds the scripts shipped with the program. Its
//! `version` marker records which script version was installed last; when it
//! is older than what this build expects, the user is offered an upgrade that
//! re-extracts the embedded bundle over the existing files.
//!
//! Extraction is not rolled back on failure. The marker is written last and
//! only after every step succeeded, so an interrupted run is retried in full
//! on the next start.

use crate::atomic::atomic_write_bytes;
use crate::bundle::{AssetBundle, Extractor, TarGzExtractor};
use crate::frontend::Confirm;
use crate::platform::PathRegistry;
use crate::{CardpeekError, Result};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Result of [`EnvironmentProvisioner::ensure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// Installed scripts are at least as recent as expected. Nothing was touched.
    UpToDate,
    /// Outdated scripts were replaced.
    Migrated,
    /// The user declined; nothing was extracted.
    Declined,
    /// The state directory was created from scratch.
    Created,
    /// A step failed; the user was told and the next run will retry.
    Failed,
}

/// Answers to the "scripts are outdated" question.
const UPGRADE_OPTIONS: [&str; 3] = ["Yes", "No", "No, don't ask me again"];
const UPGRADE: usize = 0;
const NEVER_ASK: usize = 2;

const CREATE_OPTIONS: [&str; 2] = ["Yes", "No"];
const CREATE: usize = 0;

pub struct EnvironmentProvisioner<'a> {
    paths: &'a PathRegistry,
    bundle: AssetBundle,
    expected_version: u32,
    extractor: Box<dyn Extractor>,
}

impl<'a> EnvironmentProvisioner<'a> {
    pub fn new(paths: &'a PathRegistry, bundle: AssetBundle, expected_version: u32) -> Self {
        Self {
            paths,
            bundle,
            expected_version,
            extractor: Box::new(TarGzExtractor),
        }
    }

    /// Replace the archive extraction mechanism.
    pub fn with_extractor(mut self, extractor: Box<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Bring the state directory up to the expected script version, asking first.
    pub fn ensure<C: Confirm + ?Sized>(&self, ui: &mut C) -> ProvisionOutcome {
        let state_dir = self.paths.state_dir();

        let success = match fs::metadata(state_dir) {
            Ok(_) => {
                debug!("Found directory '{}'", state_dir.display());

                let installed = self.installed_version();
                if installed >= self.expected_version {
                    debug!("Scripts are up to date (version {})", installed);
                    return ProvisionOutcome::UpToDate;
                }

                let question = format!(
                    "Some scripts in '{}' seem to come from an older version of Cardpeek.\n\
                     Do you want to upgrade these scripts?",
                    state_dir.display()
                );
                match ui.confirm(&question, &UPGRADE_OPTIONS) {
                    Some(UPGRADE) => ProvisionOutcome::Migrated,
                    Some(NEVER_ASK) => {
                        debug!("The scripts in '{}' will not be upgraded", state_dir.display());
                        if let Err(e) = self.write_version_marker() {
                            warn!("Could not record declined upgrade: {}", e);
                        }
                        return ProvisionOutcome::Declined;
                    }
                    _ => {
                        debug!("The scripts in '{}' will not be upgraded", state_dir.display());
                        return ProvisionOutcome::Declined;
                    }
                }
            }
            Err(e) => {
                let question = format!(
                    "It seems this is the first time you run Cardpeek, because\n\
                     '{}' does not exist ({}).\n\
                     Do you want to create '{}'?",
                    state_dir.display(),
                    e,
                    state_dir.display()
                );
                if ui.confirm(&question, &CREATE_OPTIONS) != Some(CREATE) {
                    debug!("'{}' will not be created", state_dir.display());
                    return ProvisionOutcome::Declined;
                }
                ProvisionOutcome::Created
            }
        };

        self.rename_legacy_replay_dir();

        if let Err(e) = self.install_bundle() {
            error!(
                category = ?e.category(),
                "Provisioning of '{}' failed: {}",
                state_dir.display(),
                e
            );
            ui.notify(&format!(
                "Installing the default files in '{}' failed, aborting.\n{}",
                self.paths.home_dir().display(),
                e
            ));
            return ProvisionOutcome::Failed;
        }

        ui.notify(
            "Note: the files have been created.\n\
             It is recommended that you quit and restart Cardpeek for changes to take effect.",
        );
        success
    }

    /// Version recorded in the marker file; 0 when missing or unreadable.
    pub fn installed_version(&self) -> u32 {
        read_version_marker(&self.paths.version_file())
    }

    fn write_version_marker(&self) -> Result<()> {
        let marker = format!("{}\n", self.expected_version);
        atomic_write_bytes(&self.paths.version_file(), marker.as_bytes())
    }

    /// Older releases kept recorded sessions in a differently named directory.
    fn rename_legacy_replay_dir(&self) {
        let legacy = self.paths.legacy_replay_dir();
        if !legacy.is_dir() {
            return;
        }

        let current = self.paths.replay_dir();
        match fs::rename(&legacy, &current) {
            Ok(()) => info!("Renamed {} to {}", legacy.display(), current.display()),
            Err(e) => warn!(
                "Failed to rename {} to {}: {}",
                legacy.display(),
                current.display(),
                e
            ),
        }
    }

    /// Materialise the bundle next to the state directory, unpack it, clean up,
    /// then record the new version.
    fn install_bundle(&self) -> Result<()> {
        let bytes = self.bundle.bytes()?;
        let archive = self.paths.bundle_archive();
        let home = self.paths.home_dir();

        if let Err(e) = write_archive(&archive, bytes) {
            let _ = fs::remove_file(&archive);
            return Err(e);
        }
        debug!("Wrote {} bytes to {}", bytes.len(), archive.display());

        info!("Creating files in {}", home.display());
        match self.extractor.extract(&archive, home) {
            Ok(count) => info!("Extracted {} files from {}", count, self.bundle.name()),
            Err(e) => {
                let _ = fs::remove_file(&archive);
                return Err(e);
            }
        }

        fs::remove_file(&archive).map_err(|e| CardpeekError::io_with_path(e, &archive))?;

        self.write_version_marker()?;
        info!(
            "Scripts in '{}' are now at version {}",
            self.paths.state_dir().display(),
            self.expected_version
        );
        Ok(())
    }
}

fn write_archive(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = fs::File::create(path).map_err(|e| CardpeekError::io_with_path(e, path))?;
    file.write_all(bytes)
        .and_then(|_| file.flush())
        .map_err(|e| CardpeekError::io_with_path(e, path))
}

/// Parse the leading unsigned integer of the marker file.
///
/// Values past `u32::MAX` saturate so a newer marker is never read as older.
pub fn read_version_marker(path: &Path) -> u32 {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            debug!("No readable version marker at {}: {}", path.display(), e);
            return 0;
        }
    };

    let digits: String = content
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return 0;
    }
    // Only digits remain, so parsing fails on overflow alone.
    digits.parse::<u32>().unwrap_or(u32::MAX)
}
