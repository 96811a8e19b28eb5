//! Throttled refresh of the cached ATR reference database.
//!
//! The schedule lives in the config store:
//! - `smartcard_list.auto_update` - `false` disables the check until re-enabled
//! - `smartcard_list.next_update` - epoch seconds before which nothing happens
//! - `smartcard_list.url` - optional source override
//!
//! A download lands in a sibling temp file first and is renamed over the cached
//! database only once complete, so readers of the cache never see a partial
//! file.

mod transfer;

pub use transfer::{HttpTransfer, Transfer};

use crate::atomic::replace_file;
use crate::config::{ConfigKeys, SyncConfig};
use crate::config_store::ConfigStore;
use crate::frontend::{Confirm, ProgressReporter, ProgressSink};
use crate::platform::PathRegistry;
use crate::{CardpeekError, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};
use url::Url;

/// Result of [`SyncScheduler::maybe_sync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Not eligible yet, or the question was dismissed.
    Skipped,
    /// The cached database was replaced.
    Updated,
    /// The user asked to be reminded later.
    Deferred,
    /// Automatic updates are switched off.
    Disabled,
    /// The transfer or the swap failed; the next eligible run retries.
    Failed,
}

/// Snapshot of the sync settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncState {
    pub auto_update: bool,
    pub next_update: i64,
    pub source_url: Option<String>,
}

impl SyncState {
    pub fn load(config: &ConfigStore) -> Self {
        Self {
            auto_update: config.get_bool(ConfigKeys::AUTO_UPDATE, true),
            next_update: config.get_int(ConfigKeys::NEXT_UPDATE, 0),
            source_url: config.get_string(ConfigKeys::SOURCE_URL),
        }
    }

    /// The configured source when it is a usable http(s) URL, else the default.
    pub fn resolve_source_url(&self) -> String {
        match self.source_url.as_deref() {
            None => SyncConfig::DEFAULT_SOURCE_URL.to_string(),
            Some(raw) => match Url::parse(raw) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => url.into(),
                Ok(url) => {
                    warn!("Ignoring source URL with unsupported scheme '{}'", url.scheme());
                    SyncConfig::DEFAULT_SOURCE_URL.to_string()
                }
                Err(e) => {
                    warn!("Ignoring invalid source URL '{}': {}", raw, e);
                    SyncConfig::DEFAULT_SOURCE_URL.to_string()
                }
            },
        }
    }
}

const UPDATE_OPTIONS: [&str; 3] = ["Yes", "No, ask me again later", "No, always use the local copy"];
const YES: usize = 0;
const LATER: usize = 1;
const NEVER: usize = 2;

pub struct SyncScheduler<T: Transfer> {
    transfer: T,
    database: PathBuf,
    download: PathBuf,
}

impl<T: Transfer> SyncScheduler<T> {
    pub fn new(paths: &PathRegistry, transfer: T) -> Self {
        Self {
            transfer,
            database: paths.database_file(),
            download: paths.database_download_file(),
        }
    }

    /// Run the throttled update check against the current time.
    pub async fn maybe_sync<U>(&self, config: &mut ConfigStore, ui: &mut U) -> SyncOutcome
    where
        U: Confirm + ProgressReporter + ?Sized,
    {
        let now = chrono::Utc::now().timestamp();
        self.maybe_sync_at(config, ui, now).await
    }

    /// Run the throttled update check as if the current time were `now`.
    pub async fn maybe_sync_at<U>(
        &self,
        config: &mut ConfigStore,
        ui: &mut U,
        now: i64,
    ) -> SyncOutcome
    where
        U: Confirm + ProgressReporter + ?Sized,
    {
        let state = SyncState::load(config);

        if !state.auto_update {
            info!("{} auto-update is disabled", self.database_name());
            return SyncOutcome::Disabled;
        }

        if now < state.next_update {
            debug!(
                "Next database update not before {} ({}s from now)",
                state.next_update,
                state.next_update - now
            );
            return SyncOutcome::Skipped;
        }

        let question = "The local copy of the ATR database may be outdated.\n\
                        Do you wish to do an online update?";
        match ui.confirm(question, &UPDATE_OPTIONS) {
            Some(YES) => {}
            Some(LATER) => {
                config.set_int(ConfigKeys::NEXT_UPDATE, now + SyncConfig::DEFER_SECS);
                return SyncOutcome::Deferred;
            }
            Some(NEVER) => {
                config.set_bool(ConfigKeys::AUTO_UPDATE, false);
                return SyncOutcome::Disabled;
            }
            _ => return SyncOutcome::Skipped,
        }

        info!("Attempting to update {}", self.database_name());
        let url = state.resolve_source_url();

        let mut progress = ui.start_progress("Downloading file", "Please wait...");
        let result = self.download(&url, progress.as_mut()).await;
        progress.finish();

        let outcome = match result {
            Ok(bytes) => {
                info!("Updated {} ({} bytes)", self.database_name(), bytes);
                config.set_int(ConfigKeys::NEXT_UPDATE, now + SyncConfig::REFRESH_SECS);
                SyncOutcome::Updated
            }
            Err(e) => {
                error!(
                    category = ?e.category(),
                    "Failed to update {}: {}",
                    self.database_name(),
                    e
                );
                SyncOutcome::Failed
            }
        };

        if let Err(e) = config.save() {
            warn!("Failed to save settings after database update: {}", e);
        }
        outcome
    }

    /// Download into the temp file, then swap it over the cached database.
    async fn download(&self, url: &str, progress: &mut dyn ProgressSink) -> Result<u64> {
        let mut file =
            File::create(&self.download).map_err(|e| CardpeekError::io_with_path(e, &self.download))?;

        let fetched = self.transfer.fetch(url, &mut file, progress).await;
        let bytes = match fetched.and_then(|bytes| {
            file.flush()
                .and_then(|_| file.sync_all())
                .map(|_| bytes)
                .map_err(|e| CardpeekError::io_with_path(e, &self.download))
        }) {
            Ok(bytes) => bytes,
            Err(e) => {
                drop(file);
                if let Err(remove_err) = fs::remove_file(&self.download) {
                    warn!(
                        "Failed to remove {}: {}",
                        self.download.display(),
                        remove_err
                    );
                }
                return Err(e);
            }
        };
        drop(file);

        replace_file(&self.download, &self.database)?;
        Ok(bytes)
    }

    fn database_name(&self) -> String {
        self.database
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.database.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{NullProgress, Progress};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    const NOW: i64 = 1_700_000_000;

    enum Script {
        Succeed(&'static [u8], Option<u64>),
        /// Write a partial body, then fail.
        FailAfter(&'static [u8]),
    }

    struct FakeTransfer {
        script: Script,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl FakeTransfer {
        fn new(script: Script) -> Self {
            Self {
                script,
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl Transfer for FakeTransfer {
        async fn fetch(
            &self,
            url: &str,
            out: &mut (dyn Write + Send),
            progress: &mut dyn ProgressSink,
        ) -> Result<u64> {
            self.calls.lock().unwrap().push(url.to_string());
            match self.script {
                Script::Succeed(body, total) => {
                    for (i, chunk) in body.chunks(4).enumerate() {
                        out.write_all(chunk)?;
                        let done = ((i * 4) + chunk.len()) as u64;
                        progress.update(Progress::from_counts(done, total));
                    }
                    Ok(body.len() as u64)
                }
                Script::FailAfter(partial) => {
                    out.write_all(partial)?;
                    Err(CardpeekError::DownloadFailed {
                        url: url.to_string(),
                        message: "server returned 404 Not Found".to_string(),
                    })
                }
            }
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        updates: Arc<Mutex<Vec<Progress>>>,
        finished: Arc<Mutex<bool>>,
    }

    impl ProgressSink for RecordingProgress {
        fn update(&mut self, progress: Progress) {
            self.updates.lock().unwrap().push(progress);
        }

        fn finish(&mut self) {
            *self.finished.lock().unwrap() = true;
        }
    }

    struct FakeUi {
        answer: Option<usize>,
        asked: usize,
        updates: Arc<Mutex<Vec<Progress>>>,
        finished: Arc<Mutex<bool>>,
    }

    impl FakeUi {
        fn answering(answer: Option<usize>) -> Self {
            Self {
                answer,
                asked: 0,
                updates: Arc::new(Mutex::new(Vec::new())),
                finished: Arc::new(Mutex::new(false)),
            }
        }
    }

    impl Confirm for FakeUi {
        fn confirm(&mut self, _question: &str, _options: &[&str]) -> Option<usize> {
            self.asked += 1;
            self.answer
        }
    }

    impl ProgressReporter for FakeUi {
        fn start_progress(&mut self, _title: &str, _message: &str) -> Box<dyn ProgressSink> {
            Box::new(RecordingProgress {
                updates: Arc::clone(&self.updates),
                finished: Arc::clone(&self.finished),
            })
        }
    }

    struct Env {
        _home: TempDir,
        paths: PathRegistry,
        config: ConfigStore,
    }

    fn env() -> Env {
        let home = TempDir::new().unwrap();
        let paths = PathRegistry::from_home(home.path());
        fs::create_dir_all(paths.state_dir()).unwrap();
        fs::write(paths.database_file(), "old database\n").unwrap();
        let config = ConfigStore::load(paths.config_file());
        Env {
            _home: home,
            paths,
            config,
        }
    }

    #[tokio::test]
    async fn test_disabled_regardless_of_schedule() {
        for next_update in [0, NOW - 1, NOW, NOW + 1_000_000] {
            let mut env = env();
            env.config.set_bool(ConfigKeys::AUTO_UPDATE, false);
            env.config.set_int(ConfigKeys::NEXT_UPDATE, next_update);
            let scheduler =
                SyncScheduler::new(&env.paths, FakeTransfer::new(Script::Succeed(b"new", None)));
            let mut ui = FakeUi::answering(Some(YES));

            let outcome = scheduler.maybe_sync_at(&mut env.config, &mut ui, NOW).await;

            assert_eq!(outcome, SyncOutcome::Disabled);
            assert_eq!(ui.asked, 0);
            assert!(scheduler.transfer.calls.lock().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_skipped_before_next_update() {
        let mut env = env();
        env.config.set_int(ConfigKeys::NEXT_UPDATE, NOW + 1);
        let before = SyncState::load(&env.config);
        let scheduler =
            SyncScheduler::new(&env.paths, FakeTransfer::new(Script::Succeed(b"new", None)));
        let mut ui = FakeUi::answering(Some(YES));

        let outcome = scheduler.maybe_sync_at(&mut env.config, &mut ui, NOW).await;

        assert_eq!(outcome, SyncOutcome::Skipped);
        assert_eq!(ui.asked, 0);
        assert_eq!(SyncState::load(&env.config), before);
    }

    #[tokio::test]
    async fn test_scheduled_exactly_now_proceeds() {
        let mut env = env();
        env.config.set_int(ConfigKeys::NEXT_UPDATE, NOW);
        let scheduler =
            SyncScheduler::new(&env.paths, FakeTransfer::new(Script::Succeed(b"new", None)));
        let mut ui = FakeUi::answering(Some(LATER));

        let outcome = scheduler.maybe_sync_at(&mut env.config, &mut ui, NOW).await;

        assert_eq!(outcome, SyncOutcome::Deferred);
        assert_eq!(ui.asked, 1);
    }

    #[tokio::test]
    async fn test_not_now_defers_one_day() {
        let mut env = env();
        env.config.set_bool(ConfigKeys::AUTO_UPDATE, true);
        env.config.set_int(ConfigKeys::NEXT_UPDATE, 0);
        let scheduler =
            SyncScheduler::new(&env.paths, FakeTransfer::new(Script::Succeed(b"new", None)));
        let mut ui = FakeUi::answering(Some(LATER));

        let outcome = scheduler.maybe_sync_at(&mut env.config, &mut ui, NOW).await;

        assert_eq!(outcome, SyncOutcome::Deferred);
        assert_eq!(env.config.get_int(ConfigKeys::NEXT_UPDATE, 0), NOW + 86_400);
        assert!(scheduler.transfer.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_never_disables_auto_update() {
        let mut env = env();
        let scheduler =
            SyncScheduler::new(&env.paths, FakeTransfer::new(Script::Succeed(b"new", None)));
        let mut ui = FakeUi::answering(Some(NEVER));

        let outcome = scheduler.maybe_sync_at(&mut env.config, &mut ui, NOW).await;

        assert_eq!(outcome, SyncOutcome::Disabled);
        assert!(!env.config.get_bool(ConfigKeys::AUTO_UPDATE, true));

        // Stays disabled on later runs without asking.
        let outcome = scheduler
            .maybe_sync_at(&mut env.config, &mut ui, NOW + 10 * 86_400)
            .await;
        assert_eq!(outcome, SyncOutcome::Disabled);
        assert_eq!(ui.asked, 1);
    }

    #[tokio::test]
    async fn test_dismissed_question_changes_nothing() {
        let mut env = env();
        let before = SyncState::load(&env.config);
        let scheduler =
            SyncScheduler::new(&env.paths, FakeTransfer::new(Script::Succeed(b"new", None)));
        let mut ui = FakeUi::answering(None);

        let outcome = scheduler.maybe_sync_at(&mut env.config, &mut ui, NOW).await;

        assert_eq!(outcome, SyncOutcome::Skipped);
        assert_eq!(SyncState::load(&env.config), before);
    }

    #[tokio::test]
    async fn test_successful_transfer_replaces_database() {
        let mut env = env();
        let body: &'static [u8] = b"3B 02 14 50\n\tSchlumberger Multiflex 3k\n";
        let scheduler = SyncScheduler::new(
            &env.paths,
            FakeTransfer::new(Script::Succeed(body, Some(body.len() as u64))),
        );
        let mut ui = FakeUi::answering(Some(YES));

        let outcome = scheduler.maybe_sync_at(&mut env.config, &mut ui, NOW).await;

        assert_eq!(outcome, SyncOutcome::Updated);
        assert_eq!(fs::read(env.paths.database_file()).unwrap(), body);
        assert!(!env.paths.database_download_file().exists());
        assert_eq!(
            env.config.get_int(ConfigKeys::NEXT_UPDATE, 0),
            NOW + 30 * 86_400
        );
        // Settings were persisted.
        let reloaded = ConfigStore::load(env.paths.config_file());
        assert_eq!(reloaded.get_int(ConfigKeys::NEXT_UPDATE, 0), NOW + 30 * 86_400);

        let updates = ui.updates.lock().unwrap();
        assert!(!updates.is_empty());
        assert_eq!(*updates.last().unwrap(), Progress::Fraction(1.0));
        assert!(*ui.finished.lock().unwrap());
    }

    #[tokio::test]
    async fn test_unknown_size_reports_pulses() {
        let mut env = env();
        let scheduler = SyncScheduler::new(
            &env.paths,
            FakeTransfer::new(Script::Succeed(b"0123456789", None)),
        );
        let mut ui = FakeUi::answering(Some(YES));

        scheduler.maybe_sync_at(&mut env.config, &mut ui, NOW).await;

        let updates = ui.updates.lock().unwrap();
        assert!(!updates.is_empty());
        assert!(updates.iter().all(|p| *p == Progress::Pulse));
    }

    #[tokio::test]
    async fn test_failed_transfer_keeps_database_and_schedule() {
        let mut env = env();
        env.config.set_int(ConfigKeys::NEXT_UPDATE, NOW - 5);
        let scheduler = SyncScheduler::new(
            &env.paths,
            FakeTransfer::new(Script::FailAfter(b"3B 02 14")),
        );
        let mut ui = FakeUi::answering(Some(YES));

        let outcome = scheduler.maybe_sync_at(&mut env.config, &mut ui, NOW).await;

        assert_eq!(outcome, SyncOutcome::Failed);
        assert_eq!(
            fs::read_to_string(env.paths.database_file()).unwrap(),
            "old database\n"
        );
        assert!(!env.paths.database_download_file().exists());
        assert_eq!(env.config.get_int(ConfigKeys::NEXT_UPDATE, 0), NOW - 5);
        assert!(*ui.finished.lock().unwrap());
    }

    #[tokio::test]
    async fn test_replace_failure_is_failed() {
        let mut env = env();
        // A directory in place of the database makes the rename fail.
        fs::remove_file(env.paths.database_file()).unwrap();
        fs::create_dir_all(env.paths.database_file().join("occupied")).unwrap();
        let scheduler =
            SyncScheduler::new(&env.paths, FakeTransfer::new(Script::Succeed(b"new", None)));
        let mut ui = FakeUi::answering(Some(YES));

        let outcome = scheduler.maybe_sync_at(&mut env.config, &mut ui, NOW).await;

        assert_eq!(outcome, SyncOutcome::Failed);
        assert!(!env.paths.database_download_file().exists());
        assert_eq!(env.config.get_int(ConfigKeys::NEXT_UPDATE, 0), 0);
    }

    #[tokio::test]
    async fn test_uses_configured_source() {
        let mut env = env();
        env.config
            .set_string(ConfigKeys::SOURCE_URL, "https://mirror.example.org/list.txt");
        let scheduler =
            SyncScheduler::new(&env.paths, FakeTransfer::new(Script::Succeed(b"new", None)));
        let mut ui = FakeUi::answering(Some(YES));

        scheduler.maybe_sync_at(&mut env.config, &mut ui, NOW).await;

        assert_eq!(
            scheduler.transfer.calls.lock().unwrap().as_slice(),
            ["https://mirror.example.org/list.txt".to_string()]
        );
    }

    #[test]
    fn test_resolve_source_url_falls_back() {
        let mut state = SyncState {
            auto_update: true,
            next_update: 0,
            source_url: None,
        };
        assert_eq!(state.resolve_source_url(), SyncConfig::DEFAULT_SOURCE_URL);

        state.source_url = Some("not a url".to_string());
        assert_eq!(state.resolve_source_url(), SyncConfig::DEFAULT_SOURCE_URL);

        state.source_url = Some("file:///etc/passwd".to_string());
        assert_eq!(state.resolve_source_url(), SyncConfig::DEFAULT_SOURCE_URL);
    }

    #[tokio::test]
    async fn test_download_without_state_dir_fails_cleanly() {
        let home = TempDir::new().unwrap();
        let paths = PathRegistry::from_home(home.path());
        let scheduler =
            SyncScheduler::new(&paths, FakeTransfer::new(Script::Succeed(b"new", None)));

        let result = scheduler.download("http://example.org", &mut NullProgress).await;
        assert!(result.is_err());
        assert!(!paths.state_dir().exists());
    }
}
