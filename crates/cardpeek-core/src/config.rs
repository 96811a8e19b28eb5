//! Centralized configuration constants for the Cardpeek core.

use std::time::Duration;

/// Application-level configuration.
pub struct AppConfig;

impl AppConfig {
    pub const APP_NAME: &'static str = "cardpeek";
    pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");
    /// Version of the bundled scripts this build expects to find on disk.
    pub const SCRIPT_VERSION: u32 = 84;
    /// Exit status used when the fault guard terminates the process.
    pub const FAULT_EXIT_CODE: i32 = 254;
}

/// Remote reference database synchronisation.
pub struct SyncConfig;

impl SyncConfig {
    pub const DEFAULT_SOURCE_URL: &'static str =
        "http://ludovic.rousseau.free.fr/softwares/pcsc-tools/smartcard_list.txt";
    /// Delay applied when the user asks to be reminded later.
    pub const DEFER_SECS: i64 = 24 * 3600;
    /// Delay applied after a successful update.
    pub const REFRESH_SECS: i64 = 30 * 24 * 3600;
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
}

/// Keys held in the config store.
pub struct ConfigKeys;

impl ConfigKeys {
    pub const AUTO_UPDATE: &'static str = "smartcard_list.auto_update";
    pub const NEXT_UPDATE: &'static str = "smartcard_list.next_update";
    pub const SOURCE_URL: &'static str = "smartcard_list.url";
}

/// File and directory names below the home and state directories.
pub struct PathsConfig;

impl PathsConfig {
    pub const STATE_DIR_NAME: &'static str = ".cardpeek";
    pub const LEGACY_REPLAY_DIR_NAME: &'static str = "logs";
    pub const REPLAY_DIR_NAME: &'static str = "replay";
    pub const VERSION_FILE_NAME: &'static str = "version";
    pub const CONFIG_FILE_NAME: &'static str = "config.json";
    pub const LOG_FILE_NAME: &'static str = "cardpeek.log";
    pub const DATABASE_FILE_NAME: &'static str = "smartcard_list.txt";
    pub const DATABASE_DOWNLOAD_NAME: &'static str = "smartcard_list.download";
    pub const BUNDLE_ARCHIVE_NAME: &'static str = "dot_cardpeek.tar.gz";
}

/// User agent sent with database downloads.
pub fn user_agent() -> String {
    format!("{}/{}", AppConfig::APP_NAME, AppConfig::VERSION)
}
