//! Platform abstraction layer.
//!
//! All OS-specific behaviour lives here rather than being scattered through the
//! lifecycle code:
//! - `paths` - home/state directory layout
//! - `fault` - fatal signal handler

pub mod fault;
pub mod paths;

pub use fault::{FaultGuard, GuardState};
pub use paths::PathRegistry;

use crate::config::AppConfig;
use sysinfo::System;

/// Returns the current platform name.
pub fn current_platform() -> &'static str {
    #[cfg(target_os = "linux")]
    {
        "linux"
    }
    #[cfg(target_os = "windows")]
    {
        "windows"
    }
    #[cfg(target_os = "macos")]
    {
        "macos"
    }
    #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
    {
        "unknown"
    }
}

/// One-line description of the program and the host it runs on.
///
/// Example: `cardpeek 0.8.4 on Ubuntu 24.04 (linux 6.8.0-45-generic)`.
pub fn system_string() -> String {
    let os = System::name().unwrap_or_else(|| current_platform().to_string());
    let os_version = System::os_version().unwrap_or_default();
    let kernel = System::kernel_version().unwrap_or_else(|| "unknown".to_string());

    let mut host = os;
    if !os_version.is_empty() {
        host.push(' ');
        host.push_str(&os_version);
    }

    format!(
        "{} {} on {} ({} {})",
        AppConfig::APP_NAME,
        AppConfig::VERSION,
        host,
        current_platform(),
        kernel
    )
}
