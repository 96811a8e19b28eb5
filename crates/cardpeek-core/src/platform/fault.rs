//! Last-resort handler for fatal memory faults.
//!
//! Once the handler fires it may only use async-signal-safe primitives: raw
//! `write(2)` of bytes prepared ahead of time, `close(2)` and `_exit(2)`. It never
//! touches the allocator, a lock, or the tracing stack.
//!
//! Everything the handler prints is prepared before the fault:
//! - a fixed banner
//! - the log file path, registered with [`FaultGuard::set_log_path`]
//! - a fixed signature
//! - `Received signal N`, formatted into a stack buffer

#![allow(unsafe_code)]

#[cfg(unix)]
use crate::config::AppConfig;
use crate::error::Result;
use std::path::Path;
use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};
use std::sync::OnceLock;
use tracing::{debug, warn};

const BANNER: &[u8] = concat!(
    "***************************************************************\n",
    " Oops...\n",
    "  Cardpeek has encountered a problem and has exited abnormally.\n",
    "  Additional information may be available in the log file\n",
    "\n",
    "  ",
)
.as_bytes();

const SIGNATURE: &[u8] = concat!(
    "\n\n",
    "  Please report this at https://github.com/L1L1/cardpeek/issues\n",
    "***************************************************************\n",
)
.as_bytes();

const SIGNAL_PREFIX: &[u8] = b"Received signal ";

static STATE: AtomicU8 = AtomicU8::new(GuardState::Disarmed as u8);
static LOG_FD: AtomicI32 = AtomicI32::new(-1);
static LOG_PATH: OnceLock<Box<[u8]>> = OnceLock::new();

/// Lifecycle of the fault handler. `Firing` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GuardState {
    Disarmed = 0,
    Armed = 1,
    Firing = 2,
}

impl GuardState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => GuardState::Armed,
            2 => GuardState::Firing,
            _ => GuardState::Disarmed,
        }
    }
}

/// Process-wide fatal signal guard.
///
/// The handler state is necessarily global since a signal handler cannot
/// receive a context pointer.
pub struct FaultGuard;

impl FaultGuard {
    /// Install the handler for SIGSEGV and SIGBUS.
    ///
    /// Installing twice is harmless.
    pub fn install() -> Result<()> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

            let action = SigAction::new(
                SigHandler::Handler(handle_fatal_signal),
                SaFlags::SA_RESETHAND,
                SigSet::empty(),
            );

            for signal in [Signal::SIGSEGV, Signal::SIGBUS] {
                // SAFETY: the handler only performs async-signal-safe calls on
                // data prepared before it was installed.
                unsafe { sigaction(signal, &action) }?;
            }
        }

        #[cfg(not(unix))]
        {
            warn!("Fault guard is not available on this platform");
        }

        STATE.store(GuardState::Armed as u8, Ordering::SeqCst);
        debug!("Fault guard armed");
        Ok(())
    }

    /// Register the log file path printed by the handler.
    ///
    /// Only the first registration sticks; returns false for later calls.
    pub fn set_log_path(path: &Path) -> bool {
        let bytes = path.to_string_lossy().into_owned().into_bytes();
        let accepted = LOG_PATH.set(bytes.into_boxed_slice()).is_ok();
        if !accepted {
            warn!("Fault guard log path already registered");
        }
        accepted
    }

    /// Register the raw descriptor of the open log file so the handler can close it.
    pub fn set_log_fd(fd: i32) {
        LOG_FD.store(fd, Ordering::SeqCst);
    }

    /// Forget the log descriptor, e.g. once the log file has been closed normally.
    pub fn clear_log_fd() {
        LOG_FD.store(-1, Ordering::SeqCst);
    }

    pub fn state() -> GuardState {
        GuardState::from_u8(STATE.load(Ordering::SeqCst))
    }
}

/// Format `Received signal N\n` into `buf` without allocating.
pub fn format_signal_line(signum: i32, buf: &mut [u8; 32]) -> &[u8] {
    let mut len = SIGNAL_PREFIX.len();
    buf[..len].copy_from_slice(SIGNAL_PREFIX);

    if signum < 0 {
        buf[len] = b'-';
        len += 1;
    }

    let mut value = signum.unsigned_abs();
    let mut digits = [0u8; 10];
    let mut count = 0;
    loop {
        digits[count] = b'0' + (value % 10) as u8;
        count += 1;
        value /= 10;
        if value == 0 {
            break;
        }
    }
    while count > 0 {
        count -= 1;
        buf[len] = digits[count];
        len += 1;
    }

    buf[len] = b'\n';
    &buf[..=len]
}

#[cfg(unix)]
fn write_stderr(bytes: &[u8]) {
    // SAFETY: write(2) is async-signal-safe; the slice is valid for its length.
    unsafe {
        libc::write(libc::STDERR_FILENO, bytes.as_ptr().cast(), bytes.len());
    }
}

#[cfg(unix)]
extern "C" fn handle_fatal_signal(signum: libc::c_int) {
    let previous = STATE.swap(GuardState::Firing as u8, Ordering::SeqCst);
    if previous == GuardState::Firing as u8 {
        // SAFETY: _exit(2) is async-signal-safe.
        unsafe { libc::_exit(AppConfig::FAULT_EXIT_CODE) }
    }

    write_stderr(BANNER);
    if let Some(path) = LOG_PATH.get() {
        write_stderr(path);
    }
    write_stderr(SIGNATURE);

    let mut buf = [0u8; 32];
    write_stderr(format_signal_line(signum, &mut buf));

    let fd = LOG_FD.swap(-1, Ordering::SeqCst);
    if fd >= 0 {
        // SAFETY: close(2) is async-signal-safe; the descriptor was registered
        // by the owner of the log file and is not reused after this point.
        unsafe {
            libc::close(fd);
        }
    }

    // SAFETY: _exit(2) skips atexit handlers and stdio flushing, both unsafe here.
    unsafe { libc::_exit(AppConfig::FAULT_EXIT_CODE) }
}
