//! Reader session management.
//!
//! At most one reader session is opened per run. The session owns the reader
//! handle and closes it when dropped, so every exit path that unwinds through
//! the controller releases the reader.

use crate::frontend::{Confirm, OutputCallback, Select};
use crate::Result;
use std::fmt;
use tracing::{debug, error, info, warn};

/// Something a reader reports while its session is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderEvent {
    Connected(String),
    Disconnected(String),
    /// Free-form trace line (APDU exchange, replay step, ...).
    Trace(String),
}

impl fmt::Display for ReaderEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReaderEvent::Connected(name) => write!(f, "connected to {}", name),
            ReaderEvent::Disconnected(name) => write!(f, "disconnected from {}", name),
            ReaderEvent::Trace(line) => f.write_str(line),
        }
    }
}

/// An open reader.
pub trait ReaderHandle: Send {
    fn name(&self) -> &str;

    /// Route reader output to `callback`, or stop routing it with `None`.
    fn set_callback(&mut self, callback: Option<OutputCallback>);

    fn close(self: Box<Self>) -> Result<()>;
}

/// Source of readers.
pub trait ReaderBackend {
    fn list_readers(&self) -> Result<Vec<String>>;

    fn open(&self, name: &str) -> Result<Box<dyn ReaderHandle>>;
}

/// The reader session of this run.
pub struct ReaderSession {
    handle: Option<Box<dyn ReaderHandle>>,
    name: String,
}

impl ReaderSession {
    fn new(handle: Box<dyn ReaderHandle>) -> Self {
        let name = handle.name().to_string();
        Self {
            handle: Some(handle),
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Detach the output callback and close the reader.
    pub fn close(mut self) -> Result<()> {
        self.close_handle()
    }

    fn close_handle(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(mut handle) => {
                handle.set_callback(None);
                debug!("Closing reader {}", self.name);
                handle.close()
            }
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ReaderSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderSession")
            .field("name", &self.name)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Drop for ReaderSession {
    fn drop(&mut self) {
        if let Err(e) = self.close_handle() {
            warn!("Failed to close reader {}: {}", self.name, e);
        }
    }
}

/// Chooses and opens the reader of this run.
pub struct SessionManager<B: ReaderBackend> {
    backend: B,
    opened: bool,
}

impl<B: ReaderBackend> SessionManager<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            opened: false,
        }
    }

    /// Open the requested reader, or ask the user to pick one.
    ///
    /// Returns `None` when no reader is available, the user picks nothing, the
    /// open fails, or a session was already opened by this manager. An open
    /// failure is reported through `ui`. On success `callback` receives
    /// everything the reader reports.
    pub fn open<S: Select + Confirm + ?Sized>(
        &mut self,
        requested: Option<&str>,
        ui: &mut S,
        callback: OutputCallback,
    ) -> Option<ReaderSession> {
        if self.opened {
            warn!("A reader session was already opened in this run");
            return None;
        }

        let name = match requested {
            Some(name) => name.to_string(),
            None => self.choose(ui)?,
        };

        self.opened = true;
        match self.backend.open(&name) {
            Ok(mut handle) => {
                handle.set_callback(Some(callback));
                info!("Opened reader {}", handle.name());
                Some(ReaderSession::new(handle))
            }
            Err(e) => {
                error!(category = ?e.category(), "Failed to open reader '{}': {}", name, e);
                ui.notify(&format!("Failed to open reader '{}': {}", name, e));
                None
            }
        }
    }

    /// Close `session` explicitly, reporting any error.
    pub fn close(&self, session: ReaderSession) {
        let name = session.name().to_string();
        if let Err(e) = session.close() {
            warn!("Failed to close reader {}: {}", name, e);
        }
    }

    fn choose<S: Select + ?Sized>(&self, ui: &mut S) -> Option<String> {
        let readers = match self.backend.list_readers() {
            Ok(readers) => readers,
            Err(e) => {
                error!("Failed to enumerate readers: {}", e);
                return None;
            }
        };

        if readers.is_empty() {
            info!("No card readers available");
            return None;
        }

        let choice = ui.select_reader(&readers)?;
        if !readers.contains(&choice) {
            warn!("Selected reader '{}' is not in the enumerated list", choice);
        }
        Some(choice)
    }
}
