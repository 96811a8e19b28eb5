//! Reader backend for the console build.
//!
//! Offers the virtual `none` reader, which lets scripts run without a card,
//! plus one `replay://<file>` reader per recorded session (`*.clf`) found in
//! the replay directory.

use cardpeek_core::{CardpeekError, OutputCallback, ReaderBackend, ReaderEvent, ReaderHandle, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const NONE_READER: &str = "none";
pub const REPLAY_SCHEME: &str = "replay://";
const REPLAY_EXTENSION: &str = "clf";

pub struct ConsoleBackend {
    replay_dir: PathBuf,
}

impl ConsoleBackend {
    pub fn new(replay_dir: impl Into<PathBuf>) -> Self {
        Self {
            replay_dir: replay_dir.into(),
        }
    }

    fn replay_files(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.replay_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(CardpeekError::ReaderEnumeration {
                    message: format!("cannot read {}: {}", self.replay_dir.display(), e),
                })
            }
        };

        let mut files: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_replay_file(path))
            .filter_map(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        files.sort();
        Ok(files)
    }
}

fn is_replay_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case(REPLAY_EXTENSION))
        .unwrap_or(false)
}

impl ReaderBackend for ConsoleBackend {
    fn list_readers(&self) -> Result<Vec<String>> {
        let mut readers = vec![NONE_READER.to_string()];
        readers.extend(
            self.replay_files()?
                .into_iter()
                .map(|file| format!("{}{}", REPLAY_SCHEME, file)),
        );
        Ok(readers)
    }

    fn open(&self, name: &str) -> Result<Box<dyn ReaderHandle>> {
        if name == NONE_READER {
            return Ok(Box::new(ConsoleReader::new(name, None)));
        }

        let file = name
            .strip_prefix(REPLAY_SCHEME)
            .ok_or_else(|| CardpeekError::ReaderOpen {
                reader: name.to_string(),
                message: "unknown reader".to_string(),
            })?;

        // Replay names are bare file names inside the replay directory.
        if file.is_empty() || file.contains(['/', '\\']) || file == ".." {
            return Err(CardpeekError::ReaderOpen {
                reader: name.to_string(),
                message: "invalid replay file name".to_string(),
            });
        }

        let path = self.replay_dir.join(file);
        if !path.is_file() {
            return Err(CardpeekError::ReaderOpen {
                reader: name.to_string(),
                message: format!("{} does not exist", path.display()),
            });
        }

        Ok(Box::new(ConsoleReader::new(name, Some(path))))
    }
}

/// Handle on the `none` reader or a replayed session.
struct ConsoleReader {
    name: String,
    replay: Option<PathBuf>,
    callback: Option<OutputCallback>,
}

impl ConsoleReader {
    fn new(name: &str, replay: Option<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            replay,
            callback: None,
        }
    }

    fn emit(&mut self, event: ReaderEvent) {
        if let Some(callback) = self.callback.as_mut() {
            callback(&event);
        }
    }
}

impl ReaderHandle for ConsoleReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_callback(&mut self, callback: Option<OutputCallback>) {
        let name = self.name.clone();
        if self.callback.is_some() {
            self.emit(ReaderEvent::Disconnected(name.clone()));
        }

        self.callback = callback;
        if self.callback.is_none() {
            return;
        }

        self.emit(ReaderEvent::Connected(name));
        if let Some(path) = self.replay.clone() {
            let trace = match fs::metadata(&path) {
                Ok(meta) => format!("replaying {} ({} bytes)", path.display(), meta.len()),
                Err(e) => format!("replaying {} (unreadable: {})", path.display(), e),
            };
            self.emit(ReaderEvent::Trace(trace));
        }
    }

    fn close(self: Box<Self>) -> Result<()> {
        debug!("Reader {} closed", self.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn recorder() -> (Arc<Mutex<Vec<ReaderEvent>>>, OutputCallback) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let callback: OutputCallback = Box::new(move |event: &ReaderEvent| {
            sink.lock().unwrap().push(event.clone());
        });
        (events, callback)
    }

    #[test]
    fn test_missing_replay_dir_lists_none_only() {
        let dir = TempDir::new().unwrap();
        let backend = ConsoleBackend::new(dir.path().join("replay"));

        assert_eq!(backend.list_readers().unwrap(), vec!["none".to_string()]);
    }

    #[test]
    fn test_replay_files_are_listed_sorted() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("visa.clf"), b"x").unwrap();
        fs::write(dir.path().join("amex.CLF"), b"x").unwrap();
        fs::write(dir.path().join("README"), b"x").unwrap();
        let backend = ConsoleBackend::new(dir.path());

        assert_eq!(
            backend.list_readers().unwrap(),
            vec![
                "none".to_string(),
                "replay://amex.CLF".to_string(),
                "replay://visa.clf".to_string(),
            ]
        );
    }

    #[test]
    fn test_open_unknown_reader_fails() {
        let dir = TempDir::new().unwrap();
        let backend = ConsoleBackend::new(dir.path());

        for name in ["pcsc://ACS", "replay://missing.clf", "replay://../x.clf"] {
            assert!(
                matches!(backend.open(name), Err(CardpeekError::ReaderOpen { .. })),
                "{} should not open",
                name
            );
        }
    }

    #[test]
    fn test_replay_reader_reports_through_callback() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("visa.clf"), b"0123").unwrap();
        let backend = ConsoleBackend::new(dir.path());
        let (events, callback) = recorder();

        let mut handle = backend.open("replay://visa.clf").unwrap();
        handle.set_callback(Some(callback));
        handle.set_callback(None);
        handle.close().unwrap();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], ReaderEvent::Connected("replay://visa.clf".to_string()));
        assert!(matches!(&events[1], ReaderEvent::Trace(line) if line.contains("4 bytes")));
        assert_eq!(events[2], ReaderEvent::Disconnected("replay://visa.clf".to_string()));
    }

    #[test]
    fn test_none_reader_opens() {
        let dir = TempDir::new().unwrap();
        let backend = ConsoleBackend::new(dir.path());
        let (events, callback) = recorder();

        let mut handle = backend.open("none").unwrap();
        handle.set_callback(Some(callback));

        assert_eq!(handle.name(), "none");
        assert_eq!(
            events.lock().unwrap().as_slice(),
            [ReaderEvent::Connected("none".to_string())]
        );
    }
}
