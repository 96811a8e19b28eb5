//! Capabilities the lifecycle core needs from its surroundings.
//!
//! The core never renders anything or interprets card data itself. It asks
//! questions through [`Confirm`], picks readers through [`Select`], reports
//! download progress through [`ProgressSink`], and hands commands to a
//! [`Runtime`]. The binary provides console implementations; tests provide
//! scripted ones.

use crate::session::ReaderEvent;
use crate::Result;

/// Ask the user a question with a fixed set of answers.
pub trait Confirm {
    /// Returns the index of the chosen option, or `None` if the question was
    /// dismissed without an answer.
    fn confirm(&mut self, question: &str, options: &[&str]) -> Option<usize>;

    /// Show an informational message that only needs acknowledging.
    fn notify(&mut self, message: &str) {
        let _ = self.confirm(message, &["OK"]);
    }
}

/// Let the user pick one reader from an enumerated list.
pub trait Select {
    /// `readers` is never empty. Returns `None` when the user picks nothing.
    fn select_reader(&mut self, readers: &[String]) -> Option<String>;
}

/// Progress of a transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progress {
    /// Completed share of the transfer, `0.0..=1.0`.
    Fraction(f64),
    /// Still alive, total size unknown.
    Pulse,
}

impl Progress {
    /// Progress from byte counts; without a known, non-zero total this is a pulse.
    pub fn from_counts(done: u64, total: Option<u64>) -> Self {
        match total {
            Some(total) if total > 0 => Progress::Fraction((done as f64 / total as f64).min(1.0)),
            _ => Progress::Pulse,
        }
    }
}

/// Receives progress updates, once per received chunk.
pub trait ProgressSink: Send {
    fn update(&mut self, progress: Progress);

    /// Called once when the transfer is over, whatever the outcome.
    fn finish(&mut self) {}
}

/// Opens progress displays.
pub trait ProgressReporter {
    fn start_progress(&mut self, title: &str, message: &str) -> Box<dyn ProgressSink>;
}

/// Sink for everything a reader reports while its session is open.
pub type OutputCallback = Box<dyn FnMut(&ReaderEvent) + Send>;

/// The scripting engine that interprets card data.
pub trait Runtime {
    fn init(&mut self) -> Result<()>;

    /// Make the opened reader available to scripts.
    fn attach_reader(&mut self, _reader: &str) {}

    fn run_command(&mut self, command: &str) -> Result<()>;

    fn release(&mut self);
}

/// Everything the process controller needs from the presentation layer.
pub trait Frontend: Confirm + Select + ProgressReporter {
    /// Callback that displays reader output (the reader view).
    fn reader_output(&mut self) -> OutputCallback;

    /// Run until the user quits. Commands typed by the user go to `runtime`.
    fn run_event_loop(&mut self, runtime: &mut dyn Runtime) -> Result<()>;
}

/// Progress sink that discards every update.
#[derive(Debug, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn update(&mut self, _progress: Progress) {}
}
