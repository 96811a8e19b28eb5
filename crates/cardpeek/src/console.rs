//! Console implementations of the frontend capabilities.

use cardpeek_core::{
    CardpeekError, Confirm, Frontend, OutputCallback, Progress, ProgressReporter, ProgressSink,
    ReaderEvent, Result, Runtime, Select,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

const QUIT_COMMAND: &str = "quit";
const BAR_SCALE: u64 = 1000;

/// Prompts, reader view and command loop over a line-oriented console.
pub struct ConsoleFrontend<R: BufRead, W: Write> {
    input: R,
    output: W,
    stop: Arc<AtomicBool>,
}

impl<R: BufRead, W: Write> ConsoleFrontend<R, W> {
    pub fn new(input: R, output: W, stop: Arc<AtomicBool>) -> Self {
        Self {
            input,
            output,
            stop,
        }
    }

    /// Next trimmed input line, or `None` at end of input.
    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim().to_string()),
            Err(e) => {
                warn!("Failed to read console input: {}", e);
                None
            }
        }
    }

    /// Print a numbered list and read a 1-based choice.
    fn choose(&mut self, items: &[&str]) -> Option<usize> {
        for (i, item) in items.iter().enumerate() {
            let _ = writeln!(self.output, "  {}) {}", i + 1, item);
        }
        let _ = write!(self.output, "> ");
        let _ = self.output.flush();

        let line = self.read_line()?;
        match line.parse::<usize>() {
            Ok(n) if (1..=items.len()).contains(&n) => Some(n - 1),
            _ => {
                if !line.is_empty() {
                    let _ = writeln!(self.output, "Invalid choice '{}'", line);
                }
                None
            }
        }
    }
}

impl<R: BufRead, W: Write> Confirm for ConsoleFrontend<R, W> {
    fn confirm(&mut self, question: &str, options: &[&str]) -> Option<usize> {
        let _ = writeln!(self.output, "\n{}", question);
        let choice = self.choose(options);
        debug!("Answered {:?} to '{}'", choice, question.lines().next().unwrap_or(""));
        choice
    }

    fn notify(&mut self, message: &str) {
        let _ = writeln!(self.output, "\n{}", message);
        let _ = self.output.flush();
    }
}

impl<R: BufRead, W: Write> Select for ConsoleFrontend<R, W> {
    fn select_reader(&mut self, readers: &[String]) -> Option<String> {
        let _ = writeln!(self.output, "\nSelect a card reader to use:");
        let names: Vec<&str> = readers.iter().map(String::as_str).collect();
        self.choose(&names).map(|i| readers[i].clone())
    }
}

impl<R: BufRead, W: Write> ProgressReporter for ConsoleFrontend<R, W> {
    fn start_progress(&mut self, title: &str, message: &str) -> Box<dyn ProgressSink> {
        Box::new(ConsoleProgress::new(title, message))
    }
}

impl<R: BufRead, W: Write> Frontend for ConsoleFrontend<R, W> {
    fn reader_output(&mut self) -> OutputCallback {
        Box::new(|event: &ReaderEvent| println!("[reader] {}", event))
    }

    fn run_event_loop(&mut self, runtime: &mut dyn Runtime) -> Result<()> {
        let _ = writeln!(
            self.output,
            "\nEnter commands, '{}' or end of input to exit.",
            QUIT_COMMAND
        );

        loop {
            if self.stop.load(Ordering::SeqCst) {
                info!("Interrupted, leaving the event loop");
                break;
            }

            let _ = write!(self.output, "cardpeek> ");
            let _ = self.output.flush();

            let Some(line) = self.read_line() else {
                break;
            };
            if self.stop.load(Ordering::SeqCst) || line == QUIT_COMMAND {
                break;
            }
            if line.is_empty() {
                continue;
            }

            if let Err(e) = runtime.run_command(&line) {
                let _ = writeln!(self.output, "Error: {}", e);
            }
        }

        Ok(())
    }
}

/// Download progress on stderr: a bar when the size is known, a spinner otherwise.
pub struct ConsoleProgress {
    bar: ProgressBar,
    determinate: bool,
}

impl ConsoleProgress {
    pub fn new(title: &str, message: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {prefix}: {msg}") {
            bar.set_style(style);
        }
        bar.set_prefix(title.to_string());
        bar.set_message(message.to_string());
        Self {
            bar,
            determinate: false,
        }
    }
}

impl ProgressSink for ConsoleProgress {
    fn update(&mut self, progress: Progress) {
        match progress {
            Progress::Fraction(fraction) => {
                if !self.determinate {
                    self.bar.set_length(BAR_SCALE);
                    if let Ok(style) = ProgressStyle::default_bar()
                        .template("{prefix}: [{bar:40}] {percent}% {msg}")
                    {
                        self.bar.set_style(style.progress_chars("=> "));
                    }
                    self.determinate = true;
                }
                self.bar.set_position((fraction * BAR_SCALE as f64) as u64);
            }
            Progress::Pulse => self.bar.tick(),
        }
    }

    fn finish(&mut self) {
        self.bar.finish_and_clear();
    }
}

/// Stand-in for the scripting engine.
///
/// Understands a handful of built-in commands and records everything it is
/// asked to run.
#[derive(Debug, Default)]
pub struct ConsoleRuntime {
    reader: Option<String>,
    history: Vec<String>,
    ready: bool,
}

impl ConsoleRuntime {
    pub fn history(&self) -> &[String] {
        &self.history
    }
}

impl Runtime for ConsoleRuntime {
    fn init(&mut self) -> Result<()> {
        self.ready = true;
        debug!("Console runtime ready");
        Ok(())
    }

    fn attach_reader(&mut self, reader: &str) {
        self.reader = Some(reader.to_string());
    }

    fn run_command(&mut self, command: &str) -> Result<()> {
        if !self.ready {
            return Err(CardpeekError::Command {
                message: "runtime is not initialized".to_string(),
            });
        }
        self.history.push(command.to_string());

        let (verb, rest) = command
            .split_once(char::is_whitespace)
            .map(|(verb, rest)| (verb, rest.trim()))
            .unwrap_or((command, ""));

        match verb {
            "help" => println!("Commands: help, reader, echo <text>, history, quit"),
            "reader" => println!("{}", self.reader.as_deref().unwrap_or("(no reader)")),
            "echo" => println!("{}", rest),
            "history" => {
                for (i, entry) in self.history.iter().enumerate() {
                    println!("{:4}  {}", i + 1, entry);
                }
            }
            _ => {
                return Err(CardpeekError::Command {
                    message: format!("unknown command '{}'", verb),
                })
            }
        }
        Ok(())
    }

    fn release(&mut self) {
        self.ready = false;
        self.reader = None;
        debug!("Console runtime released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn frontend(input: &str) -> ConsoleFrontend<Cursor<Vec<u8>>, Vec<u8>> {
        ConsoleFrontend::new(
            Cursor::new(input.as_bytes().to_vec()),
            Vec::new(),
            Arc::new(AtomicBool::new(false)),
        )
    }

    fn output(frontend: &ConsoleFrontend<Cursor<Vec<u8>>, Vec<u8>>) -> String {
        String::from_utf8_lossy(&frontend.output).into_owned()
    }

    #[test]
    fn test_confirm_reads_one_based_choice() {
        let mut ui = frontend("2\n");
        assert_eq!(ui.confirm("Update?", &["Yes", "No"]), Some(1));
        assert!(output(&ui).contains("  2) No"));
    }

    #[test]
    fn test_confirm_rejects_out_of_range_and_eof() {
        let mut ui = frontend("7\n");
        assert_eq!(ui.confirm("Update?", &["Yes", "No"]), None);
        assert!(output(&ui).contains("Invalid choice '7'"));

        let mut ui = frontend("");
        assert_eq!(ui.confirm("Update?", &["Yes", "No"]), None);
    }

    #[test]
    fn test_select_reader_by_number() {
        let readers = vec!["none".to_string(), "replay://visa.clf".to_string()];

        let mut ui = frontend("2\n");
        assert_eq!(
            ui.select_reader(&readers),
            Some("replay://visa.clf".to_string())
        );

        let mut ui = frontend("\n");
        assert_eq!(ui.select_reader(&readers), None);
    }

    #[test]
    fn test_event_loop_forwards_commands_until_quit() {
        let mut ui = frontend("echo hi\n\nbogus\nquit\necho unreachable\n");
        let mut runtime = ConsoleRuntime::default();
        runtime.init().unwrap();

        ui.run_event_loop(&mut runtime).unwrap();

        assert_eq!(runtime.history(), ["echo hi", "bogus"]);
        assert!(output(&ui).contains("unknown command 'bogus'"));
    }

    #[test]
    fn test_event_loop_honours_stop_flag() {
        let mut ui = frontend("echo hi\n");
        ui.stop.store(true, Ordering::SeqCst);
        let mut runtime = ConsoleRuntime::default();
        runtime.init().unwrap();

        ui.run_event_loop(&mut runtime).unwrap();

        assert!(runtime.history().is_empty());
    }

    #[test]
    fn test_runtime_requires_init() {
        let mut runtime = ConsoleRuntime::default();
        assert!(runtime.run_command("help").is_err());

        runtime.init().unwrap();
        runtime.attach_reader("none");
        assert!(runtime.run_command("reader").is_ok());

        runtime.release();
        assert!(runtime.run_command("help").is_err());
    }

    #[test]
    fn test_progress_switches_to_bar() {
        let mut progress = ConsoleProgress::new("Downloading file", "Please wait...");
        progress.update(Progress::Pulse);
        assert!(!progress.determinate);

        progress.update(Progress::Fraction(0.25));
        assert!(progress.determinate);
        assert_eq!(progress.bar.position(), 250);
        progress.finish();
    }
}
