//! Cardpeek - smartcard inspection tool, console launcher.
//!
//! Sets up logging and the fault guard, then hands the run over to the
//! lifecycle controller in `cardpeek-core` with console implementations of
//! the prompts, progress display, event loop and reader backend.

mod console;
mod readers;

use anyhow::{Context as _, Result};
use cardpeek_core::platform::system_string;
use cardpeek_core::{
    Context, FaultGuard, HttpTransfer, LaunchOptions, PathRegistry, ProcessController,
    ReaderBackend,
};
use clap::Parser;
use console::{ConsoleFrontend, ConsoleRuntime};
use readers::ConsoleBackend;
use std::ffi::OsString;
use std::fs::File;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cardpeek")]
#[command(about = "Smartcard inspection tool")]
#[command(disable_version_flag = true)]
struct Args {
    /// Use this reader instead of asking which one to open
    #[arg(short, long, value_name = "READER-NAME")]
    reader: Option<String>,

    /// Run a single command instead of checking for database updates
    #[arg(short, long, value_name = "COMMAND")]
    exec: Option<String>,

    /// Print version and reader information, then exit
    #[arg(short, long)]
    version: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    if let Err(e) = FaultGuard::install() {
        eprintln!("Warning: could not install the fault handler: {}", e);
    }

    let paths = PathRegistry::discover().context("Failed to locate the home directory")?;
    let Some(args) = parse_args(std::env::args_os()) else {
        return Ok(());
    };

    if args.version {
        init_console_logging();
        display_readers_and_version(&paths);
        return Ok(());
    }

    let log = init_logging(&paths);
    info!("Running {}", system_string());

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);
    if let Err(e) = ctrlc::set_handler(move || {
        stop_flag.store(true, Ordering::SeqCst);
        eprintln!("\nInterrupted, press Enter to quit.");
    }) {
        warn!("Failed to set the Ctrl-C handler: {}", e);
    }

    let backend = ConsoleBackend::new(paths.replay_dir());
    let transfer = HttpTransfer::new().context("Failed to create the HTTP client")?;
    let controller = ProcessController::new(Context::load(paths), backend, transfer);

    let options = LaunchOptions {
        reader: args.reader,
        exec: args.exec,
    };
    let mut frontend = ConsoleFrontend::new(io::stdin().lock(), io::stdout(), stop);
    let mut runtime = ConsoleRuntime::default();

    let report = controller.run(&options, &mut frontend, &mut runtime).await;
    debug!(
        "Run finished: {:?}, {} command(s) dispatched",
        report,
        runtime.history().len()
    );
    info!("Exiting");
    if let Some(log) = log {
        log.close();
    }

    Ok(())
}

/// Parse the command line. Help and usage errors are printed and yield `None`.
fn parse_args<I, T>(args: I) -> Option<Args>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match Args::try_parse_from(args) {
        Ok(args) => Some(args),
        Err(e) => {
            let _ = e.print();
            None
        }
    }
}

/// The log file behind the subscriber. Writes after [`LogFile::close`] are dropped.
#[derive(Clone)]
struct LogFile(Arc<Mutex<Option<File>>>);

impl LogFile {
    fn new(file: File) -> Self {
        Self(Arc::new(Mutex::new(Some(file))))
    }

    /// Detach the file from the fault guard, then flush and close it.
    fn close(&self) {
        FaultGuard::clear_log_fd();
        if let Ok(mut guard) = self.0.lock() {
            if let Some(file) = guard.take() {
                if let Err(e) = file.sync_all() {
                    eprintln!("Warning: failed to sync the log file: {}", e);
                }
            }
        }
    }
}

impl Write for LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.0.lock() {
            Ok(mut guard) => match guard.as_mut() {
                Some(file) => file.write(buf),
                None => Ok(buf.len()),
            },
            Err(_) => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.0.lock() {
            Ok(mut guard) => guard.as_mut().map_or(Ok(()), |file| file.flush()),
            Err(_) => Ok(()),
        }
    }
}

/// Log to `<state>/cardpeek.log` once the state directory exists, else warnings to stderr.
fn init_logging(paths: &PathRegistry) -> Option<LogFile> {
    let log_path = paths.log_file();
    let log_file = if paths.state_dir().is_dir() {
        match File::create(&log_path) {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("Warning: cannot open log file {}: {}", log_path.display(), e);
                None
            }
        }
    } else {
        None
    };

    let Some(file) = log_file else {
        init_console_logging();
        return None;
    };

    FaultGuard::set_log_path(&log_path);
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        FaultGuard::set_log_fd(file.as_raw_fd());
    }

    // "cardpeek=info" is a constant directive and always parses.
    let filter = EnvFilter::from_default_env().add_directive(
        "cardpeek=info"
            .parse()
            .unwrap_or_else(|_| tracing_subscriber::filter::Directive::from(tracing::Level::INFO)),
    );

    let log = LogFile::new(file);
    let writer = log.clone();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .init();
    Some(log)
}

fn init_console_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn display_readers_and_version(paths: &PathRegistry) {
    println!("This is {}.", system_string());
    println!("Cardpeek path is {}", paths.state_dir().display());

    let readers = match ConsoleBackend::new(paths.replay_dir()).list_readers() {
        Ok(readers) => readers,
        Err(e) => {
            warn!("Failed to enumerate readers: {}", e);
            Vec::new()
        }
    };
    println!("{}", reader_count_line(readers.len()));
    for reader in &readers {
        println!(" -> {}", reader);
    }
    println!();
}

fn reader_count_line(count: usize) -> String {
    match count {
        0 => "There are no readers detected".to_string(),
        1 => "There is 1 reader detected:".to_string(),
        n => format!("There are {} readers detected:", n),
    }
}
