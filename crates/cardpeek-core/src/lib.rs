//! Cardpeek Core - bootstrap and lifecycle controller for the Cardpeek
//! smartcard inspection tool.
//!
//! This crate owns everything that happens around a card session: creating or
//! migrating the `~/.cardpeek` environment from the embedded asset bundle,
//! choosing and opening a reader, keeping the ATR reference database fresh,
//! and tearing everything down in order. Presentation and the scripting engine
//! are reached only through the capability traits in [`frontend`].
//!
//! # Example
//!
//! ```rust,ignore
//! use cardpeek_core::{Context, HttpTransfer, LaunchOptions, PathRegistry, ProcessController};
//!
//! async fn launch(frontend: &mut impl Frontend, runtime: &mut dyn Runtime, backend: impl ReaderBackend)
//!     -> cardpeek_core::Result<()>
//! {
//!     let context = Context::load(PathRegistry::discover()?);
//!     let controller = ProcessController::new(context, backend, HttpTransfer::new()?);
//!     let report = controller.run(&LaunchOptions::default(), frontend, runtime).await;
//!     println!("provisioning: {:?}", report.provision);
//!     Ok(())
//! }
//! ```

pub mod bundle;
pub mod config;
pub mod config_store;
pub mod controller;
pub mod error;
pub mod frontend;
pub mod platform;
pub mod provision;
pub mod session;
pub mod sync;

mod atomic;

// Re-export commonly used types
pub use bundle::{AssetBundle, Extractor, TarGzExtractor};
pub use config::{AppConfig, ConfigKeys, PathsConfig, SyncConfig};
pub use config_store::ConfigStore;
pub use controller::{Context, LaunchOptions, ProcessController, RunReport};
pub use error::{CardpeekError, ErrorCategory, Result};
pub use frontend::{
    Confirm, Frontend, NullProgress, OutputCallback, Progress, ProgressReporter, ProgressSink,
    Runtime, Select,
};
pub use platform::{FaultGuard, GuardState, PathRegistry};
pub use provision::{EnvironmentProvisioner, ProvisionOutcome};
pub use session::{ReaderBackend, ReaderEvent, ReaderHandle, ReaderSession, SessionManager};
pub use sync::{HttpTransfer, SyncOutcome, SyncScheduler, SyncState, Transfer};
