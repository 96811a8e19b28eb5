//! Top-level startup and shutdown sequencing.

use crate::bundle::AssetBundle;
use crate::config::AppConfig;
use crate::config_store::ConfigStore;
use crate::frontend::{Frontend, Runtime};
use crate::platform::PathRegistry;
use crate::provision::{EnvironmentProvisioner, ProvisionOutcome};
use crate::session::{ReaderBackend, SessionManager};
use crate::sync::{SyncOutcome, SyncScheduler, Transfer};
use tracing::{debug, error, info, warn};

/// Process-wide state shared by the lifecycle components.
#[derive(Debug)]
pub struct Context {
    pub paths: PathRegistry,
    pub config: ConfigStore,
}

impl Context {
    /// Context rooted at `paths`, with the config store loaded from disk.
    pub fn load(paths: PathRegistry) -> Self {
        let config = ConfigStore::load(paths.config_file());
        Self { paths, config }
    }
}

/// Command-line choices that steer a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Open this reader instead of asking.
    pub reader: Option<String>,
    /// Dispatch this command instead of checking for a database update.
    pub exec: Option<String>,
}

/// What happened during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub provision: ProvisionOutcome,
    pub runtime_ready: bool,
    pub reader: Option<String>,
    pub sync: Option<SyncOutcome>,
    pub command_failed: bool,
}

pub struct ProcessController<B: ReaderBackend, T: Transfer> {
    context: Context,
    bundle: AssetBundle,
    expected_version: u32,
    sessions: SessionManager<B>,
    scheduler: SyncScheduler<T>,
}

impl<B: ReaderBackend, T: Transfer> ProcessController<B, T> {
    pub fn new(context: Context, backend: B, transfer: T) -> Self {
        let scheduler = SyncScheduler::new(&context.paths, transfer);
        Self {
            context,
            bundle: AssetBundle::embedded(),
            expected_version: AppConfig::SCRIPT_VERSION,
            sessions: SessionManager::new(backend),
            scheduler,
        }
    }

    /// Provision from `bundle` and expect `version` instead of the built-in ones.
    pub fn with_bundle(mut self, bundle: AssetBundle, version: u32) -> Self {
        self.bundle = bundle;
        self.expected_version = version;
        self
    }

    /// Run the whole lifecycle and tear down in order.
    ///
    /// Provisioning completes before a reader is opened. When a reader session
    /// exists, either `options.exec` is dispatched or the database update check
    /// runs, then the frontend's event loop takes over. Afterwards the session
    /// is closed, the config store persisted and the runtime released.
    pub async fn run<F>(
        mut self,
        options: &LaunchOptions,
        frontend: &mut F,
        runtime: &mut dyn Runtime,
    ) -> RunReport
    where
        F: Frontend + ?Sized,
    {
        let provision = EnvironmentProvisioner::new(
            &self.context.paths,
            self.bundle.clone(),
            self.expected_version,
        )
        .ensure(frontend);
        debug!("Provisioning finished: {:?}", provision);

        let mut report = RunReport {
            provision,
            runtime_ready: false,
            reader: None,
            sync: None,
            command_failed: false,
        };

        if let Err(e) = runtime.init() {
            error!("Failed to initialize the scripting runtime: {}", e);
            frontend.notify(&format!("Failed to initialize the scripting runtime: {}", e));
            self.persist_config();
            return report;
        }
        report.runtime_ready = true;

        let callback = frontend.reader_output();
        let session = self
            .sessions
            .open(options.reader.as_deref(), frontend, callback);

        match session {
            Some(session) => {
                report.reader = Some(session.name().to_string());
                runtime.attach_reader(session.name());

                match options.exec.as_deref() {
                    Some(command) => {
                        info!("Running command from the command line: {}", command);
                        if let Err(e) = runtime.run_command(command) {
                            error!("Command '{}' failed: {}", command, e);
                            frontend.notify(&format!("Command '{}' failed: {}", command, e));
                            report.command_failed = true;
                        }
                    }
                    None => {
                        let outcome = self
                            .scheduler
                            .maybe_sync(&mut self.context.config, frontend)
                            .await;
                        report.sync = Some(outcome);
                    }
                }

                if !report.command_failed {
                    if let Err(e) = frontend.run_event_loop(runtime) {
                        error!("Event loop ended with an error: {}", e);
                    }
                }

                self.sessions.close(session);
            }
            None => info!("No reader selected, shutting down"),
        }

        self.persist_config();
        runtime.release();
        report
    }

    fn persist_config(&mut self) {
        match self.context.config.save() {
            Ok(true) => debug!("Saved {}", self.context.config.path().display()),
            Ok(false) => {}
            Err(e) => warn!("Failed to save settings: {}", e),
        }
    }
}
