//! CLI runner for common setup and operations.
//!
//! Encapsulates logging initialization, orchestrator construction, and the
//! Ctrl-C handling shared by every command that runs units.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lockstep::config::ConfigFile;
use lockstep::executor::{
    Orchestrator, OrchestratorConfig, RequestHandler, TracingTelemetrySink,
};
use lockstep::logging::{init_logging_full, LoggingGuard, LoggingOptions};
use lockstep::runtime::{ProgressReporter, RootHost, TracingProgressReporter};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::CliError;
use crate::ui::{ConsoleProgressReporter, PromptHandler};

/// Runner that manages CLI lifecycle and common operations.
pub struct CliRunner {
    /// Logging guard - keeps logging active while runner exists
    #[allow(dead_code)]
    logging_guard: LoggingGuard,
    /// Loaded configuration file
    config: ConfigFile,
    /// `--max-concurrent` override
    max_concurrent: Option<usize>,
}

impl CliRunner {
    /// Create a new CLI runner, loading config and initializing logging.
    ///
    /// # Arguments
    ///
    /// * `debug_mode` - When true, enables debug-level logging regardless of RUST_LOG
    /// * `max_concurrent` - Overrides `orchestrator.max_concurrent` from the config file
    pub fn new(debug_mode: bool, max_concurrent: Option<usize>) -> Result<Self, CliError> {
        let config = ConfigFile::load()?;

        if max_concurrent == Some(0) {
            return Err(CliError::Usage(
                "--max-concurrent must be at least 1".to_string(),
            ));
        }

        // Keep stdout free for command output on a terminal
        let options = LoggingOptions {
            debug: debug_mode,
            stdout: Some(!atty::is(atty::Stream::Stdout)),
        };
        let logging_guard = init_logging_full(&config.logging.file, options)
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        Ok(Self {
            logging_guard,
            config,
            max_concurrent,
        })
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("lockstep v{}", lockstep::VERSION);
        info!("lockstep CLI: {} command", command);
    }

    /// Build the orchestrator settings, applying the command-line override.
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let mut config = OrchestratorConfig::from(&self.config.orchestrator);
        if let Some(max) = self.max_concurrent {
            config.max_concurrent = max;
        }
        config
    }

    /// Create the root host.
    ///
    /// Requests are answered interactively only when stdin is a terminal;
    /// otherwise the host is a batch host and requests are not supported.
    pub fn root_host(&self) -> RootHost {
        let config = self.orchestrator_config();
        let requests: Option<Arc<dyn RequestHandler>> = if atty::is(atty::Stream::Stdin) {
            Some(Arc::new(PromptHandler::new()))
        } else {
            None
        };
        info!(
            max_concurrent = config.max_concurrent,
            interactive = requests.is_some(),
            "Creating orchestrator"
        );
        RootHost::new(Orchestrator::with_parts(
            config,
            Arc::new(TracingTelemetrySink),
            requests,
        ))
    }

    /// Drive the root host until every unit is terminal.
    ///
    /// The first Ctrl-C cancels all units and waits for them to wind down;
    /// a second one stops waiting.
    pub async fn drive(&self, root: &RootHost) -> Result<(), CliError> {
        let interrupted = Arc::new(AtomicBool::new(false));
        let abort = CancellationToken::new();
        let watcher_done = CancellationToken::new();

        let watcher = {
            let orchestrator = root.orchestrator().clone();
            let interrupted = Arc::clone(&interrupted);
            let abort = abort.clone();
            let done = watcher_done.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = done.cancelled() => return,
                    result = tokio::signal::ctrl_c() => {
                        if result.is_err() {
                            return;
                        }
                    }
                }
                warn!("Interrupted, cancelling all units");
                eprintln!();
                eprintln!("Cancelling... press Ctrl-C again to stop waiting.");
                interrupted.store(true, Ordering::SeqCst);
                orchestrator.cancel_all();

                tokio::select! {
                    _ = done.cancelled() => {}
                    result = tokio::signal::ctrl_c() => {
                        if result.is_ok() {
                            warn!("Interrupted again, abandoning remaining units");
                            abort.cancel();
                        }
                    }
                }
            })
        };

        let reporter: Box<dyn ProgressReporter> = if atty::is(atty::Stream::Stderr) {
            Box::new(ConsoleProgressReporter::new())
        } else {
            Box::new(TracingProgressReporter)
        };
        let result = root.run(&abort, reporter.as_ref()).await;

        watcher_done.cancel();
        let _ = watcher.await;

        if interrupted.load(Ordering::SeqCst) || result.is_err() {
            return Err(CliError::Cancelled);
        }
        Ok(())
    }
}
