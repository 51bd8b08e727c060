//! Runner lifecycle manager
//!
//! Stands up the plugin service on a filesystem-scoped Unix domain socket,
//! launches the external engine as a child process pointed at it, relays
//! termination signals, and guarantees endpoint teardown with a bounded
//! graceful shutdown and a forced fallback.

use crate::error::{RunnerError, RunnerResult};
use crate::model::{ActionRegistry, Model};
use crate::service::PluginService;
use std::env;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixListener;
use tokio::process::{Child, Command};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;

/// Engine binary invoked when `MBT_ENGINE_BIN` is not set.
pub const DEFAULT_ENGINE_BIN: &str = "mbt-engine";

/// How long a graceful endpoint shutdown may take before it is forced.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(5000);

/// Caller-supplied engine configuration, rendered as one flag per option.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestOptions {
    /// Maximum number of sequential runs.
    pub max_seq_runs: Option<u32>,
    /// Maximum number of parallel runs.
    pub max_parallel_runs: Option<u32>,
    /// Maximum number of actions per run.
    pub max_actions: Option<u32>,
    /// Additional `--name=value` flags passed through verbatim.
    pub extra: Vec<(String, String)>,
}

/// Environment overrides captured once when the runner is constructed.
///
/// The environment replaces the values of caller-configured options but
/// never introduces a flag the caller did not configure. The seed entries
/// have no caller-side counterpart and are appended only when their
/// variables are present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    /// `MBT_ENGINE_BIN`: engine binary path.
    pub engine_bin: Option<String>,
    /// `MBT_MAX_SEQ_RUNS`.
    pub max_seq_runs: Option<u64>,
    /// `MBT_MAX_PARALLEL_RUNS`.
    pub max_parallel_runs: Option<u64>,
    /// `MBT_MAX_ACTIONS`.
    pub max_actions: Option<u64>,
    /// `MBT_SEQ_SEED`.
    pub seq_seed: Option<u64>,
    /// `MBT_PARALLEL_SEED`.
    pub parallel_seed: Option<u64>,
}

impl EnvOverrides {
    /// Capture the overrides from the process environment.
    pub fn capture() -> Self {
        Self {
            engine_bin: env::var("MBT_ENGINE_BIN").ok(),
            max_seq_runs: env_number("MBT_MAX_SEQ_RUNS"),
            max_parallel_runs: env_number("MBT_MAX_PARALLEL_RUNS"),
            max_actions: env_number("MBT_MAX_ACTIONS"),
            seq_seed: env_number("MBT_SEQ_SEED"),
            parallel_seed: env_number("MBT_PARALLEL_SEED"),
        }
    }
}

fn env_number(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

/// Fully rendered engine command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInvocation {
    /// Binary to execute.
    pub program: String,
    /// Arguments, starting with `--plugin-addr`.
    pub args: Vec<String>,
}

impl EngineInvocation {
    /// Render the command line for a socket path, options, and overrides.
    pub fn build(socket: &Path, options: &TestOptions, env: &EnvOverrides) -> Self {
        let program = env
            .engine_bin
            .clone()
            .unwrap_or_else(|| DEFAULT_ENGINE_BIN.to_string());

        let mut args = vec![format!("--plugin-addr={}", socket.display())];
        push_option(&mut args, "max-seq-runs", options.max_seq_runs, env.max_seq_runs);
        push_option(
            &mut args,
            "max-parallel-runs",
            options.max_parallel_runs,
            env.max_parallel_runs,
        );
        push_option(&mut args, "max-actions", options.max_actions, env.max_actions);
        for (name, value) in &options.extra {
            args.push(format!("--{name}={value}"));
        }
        if let Some(seed) = env.seq_seed {
            args.push(format!("--seq-seed={seed}"));
        }
        if let Some(seed) = env.parallel_seed {
            args.push(format!("--parallel-seed={seed}"));
        }

        Self { program, args }
    }
}

fn push_option(args: &mut Vec<String>, name: &str, configured: Option<u32>, env: Option<u64>) {
    let Some(configured) = configured else {
        return;
    };
    let value = env.unwrap_or(u64::from(configured));
    args.push(format!("--{name}={value}"));
}

/// Lifecycle manager owning one test run's endpoint and engine process.
#[derive(Debug, Clone)]
pub struct Runner {
    options: TestOptions,
    env: EnvOverrides,
}

impl Runner {
    /// Build a runner, capturing environment overrides now.
    pub fn new(options: TestOptions) -> Self {
        Self {
            options,
            env: EnvOverrides::capture(),
        }
    }

    /// Build a runner with explicit overrides instead of reading the
    /// environment.
    pub fn with_env(options: TestOptions, env: EnvOverrides) -> Self {
        Self { options, env }
    }

    /// Run the engine against the model until it exits.
    ///
    /// A zero exit resolves success; any other exit code or signal, or a
    /// failure to start the engine at all, resolves an error. On every exit
    /// path the endpoint is shut down gracefully within a fixed grace period
    /// (forced afterwards) and the socket file and its temporary directory
    /// are removed; teardown failures never mask the run's outcome.
    pub async fn run(&self, model: Arc<dyn Model>, actions: ActionRegistry) -> RunnerResult<()> {
        let dir = tempfile::Builder::new().prefix("mbt-plugin-").tempdir()?;
        let socket_path = dir.path().join("plugin.sock");
        let listener = UnixListener::bind(&socket_path)?;
        tracing::info!(socket = %socket_path.display(), "plugin service listening");

        let service = PluginService::new(model, actions);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = tokio::spawn(async move { service.serve(listener, shutdown_rx).await });

        let invocation = EngineInvocation::build(&socket_path, &self.options, &self.env);
        let outcome = self.drive_engine(&invocation).await;

        let _ = shutdown_tx.send(true);
        let abort = server.abort_handle();
        match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
            Ok(_) => tracing::info!("plugin service shut down gracefully"),
            Err(_) => {
                tracing::warn!("forcing plugin service shutdown");
                abort.abort();
            }
        }

        if let Err(err) = std::fs::remove_file(&socket_path) {
            tracing::debug!(error = %err, "socket file removal failed");
        }
        if let Err(err) = dir.close() {
            tracing::warn!(error = %err, "temporary directory removal failed");
        }

        outcome
    }

    async fn drive_engine(&self, invocation: &EngineInvocation) -> RunnerResult<()> {
        tracing::info!(
            program = %invocation.program,
            args = ?invocation.args,
            "starting engine"
        );
        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                binary: invocation.program.clone(),
                source,
            })?;

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        let status = loop {
            tokio::select! {
                status = child.wait() => break status?,
                _ = sigint.recv() => {
                    tracing::info!("interrupt received, stopping engine");
                    forward_termination(&mut child);
                }
                _ = sigterm.recv() => {
                    tracing::info!("termination requested, stopping engine");
                    forward_termination(&mut child);
                }
            }
        };

        if status.success() {
            tracing::info!("engine exited successfully");
            Ok(())
        } else if let Some(code) = status.code() {
            Err(RunnerError::EngineExit(code))
        } else {
            Err(RunnerError::EngineSignal(status.signal().unwrap_or(0)))
        }
    }
}

/// Relay a termination request to the engine child process. The parent keeps
/// waiting for the child to exit; it never exits on the engine's behalf.
fn forward_termination(child: &mut Child) {
    if let Err(err) = child.start_kill() {
        tracing::warn!(error = %err, "failed to terminate engine");
    }
}

/// Convenience entry point: build a [`Runner`] from the environment and run
/// the engine against `model` and `actions`.
pub async fn run_tests(
    model: Arc<dyn Model>,
    actions: ActionRegistry,
    options: TestOptions,
) -> RunnerResult<()> {
    Runner::new(options).run(model, actions).await
}
