//! Action dispatcher exposed to the external engine
//!
//! This module implements the plugin service contract: init, cleanup, single
//! action execution, and concurrent multi-sequence execution. Requests arrive
//! as newline-delimited JSON envelopes over a Unix domain socket; each
//! connection is served by its own task and processes its requests
//! sequentially, while concurrency is provided inside
//! `execute_action_sequences`.
//!
//! User-code failures never escape an operation: they are converted into
//! status-coded responses at this boundary. The dispatcher does not enforce
//! the init/cleanup pairing; it trusts the engine to drive the run lifecycle.

use crate::error::{ActionError, ActionResult};
use crate::model::{ActionRegistry, ActionTarget, Model, ModelHooks, StateAccess};
use crate::overrides::{FuzzOptions, OverridesBuilder};
use crate::protocol::{
    ActionSequence, ActionSequenceResult, CleanupRequest, CleanupResponse,
    ExecuteActionRequest, ExecuteActionResponse, ExecuteActionSequencesRequest,
    ExecuteActionSequencesResponse, InitRequest, InitResponse, Interval, RoleRef, RoleState,
    Status,
};
use crate::role::RoleId;
use crate::value::{ModelValue, decode, encode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Whether an action runs standalone or as part of a concurrent batch.
///
/// The after-action hook only fires in sequential mode; under interleaving,
/// quiescence between actions is ill-defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExecMode {
    Sequential,
    Concurrent,
}

/// Plugin service dispatching engine requests to user-registered actions.
///
/// Cheap to clone; clones share the model, the registry, and the base
/// timestamp that execution intervals are reported against.
#[derive(Clone)]
pub struct PluginService {
    model: Arc<dyn Model>,
    actions: Arc<ActionRegistry>,
    hooks: ModelHooks,
    base_time: Instant,
}

impl PluginService {
    /// Build a service around a model and its action registry.
    ///
    /// The model's optional hooks are resolved here, once, and never
    /// re-queried per call.
    pub fn new(model: Arc<dyn Model>, actions: ActionRegistry) -> Self {
        let hooks = model.hooks();
        Self {
            model,
            actions: Arc::new(actions),
            hooks,
            base_time: Instant::now(),
        }
    }

    /// Initialize the model for a test run.
    ///
    /// Overrides are collected from the model's provider hook (when declared)
    /// before `init` runs. Failures are contained and reported as an
    /// execution-failed status; this never faults across the boundary.
    pub async fn init(&self, request: InitRequest) -> InitResponse {
        let mut overrides = Vec::new();
        if self.hooks.overrides {
            let fuzz = FuzzOptions {
                seed: request.fuzz_seed.unwrap_or(0),
            };
            let mut builder = OverridesBuilder::new();
            self.model.provide_overrides(&fuzz, &mut builder).await;
            overrides = builder.into_wire();
        }

        match self.run_init(&request).await {
            Ok((roles, role_states)) => InitResponse {
                status: Status::ok("Initialization successful"),
                exec_time: Interval::zero(),
                roles,
                role_states,
                overrides,
            },
            Err(err) => InitResponse {
                status: Status::execution_failed(format!("Init failed: {err}")),
                exec_time: Interval::zero(),
                roles: Vec::new(),
                role_states: Vec::new(),
                overrides: Vec::new(),
            },
        }
    }

    /// Clean up the model after a test run, with the same failure containment
    /// as [`PluginService::init`].
    pub async fn cleanup(&self, _request: CleanupRequest) -> CleanupResponse {
        match self.model.cleanup().await {
            Ok(()) => CleanupResponse {
                status: Status::ok("Cleanup successful"),
                exec_time: Interval::zero(),
            },
            Err(err) => CleanupResponse {
                status: Status::execution_failed(format!("Cleanup failed: {err}")),
                exec_time: Interval::zero(),
            },
        }
    }

    /// Execute a single action in sequential mode.
    pub async fn execute_action(&self, request: ExecuteActionRequest) -> ExecuteActionResponse {
        self.execute_action_with_mode(request, ExecMode::Sequential)
            .await
    }

    /// Run every sequence concurrently; within one sequence, requests execute
    /// strictly in order.
    ///
    /// Each sequence runs on its own task, and after every request the
    /// sequence yields back to the scheduler so other in-flight sequences can
    /// make progress. A request that fails to produce a response is converted
    /// into a best-effort execution-failed response rather than aborting the
    /// batch; results always match the input shape.
    pub async fn execute_action_sequences(
        &self,
        request: ExecuteActionSequencesRequest,
    ) -> ExecuteActionSequencesResponse {
        let mut handles = Vec::with_capacity(request.action_sequences.len());
        for sequence in request.action_sequences {
            let service = self.clone();
            let len = sequence.requests.len();
            handles.push((
                len,
                tokio::spawn(async move { service.run_sequence(sequence).await }),
            ));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (len, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(err) => {
                    tracing::warn!(error = %err, "sequence task failed");
                    ActionSequenceResult {
                        responses: (0..len).map(|_| failure_response(err.to_string())).collect(),
                    }
                }
            };
            results.push(result);
        }
        ExecuteActionSequencesResponse { results }
    }

    /// Serve engine connections on the listener until the shutdown signal.
    ///
    /// One task per connection; in-flight connections are drained before this
    /// future resolves, so the caller can bound the whole call for forced
    /// shutdown.
    pub async fn serve(&self, listener: UnixListener, mut shutdown: watch::Receiver<bool>) {
        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        tracing::debug!("engine connection accepted");
                        let service = self.clone();
                        connections.spawn(async move { service.handle_connection(stream).await });
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to accept engine connection");
                    }
                },
                _ = shutdown.changed() => break,
            }
        }
        while connections.join_next().await.is_some() {}
    }

    async fn run_init(&self, request: &InitRequest) -> ActionResult<(Vec<RoleRef>, Vec<RoleState>)> {
        self.model.init().await?;
        self.capture_roles(request.options.capture_state).await
    }

    async fn run_sequence(&self, sequence: ActionSequence) -> ActionSequenceResult {
        let mut responses = Vec::with_capacity(sequence.requests.len());
        for request in sequence.requests {
            let service = self.clone();
            let response = tokio::spawn(async move {
                service
                    .execute_action_with_mode(request, ExecMode::Concurrent)
                    .await
            })
            .await
            .unwrap_or_else(|err| failure_response(err.to_string()));
            responses.push(response);

            // Yield so other in-flight sequences get a fair chance to run
            // between our requests.
            tokio::task::yield_now().await;
        }
        ActionSequenceResult { responses }
    }

    async fn execute_action_with_mode(
        &self,
        request: ExecuteActionRequest,
        mode: ExecMode,
    ) -> ExecuteActionResponse {
        let start = self.now_nanos();
        let role_name = request
            .role
            .as_ref()
            .map(|role| role.role_name.clone())
            .unwrap_or_default();
        let action_name = request.action_name.clone();

        match self.run_action(&request, &role_name, mode).await {
            Ok((return_value, roles, role_states)) => ExecuteActionResponse {
                status: Status::ok("OK"),
                exec_time: Interval {
                    start_unix_nano: start,
                    end_unix_nano: self.now_nanos(),
                },
                return_values: return_value.into_iter().map(|v| encode(&v)).collect(),
                roles,
                role_states,
            },
            Err(ActionError::NotImplemented) => ExecuteActionResponse {
                status: Status::not_implemented(format!(
                    "Action {action_name} for role {role_name} is not implemented"
                )),
                exec_time: Interval::zero(),
                return_values: Vec::new(),
                roles: Vec::new(),
                role_states: Vec::new(),
            },
            Err(err) => ExecuteActionResponse {
                status: Status::execution_failed(format!(
                    "Action {action_name} for role {role_name} failed: {err}"
                )),
                exec_time: Interval {
                    start_unix_nano: start,
                    end_unix_nano: self.now_nanos(),
                },
                return_values: Vec::new(),
                roles: Vec::new(),
                role_states: Vec::new(),
            },
        }
    }

    async fn run_action(
        &self,
        request: &ExecuteActionRequest,
        role_name: &str,
        mode: ExecMode,
    ) -> ActionResult<(Option<ModelValue>, Vec<RoleRef>, Vec<RoleState>)> {
        let target = if role_name.is_empty() {
            ActionTarget::Model(Arc::clone(&self.model))
        } else {
            let role_id = request.role.as_ref().map(|role| role.role_id).unwrap_or(0);
            let wanted = RoleId::new(role_name, role_id);
            let role = self
                .model
                .roles()
                .await
                .into_iter()
                .find(|(id, _)| *id == wanted)
                .map(|(_, role)| role)
                .ok_or_else(|| {
                    ActionError::failed(format!("Role {role_name} with id {role_id} not found"))
                })?;
            ActionTarget::Role(role)
        };

        let action = self
            .actions
            .actions_for(role_name)
            .ok_or_else(|| {
                ActionError::failed(format!("No actions registered for role {role_name}"))
            })?
            .get(&request.action_name)
            .cloned()
            .ok_or_else(|| {
                ActionError::failed(format!(
                    "Action {} not found for role {role_name}",
                    request.action_name
                ))
            })?;

        let args: Vec<ModelValue> = request.args.iter().map(|arg| decode(&arg.value)).collect();
        let return_value = action(target, args).await?;

        if mode == ExecMode::Sequential && self.hooks.after_action {
            self.model.after_action().await?;
        }

        let (roles, role_states) = self.capture_roles(request.options.capture_state).await?;
        Ok((return_value, roles, role_states))
    }

    async fn capture_roles(
        &self,
        capture: bool,
    ) -> ActionResult<(Vec<RoleRef>, Vec<RoleState>)> {
        let mut refs = Vec::new();
        let mut states = Vec::new();
        for (id, role) in self.model.roles().await {
            let role_ref = RoleRef::from(&id);
            if capture {
                let captured = match role.state_access() {
                    StateAccess::Hidden => None,
                    StateAccess::Snapshot => Some(role.snapshot_state().await?),
                    StateAccess::Plain => Some(role.state().await?),
                };
                if let Some(state) = captured {
                    states.push(RoleState {
                        role: role_ref.clone(),
                        state: state.into_iter().map(|(key, value)| (key, encode(&value))).collect(),
                    });
                }
            }
            refs.push(role_ref);
        }
        Ok((refs, states))
    }

    async fn handle_connection(&self, stream: UnixStream) {
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(err) => {
                    tracing::debug!(error = %err, "engine connection closed");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<RequestEnvelope>(&line) {
                Ok(request) => self.handle_request(request).await,
                Err(err) => ResponseEnvelope::from_error(
                    Value::Null,
                    ServiceError::Parse(err.to_string()),
                ),
            };

            let mut payload = match serde_json::to_vec(&response) {
                Ok(payload) => payload,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to serialize response");
                    break;
                }
            };
            payload.push(b'\n');
            if write_half.write_all(&payload).await.is_err() {
                break;
            }
        }
    }

    async fn handle_request(&self, request: RequestEnvelope) -> ResponseEnvelope {
        let RequestEnvelope { id, command, params } = request;
        match self.dispatch(&command, params).await {
            Ok(result) => ResponseEnvelope::success(id, result),
            Err(err) => ResponseEnvelope::from_error(id, err),
        }
    }

    async fn dispatch(&self, command: &str, params: Value) -> Result<Value, ServiceError> {
        match command {
            "init" => {
                let request: InitRequest = parse_params(params)?;
                to_result(self.init(request).await)
            }
            "cleanup" => {
                let request: CleanupRequest = parse_params(params)?;
                to_result(self.cleanup(request).await)
            }
            "execute_action" => {
                let request: ExecuteActionRequest = parse_params(params)?;
                to_result(self.execute_action(request).await)
            }
            "execute_action_sequences" => {
                let request: ExecuteActionSequencesRequest = parse_params(params)?;
                to_result(self.execute_action_sequences(request).await)
            }
            other => Err(ServiceError::Unsupported(other.to_string())),
        }
    }

    fn now_nanos(&self) -> u64 {
        self.base_time.elapsed().as_nanos() as u64
    }
}

/// Best-effort failure response used when a request could not even produce a
/// response of its own.
fn failure_response(message: String) -> ExecuteActionResponse {
    ExecuteActionResponse {
        status: Status::execution_failed(message),
        exec_time: Interval::zero(),
        return_values: Vec::new(),
        roles: Vec::new(),
        role_states: Vec::new(),
    }
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, ServiceError> {
    let params = if params.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        params
    };
    serde_json::from_value(params).map_err(|err| ServiceError::InvalidParams(err.to_string()))
}

fn to_result<T: Serialize>(response: T) -> Result<Value, ServiceError> {
    serde_json::to_value(response).map_err(|err| ServiceError::Internal(err.to_string()))
}

enum ServiceError {
    Parse(String),
    InvalidParams(String),
    Unsupported(String),
    Internal(String),
}

#[derive(Deserialize)]
struct RequestEnvelope {
    id: Value,
    command: String,
    #[serde(default)]
    params: Value,
}

#[derive(Serialize)]
struct ResponseEnvelope {
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorEnvelope>,
}

impl ResponseEnvelope {
    fn success(id: Value, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    fn from_error(id: Value, error: ServiceError) -> Self {
        Self {
            id,
            result: None,
            error: Some(ErrorEnvelope::from(error)),
        }
    }
}

#[derive(Serialize)]
struct ErrorEnvelope {
    code: String,
    message: String,
}

impl From<ServiceError> for ErrorEnvelope {
    fn from(error: ServiceError) -> Self {
        match error {
            ServiceError::Parse(message) => ErrorEnvelope {
                code: "parse_error".into(),
                message,
            },
            ServiceError::InvalidParams(message) => ErrorEnvelope {
                code: "invalid_params".into(),
                message,
            },
            ServiceError::Unsupported(command) => ErrorEnvelope {
                code: "unsupported_command".into(),
                message: format!("unsupported command: {command}"),
            },
            ServiceError::Internal(message) => ErrorEnvelope {
                code: "internal_error".into(),
                message,
            },
        }
    }
}
