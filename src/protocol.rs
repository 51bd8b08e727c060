//! Wire schema for the plugin service
//!
//! Serde-defined request and response messages for the four operations the
//! external engine calls: init, cleanup, execute_action and
//! execute_action_sequences. Messages travel as newline-delimited JSON
//! envelopes over a filesystem-scoped Unix domain socket (see
//! [`crate::service`]).

use crate::role::RoleId;
use crate::value::WireValue;
use serde::{Deserialize, Serialize};

/// Outcome class of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    /// Operation completed.
    Ok,
    /// User code failed or the target could not be resolved.
    ExecutionFailed,
    /// The action is deliberately unsupported by the model.
    NotImplemented,
}

/// Status code plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Outcome class.
    pub code: StatusCode,
    /// Human-readable detail; non-empty on failure.
    pub message: String,
}

impl Status {
    /// Successful status.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::Ok,
            message: message.into(),
        }
    }

    /// Execution-failed status.
    pub fn execution_failed(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::ExecutionFailed,
            message: message.into(),
        }
    }

    /// Not-implemented status.
    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::NotImplemented,
            message: message.into(),
        }
    }
}

/// Execution interval as nanosecond offsets from the service's base
/// timestamp. Zeroed when timing is not meaningful (init/cleanup).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    /// Offset of the operation start.
    pub start_unix_nano: u64,
    /// Offset of the operation end.
    pub end_unix_nano: u64,
}

impl Interval {
    /// The zero interval used when timing carries no information.
    pub fn zero() -> Self {
        Self::default()
    }
}

/// Reference to one role instance on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRef {
    /// Role type name; empty addresses the model itself.
    #[serde(default)]
    pub role_name: String,
    /// Instance index within the role type.
    #[serde(default)]
    pub role_id: u32,
}

impl From<&RoleId> for RoleRef {
    fn from(id: &RoleId) -> Self {
        Self {
            role_name: id.name.clone(),
            role_id: id.index,
        }
    }
}

impl From<&RoleRef> for RoleId {
    fn from(role: &RoleRef) -> Self {
        RoleId::new(role.role_name.clone(), role.role_id)
    }
}

/// Per-request execution options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOptions {
    /// Capture each role's observable state in the response.
    #[serde(default)]
    pub capture_state: bool,
}

/// Named positional argument for an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arg {
    /// Argument name; informational only, dispatch is positional.
    #[serde(default)]
    pub name: String,
    /// Argument value.
    pub value: WireValue,
}

/// Captured state of one role, keyed by role identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleState {
    /// Role the state belongs to.
    pub role: RoleRef,
    /// State entries in capture order, values encoded canonically.
    pub state: Vec<(String, WireValue)>,
}

/// Request for the init operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitRequest {
    /// Execution options.
    #[serde(default)]
    pub options: ExecOptions,
    /// Fuzz seed forwarded to the model's override provider.
    #[serde(default)]
    pub fuzz_seed: Option<u64>,
}

/// Response for the init operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitResponse {
    /// Operation outcome.
    pub status: Status,
    /// Always zero; init timing is not meaningful.
    pub exec_time: Interval,
    /// All current role instances.
    #[serde(default)]
    pub roles: Vec<RoleRef>,
    /// Captured role states when requested.
    #[serde(default)]
    pub role_states: Vec<RoleState>,
    /// Variable overrides declared by the model's provider hook.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<(String, WireValue)>,
}

/// Request for the cleanup operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupRequest {}

/// Response for the cleanup operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupResponse {
    /// Operation outcome.
    pub status: Status,
    /// Always zero; cleanup timing is not meaningful.
    pub exec_time: Interval,
}

/// Request to execute a single action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteActionRequest {
    /// Target role; absent or empty-named addresses the model itself.
    #[serde(default)]
    pub role: Option<RoleRef>,
    /// Name of the registered action.
    pub action_name: String,
    /// Positional arguments.
    #[serde(default)]
    pub args: Vec<Arg>,
    /// Execution options.
    #[serde(default)]
    pub options: ExecOptions,
}

/// Response for a single action execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteActionResponse {
    /// Operation outcome.
    pub status: Status,
    /// Execution interval; partial on failure, zero for not-implemented.
    pub exec_time: Interval,
    /// Encoded return value, when the action produced one.
    #[serde(default)]
    pub return_values: Vec<WireValue>,
    /// All current role instances after the action.
    #[serde(default)]
    pub roles: Vec<RoleRef>,
    /// Captured role states when requested.
    #[serde(default)]
    pub role_states: Vec<RoleState>,
}

/// One ordered list of action requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionSequence {
    /// Requests executed strictly in order within the sequence.
    #[serde(default)]
    pub requests: Vec<ExecuteActionRequest>,
}

/// Responses for one sequence, in request order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionSequenceResult {
    /// One response per request.
    #[serde(default)]
    pub responses: Vec<ExecuteActionResponse>,
}

/// Request to run several sequences concurrently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecuteActionSequencesRequest {
    /// Sequences to interleave; order is preserved in the results.
    #[serde(default)]
    pub action_sequences: Vec<ActionSequence>,
}

/// Response carrying one result list per input sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecuteActionSequencesResponse {
    /// Results aligned with the request's sequence order.
    #[serde(default)]
    pub results: Vec<ActionSequenceResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ref_conversions() {
        let id = RoleId::new("worker", 3);
        let role = RoleRef::from(&id);
        assert_eq!(role.role_name, "worker");
        assert_eq!(role.role_id, 3);
        assert_eq!(RoleId::from(&role), id);
    }

    #[test]
    fn test_execute_action_request_defaults() {
        let request: ExecuteActionRequest =
            serde_json::from_str(r#"{"action_name": "increment"}"#).unwrap();
        assert!(request.role.is_none());
        assert!(request.args.is_empty());
        assert!(!request.options.capture_state);
    }

    #[test]
    fn test_wire_value_tagging() {
        let json = serde_json::to_value(WireValue::Sentinel(
            crate::value::SentinelKind::Ignore,
        ))
        .unwrap();
        assert_eq!(json, serde_json::json!({"sentinel": "ignore"}));

        let absent = serde_json::to_value(WireValue::Absent).unwrap();
        assert_eq!(absent, serde_json::json!("absent"));
    }
}
