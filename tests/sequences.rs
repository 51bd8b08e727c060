//! Concurrent multi-sequence execution: result shape, per-sequence ordering,
//! and failure containment.

use async_trait::async_trait;
use mbt_bridge::protocol::{
    ActionSequence, Arg, ExecOptions, ExecuteActionRequest, ExecuteActionSequencesRequest,
    StatusCode,
};
use mbt_bridge::{
    ActionError, ActionRegistry, ActionResult, Model, ModelHooks, ModelValue, PluginService, Role,
    RoleId, WireValue,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Model that records every append in arrival order.
struct LogModel {
    log: Mutex<Vec<(i64, i64)>>,
    after_actions: Mutex<u32>,
}

impl LogModel {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            log: Mutex::new(Vec::new()),
            after_actions: Mutex::new(0),
        })
    }
}

#[async_trait]
impl Model for LogModel {
    async fn init(&self) -> ActionResult<()> {
        self.log.lock().clear();
        Ok(())
    }

    async fn cleanup(&self) -> ActionResult<()> {
        Ok(())
    }

    async fn roles(&self) -> Vec<(RoleId, Arc<dyn Role>)> {
        Vec::new()
    }

    fn hooks(&self) -> ModelHooks {
        ModelHooks {
            after_action: true,
            ..ModelHooks::default()
        }
    }

    async fn after_action(&self) -> ActionResult<()> {
        *self.after_actions.lock() += 1;
        Ok(())
    }
}

fn log_registry(model: Arc<LogModel>) -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    let recorder = Arc::clone(&model);
    registry.register("", "append", move |_target, args: Vec<ModelValue>| {
        let model = Arc::clone(&recorder);
        async move {
            let sequence = args
                .first()
                .and_then(ModelValue::as_int)
                .ok_or_else(|| ActionError::failed("missing sequence tag"))?;
            let step = args
                .get(1)
                .and_then(ModelValue::as_int)
                .ok_or_else(|| ActionError::failed("missing step"))?;
            model.log.lock().push((sequence, step));
            Ok(Some(ModelValue::Int(step)))
        }
    });
    registry.register("", "explode", move |_target, _args| async move {
        Err(ActionError::failed("deliberate failure"))
    });
    registry
}

fn append_request(sequence: i64, step: i64) -> ExecuteActionRequest {
    ExecuteActionRequest {
        role: None,
        action_name: "append".into(),
        args: vec![
            Arg {
                name: "sequence".into(),
                value: WireValue::Int(sequence),
            },
            Arg {
                name: "step".into(),
                value: WireValue::Int(step),
            },
        ],
        options: ExecOptions::default(),
    }
}

#[tokio::test]
async fn results_match_request_shape_and_order() {
    let model = LogModel::new();
    let service = PluginService::new(model.clone(), log_registry(model.clone()));

    let lengths = [3usize, 1, 4, 0, 2];
    let request = ExecuteActionSequencesRequest {
        action_sequences: lengths
            .iter()
            .enumerate()
            .map(|(seq, &len)| ActionSequence {
                requests: (0..len as i64)
                    .map(|step| append_request(seq as i64, step))
                    .collect(),
            })
            .collect(),
    };

    let response = service.execute_action_sequences(request).await;
    assert_eq!(response.results.len(), lengths.len());
    for (result, &len) in response.results.iter().zip(&lengths) {
        assert_eq!(result.responses.len(), len);
        for (step, action) in result.responses.iter().enumerate() {
            assert_eq!(action.status.code, StatusCode::Ok);
            assert_eq!(action.return_values, vec![WireValue::Int(step as i64)]);
        }
    }
}

#[tokio::test]
async fn steps_within_one_sequence_stay_ordered() {
    let model = LogModel::new();
    let service = PluginService::new(model.clone(), log_registry(model.clone()));

    let request = ExecuteActionSequencesRequest {
        action_sequences: (0..4)
            .map(|seq| ActionSequence {
                requests: (0..8).map(|step| append_request(seq, step)).collect(),
            })
            .collect(),
    };
    service.execute_action_sequences(request).await;

    let log = model.log.lock();
    for seq in 0..4 {
        let steps: Vec<i64> = log
            .iter()
            .filter(|(s, _)| *s == seq)
            .map(|(_, step)| *step)
            .collect();
        assert_eq!(steps, (0..8).collect::<Vec<i64>>());
    }
}

#[tokio::test]
async fn one_failing_request_does_not_abort_its_sequence() {
    let model = LogModel::new();
    let service = PluginService::new(model.clone(), log_registry(model.clone()));

    let request = ExecuteActionSequencesRequest {
        action_sequences: vec![ActionSequence {
            requests: vec![
                append_request(0, 0),
                ExecuteActionRequest {
                    role: None,
                    action_name: "explode".into(),
                    args: Vec::new(),
                    options: ExecOptions::default(),
                },
                append_request(0, 1),
            ],
        }],
    };

    let response = service.execute_action_sequences(request).await;
    let responses = &response.results[0].responses;
    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0].status.code, StatusCode::Ok);
    assert_eq!(responses[1].status.code, StatusCode::ExecutionFailed);
    assert!(responses[1].status.message.contains("deliberate failure"));
    assert_eq!(responses[2].status.code, StatusCode::Ok);

    let log = model.log.lock();
    assert_eq!(*log, vec![(0, 0), (0, 1)]);
}

#[tokio::test]
async fn after_action_hook_is_skipped_under_interleaving() {
    let model = LogModel::new();
    let service = PluginService::new(model.clone(), log_registry(model.clone()));

    let request = ExecuteActionSequencesRequest {
        action_sequences: vec![
            ActionSequence {
                requests: vec![append_request(0, 0), append_request(0, 1)],
            },
            ActionSequence {
                requests: vec![append_request(1, 0)],
            },
        ],
    };
    service.execute_action_sequences(request).await;
    assert_eq!(*model.after_actions.lock(), 0);

    // The same action standalone does run the hook.
    service.execute_action(append_request(9, 0)).await;
    assert_eq!(*model.after_actions.lock(), 1);
}
