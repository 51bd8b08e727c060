//! Socket-level protocol tests: envelopes exchanged over a live Unix socket.

use async_trait::async_trait;
use mbt_bridge::{
    ActionRegistry, ActionResult, Model, ModelValue, PluginService, Role, RoleId, StateAccess,
    StateMap,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::any::Any;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;

struct Light {
    on: Mutex<bool>,
}

#[async_trait]
impl Role for Light {
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn state_access(&self) -> StateAccess {
        StateAccess::Plain
    }

    async fn state(&self) -> ActionResult<StateMap> {
        Ok(vec![("on".to_string(), ModelValue::Bool(*self.on.lock()))])
    }
}

struct LightModel {
    light: Arc<Light>,
}

#[async_trait]
impl Model for LightModel {
    async fn init(&self) -> ActionResult<()> {
        *self.light.on.lock() = false;
        Ok(())
    }

    async fn cleanup(&self) -> ActionResult<()> {
        Ok(())
    }

    async fn roles(&self) -> Vec<(RoleId, Arc<dyn Role>)> {
        vec![(
            RoleId::new("light", 0),
            Arc::clone(&self.light) as Arc<dyn Role>,
        )]
    }
}

struct Harness {
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    writer: tokio::net::unix::OwnedWriteHalf,
    shutdown: watch::Sender<bool>,
}

impl Harness {
    async fn start() -> Self {
        // Shared across tests in the binary, so only the first init wins.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let light = Arc::new(Light {
            on: Mutex::new(false),
        });
        let model = Arc::new(LightModel {
            light: Arc::clone(&light),
        });

        let mut registry = ActionRegistry::new();
        registry.register("light", "toggle", move |target, _args| {
            async move {
                let light = target
                    .role_as::<Light>()
                    .ok_or_else(|| mbt_bridge::ActionError::failed("expected light role"))?;
                let mut on = light.on.lock();
                *on = !*on;
                Ok(Some(ModelValue::Bool(*on)))
            }
        });

        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("plugin.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let service = PluginService::new(model, registry);
        tokio::spawn(async move {
            service.serve(listener, shutdown_rx).await;
            drop(dir);
        });

        let stream = UnixStream::connect(&socket).await.unwrap();
        let (read_half, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer,
            shutdown,
        }
    }

    async fn call(&mut self, request: Value) -> Value {
        let mut line = serde_json::to_vec(&request).unwrap();
        line.push(b'\n');
        self.writer.write_all(&line).await.unwrap();

        let mut response = String::new();
        self.reader.read_line(&mut response).await.unwrap();
        serde_json::from_str(&response).unwrap()
    }

    fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

#[tokio::test]
async fn init_toggle_cleanup_over_socket() {
    let mut harness = Harness::start().await;

    let response = harness
        .call(json!({
            "id": 1,
            "command": "init",
            "params": {"options": {"capture_state": true}}
        }))
        .await;
    assert_eq!(response["id"], json!(1));
    let result = &response["result"];
    assert_eq!(result["status"]["code"], json!("ok"));
    assert_eq!(result["roles"], json!([{"role_name": "light", "role_id": 0}]));
    assert_eq!(
        result["role_states"][0]["state"][0],
        json!(["on", {"bool": false}])
    );

    let response = harness
        .call(json!({
            "id": 2,
            "command": "execute_action",
            "params": {
                "role": {"role_name": "light", "role_id": 0},
                "action_name": "toggle"
            }
        }))
        .await;
    assert_eq!(response["result"]["status"]["code"], json!("ok"));
    assert_eq!(response["result"]["return_values"], json!([{"bool": true}]));

    let response = harness
        .call(json!({"id": 3, "command": "cleanup"}))
        .await;
    assert_eq!(response["result"]["status"]["code"], json!("ok"));
    assert_eq!(
        response["result"]["status"]["message"],
        json!("Cleanup successful")
    );

    harness.stop();
}

#[tokio::test]
async fn unsupported_command_yields_error_envelope() {
    let mut harness = Harness::start().await;

    let response = harness
        .call(json!({"id": 7, "command": "destroy_everything"}))
        .await;
    assert_eq!(response["id"], json!(7));
    assert!(response.get("result").is_none());
    assert_eq!(response["error"]["code"], json!("unsupported_command"));

    harness.stop();
}

#[tokio::test]
async fn malformed_json_yields_parse_error() {
    let mut harness = Harness::start().await;

    harness.writer.write_all(b"{not json\n").await.unwrap();
    let mut line = String::new();
    harness.reader.read_line(&mut line).await.unwrap();
    let response: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(response["id"], Value::Null);
    assert_eq!(response["error"]["code"], json!("parse_error"));

    harness.stop();
}

#[tokio::test]
async fn sequences_round_trip_over_socket() {
    let mut harness = Harness::start().await;
    harness
        .call(json!({"id": 1, "command": "init", "params": {}}))
        .await;

    let toggle = json!({
        "role": {"role_name": "light", "role_id": 0},
        "action_name": "toggle"
    });
    let response = harness
        .call(json!({
            "id": 2,
            "command": "execute_action_sequences",
            "params": {
                "action_sequences": [
                    {"requests": [toggle.clone(), toggle.clone()]},
                    {"requests": [toggle]}
                ]
            }
        }))
        .await;

    let results = response["result"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["responses"].as_array().unwrap().len(), 2);
    assert_eq!(results[1]["responses"].as_array().unwrap().len(), 1);

    harness.stop();
}
