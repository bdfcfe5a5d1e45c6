//! Task dispatch and reply correlation. Each outstanding task holds a
//! one-shot waiter keyed by task id; a reply or the timeout resolves the
//! caller exactly once, whichever removes the waiter first.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

use crate::minecraft::common::ServerStatus;
use crate::minecraft::Protocol;
use crate::probes::registry::{self, ProbeSession};

pub const TASK_TIMEOUT: Duration = Duration::from_secs(6);

/// Downstream frame sent to a probe.
#[derive(Debug, Serialize)]
struct ProbeTask<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    target: &'a str,
    port: u16,
    protocol: Protocol,
}

/// Upstream frame received from a probe, or synthesized locally on timeout
/// and dispatch failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    #[serde(default)]
    pub id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ServerStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskResult {
    pub fn failed(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

fn waiters() -> &'static DashMap<String, oneshot::Sender<TaskResult>> {
    static WAITERS: OnceLock<DashMap<String, oneshot::Sender<TaskResult>>> = OnceLock::new();
    WAITERS.get_or_init(DashMap::new)
}

/// Sends one ping task to one probe and waits for its result or the timeout.
pub async fn send_task(
    probe_id: &str,
    target: &str,
    port: u16,
    protocol: Protocol,
    task_timeout: Duration,
) -> TaskResult {
    if registry::get(probe_id).is_none() {
        return TaskResult::failed("", format!("Probe {} not found", probe_id));
    }

    let id = Uuid::new_v4().to_string();
    let task = ProbeTask {
        id: &id,
        kind: "ping",
        target,
        port,
        protocol,
    };
    let frame = match serde_json::to_string(&task) {
        Ok(frame) => frame,
        Err(e) => return TaskResult::failed(id, format!("Failed to encode task: {}", e)),
    };

    let (tx, mut rx) = oneshot::channel();
    waiters().insert(id.clone(), tx);

    if let Err(e) = registry::send_to(probe_id, frame) {
        waiters().remove(&id);
        return TaskResult::failed(id, e);
    }

    let sleep = tokio::time::sleep(task_timeout);
    tokio::pin!(sleep);

    tokio::select! {
        reply = &mut rx => match reply {
            Ok(result) => result,
            // Waiter vanished without a reply
            Err(_) => TaskResult::failed(id, "Task timeout"),
        },
        _ = &mut sleep => {
            if waiters().remove(&id).is_some() {
                debug!("Task {} timed out", id);
                TaskResult::failed(id, "Task timeout")
            } else {
                // A reply claimed the waiter as the timer fired; take it
                match rx.await {
                    Ok(result) => result,
                    Err(_) => TaskResult::failed(id, "Task timeout"),
                }
            }
        }
    }
}

/// Routes a probe's reply to its waiter. Replies correlate only by id;
/// anything without a pending waiter is a late reply and is dropped.
pub fn handle_reply(result: TaskResult) {
    match waiters().remove(&result.id) {
        Some((_, tx)) => {
            let _ = tx.send(result);
        }
        None => debug!("Dropping reply for unknown task {}", result.id),
    }
}

/// Sends the same task to every probe in the snapshot and collects all
/// results. The caller takes one registry snapshot and derives everything it
/// needs from it, so no lock is held across sends and the result set cannot
/// drift from what the caller saw. Per-probe failures and timeouts never
/// affect the others.
pub async fn broadcast_task(
    probes: Vec<ProbeSession>,
    target: &str,
    port: u16,
    protocol: Protocol,
) -> HashMap<String, TaskResult> {
    let tasks = probes.into_iter().map(|session| async move {
        let result = send_task(&session.id, target, port, protocol, TASK_TIMEOUT).await;
        (session.id, result)
    });

    join_all(tasks).await.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ws::Message;
    use tokio::sync::mpsc;

    fn register_probe(id: &str) -> (Uuid, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = ProbeSession::new(id.to_string(), "test".to_string(), tx);
        let conn = session.conn;
        registry::register(session);
        (conn, rx)
    }

    fn task_id_of(frame: &Message) -> String {
        let Message::Text(text) = frame else {
            panic!("expected text frame");
        };
        let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(value["type"], "ping");
        value["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn unknown_probe_is_synthesized_without_waiting() {
        let result = send_task("disp-ghost", "mc.example.com", 25565, Protocol::Java, TASK_TIMEOUT).await;
        assert!(!result.success);
        assert_eq!(result.id, "");
        assert_eq!(result.error.as_deref(), Some("Probe disp-ghost not found"));
    }

    #[tokio::test]
    async fn reply_resolves_matching_waiter() {
        let (conn, mut rx) = register_probe("disp-corr");

        // Answer every frame this session sees; correlation by id ensures the
        // caller below gets the reply minted for its own task.
        let responder = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if matches!(frame, Message::Close(_)) {
                    break;
                }
                let id = task_id_of(&frame);
                handle_reply(TaskResult {
                    id,
                    success: true,
                    data: Some(ServerStatus::online("mc.example.com", 25565)),
                    error: None,
                });
            }
        });

        let result = send_task(
            "disp-corr",
            "mc.example.com",
            25565,
            Protocol::Java,
            TASK_TIMEOUT,
        )
        .await;

        assert!(result.success);
        assert!(!result.id.is_empty());
        assert!(result.data.is_some());

        registry::unregister("disp-corr", conn);
        responder.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn silence_resolves_to_timeout() {
        let (conn, _rx) = register_probe("disp-silent");

        let result = send_task(
            "disp-silent",
            "mc.example.com",
            25565,
            Protocol::Java,
            Duration::from_millis(50),
        )
        .await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Task timeout"));

        registry::unregister("disp-silent", conn);
    }

    #[tokio::test]
    async fn late_reply_is_dropped() {
        // No waiter exists for this id; must not panic or leak
        handle_reply(TaskResult::failed("no-such-task", "whatever"));
    }

    #[tokio::test(start_paused = true)]
    async fn broadcast_covers_every_probe_independently() {
        let (conn_a, mut rx_a) = register_probe("disp-bc-a");
        let (conn_b, _rx_b) = register_probe("disp-bc-b");

        // Probe A answers every task; probe B stays silent and times out
        let responder = tokio::spawn(async move {
            while let Some(frame) = rx_a.recv().await {
                if matches!(frame, Message::Close(_)) {
                    break;
                }
                let id = task_id_of(&frame);
                handle_reply(TaskResult {
                    id,
                    success: true,
                    data: None,
                    error: None,
                });
            }
        });

        let results =
            broadcast_task(registry::snapshot(), "mc.example.com", 25565, Protocol::Java).await;

        let a = results.get("disp-bc-a").expect("probe a present");
        assert!(a.success);
        let b = results.get("disp-bc-b").expect("probe b present");
        assert!(!b.success);
        assert_eq!(b.error.as_deref(), Some("Task timeout"));

        registry::unregister("disp-bc-a", conn_a);
        registry::unregister("disp-bc-b", conn_b);
        responder.abort();
    }
}
