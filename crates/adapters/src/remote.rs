// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket bridge to the downstream AI-process adapter service.
//!
//! Requests go out as `{"id", "method", "params"}` and are correlated by
//! id; the service pushes `{"type": "event", ...}` and
//! `{"type": "approval_request", ...}` frames which fan out to the
//! registered handlers. Connection establishment retries while the
//! service starts up.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;

use crate::agent::{
    AdapterDecision, AdapterError, AdapterEvent, AgentAdapter, ApprovalRequest, ForkOptions,
    ThreadHandle, TurnOptions,
};
use crate::handlers::{HandlerSet, HandlerSubscription};

const CONNECT_ATTEMPTS: usize = 10;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(500);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct RemoteAgentAdapter {
    outbound: mpsc::UnboundedSender<Message>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Result<serde_json::Value, String>>>>>,
    next_request: AtomicU64,
    events: Arc<HandlerSet<AdapterEvent>>,
    approvals: Arc<HandlerSet<ApprovalRequest>>,
}

impl RemoteAgentAdapter {
    /// Connect to the adapter service, retrying while it starts up.
    pub async fn connect(url: &str) -> Result<Arc<Self>, AdapterError> {
        let mut last_error = String::new();
        let mut stream = None;
        for attempt in 0..CONNECT_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            }
            match tokio_tungstenite::connect_async(url).await {
                Ok((ws, _)) => {
                    stream = Some(ws);
                    break;
                }
                Err(e) => last_error = e.to_string(),
            }
        }
        let ws = stream.ok_or_else(|| {
            AdapterError::Unavailable(format!(
                "adapter service at {url} unreachable after {CONNECT_ATTEMPTS} attempts: {last_error}"
            ))
        })?;

        let (mut ws_tx, mut ws_rx) = ws.split();
        let (outbound, mut out_rx) = mpsc::unbounded_channel::<Message>();

        let adapter = Arc::new(Self {
            outbound,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_request: AtomicU64::new(1),
            events: Arc::new(HandlerSet::new()),
            approvals: Arc::new(HandlerSet::new()),
        });

        // Writer: drain outbound requests onto the socket.
        tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                if ws_tx.send(message).await.is_err() {
                    break;
                }
            }
        });

        // Reader: route responses to their waiters, push frames to
        // handlers.
        let pending = Arc::clone(&adapter.pending);
        let events = Arc::clone(&adapter.events);
        let approvals = Arc::clone(&adapter.approvals);
        tokio::spawn(async move {
            while let Some(message) = ws_rx.next().await {
                let text = match message {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => continue,
                };
                route_frame(text.as_str(), &pending, &events, &approvals);
            }
            // Socket gone: fail every in-flight request.
            let drained: Vec<_> = pending.lock().drain().collect();
            for (_, tx) in drained {
                let _ = tx.send(Err("adapter connection closed".to_string()));
            }
        });

        Ok(adapter)
    }

    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, AdapterError> {
        let id = self.next_request.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let frame = serde_json::json!({ "id": id, "method": method, "params": params });
        let sent = self.outbound.send(Message::Text(frame.to_string().into())).is_ok();
        if !sent {
            self.pending.lock().remove(&id);
            return Err(AdapterError::Unavailable("adapter connection closed".into()));
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(error))) => Err(AdapterError::Protocol(error)),
            Ok(Err(_)) => Err(AdapterError::Unavailable("adapter connection closed".into())),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(AdapterError::Unavailable(format!("{method} timed out")))
            }
        }
    }
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<serde_json::Value, String>>>>>;

fn route_frame(
    text: &str,
    pending: &Pending,
    events: &HandlerSet<AdapterEvent>,
    approvals: &HandlerSet<ApprovalRequest>,
) {
    let Ok(json) = serde_json::from_str::<serde_json::Value>(text) else {
        tracing::debug!("unparseable adapter frame");
        return;
    };

    // Response to one of our requests.
    if let Some(id) = json.get("id").and_then(|v| v.as_u64()) {
        let Some(tx) = pending.lock().remove(&id) else {
            return;
        };
        let outcome = match json.get("error") {
            Some(error) => Err(error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("adapter error")
                .to_string()),
            None => Ok(json.get("result").cloned().unwrap_or(serde_json::Value::Null)),
        };
        let _ = tx.send(outcome);
        return;
    }

    // Push frame.
    match json.get("type").and_then(|t| t.as_str()) {
        Some("approval_request") => {
            match serde_json::from_value::<ApprovalRequest>(
                json.get("request").cloned().unwrap_or(serde_json::Value::Null),
            ) {
                Ok(request) => approvals.emit(&request),
                Err(e) => tracing::warn!(error = %e, "malformed approval request"),
            }
        }
        Some(_) => match serde_json::from_value::<AdapterEvent>(json) {
            Ok(event) => events.emit(&event),
            Err(e) => tracing::debug!(error = %e, "unrecognized adapter event"),
        },
        None => {}
    }
}

#[async_trait]
impl AgentAdapter for RemoteAgentAdapter {
    async fn start_thread(&self) -> Result<ThreadHandle, AdapterError> {
        let result = self.call("startThread", serde_json::json!({})).await?;
        let id = result
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::Protocol("startThread returned no id".into()))?;
        Ok(ThreadHandle { id: id.to_string() })
    }

    async fn fork_thread(
        &self,
        parent_thread_id: &str,
        opts: ForkOptions,
    ) -> Result<ThreadHandle, AdapterError> {
        let result = self
            .call(
                "forkThread",
                serde_json::json!({ "parentThreadId": parent_thread_id, "cwd": opts.cwd }),
            )
            .await?;
        let id = result
            .get("thread")
            .and_then(|t| t.get("id"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::Protocol("forkThread returned no thread id".into()))?;
        Ok(ThreadHandle { id: id.to_string() })
    }

    async fn send_turn(
        &self,
        thread_id: &str,
        prompt: &str,
        opts: TurnOptions,
    ) -> Result<String, AdapterError> {
        let result = self
            .call(
                "sendTurn",
                serde_json::json!({ "threadId": thread_id, "prompt": prompt, "cwd": opts.cwd }),
            )
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AdapterError::Protocol("sendTurn returned no run id".into()))
    }

    async fn cancel(&self, run_id: &str) -> Result<(), AdapterError> {
        self.call("cancel", serde_json::json!({ "runId": run_id })).await?;
        Ok(())
    }

    async fn respond_to_approval(
        &self,
        token: &str,
        decision: AdapterDecision,
    ) -> Result<bool, AdapterError> {
        let result = self
            .call(
                "respondToApproval",
                serde_json::json!({ "token": token, "decision": decision }),
            )
            .await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    fn on_event(
        &self,
        handler: Box<dyn Fn(&AdapterEvent) + Send + Sync>,
    ) -> HandlerSubscription {
        self.events.register(handler)
    }

    fn on_approval_request(
        &self,
        handler: Box<dyn Fn(&ApprovalRequest) + Send + Sync>,
    ) -> HandlerSubscription {
        self.approvals.register(handler)
    }
}

#[cfg(test)]
#[path = "remote_tests.rs"]
mod tests;
