// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The realtime WebSocket gateway.
//!
//! One endpoint; the pre-upgrade callback enforces origin, auth, and the
//! connection cap. Each accepted socket gets a paused/resumed outbound
//! queue, a bus subscription fan-in (events are serialized once and
//! shared across connections), inbound frame dispatch, and a heartbeat.

mod auth;
mod connection;

pub use auth::AuthRejection;
pub use connection::{ConnectionSink, Outbound, MAX_PAYLOAD, PAUSE_AT, RESUME_AT};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use forks_adapters::{AgentAdapter, HandlerSubscription};
use forks_core::{DomainEvent, EventBus, Subscription};
use forks_pty::PtyManager;
use forks_wire::{decode_client, encode_server, ClientFrame, ServerFrame};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// Concurrent connection cap.
pub const MAX_CONNECTIONS: usize = 100;

/// WebSocket-level ping cadence.
const HEARTBEAT_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

/// How long a ping may go unanswered.
const PONG_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

#[derive(Clone, Default)]
pub struct GatewayConfig {
    pub auth_token: Option<String>,
    pub allowed_origins: Vec<String>,
}

pub struct Gateway {
    bus: EventBus,
    adapter: Arc<dyn AgentAdapter>,
    pty: Arc<PtyManager>,
    config: GatewayConfig,
    connections: Mutex<HashMap<u64, Arc<Outbound>>>,
    next_key: AtomicU64,
    bus_subscriptions: Mutex<Vec<Subscription>>,
    adapter_subscriptions: Mutex<Vec<HandlerSubscription>>,
}

impl Gateway {
    pub fn new(
        bus: EventBus,
        adapter: Arc<dyn AgentAdapter>,
        pty: Arc<PtyManager>,
        config: GatewayConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            bus,
            adapter,
            pty,
            config,
            connections: Mutex::new(HashMap::new()),
            next_key: AtomicU64::new(1),
            bus_subscriptions: Mutex::new(Vec::new()),
            adapter_subscriptions: Mutex::new(Vec::new()),
        })
    }

    /// Accept connections until the shutdown token fires.
    pub async fn run(self: Arc<Self>, listener: TcpListener, shutdown: CancellationToken) {
        self.subscribe_sources();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        tracing::debug!(%addr, "gateway connection");
                        let gateway = Arc::clone(&self);
                        tokio::spawn(async move {
                            if let Err(e) = gateway.handle_socket(stream).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => tracing::error!(error = %e, "accept error"),
                },
                _ = shutdown.cancelled() => break,
            }
        }

        self.unsubscribe_sources();
        self.connections.lock().clear();
    }

    /// Register the fan-in listeners: domain events and raw adapter
    /// events, each serialized once per emission.
    fn subscribe_sources(self: &Arc<Self>) {
        let gateway = Arc::clone(self);
        let bus_sub = self.bus.subscribe(move |event| gateway.broadcast_domain(event));
        self.bus_subscriptions.lock().push(bus_sub);

        let gateway = Arc::clone(self);
        let adapter_sub = self.adapter.on_event(Box::new(move |event| {
            match serde_json::to_value(event) {
                Ok(json) => gateway.broadcast(ServerFrame::Adapter { event: json }),
                Err(e) => tracing::error!(error = %e, "adapter event serialization failed"),
            }
        }));
        self.adapter_subscriptions.lock().push(adapter_sub);
    }

    fn unsubscribe_sources(&self) {
        for sub in self.bus_subscriptions.lock().drain(..) {
            sub.unsubscribe();
        }
        for sub in self.adapter_subscriptions.lock().drain(..) {
            sub.unsubscribe();
        }
    }

    fn broadcast_domain(&self, event: &DomainEvent) {
        self.broadcast(ServerFrame::Agent { event: event.clone() });
    }

    fn broadcast(&self, frame: ServerFrame) {
        let droppable = frame.droppable_under_backpressure();
        let serialized = match encode_server(&frame) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "frame serialization failed");
                return;
            }
        };
        let connections: Vec<Arc<Outbound>> =
            self.connections.lock().values().cloned().collect();
        for outbound in connections {
            outbound.enqueue_text(&serialized, droppable);
        }
    }

    /// Full lifecycle of one socket: handshake, pumps, cleanup.
    async fn handle_socket(
        self: Arc<Self>,
        stream: TcpStream,
    ) -> Result<(), tokio_tungstenite::tungstenite::Error> {
        let config = WebSocketConfig::default()
            .max_message_size(Some(MAX_PAYLOAD))
            .max_frame_size(Some(MAX_PAYLOAD));

        let auth_token = self.config.auth_token.clone();
        let origins = self.config.allowed_origins.clone();
        let at_capacity = self.connections.lock().len() >= MAX_CONNECTIONS;

        let callback = move |request: &Request, mut response: Response| {
            match check_upgrade(request, auth_token.as_deref(), &origins, at_capacity) {
                Ok(Some(protocol)) => {
                    if let Ok(value) = protocol.parse() {
                        response.headers_mut().insert("Sec-WebSocket-Protocol", value);
                    }
                    Ok(response)
                }
                Ok(None) => Ok(response),
                Err(rejection) => Err(reject(rejection)),
            }
        };

        let ws =
            tokio_tungstenite::accept_hdr_async_with_config(stream, callback, Some(config)).await?;

        let key = self.next_key.fetch_add(1, Ordering::SeqCst);
        let (outbound, out_rx) = Outbound::new();
        self.connections.lock().insert(key, Arc::clone(&outbound));

        let result = self.connection_loop(key, ws, Arc::clone(&outbound), out_rx).await;

        self.connections.lock().remove(&key);
        self.pty.detach_all(key);
        result
    }

    async fn connection_loop(
        &self,
        key: u64,
        ws: tokio_tungstenite::WebSocketStream<TcpStream>,
        outbound: Arc<Outbound>,
        mut out_rx: mpsc::UnboundedReceiver<Message>,
    ) -> Result<(), tokio_tungstenite::tungstenite::Error> {
        let (mut ws_tx, mut ws_rx) = ws.split();
        let sink = ConnectionSink::new(Arc::clone(&outbound));

        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick fires immediately; skip it so the ping cadence starts
        // one interval in.
        heartbeat.tick().await;
        let mut pong_deadline: Option<Instant> = None;

        loop {
            let pong_at = pong_deadline;
            tokio::select! {
                inbound = ws_rx.next() => match inbound {
                    Some(Ok(Message::Text(text))) => {
                        self.dispatch_client_frame(key, text.as_bytes(), &outbound, &sink).await;
                    }
                    Some(Ok(Message::Binary(payload))) => {
                        self.dispatch_client_frame(key, &payload, &outbound, &sink).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        pong_deadline = None;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "websocket read error");
                        break;
                    }
                },
                queued = out_rx.recv() => match queued {
                    Some(message) => {
                        // Only text frames were counted on enqueue; control
                        // frames bypass the byte accounting.
                        let text_len = match &message {
                            Message::Text(text) => text.len(),
                            _ => 0,
                        };
                        ws_tx.send(message).await?;
                        if text_len > 0 {
                            outbound.mark_sent(text_len);
                        }
                    }
                    None => break,
                },
                _ = heartbeat.tick() => {
                    outbound.enqueue_control(Message::Ping(Vec::new().into()));
                    pong_deadline = Some(Instant::now() + PONG_TIMEOUT);
                }
                _ = sleep_until_opt(pong_at), if pong_at.is_some() => {
                    tracing::info!("pong timeout; closing connection");
                    let _ = ws_tx
                        .send(Message::Close(Some(CloseFrame {
                            code: CloseCode::Normal,
                            reason: "Pong timeout".into(),
                        })))
                        .await;
                    break;
                }
            }
        }
        Ok(())
    }

    /// Inbound JSON frame dispatch: ping and the `pty:*` family.
    async fn dispatch_client_frame(
        &self,
        key: u64,
        payload: &[u8],
        outbound: &Arc<Outbound>,
        sink: &Arc<ConnectionSink>,
    ) {
        let frame = match decode_client(payload) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(error = %e, "malformed client frame");
                self.send_to(
                    outbound,
                    ServerFrame::Error {
                        code: "malformed_frame".into(),
                        message: forks_core::sanitize_message(&e.to_string()),
                    },
                );
                return;
            }
        };

        match frame {
            ClientFrame::Ping => {
                self.send_to(outbound, ServerFrame::Pong);
            }
            ClientFrame::PtyAttach { id } => {
                match self.pty.attach(&id, key, Arc::clone(sink) as Arc<dyn forks_pty::OutputSink>)
                {
                    Ok(history) => {
                        self.send_to(outbound, ServerFrame::PtyAttached { id, history });
                    }
                    Err(e) => self.send_pty_error(outbound, id, &e),
                }
            }
            ClientFrame::PtyDetach { id } => {
                self.pty.detach(&id, key);
            }
            ClientFrame::PtyInput { id, data } => {
                if let Err(e) = self.pty.write(&id, data.as_bytes()).await {
                    self.send_pty_error(outbound, id, &e);
                }
            }
            ClientFrame::PtyResize { id, cols, rows } => {
                if let Err(e) = self.pty.resize(&id, cols, rows) {
                    self.send_pty_error(outbound, id, &e);
                }
            }
        }
    }

    fn send_to(&self, outbound: &Arc<Outbound>, frame: ServerFrame) {
        match encode_server(&frame) {
            Ok(serialized) => {
                outbound.enqueue_text(&serialized, false);
            }
            Err(e) => tracing::error!(error = %e, "frame serialization failed"),
        }
    }

    fn send_pty_error(
        &self,
        outbound: &Arc<Outbound>,
        id: forks_core::TerminalId,
        error: &forks_pty::PtyError,
    ) {
        self.send_to(
            outbound,
            ServerFrame::PtyError {
                id,
                message: forks_core::sanitize_message(&error.to_string()),
            },
        );
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }
}

/// The pre-upgrade decision: capacity, origin, auth, subprotocol.
fn check_upgrade(
    request: &Request,
    auth_token: Option<&str>,
    origins: &[String],
    at_capacity: bool,
) -> Result<Option<String>, AuthRejection> {
    if at_capacity {
        return Err(AuthRejection::TooManyConnections);
    }

    let header = |name: &str| request.headers().get(name).and_then(|v| v.to_str().ok());

    if !auth::origin_allowed(header("Origin"), origins) {
        return Err(AuthRejection::ForbiddenOrigin);
    }

    let provided = auth::extract_token(
        header("Authorization"),
        header("X-Forksd-Token"),
        header("Sec-WebSocket-Protocol"),
    );
    auth::check_token(auth_token, provided.as_deref())?;

    Ok(auth::select_subprotocol(header("Sec-WebSocket-Protocol")))
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn reject(rejection: AuthRejection) -> ErrorResponse {
    let (status, body) = match rejection {
        AuthRejection::ForbiddenOrigin => (403, "invalid_origin"),
        AuthRejection::Unauthorized => (401, "unauthorized"),
        AuthRejection::AuthNotConfigured => (500, "auth_not_configured"),
        AuthRejection::TooManyConnections => (503, "resource_exhausted"),
    };
    let mut response = ErrorResponse::new(Some(body.to_string()));
    *response.status_mut() = tokio_tungstenite::tungstenite::http::StatusCode::from_u16(status)
        .unwrap_or(tokio_tungstenite::tungstenite::http::StatusCode::INTERNAL_SERVER_ERROR);
    response
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod tests;
