//! Gateway: the real-time bidirectional transport. Agents and users
//! connect over a WebSocket; each connection gets an independent
//! reader/writer task pair so a slow write never blocks processing of the
//! next inbound frame, and vice versa.

pub mod protocol;

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use subtle::ConstantTimeEq;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::agent_manager::AgentManager;
use crate::config::ApiConfig;
use crate::coordinator::events::Event;
use crate::coordinator::Coordinator;
use crate::models::{AgentRegistration, TaskSubmission, WorkflowSubmission};

use protocol::{ClientRole, Frame, InboundMessage, OutboundMessage};

struct ClientRecord {
    role: ClientRole,
    agent_id: Option<String>,
    outbound: mpsc::Sender<OutboundMessage>,
}

#[derive(Clone)]
pub struct Gateway {
    coordinator: Arc<Coordinator>,
    agent_manager: Arc<AgentManager>,
    config: ApiConfig,
    clients: Arc<RwLock<HashMap<String, ClientRecord>>>,
}

impl Gateway {
    pub fn new(coordinator: Arc<Coordinator>, agent_manager: Arc<AgentManager>, config: ApiConfig) -> Arc<Self> {
        Arc::new(Self {
            coordinator,
            agent_manager,
            config,
            clients: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Requires the same `x-api-key`/`Bearer` credential as the REST
    /// surface before completing the upgrade handshake.
    pub async fn handle_upgrade(
        State(gateway): State<Arc<Gateway>>,
        headers: HeaderMap,
        ws: WebSocketUpgrade,
    ) -> impl IntoResponse {
        let provided = headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .or_else(|| {
                headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.strip_prefix("Bearer "))
            });
        let authorized = provided
            .map(|key| key.as_bytes().ct_eq(gateway.config.api_key.as_bytes()).into())
            .unwrap_or(false);
        if !authorized {
            return StatusCode::UNAUTHORIZED.into_response();
        }

        ws.on_upgrade(move |socket| async move { gateway.handle_socket(socket).await })
            .into_response()
    }

    async fn handle_socket(self: Arc<Self>, socket: WebSocket) {
        let client_id = Uuid::new_v4().to_string();
        let (mut sink, mut stream) = socket.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundMessage>(self.config.gateway_send_buffer);

        self.clients.write().await.insert(
            client_id.clone(),
            ClientRecord {
                role: ClientRole::User,
                agent_id: None,
                outbound: outbound_tx.clone(),
            },
        );

        let welcome = OutboundMessage::Welcome {
            client_id: client_id.clone(),
        }
        .into_frame();
        if let Ok(text) = serde_json::to_string(&welcome) {
            let _ = sink.send(Message::Text(text.into())).await;
        }

        let writer_client_id = client_id.clone();
        let writer = tokio::spawn(async move {
            let mut keepalive = tokio::time::interval(crate::constants::GATEWAY_KEEPALIVE_INTERVAL);
            loop {
                tokio::select! {
                    maybe_message = outbound_rx.recv() => {
                        let Some(message) = maybe_message else { break };
                        let frame = message.into_frame();
                        match serde_json::to_string(&frame) {
                            Ok(text) => {
                                if sink.send(Message::Text(text.into())).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => tracing::warn!(client_id = %writer_client_id, "failed to encode frame: {e}"),
                        }
                    }
                    _ = keepalive.tick() => {
                        if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let gateway = self.clone();
        let reader_client_id = client_id.clone();
        let reader = tokio::spawn(async move {
            loop {
                let next = tokio::time::timeout(crate::constants::GATEWAY_READ_DEADLINE, stream.next()).await;
                let message = match next {
                    Ok(Some(Ok(message))) => message,
                    _ => break,
                };
                match message {
                    Message::Text(text) => {
                        gateway
                            .handle_inbound(&reader_client_id, &text, &outbound_tx)
                            .await;
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        });

        let _ = tokio::join!(writer, reader);
        self.handle_disconnect(&client_id).await;
    }

    async fn handle_inbound(
        &self,
        client_id: &str,
        text: &str,
        outbound: &mpsc::Sender<OutboundMessage>,
    ) {
        let frame: Frame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(client_id, "dropping unparseable frame: {e}");
                return;
            }
        };

        let envelope = serde_json::json!({"type": frame.frame_type, "data": frame.data});
        let message: InboundMessage = match serde_json::from_value(envelope) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(client_id, frame_type = %frame.frame_type, "unknown inbound message type: {e}");
                return;
            }
        };

        match message {
            InboundMessage::AgentRegister {
                name,
                agent_type,
                capabilities,
                config,
            } => {
                let agent = self
                    .coordinator
                    .register_agent(AgentRegistration {
                        name,
                        agent_type,
                        capabilities: capabilities.into_iter().collect(),
                        config,
                    })
                    .await;
                self.agent_manager
                    .register_connection(agent.id.clone(), outbound.clone())
                    .await;
                self.clients.write().await.insert(
                    client_id.to_string(),
                    ClientRecord {
                        role: ClientRole::Agent,
                        agent_id: Some(agent.id.clone()),
                        outbound: outbound.clone(),
                    },
                );
                let _ = outbound
                    .send(OutboundMessage::AgentRegistered { agent_id: agent.id })
                    .await;
            }
            InboundMessage::AgentUnregister => {
                if let Some(agent_id) = self.bound_agent(client_id).await {
                    self.agent_manager.remove_connection(&agent_id).await;
                    self.coordinator.unregister_agent(&agent_id).await;
                }
            }
            InboundMessage::AgentHeartbeat => {
                if let Some(agent_id) = self.bound_agent(client_id).await {
                    self.agent_manager.touch(&agent_id).await;
                    // Don't clobber Busy: a heartbeat from an agent mid-task
                    // must not make it look available to the matching pass.
                    if let Ok(agent) = self.coordinator.get_agent(&agent_id).await {
                        if agent.status != crate::models::AgentStatus::Busy {
                            let _ = self
                                .coordinator
                                .update_agent_status(&agent_id, crate::models::AgentStatus::Active)
                                .await;
                        }
                    }
                }
                let _ = outbound.send(OutboundMessage::HeartbeatAck).await;
            }
            InboundMessage::AgentTaskResult {
                task_id,
                success,
                result,
                error,
            } => {
                if let Some(agent_id) = self.bound_agent(client_id).await {
                    self.agent_manager.touch(&agent_id).await;
                }
                if let Err(e) = self
                    .coordinator
                    .complete_task(&task_id, success, result, error)
                    .await
                {
                    tracing::debug!(task_id, "complete_task rejected: {e}");
                }
            }
            InboundMessage::UserCommand { command, args } => {
                self.handle_user_command(client_id, &command, args, outbound)
                    .await;
            }
        }
    }

    /// Supports the small subcommand set users drive interactively over the
    /// socket; anything wider (filtering, pagination) goes through the REST
    /// surface instead.
    async fn handle_user_command(
        &self,
        client_id: &str,
        command: &str,
        args: serde_json::Value,
        outbound: &mpsc::Sender<OutboundMessage>,
    ) {
        let result = match command {
            "list_agents" => {
                let agents = self.coordinator.list_agents().await;
                let _ = outbound.send(OutboundMessage::AgentList { agents }).await;
                return;
            }
            "create_task" => match serde_json::from_value::<TaskSubmission>(args) {
                Ok(submission) => self
                    .coordinator
                    .submit_task(submission)
                    .await
                    .map(|task| OutboundMessage::TaskCreated { task_id: task.id }),
                Err(e) => Err(crate::error::OrchestratorError::Invalid(e.to_string())),
            },
            "create_workflow" => match serde_json::from_value::<WorkflowSubmission>(args) {
                Ok(submission) => self
                    .coordinator
                    .submit_workflow(submission)
                    .await
                    .map(|workflow| OutboundMessage::WorkflowCreated {
                        workflow_id: workflow.id,
                    }),
                Err(e) => Err(crate::error::OrchestratorError::Invalid(e.to_string())),
            },
            other => Err(crate::error::OrchestratorError::Invalid(format!(
                "unknown command {other}"
            ))),
        };

        match result {
            Ok(message) => {
                let _ = outbound.send(message).await;
            }
            Err(e) => {
                tracing::debug!(client_id, command, "user command failed: {e}");
                let _ = outbound
                    .send(OutboundMessage::CommandError {
                        command: command.to_string(),
                        error: e.to_string(),
                    })
                    .await;
            }
        }
    }

    /// Subscribes to the Coordinator's event bus and relays a subset of
    /// events (`task.completed`, `task.timeout`, `agent.registered`) to
    /// every connected client, per §4.5's "event fan-out" outbound types.
    /// Never blocks the Coordinator: each client's outbound channel is a
    /// bounded `try_send`-equivalent best-effort push.
    pub async fn run_event_fanout(self: Arc<Self>) {
        let mut events = self.coordinator.subscribe().await;
        while let Some(event) = events.recv().await {
            let message = match event {
                Event::TaskCompleted { task_id, status } => Some(OutboundMessage::TaskCompleted {
                    task_id,
                    status: status.to_string(),
                }),
                Event::TaskTimeout { task_id } => Some(OutboundMessage::TaskTimeout { task_id }),
                Event::AgentRegistered { agent_id } => {
                    Some(OutboundMessage::AgentRegistered { agent_id })
                }
                _ => None,
            };
            if let Some(message) = message {
                self.broadcast(message).await;
            }
        }
    }

    async fn broadcast(&self, message: OutboundMessage) {
        let clients = self.clients.read().await;
        for client in clients.values() {
            let _ = client.outbound.try_send(message.clone());
        }
    }

    async fn bound_agent(&self, client_id: &str) -> Option<String> {
        self.clients
            .read()
            .await
            .get(client_id)
            .and_then(|c| c.agent_id.clone())
    }

    async fn handle_disconnect(&self, client_id: &str) {
        let record = self.clients.write().await.remove(client_id);
        if let Some(ClientRecord {
            role: ClientRole::Agent,
            agent_id: Some(agent_id),
            ..
        }) = record
        {
            self.agent_manager.remove_connection(&agent_id).await;
            self.coordinator.unregister_agent(&agent_id).await;
        }
    }
}
