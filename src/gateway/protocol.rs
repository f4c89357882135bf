use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire frame for both directions: `{type, timestamp, data}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}

impl Frame {
    pub fn new(frame_type: &str, data: Value) -> Self {
        Self {
            frame_type: frame_type.to_string(),
            timestamp: Utc::now(),
            data,
        }
    }
}

/// Role a connected client identifies as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientRole {
    Agent,
    User,
    Monitor,
}

/// Inbound message bodies the Gateway recognizes. Anything that doesn't
/// parse into one of these is logged and dropped, never closes the
/// connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum InboundMessage {
    #[serde(rename = "agent.register")]
    AgentRegister {
        name: String,
        #[serde(rename = "type")]
        agent_type: String,
        capabilities: Vec<String>,
        #[serde(default)]
        config: HashMap<String, String>,
    },
    #[serde(rename = "agent.unregister")]
    AgentUnregister,
    #[serde(rename = "agent.heartbeat")]
    AgentHeartbeat,
    #[serde(rename = "agent.task_result")]
    AgentTaskResult {
        task_id: String,
        success: bool,
        #[serde(default)]
        result: HashMap<String, String>,
        #[serde(default)]
        error: Option<String>,
    },
    #[serde(rename = "user.command")]
    UserCommand { command: String, args: Value },
}

/// Outbound message bodies, serialized into a `Frame` before being written
/// to the socket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OutboundMessage {
    Welcome {
        client_id: String,
    },
    #[serde(rename = "task.dispatch")]
    TaskDispatch {
        task_id: String,
        task_type: String,
        payload: HashMap<String, String>,
    },
    #[serde(rename = "task.cancel")]
    TaskCancel { task_id: String },
    #[serde(rename = "task.timeout")]
    TaskTimeout { task_id: String },
    #[serde(rename = "task.completed")]
    TaskCompleted { task_id: String, status: String },
    #[serde(rename = "agent.registered")]
    AgentRegistered { agent_id: String },
    HeartbeatAck,
    #[serde(rename = "agent.list")]
    AgentList { agents: Vec<crate::models::Agent> },
    #[serde(rename = "task.created")]
    TaskCreated { task_id: String },
    #[serde(rename = "workflow.created")]
    WorkflowCreated { workflow_id: String },
    #[serde(rename = "command.error")]
    CommandError { command: String, error: String },
}

impl OutboundMessage {
    pub fn into_frame(self) -> Frame {
        let data = serde_json::to_value(&self).unwrap_or(Value::Null);
        let frame_type = data
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let payload = data.get("data").cloned().unwrap_or(Value::Null);
        Frame::new(&frame_type, payload)
    }
}
