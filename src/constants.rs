//! Tunable defaults, overridable via `Config`. Values here are the
//! fallbacks used when the corresponding environment variable is unset.

use std::time::Duration;

pub const DEFAULT_TRANSPORT_PORT_PRIMARY: u16 = 8080;
pub const DEFAULT_TRANSPORT_PORT_RPC: u16 = 9090;

pub const DEFAULT_ADMISSION_QUEUE_SIZE: usize = 1000;
pub const DEFAULT_AGENT_INBOX_SIZE: usize = 100;
pub const DEFAULT_GATEWAY_SEND_BUFFER: usize = 256;

pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_TIMEOUT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

pub const DEFAULT_AGENT_INACTIVE_THRESHOLD: Duration = Duration::from_secs(2 * 60);
pub const DEFAULT_AGENT_DEAD_THRESHOLD: Duration = Duration::from_secs(5 * 60);

pub const GATEWAY_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(54);
pub const GATEWAY_READ_DEADLINE: Duration = Duration::from_secs(60);

pub const SCHEDULER_TICK_INTERVAL: Duration = Duration::from_secs(1);

pub const MAX_TASK_PAYLOAD_LENGTH: usize = 10_000;
pub const MAX_CONTEXT_KEY_LENGTH: usize = 100;
pub const MAX_CONTEXT_VALUE_LENGTH: usize = 1_000;

pub const METRICS_HISTORY_RETENTION: usize = 200;
