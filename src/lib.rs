//! # Orchestrator Core
//!
//! A multi-agent task orchestration engine: remote agents register over a
//! WebSocket gateway, advertise capabilities, and pull work from a
//! Coordinator that owns the authoritative Agent/Task/Workflow state. Tasks
//! can be submitted directly or expanded from a Workflow's dependency DAG,
//! and either can be triggered on a cron schedule.
//!
//! ## Architecture
//!
//! - **Coordinator**: single authoritative registry for agents, tasks and
//!   workflows, and the matching pass that pairs pending tasks with
//!   capable, idle agents.
//! - **Agent Manager**: owns per-agent inboxes and connection health,
//!   dispatching matched tasks to the agent that claimed them.
//! - **Workflow Engine**: expands a workflow into a DAG of tasks and
//!   advances it as task-completion events arrive.
//! - **Scheduler**: fires task or workflow submissions on a cron schedule.
//! - **Gateway**: the WebSocket surface agents connect through.
//!
//! ## Usage
//!
//! Run as a standalone service exposing a REST API (agent/task/workflow/
//! schedule management) and a `/ws` endpoint for agent connections.

/// HTTP API server and endpoints
pub mod api;
/// Authentication and authorization
pub mod auth;
/// Agent registration, health checks and task dispatch
pub mod agent_manager;
/// System configuration
pub mod config;
/// System-wide constants
pub mod constants;
/// Coordinator: agent/task/workflow state and the matching pass
pub mod coordinator;
/// Error types and handling
pub mod error;
/// WebSocket gateway for agent connections
pub mod gateway;
/// Core data models
pub mod models;
/// System monitoring and metrics
pub mod monitoring;
/// Rate limiting functionality
pub mod rate_limit;
/// Cron-driven task and workflow scheduling
pub mod scheduler;
/// Input validation and sanitization
pub mod validation;
/// Workflow DAG expansion and advancement
pub mod workflow_engine;

#[cfg(test)]
mod tests;

pub use error::{OrchestratorError, Result};
