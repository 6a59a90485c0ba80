//! `nexus-api` — typed REST client for the Nexus command-center backend.
//!
//! The backend exposes JSON request/response endpoints for projects,
//! connections, agent runs (with per-diff approve/reject), service health,
//! and activity statistics. This crate maps each endpoint to one async
//! method on [`NexusClient`] and gives every wire shape a concrete type —
//! no `Value` escape hatches except where the backend itself is free-form
//! (pulse details, proposals).
//!
//! Polling, push delivery, and optimistic state live one layer up in
//! `nexus-sync`; this crate is strictly request/response.

pub mod client;
pub mod error;
pub mod types;

pub use client::NexusClient;
pub use error::NexusApiError;
pub use types::{
    ActionKind, ActivityStats, ChartPoint, ConnectionEntry, ConnectionStatus,
    CreateConnectionRequest, CreateProjectRequest, DiffActionResponse, DiffChange, DiffItem,
    DiffStatus, HealthResponse, MessageFeed, NodeStatus, OkResponse, PlatformActivity, Project,
    Pulse, PulseStatus, ResetResponse, Run, RunLogs, RunNode, RunStatus, ServiceStatus, Stage,
    TelemetryEntry, TestConnectionResponse, TriggerRunRequest, UpdateConnectionRequest,
    UpdateProjectRequest,
};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, NexusApiError>;
