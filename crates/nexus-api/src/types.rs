use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingest,
    Reason,
    Draft,
    HumanReview,
    Execute,
}

impl Stage {
    pub fn all() -> &'static [Stage] {
        &[
            Stage::Ingest,
            Stage::Reason,
            Stage::Draft,
            Stage::HumanReview,
            Stage::Execute,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Reason => "reason",
            Stage::Draft => "draft",
            Stage::HumanReview => "human_review",
            Stage::Execute => "execute",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = crate::error::NexusApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ingest" => Ok(Stage::Ingest),
            "reason" => Ok(Stage::Reason),
            "draft" => Ok(Stage::Draft),
            "human_review" => Ok(Stage::HumanReview),
            "execute" => Ok(Stage::Execute),
            _ => Err(crate::error::NexusApiError::InvalidValue(format!(
                "unknown stage: {s}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Active,
    Completed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PulseStatus {
    Processing,
    Completed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Error,
    Syncing,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Error => "error",
            ConnectionStatus::Syncing => "syncing",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Pulse
// ---------------------------------------------------------------------------

/// One push-delivered progress event from the agent pipeline.
///
/// Timestamps are server-assigned display strings and may be skewed across
/// message types; consumers order pulses by arrival, never by `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pulse {
    pub id: String,
    #[serde(default)]
    pub timestamp: String,
    pub agent: String,
    pub action: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub target: String,
    pub status: PulseStatus,
    /// Free-form payload: the backend sends either a string or an object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

// ---------------------------------------------------------------------------
// Run / RunNode
// ---------------------------------------------------------------------------

/// One stage record inside a run's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunNode {
    pub id: String,
    pub stage: Stage,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Display string ("now", "-", or a clock time); not a parseable instant.
    #[serde(default)]
    pub timestamp: String,
    pub status: NodeStatus,
    #[serde(default)]
    pub agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

/// A single pipeline run with its timeline and proposed changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub status: RunStatus,
    #[serde(rename = "currentStage", default, skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<Stage>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub nodes: Vec<RunNode>,
    #[serde(default)]
    pub diffs: Vec<DiffItem>,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Run {
    /// The node currently marked active, if any. "Exactly one active node"
    /// is typical but not guaranteed; out-of-order stage updates can leave
    /// zero or several transiently active.
    pub fn active_node(&self) -> Option<&RunNode> {
        self.nodes.iter().find(|n| n.status == NodeStatus::Active)
    }

    pub fn pending_diffs(&self) -> usize {
        self.diffs
            .iter()
            .filter(|d| d.status == DiffStatus::Pending)
            .count()
    }
}

// ---------------------------------------------------------------------------
// DiffItem / DiffChange
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineNumbers {
    #[serde(default)]
    pub old: u32,
    #[serde(default)]
    pub new: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffChange {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub field: String,
    #[serde(rename = "oldValue", default)]
    pub old_value: String,
    #[serde(rename = "newValue", default)]
    pub new_value: String,
    #[serde(rename = "lineNumbers", default, skip_serializing_if = "Option::is_none")]
    pub line_numbers: Option<LineNumbers>,
}

/// A proposed change awaiting operator review.
///
/// `execution_result` is attached by the backend only after the status
/// leaves `pending` via an approve action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffItem {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub changes: Vec<DiffChange>,
    pub status: DiffStatus,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub proposal: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_state: Option<Value>,
}

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

// ---------------------------------------------------------------------------
// ConnectionEntry / ServiceStatus
// ---------------------------------------------------------------------------

/// A stored integration credential plus its last known health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionEntry {
    pub id: String,
    pub name: String,
    pub status: ConnectionStatus,
    #[serde(rename = "lastSync", default)]
    pub last_sync: String,
    #[serde(default)]
    pub health: u32,
    #[serde(default)]
    pub latency: u64,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<String>,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Live ping result for one backing service (Slack, Figma, Jira, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub status: ConnectionStatus,
    #[serde(default)]
    pub health: u32,
    #[serde(default)]
    pub latency: u64,
    #[serde(rename = "lastSync", default)]
    pub last_sync: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub color: String,
}

// ---------------------------------------------------------------------------
// ActivityStats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformActivity {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub events: u64,
    #[serde(default)]
    pub total_events: u64,
    #[serde(default)]
    pub change: i64,
    #[serde(default)]
    pub trend: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub events: u64,
    #[serde(default)]
    pub syncs: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
}

/// Aggregated per-project activity counters for the stats widgets.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActivityStats {
    #[serde(default)]
    pub platforms: Vec<PlatformActivity>,
    #[serde(rename = "totalEvents", default)]
    pub total_events: u64,
    #[serde(rename = "totalEventsAllTime", default)]
    pub total_events_all_time: u64,
    #[serde(rename = "totalSyncs", default)]
    pub total_syncs: u64,
    #[serde(rename = "activeAgents", default)]
    pub active_agents: u64,
    #[serde(rename = "chartData", default)]
    pub chart_data: Vec<ChartPoint>,
    #[serde(rename = "timeRange", default)]
    pub time_range: TimeRange,
    #[serde(rename = "slackHistory", default)]
    pub slack_history: u64,
}

// ---------------------------------------------------------------------------
// Telemetry / message feed / health
// ---------------------------------------------------------------------------

/// One structured log line emitted by the pipeline for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEntry {
    #[serde(default)]
    pub run_id: String,
    pub stage: String,
    pub message: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLogs {
    #[serde(default)]
    pub logs: Vec<TelemetryEntry>,
    #[serde(default)]
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MessageFeed {
    #[serde(default)]
    pub messages: Vec<Value>,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub total_history: u64,
    #[serde(default)]
    pub topics: Vec<String>,
}

/// Backend liveness plus which integrations are configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub services: Value,
    #[serde(default)]
    pub version: String,
}

// ---------------------------------------------------------------------------
// Requests / action payloads
// ---------------------------------------------------------------------------

/// Operator decision on a run or a single diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Approve,
    Reject,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Approve => "approve",
            ActionKind::Reject => "reject",
        }
    }

    /// The diff status this action drives the entity toward.
    pub fn diff_outcome(self) -> DiffStatus {
        match self {
            ActionKind::Approve => DiffStatus::Approved,
            ActionKind::Reject => DiffStatus::Rejected,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRunRequest {
    pub project_id: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProjectRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConnectionRequest {
    pub project_id: String,
    pub name: String,
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<String>,
    #[serde(default = "default_connection_icon")]
    pub icon: String,
    #[serde(default = "default_connection_color")]
    pub color: String,
}

fn default_connection_icon() -> String {
    "key".to_string()
}

fn default_connection_color() -> String {
    "#00F0FF".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateConnectionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffActionResponse {
    pub diff: DiffItem,
    pub run: Run,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestConnectionResponse {
    pub status: ConnectionStatus,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetResponse {
    pub ok: bool,
    #[serde(default)]
    pub flushed_keys: u64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
