use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use url::Url;

use nexus_api::types::{
    ActionKind, ActivityStats, ConnectionEntry, ConnectionStatus, CreateConnectionRequest,
    DiffActionResponse, MessageFeed, ResetResponse, Run, RunLogs, ServiceStatus,
    TestConnectionResponse, TriggerRunRequest, UpdateConnectionRequest,
};
use nexus_api::{NexusApiError, NexusClient};

use crate::buffer::{EventBuffer, Notification};
use crate::channel::{ChannelEvent, OutboundFrame, PushChannel};
use crate::config::SyncConfig;
use crate::error::Result;
use crate::mutator::{local_placeholder_id, Mutator};
use crate::poller::Poller;
use crate::selector::{review_run, RunSelector};

/// Outcome of creating an entity that may not have reached the backend.
#[derive(Debug)]
pub enum Created<T> {
    /// The backend accepted the entity and assigned its id.
    Synced(T),
    /// The backend rejected or was unreachable; the entity lives only in
    /// the local view under a placeholder id until retried.
    LocalOnly { entity: T, error: NexusApiError },
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Everything the dashboard needs for one project, wired together: the
/// push channel, the per-resource pollers, the optimistic run and
/// connection views, the live event buffer, and run selection.
///
/// Pulses arriving over the channel are advisory: they land in the event
/// buffer and nudge the run poller, but never mutate run state directly —
/// the polled REST responses stay authoritative.
pub struct Workspace {
    config: SyncConfig,
    project_id: String,
    client: NexusClient,
    channel: PushChannel,
    runs: Mutator<Run>,
    connections: Mutator<ConnectionEntry>,
    services: Poller<Vec<ServiceStatus>>,
    activity: Poller<ActivityStats>,
    messages: Poller<MessageFeed>,
    feed: Arc<Mutex<EventBuffer>>,
    selector: Arc<Mutex<RunSelector>>,
    feed_task: Option<JoinHandle<()>>,
    selector_task: Option<JoinHandle<()>>,
}

impl Workspace {
    /// Open a workspace for one project. Must be called inside a Tokio
    /// runtime; all background tasks start immediately.
    pub fn open(config: SyncConfig, project_id: impl Into<String>) -> Result<Self> {
        let project_id = project_id.into();
        let client = NexusClient::new(&config.api_base);
        let channel = PushChannel::connect(Url::parse(&config.ws_base)?, &project_id);

        let runs = spawn_runs(&client, &project_id, &config);
        let connections = spawn_connections(&client, &project_id, &config);
        let services = spawn_services(&client, &config);
        let activity = spawn_activity(&client, &project_id, &config);
        let messages = spawn_messages(&client, &project_id, &config);

        let feed = Arc::new(Mutex::new(EventBuffer::with_capacity(
            config.event_capacity,
            config.notification_capacity,
        )));
        let selector = Arc::new(Mutex::new(RunSelector::new()));

        let feed_task = spawn_feed_task(
            channel.subscribe(),
            feed.clone(),
            runs.poller().refresh_handle(),
            services.refresh_handle(),
        );
        let selector_task = spawn_selector_task(&runs, selector.clone());

        info!(project = %project_id, "workspace opened");
        Ok(Self {
            config,
            project_id,
            client,
            channel,
            runs,
            connections,
            services,
            activity,
            messages,
            feed,
            selector,
            feed_task: Some(feed_task),
            selector_task: Some(selector_task),
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn client(&self) -> &NexusClient {
        &self.client
    }

    pub fn channel(&self) -> &PushChannel {
        &self.channel
    }

    pub fn runs(&self) -> &Mutator<Run> {
        &self.runs
    }

    pub fn connections(&self) -> &Mutator<ConnectionEntry> {
        &self.connections
    }

    pub fn services(&self) -> &Poller<Vec<ServiceStatus>> {
        &self.services
    }

    pub fn activity(&self) -> &Poller<ActivityStats> {
        &self.activity
    }

    pub fn messages(&self) -> &Poller<MessageFeed> {
        &self.messages
    }

    // -----------------------------------------------------------------------
    // Event feed
    // -----------------------------------------------------------------------

    /// Retained pulses, newest first.
    pub fn recent_pulses(&self) -> Vec<nexus_api::types::Pulse> {
        lock(&self.feed).pulses().cloned().collect()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.feed).notifications().cloned().collect()
    }

    pub fn unread_notifications(&self) -> usize {
        lock(&self.feed).unread()
    }

    pub fn mark_notifications_read(&self) {
        lock(&self.feed).mark_all_read();
    }

    pub fn clear_feed(&self) {
        lock(&self.feed).clear();
    }

    // -----------------------------------------------------------------------
    // Run selection
    // -----------------------------------------------------------------------

    pub fn select_run(&self, run_id: impl Into<String>) {
        lock(&self.selector).select(run_id);
    }

    pub fn selected_run_id(&self) -> Option<String> {
        lock(&self.selector).selected().map(str::to_string)
    }

    pub fn selected_run(&self) -> Option<Run> {
        let runs = self.runs.view();
        lock(&self.selector).selected_run(&runs).cloned()
    }

    /// The run the review panel should show.
    pub fn run_under_review(&self) -> Option<Run> {
        review_run(&self.runs.view()).cloned()
    }

    // -----------------------------------------------------------------------
    // Pipeline operations
    // -----------------------------------------------------------------------

    /// Start a pipeline run. Goes over the push channel when connected
    /// (the created run arrives via pulses and the next poll); otherwise
    /// falls back to REST and returns the created run directly.
    pub async fn trigger(&self, description: &str, sources: &[String]) -> Result<Option<Run>> {
        if self.channel.is_connected() {
            self.channel.send(OutboundFrame::TriggerRun {
                description: description.to_string(),
                sources: sources.to_vec(),
            });
            return Ok(None);
        }
        let run = self
            .client
            .trigger_run(&TriggerRunRequest {
                project_id: self.project_id.clone(),
                sources: sources.to_vec(),
                description: description.to_string(),
            })
            .await?;
        self.runs.refresh_now();
        Ok(Some(run))
    }

    /// Approve or reject an entire run, optimistically. A failed write is
    /// compensated here by reverting the patch, then surfaced — the
    /// operator must see that their decision did not land.
    pub async fn run_decision(&self, run_id: &str, action: ActionKind) -> Result<Run> {
        let patch = match action {
            ActionKind::Approve => json!({"status": "completed", "currentStage": "execute"}),
            ActionKind::Reject => json!({"status": "failed"}),
        };
        let op = self.client.run_action(&self.project_id, run_id, action);
        let result = self.runs.mutate(run_id, patch, op).await;
        if result.is_err() {
            self.runs.rollback(run_id);
        }
        Ok(result?)
    }

    /// Approve or reject one diff inside a run, optimistically. The run's
    /// diff list is patched in place so pending counts update at once.
    pub async fn diff_decision(
        &self,
        run_id: &str,
        diff_id: &str,
        action: ActionKind,
    ) -> Result<DiffActionResponse> {
        let patch = self
            .runs
            .view()
            .iter()
            .find(|r| r.id == run_id)
            .and_then(|run| patch_for_diff_action(run, diff_id, action));
        let op = self.client.diff_action(&self.project_id, run_id, diff_id, action);
        let resp = match patch {
            Some(patch) => {
                let result = self.runs.mutate(run_id, patch, op).await;
                if result.is_err() {
                    self.runs.rollback(run_id);
                }
                result?
            }
            // The run is not in view yet; skip the overlay and re-poll.
            None => {
                let resp = op.await?;
                self.runs.refresh_now();
                resp
            }
        };
        Ok(resp)
    }

    pub async fn run_logs(&self, run_id: &str) -> Result<RunLogs> {
        Ok(self.client.run_logs(&self.project_id, run_id).await?)
    }

    // -----------------------------------------------------------------------
    // Connections
    // -----------------------------------------------------------------------

    /// Create a connection. When the backend is unreachable the entry is
    /// kept locally under a placeholder id so the vault view still shows
    /// it; callers decide whether and when to retry.
    pub async fn add_connection(&self, req: CreateConnectionRequest) -> Created<ConnectionEntry> {
        match self.client.create_connection(&req).await {
            Ok(entry) => {
                self.connections.refresh_now();
                Created::Synced(entry)
            }
            Err(error) => {
                warn!(name = %req.name, "connection create failed, keeping local entry: {error}");
                let entity = ConnectionEntry {
                    id: local_placeholder_id(),
                    name: req.name,
                    status: ConnectionStatus::Disconnected,
                    last_sync: "never".to_string(),
                    health: 0,
                    latency: 0,
                    icon: req.icon,
                    color: req.color,
                    token: Some(req.token),
                    webhook: req.webhook,
                    created_at: None,
                };
                self.connections.insert_local(entity.clone());
                Created::LocalOnly { entity, error }
            }
        }
    }

    pub async fn update_connection(
        &self,
        conn_id: &str,
        req: &UpdateConnectionRequest,
    ) -> Result<ConnectionEntry> {
        // The request serializes only its set fields, which is exactly
        // the merge patch for the optimistic view.
        let patch = serde_json::to_value(req).map_err(NexusApiError::from)?;
        let op = self.client.update_connection(&self.project_id, conn_id, req);
        let result = self.connections.mutate(conn_id, patch, op).await;
        if result.is_err() {
            self.connections.rollback(conn_id);
        }
        Ok(result?)
    }

    pub async fn remove_connection(&self, conn_id: &str) -> Result<()> {
        if conn_id.starts_with("local-") {
            self.connections.remove_local(conn_id);
            return Ok(());
        }
        self.client
            .delete_connection(&self.project_id, conn_id)
            .await?;
        self.connections.refresh_now();
        Ok(())
    }

    pub async fn test_connection(&self, conn_id: &str) -> Result<TestConnectionResponse> {
        let resp = self.client.test_connection(&self.project_id, conn_id).await?;
        self.connections.refresh_now();
        Ok(resp)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Purge backend state and re-poll everything.
    pub async fn reset(&self) -> Result<ResetResponse> {
        let resp = self.client.admin_reset().await?;
        self.clear_feed();
        self.refresh_all();
        Ok(resp)
    }

    pub fn refresh_all(&self) {
        self.runs.refresh_now();
        self.connections.refresh_now();
        self.services.refresh_now();
        self.activity.refresh_now();
        self.messages.refresh_now();
    }

    /// Retarget the workspace at a different project: the channel
    /// reconnects and every poller and view starts over.
    pub fn switch_project(&mut self, project_id: impl Into<String>) {
        let project_id = project_id.into();
        info!(from = %self.project_id, to = %project_id, "switching project");
        self.teardown();
        self.channel.switch_workspace(&project_id);
        self.project_id = project_id;

        self.runs = spawn_runs(&self.client, &self.project_id, &self.config);
        self.connections = spawn_connections(&self.client, &self.project_id, &self.config);
        self.services = spawn_services(&self.client, &self.config);
        self.activity = spawn_activity(&self.client, &self.project_id, &self.config);
        self.messages = spawn_messages(&self.client, &self.project_id, &self.config);

        self.feed = Arc::new(Mutex::new(EventBuffer::with_capacity(
            self.config.event_capacity,
            self.config.notification_capacity,
        )));
        self.selector = Arc::new(Mutex::new(RunSelector::new()));
        self.feed_task = Some(spawn_feed_task(
            self.channel.subscribe(),
            self.feed.clone(),
            self.runs.poller().refresh_handle(),
            self.services.refresh_handle(),
        ));
        self.selector_task = Some(spawn_selector_task(&self.runs, self.selector.clone()));
    }

    /// Stop every background task and disconnect the channel.
    pub fn close(&mut self) {
        self.teardown();
        self.channel.disconnect();
    }

    fn teardown(&mut self) {
        if let Some(task) = self.feed_task.take() {
            task.abort();
        }
        if let Some(task) = self.selector_task.take() {
            task.abort();
        }
        self.runs.stop();
        self.connections.stop();
        self.services.stop();
        self.activity.stop();
        self.messages.stop();
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Some(task) = self.feed_task.take() {
            task.abort();
        }
        if let Some(task) = self.selector_task.take() {
            task.abort();
        }
    }
}

/// The run-level merge patch for approving or rejecting one diff: the
/// full diff list with the target's status flipped.
fn patch_for_diff_action(
    run: &Run,
    diff_id: &str,
    action: ActionKind,
) -> Option<serde_json::Value> {
    let mut diffs = run.diffs.clone();
    let diff = diffs.iter_mut().find(|d| d.id == diff_id)?;
    diff.status = action.diff_outcome();
    Some(json!({ "diffs": diffs }))
}

// ─── Background wiring ────────────────────────────────────────────────────

fn spawn_runs(client: &NexusClient, project_id: &str, config: &SyncConfig) -> Mutator<Run> {
    let client = client.clone();
    let project_id = project_id.to_string();
    let poller = Poller::spawn(config.poll.runs(), move || {
        let client = client.clone();
        let project_id = project_id.clone();
        async move { client.list_runs(&project_id).await }
    });
    Mutator::new(poller, config.settle_delay(), config.pending_max_age())
}

fn spawn_connections(
    client: &NexusClient,
    project_id: &str,
    config: &SyncConfig,
) -> Mutator<ConnectionEntry> {
    let client = client.clone();
    let project_id = project_id.to_string();
    let poller = Poller::spawn(config.poll.services(), move || {
        let client = client.clone();
        let project_id = project_id.clone();
        async move { client.list_connections(&project_id).await }
    });
    Mutator::new(poller, config.settle_delay(), config.pending_max_age())
}

fn spawn_services(client: &NexusClient, config: &SyncConfig) -> Poller<Vec<ServiceStatus>> {
    let client = client.clone();
    Poller::spawn(config.poll.services(), move || {
        let client = client.clone();
        async move { client.services_status().await }
    })
}

fn spawn_activity(
    client: &NexusClient,
    project_id: &str,
    config: &SyncConfig,
) -> Poller<ActivityStats> {
    let client = client.clone();
    let project_id = project_id.to_string();
    Poller::spawn(config.poll.activity(), move || {
        let client = client.clone();
        let project_id = project_id.clone();
        async move { client.activity_stats(&project_id).await }
    })
}

fn spawn_messages(
    client: &NexusClient,
    project_id: &str,
    config: &SyncConfig,
) -> Poller<MessageFeed> {
    let client = client.clone();
    let project_id = project_id.to_string();
    Poller::spawn(config.poll.messages(), move || {
        let client = client.clone();
        let project_id = project_id.clone();
        async move { client.message_feed(&project_id).await }
    })
}

fn spawn_feed_task(
    mut events: broadcast::Receiver<ChannelEvent>,
    feed: Arc<Mutex<EventBuffer>>,
    runs_refresh: crate::poller::RefreshHandle,
    services_refresh: crate::poller::RefreshHandle,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ChannelEvent::Pulse(pulse)) => {
                    lock(&feed).push(pulse);
                    // Pulses hint that run state moved; the poll confirms.
                    runs_refresh.refresh_now();
                }
                Ok(ChannelEvent::Health(_)) => services_refresh.refresh_now(),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "event feed lagged behind the push channel");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn spawn_selector_task(runs: &Mutator<Run>, selector: Arc<Mutex<RunSelector>>) -> JoinHandle<()> {
    let mut rx = runs.subscribe();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let view = rx.borrow_and_update().clone();
            lock(&selector).observe(&view);
        }
    })
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PollIntervals;
    use nexus_api::types::{DiffStatus, RunStatus};
    use serde_json::json;

    fn quiet_config(api_base: String) -> SyncConfig {
        SyncConfig {
            api_base,
            // Nothing listens here; the channel stays disconnected.
            ws_base: "ws://127.0.0.1:1".to_string(),
            poll: PollIntervals {
                services_secs: 3600,
                activity_secs: 3600,
                runs_secs: 3600,
                messages_secs: 3600,
            },
            ..Default::default()
        }
    }

    fn run_json(id: &str, status: &str, diffs: serde_json::Value) -> serde_json::Value {
        json!({"id": id, "status": status, "nodes": [], "diffs": diffs})
    }

    #[test]
    fn diff_patch_flips_only_the_target() {
        let run: Run = serde_json::from_value(run_json(
            "run-1",
            "running",
            json!([
                {"id": "d1", "status": "pending", "changes": [], "proposal": {}},
                {"id": "d2", "status": "pending", "changes": [], "proposal": {}}
            ]),
        ))
        .unwrap();

        let patch = patch_for_diff_action(&run, "d2", ActionKind::Approve).unwrap();
        let diffs = patch["diffs"].as_array().unwrap();
        assert_eq!(diffs[0]["status"], "pending");
        assert_eq!(diffs[1]["status"], "approved");

        assert!(patch_for_diff_action(&run, "missing", ActionKind::Approve).is_none());
    }

    #[tokio::test]
    async fn polled_runs_reach_view_and_selector() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/agents/runs/p1")
            .with_header("content-type", "application/json")
            .with_body(json!([run_json("run-1", "running", json!([]))]).to_string())
            .create_async()
            .await;

        let mut ws = Workspace::open(quiet_config(server.url()), "p1").unwrap();
        let mut rx = ws.runs().subscribe();
        rx.wait_for(|v| !v.is_empty()).await.unwrap();
        // Give the selector task a beat to observe the new view.
        tokio::task::yield_now().await;

        assert_eq!(ws.selected_run_id().as_deref(), Some("run-1"));
        assert_eq!(ws.selected_run().unwrap().status, RunStatus::Running);
        ws.close();
    }

    #[tokio::test]
    async fn trigger_falls_back_to_rest_when_disconnected() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/agents/trigger")
            .match_body(mockito::Matcher::PartialJson(json!({
                "project_id": "p1", "description": "manual sync"
            })))
            .with_header("content-type", "application/json")
            .with_body(run_json("run-9", "pending", json!([])).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/api/agents/runs/p1")
            .with_header("content-type", "application/json")
            .with_body("[]")
            .create_async()
            .await;

        let mut ws = Workspace::open(quiet_config(server.url()), "p1").unwrap();
        let created = ws.trigger("manual sync", &["slack".to_string()]).await.unwrap();
        assert_eq!(created.unwrap().id, "run-9");
        mock.assert_async().await;
        ws.close();
    }

    #[tokio::test]
    async fn run_decision_is_optimistic() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/agents/runs/p1")
            .with_header("content-type", "application/json")
            .with_body(json!([run_json("run-1", "running", json!([]))]).to_string())
            .create_async()
            .await;
        server
            .mock("POST", "/api/agents/runs/p1/run-1/action")
            .with_header("content-type", "application/json")
            .with_body(run_json("run-1", "completed", json!([])).to_string())
            .create_async()
            .await;

        let mut ws = Workspace::open(quiet_config(server.url()), "p1").unwrap();
        let mut rx = ws.runs().subscribe();
        rx.wait_for(|v| !v.is_empty()).await.unwrap();

        let run = ws.run_decision("run-1", ActionKind::Approve).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        // The optimistic view already reports completion even though no
        // fresh poll has landed.
        assert_eq!(ws.runs().view()[0].status, RunStatus::Completed);
        ws.close();
    }

    #[tokio::test]
    async fn diff_decision_patches_run_in_view() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/agents/runs/p1")
            .with_header("content-type", "application/json")
            .with_body(
                json!([run_json(
                    "run-1",
                    "running",
                    json!([{"id": "d1", "status": "pending", "changes": [], "proposal": {}}])
                )])
                .to_string(),
            )
            .create_async()
            .await;
        server
            .mock("POST", "/api/agents/runs/p1/run-1/diffs/d1/action")
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "diff": {"id": "d1", "status": "approved", "changes": [], "proposal": {},
                             "execution_result": {"success": true}},
                    "run": run_json("run-1", "running", json!([]))
                })
                .to_string(),
            )
            .create_async()
            .await;

        let mut ws = Workspace::open(quiet_config(server.url()), "p1").unwrap();
        let mut rx = ws.runs().subscribe();
        rx.wait_for(|v| !v.is_empty()).await.unwrap();
        assert_eq!(ws.runs().view()[0].pending_diffs(), 1);

        let resp = ws.diff_decision("run-1", "d1", ActionKind::Approve).await.unwrap();
        assert_eq!(resp.diff.status, DiffStatus::Approved);
        let view = ws.runs().view();
        assert_eq!(view[0].diffs[0].status, DiffStatus::Approved);
        assert_eq!(view[0].pending_diffs(), 0);
        ws.close();
    }

    #[tokio::test]
    async fn failed_run_decision_reverts_view_and_surfaces_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/agents/runs/p1")
            .with_header("content-type", "application/json")
            .with_body(json!([run_json("run-1", "running", json!([]))]).to_string())
            .create_async()
            .await;
        server
            .mock("POST", "/api/agents/runs/p1/run-1/action")
            .with_status(409)
            .with_body(r#"{"detail": "Run is not pending"}"#)
            .create_async()
            .await;

        let mut ws = Workspace::open(quiet_config(server.url()), "p1").unwrap();
        let mut rx = ws.runs().subscribe();
        rx.wait_for(|v| !v.is_empty()).await.unwrap();

        let err = ws
            .run_decision("run-1", ActionKind::Approve)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("409"));
        assert_eq!(ws.runs().view()[0].status, RunStatus::Running);
        assert_eq!(ws.runs().pending_count(), 0);
        ws.close();
    }

    #[tokio::test]
    async fn unreachable_create_keeps_connection_locally() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/connections")
            .with_status(503)
            .with_body("gateway down")
            .create_async()
            .await;
        server
            .mock("GET", "/api/connections/p1")
            .with_header("content-type", "application/json")
            .with_body("[]")
            .create_async()
            .await;

        let mut ws = Workspace::open(quiet_config(server.url()), "p1").unwrap();
        let created = ws
            .add_connection(CreateConnectionRequest {
                project_id: "p1".into(),
                name: "Slack".into(),
                token: "xoxb-1".into(),
                webhook: None,
                icon: "key".into(),
                color: "#00F0FF".into(),
            })
            .await;

        let Created::LocalOnly { entity, error } = created else {
            panic!("expected local-only create");
        };
        assert!(entity.id.starts_with("local-"));
        assert!(matches!(error, NexusApiError::Status { status: 503, .. }));

        let view = ws.connections().view();
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].name, "Slack");

        ws.remove_connection(&entity.id).await.unwrap();
        assert!(ws.connections().view().is_empty());
        ws.close();
    }
}
