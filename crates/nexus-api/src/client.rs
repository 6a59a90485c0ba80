use reqwest::Response;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{NexusApiError, Result};
use crate::types::*;

// ---------------------------------------------------------------------------
// NexusClient
// ---------------------------------------------------------------------------

/// Async client for the command-center REST API.
///
/// One method per backend endpoint. Cheap to clone (shares the underlying
/// `reqwest` connection pool), so pollers and mutators can each hold a copy.
#[derive(Debug, Clone)]
pub struct NexusClient {
    http: reqwest::Client,
    base: String,
}

impl NexusClient {
    pub fn new(api_base: impl Into<String>) -> Self {
        let base = api_base.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    // -----------------------------------------------------------------------
    // Projects
    // -----------------------------------------------------------------------

    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        self.get("/api/projects".to_string()).await
    }

    pub async fn get_project(&self, project_id: &str) -> Result<Project> {
        self.get(format!("/api/projects/{project_id}")).await
    }

    pub async fn create_project(&self, req: &CreateProjectRequest) -> Result<Project> {
        self.post("/api/projects".to_string(), req).await
    }

    pub async fn update_project(
        &self,
        project_id: &str,
        req: &UpdateProjectRequest,
    ) -> Result<Project> {
        self.patch(format!("/api/projects/{project_id}"), req).await
    }

    pub async fn delete_project(&self, project_id: &str) -> Result<OkResponse> {
        self.delete(format!("/api/projects/{project_id}")).await
    }

    // -----------------------------------------------------------------------
    // Connections
    // -----------------------------------------------------------------------

    pub async fn list_connections(&self, project_id: &str) -> Result<Vec<ConnectionEntry>> {
        self.get(format!("/api/connections/{project_id}")).await
    }

    pub async fn create_connection(
        &self,
        req: &CreateConnectionRequest,
    ) -> Result<ConnectionEntry> {
        self.post("/api/connections".to_string(), req).await
    }

    pub async fn update_connection(
        &self,
        project_id: &str,
        conn_id: &str,
        req: &UpdateConnectionRequest,
    ) -> Result<ConnectionEntry> {
        self.put(format!("/api/connections/{project_id}/{conn_id}"), req)
            .await
    }

    pub async fn delete_connection(&self, project_id: &str, conn_id: &str) -> Result<OkResponse> {
        self.delete(format!("/api/connections/{project_id}/{conn_id}"))
            .await
    }

    pub async fn test_connection(
        &self,
        project_id: &str,
        conn_id: &str,
    ) -> Result<TestConnectionResponse> {
        self.post_empty(format!("/api/connections/{project_id}/{conn_id}/test"))
            .await
    }

    // -----------------------------------------------------------------------
    // Runs and diffs
    // -----------------------------------------------------------------------

    pub async fn trigger_run(&self, req: &TriggerRunRequest) -> Result<Run> {
        self.post("/api/agents/trigger".to_string(), req).await
    }

    pub async fn list_runs(&self, project_id: &str) -> Result<Vec<Run>> {
        self.get(format!("/api/agents/runs/{project_id}")).await
    }

    pub async fn get_run(&self, project_id: &str, run_id: &str) -> Result<Run> {
        self.get(format!("/api/agents/runs/{project_id}/{run_id}"))
            .await
    }

    /// Approve or reject an entire pending run.
    pub async fn run_action(
        &self,
        project_id: &str,
        run_id: &str,
        action: ActionKind,
    ) -> Result<Run> {
        self.post(
            format!("/api/agents/runs/{project_id}/{run_id}/action"),
            &serde_json::json!({ "action": action.as_str() }),
        )
        .await
    }

    /// Approve or reject one diff inside a run.
    pub async fn diff_action(
        &self,
        project_id: &str,
        run_id: &str,
        diff_id: &str,
        action: ActionKind,
    ) -> Result<DiffActionResponse> {
        self.post(
            format!("/api/agents/runs/{project_id}/{run_id}/diffs/{diff_id}/action"),
            &serde_json::json!({ "action": action.as_str(), "diff_id": diff_id }),
        )
        .await
    }

    pub async fn run_logs(&self, project_id: &str, run_id: &str) -> Result<RunLogs> {
        self.get(format!("/api/agents/runs/{project_id}/{run_id}/logs"))
            .await
    }

    /// Purge all backend data and re-seed defaults.
    pub async fn admin_reset(&self) -> Result<ResetResponse> {
        self.post_empty("/api/agents/admin/reset".to_string()).await
    }

    // -----------------------------------------------------------------------
    // Services
    // -----------------------------------------------------------------------

    pub async fn services_status(&self) -> Result<Vec<ServiceStatus>> {
        self.get("/api/services/status".to_string()).await
    }

    pub async fn activity_stats(&self, project_id: &str) -> Result<ActivityStats> {
        self.get(format!("/api/services/activity/{project_id}"))
            .await
    }

    pub async fn message_feed(&self, project_id: &str) -> Result<MessageFeed> {
        self.get(format!("/api/services/slack/messages/{project_id}"))
            .await
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.get("/health".to_string()).await
    }

    // -----------------------------------------------------------------------
    // Transport helpers
    // -----------------------------------------------------------------------

    async fn get<T: DeserializeOwned>(&self, path: String) -> Result<T> {
        let resp = self.http.get(self.url(&path)).send().await?;
        Self::decode(resp).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: String,
        body: &B,
    ) -> Result<T> {
        let resp = self.http.post(self.url(&path)).json(body).send().await?;
        Self::decode(resp).await
    }

    async fn post_empty<T: DeserializeOwned>(&self, path: String) -> Result<T> {
        let resp = self.http.post(self.url(&path)).send().await?;
        Self::decode(resp).await
    }

    async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: String,
        body: &B,
    ) -> Result<T> {
        let resp = self.http.put(self.url(&path)).json(body).send().await?;
        Self::decode(resp).await
    }

    async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: String,
        body: &B,
    ) -> Result<T> {
        let resp = self.http.patch(self.url(&path)).json(body).send().await?;
        Self::decode(resp).await
    }

    async fn delete<T: DeserializeOwned>(&self, path: String) -> Result<T> {
        let resp = self.http.delete(self.url(&path)).send().await?;
        Self::decode(resp).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NexusApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json().await?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
