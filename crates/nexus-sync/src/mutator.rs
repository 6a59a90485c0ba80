use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use nexus_api::types::{ConnectionEntry, DiffItem, Project, Run};
use nexus_api::NexusApiError;

use crate::poller::{Poller, Snapshot};

/// An identifiable entity whose list view supports optimistic patching.
pub trait Entity:
    Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    fn id(&self) -> &str;
}

impl Entity for Run {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for DiffItem {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for ConnectionEntry {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for Project {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Placeholder id for an entity that exists only locally, so it can never
/// collide with a backend-assigned id.
pub fn local_placeholder_id() -> String {
    format!("local-{}", Uuid::new_v4())
}

struct PendingMutation {
    target_id: String,
    patch: Value,
    applied_at: Instant,
}

struct MutatorState<E> {
    pending: Vec<PendingMutation>,
    locals: Vec<E>,
}

impl<E> Default for MutatorState<E> {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
            locals: Vec::new(),
        }
    }
}

// A poisoned lock only means another task panicked mid-update; the state
// itself is a plain list and stays usable.
fn lock<E>(state: &Mutex<MutatorState<E>>) -> MutexGuard<'_, MutatorState<E>> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Apply an RFC 7386 merge patch to a typed entity. If the patched value
/// no longer decodes as `E` the original is kept unchanged.
fn patched<E: Entity>(entity: &E, patch: &Value) -> E {
    let mut value = match serde_json::to_value(entity) {
        Ok(value) => value,
        Err(_) => return entity.clone(),
    };
    json_patch::merge(&mut value, patch);
    serde_json::from_value(value).unwrap_or_else(|err| {
        debug!("patch produced undecodable entity, keeping original: {err}");
        entity.clone()
    })
}

fn compose<E: Entity>(authoritative: &[E], state: &MutatorState<E>) -> Vec<E> {
    let mut view: Vec<E> = authoritative
        .iter()
        .map(|entity| {
            state
                .pending
                .iter()
                .filter(|p| p.target_id == entity.id())
                .fold(entity.clone(), |acc, p| patched(&acc, &p.patch))
        })
        .collect();
    for local in &state.locals {
        if !authoritative.iter().any(|e| e.id() == local.id()) {
            view.push(local.clone());
        }
    }
    view
}

/// Optimistic overlay over one polled entity list.
///
/// The authoritative list comes from the wrapped [`Poller`]; operator
/// actions apply a merge patch locally first, so the published view
/// reflects them before the backend confirms. A patch is cleared when the
/// authoritative data absorbs it (patching becomes a no-op), when its
/// entity vanishes, or when it goes unconfirmed past `max_age` — the view
/// then rolls back to what the backend says.
pub struct Mutator<E: Entity> {
    poller: Poller<Vec<E>>,
    state: Arc<Mutex<MutatorState<E>>>,
    view_tx: Arc<watch::Sender<Vec<E>>>,
    settle: Duration,
    reconcile: Option<JoinHandle<()>>,
}

impl<E: Entity> Mutator<E> {
    pub fn new(poller: Poller<Vec<E>>, settle: Duration, max_age: Duration) -> Self {
        let (view_tx, _) = watch::channel(Vec::new());
        let view_tx = Arc::new(view_tx);
        let state = Arc::new(Mutex::new(MutatorState::default()));
        let reconcile = tokio::spawn(reconcile_loop(
            poller.subscribe(),
            state.clone(),
            view_tx.clone(),
            max_age,
        ));
        Self {
            poller,
            state,
            view_tx,
            settle,
            reconcile: Some(reconcile),
        }
    }

    /// Current composed view: authoritative entities with pending patches
    /// applied, plus local-only entities.
    pub fn view(&self) -> Vec<E> {
        self.view_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<E>> {
        self.view_tx.subscribe()
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.state).pending.len()
    }

    pub fn poller(&self) -> &Poller<Vec<E>> {
        &self.poller
    }

    pub fn refresh_now(&self) {
        self.poller.refresh_now();
    }

    /// Apply a merge patch to the view immediately, without contacting the
    /// backend. The view update is synchronous: `view()` reflects the
    /// patch as soon as this returns.
    pub fn apply_local(&self, target_id: &str, patch: Value) {
        {
            let mut st = lock(&self.state);
            if let Some(existing) = st
                .pending
                .iter_mut()
                .find(|p| p.target_id == target_id)
            {
                json_patch::merge(&mut existing.patch, &patch);
                existing.applied_at = Instant::now();
            } else {
                st.pending.push(PendingMutation {
                    target_id: target_id.to_string(),
                    patch,
                    applied_at: Instant::now(),
                });
            }
        }
        self.publish();
    }

    /// Discard any pending patch for the target and republish.
    pub fn rollback(&self, target_id: &str) {
        lock(&self.state).pending.retain(|p| p.target_id != target_id);
        self.publish();
    }

    /// The optimistic cycle: patch the view, run the backend write, and
    /// on success schedule a confirming re-poll after the settle delay.
    /// On failure the error is returned with the patch still in place;
    /// the caller decides how to compensate ([`rollback`](Self::rollback)
    /// or a counter-patch). Silently reverting an operator's decision is
    /// not this layer's call to make.
    pub async fn mutate<R, Fut>(
        &self,
        target_id: &str,
        patch: Value,
        op: Fut,
    ) -> Result<R, NexusApiError>
    where
        Fut: Future<Output = Result<R, NexusApiError>>,
    {
        self.apply_local(target_id, patch);
        match op.await {
            Ok(out) => {
                let refresh = self.poller.refresh_handle();
                let settle = self.settle;
                tokio::spawn(async move {
                    tokio::time::sleep(settle).await;
                    refresh.refresh_now();
                });
                Ok(out)
            }
            Err(err) => {
                warn!(target = target_id, "write failed, patch left pending: {err}");
                Err(err)
            }
        }
    }

    /// Add an entity that exists only locally. It stays in the view until
    /// [`remove_local`](Self::remove_local) or until the authoritative
    /// list carries the same id.
    pub fn insert_local(&self, entity: E) {
        lock(&self.state).locals.push(entity);
        self.publish();
    }

    pub fn remove_local(&self, id: &str) {
        lock(&self.state).locals.retain(|e| e.id() != id);
        self.publish();
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.reconcile.take() {
            task.abort();
        }
        self.poller.stop();
    }

    fn publish(&self) {
        let authoritative = self.poller.snapshot().data.unwrap_or_default();
        let view = compose(&authoritative, &lock(&self.state));
        // send_replace: the stored view must advance even while nobody
        // is subscribed, or view() would read stale state.
        self.view_tx.send_replace(view);
    }
}

impl<E: Entity> Drop for Mutator<E> {
    fn drop(&mut self) {
        if let Some(task) = self.reconcile.take() {
            task.abort();
        }
    }
}

async fn reconcile_loop<E: Entity>(
    mut snap_rx: watch::Receiver<Snapshot<Vec<E>>>,
    state: Arc<Mutex<MutatorState<E>>>,
    view_tx: Arc<watch::Sender<Vec<E>>>,
    max_age: Duration,
) {
    loop {
        if snap_rx.changed().await.is_err() {
            return;
        }
        let authoritative = match snap_rx.borrow_and_update().data.clone() {
            Some(data) => data,
            None => continue,
        };
        let view = {
            let mut st = lock(&state);
            st.pending.retain(|p| {
                let Some(entity) = authoritative.iter().find(|e| e.id() == p.target_id) else {
                    debug!(target = %p.target_id, "dropping patch: entity gone from backend");
                    return false;
                };
                // The backend now reports the patched state itself.
                if patched(entity, &p.patch) == *entity {
                    return false;
                }
                if p.applied_at.elapsed() > max_age {
                    warn!(
                        target = %p.target_id,
                        "patch unconfirmed after {}s, rolling back",
                        max_age.as_secs()
                    );
                    return false;
                }
                true
            });
            compose(&authoritative, &st)
        };
        view_tx.send_replace(view);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_api::types::{RunStatus, Stage};
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Gadget {
        id: String,
        status: String,
    }

    impl Entity for Gadget {
        fn id(&self) -> &str {
            &self.id
        }
    }

    fn gadget(id: &str, status: &str) -> Gadget {
        Gadget {
            id: id.to_string(),
            status: status.to_string(),
        }
    }

    fn backed_by(data: Arc<Mutex<Vec<Gadget>>>) -> Poller<Vec<Gadget>> {
        Poller::spawn(Duration::from_secs(3600), move || {
            let data = data.clone();
            async move { Ok(data.lock().unwrap().clone()) }
        })
    }

    async fn settled_mutator(
        data: Arc<Mutex<Vec<Gadget>>>,
        max_age: Duration,
    ) -> Mutator<Gadget> {
        let mutator = Mutator::new(backed_by(data), Duration::from_millis(500), max_age);
        let mut rx = mutator.subscribe();
        rx.wait_for(|v| !v.is_empty()).await.unwrap();
        mutator
    }

    #[tokio::test(start_paused = true)]
    async fn apply_local_shows_patch_synchronously() {
        let data = Arc::new(Mutex::new(vec![gadget("g1", "pending")]));
        let mutator = settled_mutator(data, Duration::from_secs(30)).await;

        mutator.apply_local("g1", json!({"status": "approved"}));
        assert_eq!(mutator.view()[0].status, "approved");
        assert_eq!(mutator.pending_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn view_advances_with_no_subscribers() {
        let data = Arc::new(Mutex::new(vec![gadget("g1", "pending")]));
        let mutator = Mutator::new(
            backed_by(data),
            Duration::from_millis(500),
            Duration::from_secs(30),
        );
        // No receiver is ever taken from subscribe(); the stored view
        // must still track the poll and local patches.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(mutator.view().len(), 1);

        mutator.apply_local("g1", json!({"status": "approved"}));
        assert_eq!(mutator.view()[0].status, "approved");

        mutator.insert_local(gadget("local-x", "connected"));
        assert_eq!(mutator.view().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn confirmed_patch_is_cleared() {
        let data = Arc::new(Mutex::new(vec![gadget("g1", "pending")]));
        let mutator = settled_mutator(data.clone(), Duration::from_secs(30)).await;

        mutator.apply_local("g1", json!({"status": "approved"}));
        // Backend catches up, then the next poll arrives.
        data.lock().unwrap()[0].status = "approved".to_string();
        mutator.refresh_now();

        let mut rx = mutator.subscribe();
        rx.wait_for(|v| v[0].status == "approved").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(mutator.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unconfirmed_patch_rolls_back_after_max_age() {
        let data = Arc::new(Mutex::new(vec![gadget("g1", "pending")]));
        let mutator = settled_mutator(data, Duration::from_secs(30)).await;

        mutator.apply_local("g1", json!({"status": "approved"}));
        tokio::time::sleep(Duration::from_secs(31)).await;
        // Backend still reports the old state on the next poll.
        mutator.refresh_now();

        let mut rx = mutator.subscribe();
        rx.wait_for(|v| v[0].status == "pending").await.unwrap();
        assert_eq!(mutator.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn patch_for_vanished_entity_is_dropped() {
        let data = Arc::new(Mutex::new(vec![gadget("g1", "pending")]));
        let mutator = settled_mutator(data.clone(), Duration::from_secs(30)).await;

        mutator.apply_local("g1", json!({"status": "approved"}));
        data.lock().unwrap().clear();
        mutator.refresh_now();

        let mut rx = mutator.subscribe();
        rx.wait_for(|v| v.is_empty()).await.unwrap();
        assert_eq!(mutator.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_leaves_patch_until_caller_compensates() {
        let data = Arc::new(Mutex::new(vec![gadget("g1", "pending")]));
        let mutator = settled_mutator(data, Duration::from_secs(30)).await;

        let result: Result<(), _> = mutator
            .mutate("g1", json!({"status": "approved"}), async {
                Err(NexusApiError::InvalidValue("rejected by backend".into()))
            })
            .await;
        assert!(result.is_err());
        // The patch is the caller's to resolve; nothing reverts silently.
        assert_eq!(mutator.view()[0].status, "approved");
        assert_eq!(mutator.pending_count(), 1);

        mutator.rollback("g1");
        assert_eq!(mutator.view()[0].status, "pending");
        assert_eq!(mutator.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_write_schedules_settle_refresh() {
        let data = Arc::new(Mutex::new(vec![gadget("g1", "pending")]));
        let refetched = Arc::new(AtomicBool::new(false));
        let poller = {
            let data = data.clone();
            let refetched = refetched.clone();
            let first = Arc::new(AtomicBool::new(true));
            Poller::spawn(Duration::from_secs(3600), move || {
                let data = data.clone();
                let refetched = refetched.clone();
                let first = first.clone();
                async move {
                    if !first.swap(false, Ordering::SeqCst) {
                        refetched.store(true, Ordering::SeqCst);
                    }
                    Ok(data.lock().unwrap().clone())
                }
            })
        };
        let mutator = Mutator::new(poller, Duration::from_millis(500), Duration::from_secs(30));
        let mut rx = mutator.subscribe();
        rx.wait_for(|v| !v.is_empty()).await.unwrap();

        mutator
            .mutate("g1", json!({"status": "approved"}), async { Ok(()) })
            .await
            .unwrap();
        assert!(!refetched.load(Ordering::SeqCst));
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(refetched.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn local_entities_ride_along_until_removed() {
        let data = Arc::new(Mutex::new(vec![gadget("g1", "pending")]));
        let mutator = settled_mutator(data, Duration::from_secs(30)).await;

        let id = local_placeholder_id();
        assert!(id.starts_with("local-"));
        mutator.insert_local(gadget(&id, "connected"));
        assert_eq!(mutator.view().len(), 2);

        // Locals survive a fresh poll of the authoritative list.
        mutator.refresh_now();
        let mut rx = mutator.subscribe();
        rx.wait_for(|v| v.len() == 2).await.unwrap();

        mutator.remove_local(&id);
        assert_eq!(mutator.view().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn patch_reaches_camel_case_wire_fields() {
        let run: Run = serde_json::from_str(
            r#"{"id": "run-1", "status": "running", "currentStage": "draft"}"#,
        )
        .unwrap();
        let after = patched(&run, &json!({"status": "completed", "currentStage": "execute"}));
        assert_eq!(after.status, RunStatus::Completed);
        assert_eq!(after.current_stage, Some(Stage::Execute));
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_patch_keeps_original() {
        let g = gadget("g1", "pending");
        // Removing a required field makes the value undecodable.
        let after = patched(&g, &json!({"status": null}));
        assert_eq!(after, g);
    }
}
