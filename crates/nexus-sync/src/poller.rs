use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use nexus_api::NexusApiError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::warn;

/// The current view of one polled resource.
///
/// `loading` is true from the moment a fetch starts until it succeeds, so
/// it covers both the initial load and a failing poller that is still
/// showing its last good data.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    pub data: Option<T>,
    pub loading: bool,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl<T> Default for Snapshot<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: true,
            fetched_at: None,
        }
    }
}

impl<T> Snapshot<T> {
    /// Age of the data, if any has ever arrived.
    pub fn age(&self) -> Option<chrono::Duration> {
        self.fetched_at.map(|at| Utc::now() - at)
    }
}

/// Clonable handle for requesting an immediate out-of-cycle fetch.
#[derive(Debug, Clone)]
pub struct RefreshHandle {
    tx: mpsc::Sender<()>,
}

impl RefreshHandle {
    /// Best-effort: a request is dropped if one is already queued or the
    /// poller has stopped.
    pub fn refresh_now(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Periodically fetches one resource on a background task and publishes
/// snapshots over a `watch` channel.
///
/// Fetches never overlap: the loop awaits each fetch inline, and ticks
/// that elapse while one is in flight are skipped rather than queued. A
/// failed fetch keeps the previous snapshot's data so consumers always
/// render the last good state.
pub struct Poller<T> {
    rx: watch::Receiver<Snapshot<T>>,
    refresh_tx: mpsc::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl<T> Poller<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Start polling. The first fetch fires immediately, then every
    /// `period` thereafter.
    pub fn spawn<F, Fut>(period: Duration, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, NexusApiError>> + Send + 'static,
    {
        let (tx, rx) = watch::channel(Snapshot::default());
        let (refresh_tx, refresh_rx) = mpsc::channel(1);
        let task = tokio::spawn(poll_loop(period, fetch, tx, refresh_rx));
        Self {
            rx,
            refresh_tx,
            task: Some(task),
        }
    }

    /// Clone of the latest published snapshot.
    pub fn snapshot(&self) -> Snapshot<T> {
        self.rx.borrow().clone()
    }

    /// Watch the snapshot stream.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot<T>> {
        self.rx.clone()
    }

    pub fn refresh_now(&self) {
        let _ = self.refresh_tx.try_send(());
    }

    pub fn refresh_handle(&self) -> RefreshHandle {
        RefreshHandle {
            tx: self.refresh_tx.clone(),
        }
    }

    /// Stop polling. Any in-flight fetch is discarded, never published.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl<T> Drop for Poller<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn poll_loop<T, F, Fut>(
    period: Duration,
    fetch: F,
    tx: watch::Sender<Snapshot<T>>,
    mut refresh_rx: mpsc::Receiver<()>,
) where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, NexusApiError>>,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            req = refresh_rx.recv() => {
                if req.is_none() {
                    return;
                }
                // A manual refresh restarts the cadence from now.
                ticker.reset();
            }
        }
        tx.send_modify(|snap| snap.loading = true);
        match fetch().await {
            Ok(data) => {
                let _ = tx.send(Snapshot {
                    data: Some(data),
                    loading: false,
                    fetched_at: Some(Utc::now()),
                });
            }
            Err(err) => {
                // Keep the last good data; loading stays raised until a
                // fetch succeeds.
                warn!("poll fetch failed: {err}");
            }
        }
    }
}
