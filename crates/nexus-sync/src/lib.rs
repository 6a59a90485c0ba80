//! `nexus-sync` — live state synchronization for the command-center
//! dashboard.
//!
//! The backend is the single source of truth; this crate keeps a local
//! view of it fresh and responsive through four cooperating pieces:
//!
//! - [`channel::PushChannel`] — a self-healing websocket that delivers
//!   agent pulses, health updates, and telemetry as they happen.
//! - [`poller::Poller`] — periodic REST fetches publishing snapshots
//!   over `watch` channels; push traffic only ever *hints* at a refresh.
//! - [`mutator::Mutator`] — optimistic merge-patch overlays so operator
//!   actions (approve, reject, trigger) appear instantly and roll back
//!   if the backend disagrees or never confirms.
//! - [`workspace::Workspace`] — one handle wiring all of the above to a
//!   single project, plus the pulse feed and run selection.

pub mod buffer;
pub mod channel;
pub mod config;
pub mod error;
pub mod mutator;
pub mod poller;
pub mod selector;
pub mod workspace;

pub use buffer::{EventBuffer, Notification};
pub use channel::{ChannelEvent, OutboundFrame, PushChannel};
pub use config::{PollIntervals, SyncConfig};
pub use error::SyncError;
pub use mutator::{local_placeholder_id, Entity, Mutator};
pub use poller::{Poller, RefreshHandle, Snapshot};
pub use selector::{review_run, RunSelector};
pub use workspace::{Created, Workspace};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, SyncError>;
