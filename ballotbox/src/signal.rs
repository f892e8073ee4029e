//! Directed out-of-band notifications between stages
//!
//! A stage registers with the [`SignalRouter`] and gets a [`StageId`] plus an
//! inbox. Any holder of the router can raise a notification at that id. A
//! notification raised before the target starts waiting is kept, so the
//! target never misses it.

use crate::types::StageId;
use crate::{PipelineError, Result};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;

#[derive(Debug, Default)]
struct RouterState {
    next_id: AtomicU32,
    inboxes: DashMap<StageId, Arc<Notify>>,
}

/// Routing table from stage ids to their inboxes
#[derive(Debug, Clone, Default)]
pub struct SignalRouter {
    state: Arc<RouterState>,
}

impl SignalRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id for a stage and open its inbox
    pub fn register(&self, stage: &str) -> SignalInbox {
        let id = StageId(self.state.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let notify = Arc::new(Notify::new());
        self.state.inboxes.insert(id, notify.clone());
        debug!(stage = %stage, %id, "registered stage");
        SignalInbox {
            id,
            notify,
            router: self.state.clone(),
        }
    }

    /// Deliver one notification to `target`
    pub fn raise(&self, target: StageId) -> Result<()> {
        let notify = self
            .state
            .inboxes
            .get(&target)
            .map(|entry| entry.value().clone())
            .ok_or(PipelineError::UnknownStage { stage: target.0 })?;
        notify.notify_one();
        debug!(%target, "raised notification");
        Ok(())
    }
}

/// Receiving side of a stage's notifications; unregisters on drop
#[derive(Debug)]
pub struct SignalInbox {
    id: StageId,
    notify: Arc<Notify>,
    router: Arc<RouterState>,
}

impl SignalInbox {
    pub fn id(&self) -> StageId {
        self.id
    }

    /// Wait for the next notification
    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}

impl Drop for SignalInbox {
    fn drop(&mut self) {
        self.router.inboxes.remove(&self.id);
    }
}
