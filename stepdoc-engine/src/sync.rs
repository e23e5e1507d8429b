//! Realtime sync bridge
//!
//! One bridge per open editor. It subscribes to the change feed exactly
//! once, filters for its own (project, step) key, and on every matching
//! notification performs an authoritative reload from the repository,
//! replacing the local view's state wholesale.
//!
//! The conflict policy is deliberate: the most recently persisted write
//! wins. Any local unsaved edits held by the view when a notification
//! arrives are discarded with the replaced state. There is no field-level
//! merge.

use stepdoc_common::events::EventBus;
use stepdoc_common::{Error, Result};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::store::{StepDocument, StepRepository};

pub struct SyncBridge {
    state: watch::Receiver<Option<StepDocument>>,
    task: JoinHandle<()>,
}

impl SyncBridge {
    /// Open the bridge for one editor instance
    ///
    /// Performs an initial authoritative load so the view starts from
    /// persisted state, then keeps reloading on notifications until the
    /// bridge is closed or dropped.
    pub async fn open(
        repo: StepRepository,
        bus: &EventBus,
        project_id: Uuid,
        step_number: i64,
    ) -> Result<Self> {
        let initial = repo.load(&project_id, step_number).await?;
        let (tx, state) = watch::channel(initial);
        let mut events = bus.subscribe();

        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if event.project_id != project_id || event.step_number != step_number {
                            continue;
                        }
                        debug!(
                            "Sync bridge reloading project {} step {} after {}",
                            project_id,
                            step_number,
                            event.kind.as_str()
                        );
                        if !reload(&repo, &tx, &project_id, step_number).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Notifications carry nothing, so missing some only
                        // means we reload once instead of several times
                        warn!(
                            "Sync bridge lagged {} notifications; reloading project {} step {}",
                            skipped, project_id, step_number
                        );
                        if !reload(&repo, &tx, &project_id, step_number).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(Self { state, task })
    }

    /// Current authoritative state of the document (None if never saved)
    pub fn current(&self) -> Option<StepDocument> {
        self.state.borrow().clone()
    }

    /// Wait until the next authoritative replace
    pub async fn changed(&mut self) -> Result<()> {
        self.state
            .changed()
            .await
            .map_err(|_| Error::Internal("sync bridge closed".to_string()))
    }

    /// Close the subscription; called on editor teardown
    pub fn close(self) {
        self.task.abort();
    }
}

impl Drop for SyncBridge {
    fn drop(&mut self) {
        // A dismounted editor must not leave a subscription running
        self.task.abort();
    }
}

/// Reload and replace; returns false when the bridge side is gone
async fn reload(
    repo: &StepRepository,
    tx: &watch::Sender<Option<StepDocument>>,
    project_id: &Uuid,
    step_number: i64,
) -> bool {
    match repo.load(project_id, step_number).await {
        Ok(document) => tx.send(document).is_ok(),
        Err(e) => {
            warn!(
                "Sync bridge reload failed for project {} step {}: {}; keeping last state",
                project_id, step_number, e
            );
            true
        }
    }
}
