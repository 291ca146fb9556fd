//! Background removal of ext clients after a gateway is detached.
//!
//! Jobs go through a bounded queue and are processed by a single worker task.
//! Submission never blocks the request; a full queue drops the job. Failures
//! are logged under the `meshgate::cleanup` target and never reach the caller.

use meshgate_common::{RecordStore, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::blocking::run_blocking;

const LOG_TARGET: &str = "meshgate::cleanup";

/// Remove every ext client `owner` has bound to `gateway_id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupJob {
    pub owner: String,
    pub gateway_id: Uuid,
}

/// Sending half, shared by request handlers
#[derive(Debug, Clone)]
pub struct CleanupQueue {
    tx: mpsc::Sender<CleanupJob>,
}

impl CleanupQueue {
    /// Enqueue without waiting. Returns false when the job was dropped.
    pub fn submit(&self, job: CleanupJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                error!(target: LOG_TARGET, owner = %job.owner, gateway = %job.gateway_id, "Cleanup queue full, dropping job");
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                error!(target: LOG_TARGET, owner = %job.owner, gateway = %job.gateway_id, "Cleanup worker stopped, dropping job");
                false
            }
        }
    }
}

pub struct CleanupWorker {
    store: Arc<dyn RecordStore>,
    rx: mpsc::Receiver<CleanupJob>,
}

impl CleanupWorker {
    pub fn new(store: Arc<dyn RecordStore>, capacity: usize) -> (CleanupQueue, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (CleanupQueue { tx }, Self { store, rx })
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Process jobs until every queue handle is dropped
    pub async fn run(mut self) {
        debug!(target: LOG_TARGET, "Cleanup worker started");
        while let Some(job) = self.rx.recv().await {
            let store = self.store.clone();
            let scan = job.clone();
            let outcome = run_blocking(move || remove_bound_clients(store.as_ref(), &scan)).await;
            match outcome {
                Ok(removed) => {
                    if removed > 0 {
                        info!(target: LOG_TARGET, owner = %job.owner, gateway = %job.gateway_id, removed, "Removed ext clients of detached gateway");
                    }
                }
                Err(e) => {
                    error!(target: LOG_TARGET, owner = %job.owner, gateway = %job.gateway_id, error = %e, "Failed to scan ext clients");
                }
            }
        }
        debug!(target: LOG_TARGET, "Cleanup worker stopped");
    }
}

/// Delete matching ext clients; per-client failures are logged and skipped
fn remove_bound_clients(store: &dyn RecordStore, job: &CleanupJob) -> Result<usize> {
    let mut removed = 0;
    for client in store.list_ext_clients()? {
        if client.owner_id != job.owner || client.ingress_gateway_id != job.gateway_id {
            continue;
        }
        match store.delete_ext_client(&client.network, &client.client_id) {
            Ok(true) => removed += 1,
            Ok(false) => {}
            Err(e) => {
                error!(target: LOG_TARGET, client = %client.client_id, network = %client.network, error = %e, "Failed to delete ext client");
            }
        }
    }
    Ok(removed)
}
