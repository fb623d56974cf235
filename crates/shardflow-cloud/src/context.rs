//! Per-operation context
//!
//! Everything a lifecycle operation needs is passed explicitly: the remote
//! client, the region, per-kind timeouts, the poll policy and the shutdown
//! signal. Nothing is process-global, so distinct clusters can be handled
//! concurrently with independent contexts.

use crate::client::ClusterApi;
use crate::error::Result;
use crate::poller::{PollPolicy, StateWaiter};
use crate::topology::OperationStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Default budget for create, delete and update waits
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Per-operation-kind timeouts
#[derive(Debug, Clone, PartialEq)]
pub struct Timeouts {
    pub create: Duration,
    pub delete: Duration,
    /// Applied to each update action separately
    pub update: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: DEFAULT_OPERATION_TIMEOUT,
            delete: DEFAULT_OPERATION_TIMEOUT,
            update: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

/// Context carried through create/read/update/delete
#[derive(Clone)]
pub struct OperatorContext {
    pub client: Arc<dyn ClusterApi>,
    pub region: String,
    pub timeouts: Timeouts,
    pub poll: PollPolicy,
    shutdown: watch::Receiver<bool>,
}

impl OperatorContext {
    /// Context that is never cancelled
    pub fn new(client: Arc<dyn ClusterApi>, region: impl Into<String>) -> Self {
        // The sender is dropped right away; a closed channel never signals shutdown.
        let (_tx, shutdown) = watch::channel(false);
        Self {
            client,
            region: region.into(),
            timeouts: Timeouts::default(),
            poll: PollPolicy::default(),
            shutdown,
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Poll the cluster until it reaches `target`.
    ///
    /// With `with_capabilities`, the cluster only counts as `target` once every
    /// applied capability is Active as well; a capability in Error fails the wait.
    /// While waiting for `Deleted`, a not-found read counts as `Deleted`.
    pub async fn wait_for_cluster(
        &self,
        cluster_id: &str,
        pending: Vec<OperationStatus>,
        target: OperationStatus,
        timeout: Duration,
        with_capabilities: bool,
    ) -> Result<OperationStatus> {
        let waiter = StateWaiter::new(
            format!("cluster {}", cluster_id),
            pending,
            target.clone(),
            timeout,
        )
        .with_policy(self.poll.clone());
        let mut shutdown = self.shutdown.clone();
        let client = &self.client;
        let target = &target;

        waiter
            .wait(
                || async move {
                    let status = match client.get(cluster_id).await {
                        Ok(remote) => remote.status,
                        Err(e) if e.is_not_found() && *target == OperationStatus::Deleted => {
                            return Ok(OperationStatus::Deleted);
                        }
                        Err(e) => return Err(e),
                    };

                    if with_capabilities && status == OperationStatus::Active {
                        return capability_status(&**client, cluster_id).await;
                    }
                    Ok(status)
                },
                &mut shutdown,
            )
            .await
    }
}

/// Aggregate capability status: Error if any failed, Building while any is not Active
async fn capability_status(client: &dyn ClusterApi, cluster_id: &str) -> Result<OperationStatus> {
    let capabilities = client.get_capabilities(cluster_id).await?;

    if let Some(failed) = capabilities
        .iter()
        .find(|c| c.status == OperationStatus::Error)
    {
        tracing::warn!(
            "Capability {} of cluster {} is in error state",
            failed.name,
            cluster_id
        );
        return Ok(OperationStatus::Error);
    }

    if capabilities.iter().any(|c| c.status != OperationStatus::Active) {
        return Ok(OperationStatus::Building);
    }

    Ok(OperationStatus::Active)
}

impl std::fmt::Debug for OperatorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorContext")
            .field("region", &self.region)
            .field("timeouts", &self.timeouts)
            .field("poll", &self.poll)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

