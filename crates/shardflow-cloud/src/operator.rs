//! Cluster lifecycle: create, read, update, delete, import

use crate::client::{AppliedCapability, RemoteCluster};
use crate::context::OperatorContext;
use crate::error::{CloudError, Result};
use crate::executor::{ActionExecutor, ApplyResult};
use crate::plan::{UpdateAction, UpdatePlan, plan};
use crate::reconcile::{overlay_declared, reconcile, refresh_spec};
use crate::spec::{Capability, ClusterSpec};
use crate::state::ClusterState;
use crate::topology::OperationStatus;
use crate::translate::translate;

/// Drives one cluster through its lifecycle
pub struct ClusterOperator {
    ctx: OperatorContext,
}

impl ClusterOperator {
    pub fn new(ctx: OperatorContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &OperatorContext {
        &self.ctx
    }

    /// Create the cluster, wait until it is usable and return its first recorded state
    pub async fn create(&self, spec: &ClusterSpec) -> Result<ClusterState> {
        let request = translate(spec)?;
        tracing::debug!("Cluster create options: {:?}", request);

        let cluster_id = self.ctx.client.create(&request).await?;
        tracing::info!("Creating cluster {} ({})", spec.name, cluster_id);

        self.ctx
            .wait_for_cluster(
                &cluster_id,
                vec![OperationStatus::Building],
                OperationStatus::Active,
                self.ctx.timeouts.create,
                !spec.capabilities.is_empty(),
            )
            .await?;

        // Configuration groups can only be attached to a running cluster
        if let Some(configuration_id) = &spec.configuration_id {
            let attach = UpdateAction::AttachConfiguration {
                previous: None,
                configuration_id: Some(configuration_id.clone()),
            };
            ActionExecutor::new(&self.ctx, &cluster_id)
                .run(&attach)
                .await
                .map_err(|e| CloudError::action(attach.kind(), &cluster_id, None, e))?;
        }

        tracing::info!("Cluster {} ({}) is active", spec.name, cluster_id);

        let pending = ClusterState::new(&cluster_id, &self.ctx.region, spec.clone());
        self.read(&pending)
            .await?
            .ok_or(CloudError::ClusterNotFound(cluster_id))
    }

    /// Reconcile the recorded state with the remote cluster.
    ///
    /// Returns `None` when the cluster no longer exists, so the caller can drop
    /// the record.
    pub async fn read(&self, state: &ClusterState) -> Result<Option<ClusterState>> {
        let remote = match self.ctx.client.get(&state.id).await {
            Ok(remote) => remote,
            Err(e) if e.is_not_found() => {
                tracing::warn!("Cluster {} not found, dropping it from state", state.id);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let mut spec = refresh_spec(&remote, &state.spec);
        let applied = self.ctx.client.get_capabilities(&state.id).await?;
        spec.capabilities = merge_capabilities(&state.spec.capabilities, &applied);

        Ok(Some(state.refreshed(spec, remote.status)))
    }

    /// Compute the plan that moves `state` towards `desired`
    pub fn plan(&self, state: &ClusterState, desired: &ClusterSpec) -> Result<UpdatePlan> {
        plan(&state.spec, desired)
    }

    /// Apply `desired` to the cluster in place and return the refreshed state
    pub async fn update(
        &self,
        state: &ClusterState,
        desired: &ClusterSpec,
    ) -> Result<ClusterState> {
        let plan = self.plan(state, desired)?;

        if plan.requires_replacement() {
            return Err(CloudError::Validation(format!(
                "cluster {} cannot be updated in place, changed: {}",
                state.id,
                plan.replacements.join(", ")
            )));
        }

        if plan.has_changes() {
            let result = self.apply(&state.id, &plan).await?;
            tracing::info!(
                "Updated cluster {} ({}): {} action(s) in {}s",
                desired.name,
                state.id,
                result.completed.len(),
                result.duration().num_seconds()
            );
        } else {
            tracing::info!("Cluster {} is up to date", state.id);
        }

        // The desired spec becomes the baseline so its shard order and volume types stick
        let baseline = state.refreshed(desired.clone(), state.status.clone());
        self.read(&baseline)
            .await?
            .ok_or_else(|| CloudError::ClusterNotFound(state.id.clone()))
    }

    /// Execute a precomputed plan
    pub async fn apply(&self, cluster_id: &str, plan: &UpdatePlan) -> Result<ApplyResult> {
        tracing::info!("Applying to cluster {}: {}", cluster_id, plan.summary());
        ActionExecutor::new(&self.ctx, cluster_id).apply(plan).await
    }

    /// Delete the cluster and wait until it is gone. A missing cluster is not an error.
    pub async fn delete(&self, cluster_id: &str) -> Result<()> {
        match self.ctx.client.delete(cluster_id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                tracing::warn!("Cluster {} already deleted", cluster_id);
                return Ok(());
            }
            Err(e) => return Err(e),
        }
        tracing::info!("Deleting cluster {}", cluster_id);

        self.ctx
            .wait_for_cluster(
                cluster_id,
                vec![OperationStatus::Active, OperationStatus::Deleting],
                OperationStatus::Deleted,
                self.ctx.timeouts.delete,
                false,
            )
            .await?;

        tracing::info!("Cluster {} deleted", cluster_id);
        Ok(())
    }

    /// Build a state record for an existing cluster from its id alone
    pub async fn import(&self, cluster_id: &str) -> Result<ClusterState> {
        let remote = self.ctx.client.get(cluster_id).await?;
        let applied = self.ctx.client.get_capabilities(cluster_id).await?;
        let spec = imported_spec(&remote, &applied)?;

        tracing::info!(
            "Imported cluster {} ({}) with {} shard(s)",
            spec.name,
            cluster_id,
            spec.shards.len()
        );
        Ok(ClusterState::new(cluster_id, &self.ctx.region, spec).with_status(remote.status))
    }
}

fn imported_spec(remote: &RemoteCluster, applied: &[AppliedCapability]) -> Result<ClusterSpec> {
    let datastore = remote.datastore.clone().ok_or_else(|| {
        CloudError::Api(format!("cluster {} did not report its datastore", remote.id))
    })?;

    Ok(ClusterSpec {
        name: remote.name.clone(),
        datastore,
        floating_ip_enabled: false,
        keypair: None,
        cloud_monitoring_enabled: remote.cloud_monitoring_enabled.unwrap_or_default(),
        disk_autoexpand: remote.disk_autoexpand.clone(),
        wal_disk_autoexpand: remote.wal_disk_autoexpand.clone(),
        configuration_id: remote.configuration_id.clone(),
        capabilities: applied.iter().map(Capability::from).collect(),
        restore_point: None,
        shards: overlay_declared(reconcile(&remote.topology, &[]), &[]),
    })
}

/// Keep the declared capability order when the remote set is the same
fn merge_capabilities(declared: &[Capability], applied: &[AppliedCapability]) -> Vec<Capability> {
    let remote: Vec<Capability> = applied.iter().map(Capability::from).collect();
    let same_set = declared.len() == remote.len() && declared.iter().all(|c| remote.contains(c));
    if same_set {
        declared.to_vec()
    } else {
        remote
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::topology;
    use crate::spec::Datastore;

    fn applied(name: &str) -> AppliedCapability {
        AppliedCapability {
            name: name.to_string(),
            settings: Default::default(),
            status: OperationStatus::Active,
        }
    }

    #[test]
    fn test_merge_keeps_declared_order() {
        let declared = vec![Capability::new("b"), Capability::new("a")];
        let merged = merge_capabilities(&declared, &[applied("a"), applied("b")]);
        assert_eq!(merged, declared);
    }

    #[test]
    fn test_merge_takes_remote_when_sets_differ() {
        let declared = vec![Capability::new("a")];
        let merged = merge_capabilities(&declared, &[applied("a"), applied("c")]);
        assert_eq!(merged, vec![Capability::new("a"), Capability::new("c")]);
    }

    #[test]
    fn test_imported_spec_sorts_shards_and_marks_volumes() {
        let remote = RemoteCluster {
            id: "c-9".to_string(),
            name: "legacy".to_string(),
            status: OperationStatus::Active,
            datastore: Some(Datastore {
                datastore_type: "clickhouse".to_string(),
                version: "22.3".to_string(),
            }),
            configuration_id: Some("cfg".to_string()),
            disk_autoexpand: None,
            wal_disk_autoexpand: None,
            cloud_monitoring_enabled: Some(true),
            topology: topology(&[("i-1", "z"), ("i-2", "a"), ("i-3", "a")]),
        };

        let spec = imported_spec(&remote, &[applied("hadoop")]).unwrap();

        assert_eq!(spec.shard_order(), vec!["a", "z"]);
        assert_eq!(spec.shards[0].size, 2);
        assert_eq!(
            spec.shards[0].volume.volume_type.as_deref(),
            Some(crate::spec::IMPORTED_VOLUME_TYPE)
        );
        assert_eq!(spec.capabilities, vec![Capability::new("hadoop")]);
        assert!(spec.cloud_monitoring_enabled);
    }

    #[test]
    fn test_imported_spec_requires_datastore() {
        let remote = RemoteCluster {
            id: "c-9".to_string(),
            name: "legacy".to_string(),
            status: OperationStatus::Active,
            datastore: None,
            configuration_id: None,
            disk_autoexpand: None,
            wal_disk_autoexpand: None,
            cloud_monitoring_enabled: None,
            topology: topology(&[("i-1", "a")]),
        };
        assert!(matches!(imported_spec(&remote, &[]), Err(CloudError::Api(_))));
    }
}
