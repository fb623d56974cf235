//! Sequential execution of an update plan
//!
//! Each action is a precondition check, one or more remote calls and a poll
//! until the cluster is Active again. Actions never overlap: the next one is
//! issued only after the previous one has settled. The first failure stops the
//! sequence and is reported as a single action-scoped error; actions that
//! already completed are not undone.

use crate::client::{ClusterAction, RemoteCluster};
use crate::context::OperatorContext;
use crate::error::{CloudError, Result};
use crate::plan::{ActionKind, UpdateAction, UpdatePlan};
use crate::topology::{ClusterInstance, OperationStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Result of running a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyResult {
    /// Actions that completed, in order
    pub completed: Vec<ActionKind>,

    pub started_at: DateTime<Utc>,

    pub finished_at: DateTime<Utc>,
}

impl ApplyResult {
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Runs update actions against one cluster
pub struct ActionExecutor<'a> {
    ctx: &'a OperatorContext,
    cluster_id: &'a str,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(ctx: &'a OperatorContext, cluster_id: &'a str) -> Self {
        Self { ctx, cluster_id }
    }

    /// Execute every action of `plan` in order, stopping at the first failure
    pub async fn apply(&self, plan: &UpdatePlan) -> Result<ApplyResult> {
        let started_at = Utc::now();
        let mut completed = Vec::with_capacity(plan.actions.len());

        for action in &plan.actions {
            self.run(action).await.map_err(|e| {
                tracing::error!("{} failed on cluster {}: {}", action.kind(), self.cluster_id, e);
                CloudError::action(action.kind(), self.cluster_id, action.shard_id(), e)
            })?;
            completed.push(action.kind());
        }

        Ok(ApplyResult {
            completed,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Execute a single action
    pub async fn run(&self, action: &UpdateAction) -> Result<()> {
        let started = Instant::now();
        tracing::info!("{}: {}", self.cluster_id, action.describe());

        let remote = self.ready_cluster().await?;
        for call in self.calls_for(action, &remote)? {
            tracing::debug!("Submitting {} to cluster {}", call.name(), self.cluster_id);
            self.ctx.client.act(self.cluster_id, &call).await?;
            self.wait_active(action.kind() == ActionKind::ApplyCapabilities)
                .await?;
        }

        tracing::info!(
            "{}: {} finished in {:?}",
            self.cluster_id,
            action.kind(),
            started.elapsed()
        );
        Ok(())
    }

    /// Read the cluster and require it to be Active before any remote call
    async fn ready_cluster(&self) -> Result<RemoteCluster> {
        let remote = self.ctx.client.get(self.cluster_id).await?;
        if remote.status != OperationStatus::Active {
            return Err(CloudError::NotReady {
                cluster_id: self.cluster_id.to_string(),
                status: remote.status.to_string(),
            });
        }
        Ok(remote)
    }

    async fn wait_active(&self, with_capabilities: bool) -> Result<()> {
        self.ctx
            .wait_for_cluster(
                self.cluster_id,
                vec![OperationStatus::Building],
                OperationStatus::Active,
                self.ctx.timeouts.update,
                with_capabilities,
            )
            .await?;
        Ok(())
    }

    /// Remote calls implementing `action`, in submission order
    fn calls_for(
        &self,
        action: &UpdateAction,
        remote: &RemoteCluster,
    ) -> Result<Vec<ClusterAction>> {
        let calls = match action {
            UpdateAction::AttachConfiguration {
                previous,
                configuration_id,
            } => {
                let mut calls = Vec::with_capacity(2);
                if let Some(old) = previous {
                    calls.push(ClusterAction::DetachConfiguration {
                        configuration_id: old.clone(),
                    });
                }
                if let Some(new) = configuration_id {
                    calls.push(ClusterAction::AttachConfiguration {
                        configuration_id: new.clone(),
                    });
                }
                calls
            }
            UpdateAction::UpdateDiskAutoexpand { autoexpand } => {
                vec![ClusterAction::UpdateAutoexpand {
                    autoexpand: autoexpand.clone(),
                }]
            }
            UpdateAction::UpdateWalAutoexpand { autoexpand } => {
                vec![ClusterAction::UpdateWalAutoexpand {
                    autoexpand: autoexpand.clone(),
                }]
            }
            UpdateAction::ApplyCapabilities { capabilities } => {
                vec![ClusterAction::ApplyCapabilities {
                    capabilities: capabilities.clone(),
                }]
            }
            UpdateAction::ToggleMonitoring { enabled } => {
                vec![ClusterAction::UpdateCloudMonitoring { enabled: *enabled }]
            }
            UpdateAction::ResizeVolume { shard_id, size } => {
                self.require_shard(remote, shard_id)?;
                vec![ClusterAction::ResizeVolume {
                    shard_id: shard_id.clone(),
                    size: *size,
                }]
            }
            UpdateAction::ResizeWalVolume {
                shard_id,
                wal_volume,
            } => {
                self.require_shard(remote, shard_id)?;
                vec![ClusterAction::ResizeWalVolume {
                    shard_id: shard_id.clone(),
                    size: wal_volume.size,
                }]
            }
            UpdateAction::ResizeFlavor {
                shard_id,
                flavor_id,
            } => {
                self.require_shard(remote, shard_id)?;
                vec![ClusterAction::ResizeFlavor {
                    shard_id: shard_id.clone(),
                    flavor_id: flavor_id.clone(),
                }]
            }
            UpdateAction::Grow {
                shard_id,
                instances,
                ..
            } => {
                self.require_shard(remote, shard_id)?;
                vec![ClusterAction::Grow {
                    instances: instances.clone(),
                }]
            }
            UpdateAction::Shrink {
                shard_id,
                count,
                instance_ids,
            } => {
                let members: Vec<&ClusterInstance> =
                    remote.topology.shard_instances(shard_id).collect();
                if members.is_empty() {
                    return Err(self.shard_not_found(shard_id));
                }
                let instance_ids =
                    select_for_removal(shard_id, &members, *count, instance_ids.as_deref())?;
                vec![ClusterAction::Shrink { instance_ids }]
            }
        };
        Ok(calls)
    }

    fn require_shard(&self, remote: &RemoteCluster, shard_id: &str) -> Result<()> {
        if remote.topology.contains_shard(shard_id) {
            Ok(())
        } else {
            Err(self.shard_not_found(shard_id))
        }
    }

    fn shard_not_found(&self, shard_id: &str) -> CloudError {
        CloudError::ShardNotFound {
            cluster_id: self.cluster_id.to_string(),
            shard_id: shard_id.to_string(),
        }
    }
}

/// Pick the instances a shrink removes.
///
/// Explicit ids must all be current members of the shard. Without them, the
/// first non-leader members in remote order are taken. A shard is never
/// shrunk to zero.
pub fn select_for_removal(
    shard_id: &str,
    members: &[&ClusterInstance],
    count: u32,
    requested: Option<&[String]>,
) -> Result<Vec<String>> {
    let count = count as usize;
    if count >= members.len() {
        return Err(CloudError::ShrinkOptions {
            shard_id: shard_id.to_string(),
            reason: format!(
                "cannot remove {} of {} instance(s); at least one must remain",
                count,
                members.len()
            ),
        });
    }

    if let Some(ids) = requested {
        if ids.len() != count {
            return Err(CloudError::ShrinkOptions {
                shard_id: shard_id.to_string(),
                reason: format!(
                    "expected exactly {} instance id(s) to remove, got {}",
                    count,
                    ids.len()
                ),
            });
        }
        if let Some(unknown) = ids
            .iter()
            .find(|id| !members.iter().any(|m| &m.instance_id == *id))
        {
            return Err(CloudError::ShrinkOptions {
                shard_id: shard_id.to_string(),
                reason: format!("instance {} is not part of the shard", unknown),
            });
        }
        return Ok(ids.to_vec());
    }

    let candidates: Vec<String> = members
        .iter()
        .filter(|m| !m.is_leader())
        .take(count)
        .map(|m| m.instance_id.clone())
        .collect();

    if candidates.len() < count {
        return Err(CloudError::ShrinkOptions {
            shard_id: shard_id.to_string(),
            reason: format!(
                "only {} non-leader instance(s) available, {} requested",
                candidates.len(),
                count
            ),
        });
    }

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::InstanceRole;

    fn members() -> Vec<ClusterInstance> {
        vec![
            ClusterInstance::new("i-1", "s").with_role(InstanceRole::Replica),
            ClusterInstance::new("i-2", "s").with_role(InstanceRole::Leader),
            ClusterInstance::new("i-3", "s").with_role(InstanceRole::Replica),
        ]
    }

    #[test]
    fn test_default_selection_skips_leader() {
        let members = members();
        let refs: Vec<_> = members.iter().collect();
        let picked = select_for_removal("s", &refs, 2, None).unwrap();
        assert_eq!(picked, vec!["i-1", "i-3"]);
    }

    #[test]
    fn test_explicit_ids_must_be_members() {
        let members = members();
        let refs: Vec<_> = members.iter().collect();

        let ids = vec!["i-2".to_string()];
        assert_eq!(select_for_removal("s", &refs, 1, Some(&ids)).unwrap(), ids);

        let unknown = vec!["i-7".to_string()];
        let err = select_for_removal("s", &refs, 1, Some(&unknown)).unwrap_err();
        assert!(matches!(err, CloudError::ShrinkOptions { .. }));
    }

    #[test]
    fn test_cannot_remove_every_instance() {
        let members = members();
        let refs: Vec<_> = members.iter().collect();
        assert!(select_for_removal("s", &refs, 3, None).is_err());
    }

    #[test]
    fn test_not_enough_non_leaders() {
        let members = vec![
            ClusterInstance::new("i-1", "s").with_role(InstanceRole::Leader),
            ClusterInstance::new("i-2", "s").with_role(InstanceRole::Leader),
            ClusterInstance::new("i-3", "s").with_role(InstanceRole::Replica),
        ];
        let refs: Vec<_> = members.iter().collect();
        let err = select_for_removal("s", &refs, 2, None).unwrap_err();
        assert!(err.to_string().contains("only 1 non-leader"));
    }
}
