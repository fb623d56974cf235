//! Change detection and update planning
//!
//! `plan` compares the last-known spec with the desired one and emits an ordered
//! list of update actions. The order is fixed and independent of field or map
//! iteration order: cluster-level actions first (configuration, disk autoexpand,
//! WAL autoexpand, capabilities, monitoring), then per shard in declared order
//! (volume, WAL volume, flavor, size).

use crate::error::{CloudError, Result};
use crate::spec::{AutoExpand, Capability, ClusterSpec, ShardSpec, WalVolume};
use crate::translate::{InstanceRequest, shard_requests};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Kind of update action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    AttachConfiguration,
    UpdateDiskAutoexpand,
    UpdateWalAutoexpand,
    ApplyCapabilities,
    ToggleMonitoring,
    ResizeVolume,
    ResizeWalVolume,
    ResizeFlavor,
    Grow,
    Shrink,
}

impl ActionKind {
    /// Gerund used in diagnostics ("error growing on shard ...")
    pub fn verb(&self) -> &'static str {
        match self {
            ActionKind::AttachConfiguration => "updating configuration",
            ActionKind::UpdateDiskAutoexpand => "updating disk_autoexpand",
            ActionKind::UpdateWalAutoexpand => "updating wal_disk_autoexpand",
            ActionKind::ApplyCapabilities => "applying capabilities",
            ActionKind::ToggleMonitoring => "updating cloud_monitoring_enabled",
            ActionKind::ResizeVolume => "resizing volume",
            ActionKind::ResizeWalVolume => "resizing wal_volume",
            ActionKind::ResizeFlavor => "changing flavor",
            ActionKind::Grow => "growing",
            ActionKind::Shrink => "shrinking",
        }
    }

    pub fn is_shard_scoped(&self) -> bool {
        matches!(
            self,
            ActionKind::ResizeVolume
                | ActionKind::ResizeWalVolume
                | ActionKind::ResizeFlavor
                | ActionKind::Grow
                | ActionKind::Shrink
        )
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ActionKind::AttachConfiguration => "attach-configuration",
            ActionKind::UpdateDiskAutoexpand => "update-disk-autoexpand",
            ActionKind::UpdateWalAutoexpand => "update-wal-autoexpand",
            ActionKind::ApplyCapabilities => "apply-capabilities",
            ActionKind::ToggleMonitoring => "toggle-monitoring",
            ActionKind::ResizeVolume => "resize-volume",
            ActionKind::ResizeWalVolume => "resize-wal-volume",
            ActionKind::ResizeFlavor => "resize-flavor",
            ActionKind::Grow => "grow",
            ActionKind::Shrink => "shrink",
        };
        write!(f, "{}", name)
    }
}

/// A planned update action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum UpdateAction {
    /// Detach `previous` (if any), then attach `configuration_id` (if any)
    AttachConfiguration {
        previous: Option<String>,
        configuration_id: Option<String>,
    },
    UpdateDiskAutoexpand {
        autoexpand: AutoExpand,
    },
    UpdateWalAutoexpand {
        autoexpand: AutoExpand,
    },
    ApplyCapabilities {
        capabilities: Vec<Capability>,
    },
    ToggleMonitoring {
        enabled: bool,
    },
    ResizeVolume {
        shard_id: String,
        size: u32,
    },
    ResizeWalVolume {
        shard_id: String,
        wal_volume: WalVolume,
    },
    ResizeFlavor {
        shard_id: String,
        flavor_id: String,
    },
    Grow {
        shard_id: String,
        count: u32,
        instances: Vec<InstanceRequest>,
    },
    /// Remove `count` instances; `instance_ids` names them, otherwise non-leaders are picked
    Shrink {
        shard_id: String,
        count: u32,
        instance_ids: Option<Vec<String>>,
    },
}

impl UpdateAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            UpdateAction::AttachConfiguration { .. } => ActionKind::AttachConfiguration,
            UpdateAction::UpdateDiskAutoexpand { .. } => ActionKind::UpdateDiskAutoexpand,
            UpdateAction::UpdateWalAutoexpand { .. } => ActionKind::UpdateWalAutoexpand,
            UpdateAction::ApplyCapabilities { .. } => ActionKind::ApplyCapabilities,
            UpdateAction::ToggleMonitoring { .. } => ActionKind::ToggleMonitoring,
            UpdateAction::ResizeVolume { .. } => ActionKind::ResizeVolume,
            UpdateAction::ResizeWalVolume { .. } => ActionKind::ResizeWalVolume,
            UpdateAction::ResizeFlavor { .. } => ActionKind::ResizeFlavor,
            UpdateAction::Grow { .. } => ActionKind::Grow,
            UpdateAction::Shrink { .. } => ActionKind::Shrink,
        }
    }

    pub fn shard_id(&self) -> Option<&str> {
        match self {
            UpdateAction::ResizeVolume { shard_id, .. }
            | UpdateAction::ResizeWalVolume { shard_id, .. }
            | UpdateAction::ResizeFlavor { shard_id, .. }
            | UpdateAction::Grow { shard_id, .. }
            | UpdateAction::Shrink { shard_id, .. } => Some(shard_id),
            _ => None,
        }
    }

    /// One-line human description
    pub fn describe(&self) -> String {
        match self {
            UpdateAction::AttachConfiguration {
                previous,
                configuration_id,
            } => match (previous, configuration_id) {
                (Some(old), Some(new)) => format!("replace configuration {} with {}", old, new),
                (None, Some(new)) => format!("attach configuration {}", new),
                (Some(old), None) => format!("detach configuration {}", old),
                (None, None) => "keep configuration".to_string(),
            },
            UpdateAction::UpdateDiskAutoexpand { autoexpand } => {
                format!("set disk autoexpand to {}", describe_autoexpand(autoexpand))
            }
            UpdateAction::UpdateWalAutoexpand { autoexpand } => {
                format!("set wal disk autoexpand to {}", describe_autoexpand(autoexpand))
            }
            UpdateAction::ApplyCapabilities { capabilities } => {
                let names: Vec<_> = capabilities.iter().map(|c| c.name.as_str()).collect();
                format!("apply capabilities [{}]", names.join(", "))
            }
            UpdateAction::ToggleMonitoring { enabled } => {
                if *enabled {
                    "enable cloud monitoring".to_string()
                } else {
                    "disable cloud monitoring".to_string()
                }
            }
            UpdateAction::ResizeVolume { shard_id, size } => {
                format!("resize volume of shard {} to {} GB", shard_id, size)
            }
            UpdateAction::ResizeWalVolume {
                shard_id,
                wal_volume,
            } => format!(
                "resize wal volume of shard {} to {} GB",
                shard_id, wal_volume.size
            ),
            UpdateAction::ResizeFlavor {
                shard_id,
                flavor_id,
            } => format!("change flavor of shard {} to {}", shard_id, flavor_id),
            UpdateAction::Grow { shard_id, count, .. } => {
                format!("add {} instance(s) to shard {}", count, shard_id)
            }
            UpdateAction::Shrink {
                shard_id,
                count,
                instance_ids,
            } => match instance_ids {
                Some(ids) => format!(
                    "remove {} instance(s) [{}] from shard {}",
                    count,
                    ids.join(", "),
                    shard_id
                ),
                None => format!(
                    "remove {} non-leader instance(s) from shard {}",
                    count, shard_id
                ),
            },
        }
    }
}

fn describe_autoexpand(autoexpand: &AutoExpand) -> String {
    match (autoexpand.enabled, autoexpand.max_disk_size) {
        (true, Some(max)) => format!("enabled (max {} GB)", max),
        (true, None) => "enabled".to_string(),
        (false, _) => "disabled".to_string(),
    }
}

/// Plan containing all actions of one update cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdatePlan {
    /// Actions in execution order
    pub actions: Vec<UpdateAction>,

    /// Immutable fields that changed; any entry means the cluster must be replaced
    pub replacements: Vec<String>,
}

impl UpdatePlan {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_changes(&self) -> bool {
        !self.actions.is_empty() || !self.replacements.is_empty()
    }

    pub fn requires_replacement(&self) -> bool {
        !self.replacements.is_empty()
    }

    pub fn kinds(&self) -> Vec<ActionKind> {
        self.actions.iter().map(UpdateAction::kind).collect()
    }

    /// Summary of the plan
    pub fn summary(&self) -> PlanSummary {
        let shard = self
            .actions
            .iter()
            .filter(|a| a.kind().is_shard_scoped())
            .count();
        PlanSummary {
            cluster: self.actions.len() - shard,
            shard,
            replacements: self.replacements.len(),
        }
    }
}

/// Summary of planned actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    pub cluster: usize,
    pub shard: usize,
    pub replacements: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} cluster action(s), {} shard action(s), {} field(s) forcing replacement",
            self.cluster, self.shard, self.replacements
        )
    }
}

/// Compute the update plan from `previous` to `desired`
pub fn plan(previous: &ClusterSpec, desired: &ClusterSpec) -> Result<UpdatePlan> {
    desired.validate()?;

    let replacements = immutable_changes(previous, desired);
    let mut actions = Vec::new();

    if previous.configuration_id != desired.configuration_id {
        actions.push(UpdateAction::AttachConfiguration {
            previous: previous.configuration_id.clone(),
            configuration_id: desired.configuration_id.clone(),
        });
    }

    if previous.disk_autoexpand != desired.disk_autoexpand {
        actions.push(UpdateAction::UpdateDiskAutoexpand {
            autoexpand: desired
                .disk_autoexpand
                .clone()
                .unwrap_or_else(AutoExpand::disabled),
        });
    }

    if previous.wal_disk_autoexpand != desired.wal_disk_autoexpand {
        actions.push(UpdateAction::UpdateWalAutoexpand {
            autoexpand: desired
                .wal_disk_autoexpand
                .clone()
                .unwrap_or_else(AutoExpand::disabled),
        });
    }

    if previous.capabilities != desired.capabilities {
        actions.push(UpdateAction::ApplyCapabilities {
            capabilities: desired.capabilities.clone(),
        });
    }

    if previous.cloud_monitoring_enabled != desired.cloud_monitoring_enabled {
        actions.push(UpdateAction::ToggleMonitoring {
            enabled: desired.cloud_monitoring_enabled,
        });
    }

    for shard in &desired.shards {
        // Shards new to the cluster are reported as replacements above
        let Some(old) = previous.shard(&shard.shard_id) else {
            continue;
        };
        plan_shard(old, shard, desired.keypair.as_deref(), &mut actions)?;
    }

    Ok(UpdatePlan {
        actions,
        replacements,
    })
}

fn plan_shard(
    old: &ShardSpec,
    new: &ShardSpec,
    keypair: Option<&str>,
    actions: &mut Vec<UpdateAction>,
) -> Result<()> {
    let shard_id = &new.shard_id;

    if let Some(size) = new.volume.size {
        if old.volume.size != Some(size) {
            actions.push(UpdateAction::ResizeVolume {
                shard_id: shard_id.clone(),
                size,
            });
        }
    }

    if old.wal_volume != new.wal_volume {
        let Some(wal_volume) = &new.wal_volume else {
            return Err(CloudError::Validation(format!(
                "wal_volume cannot be removed from shard {}",
                shard_id
            )));
        };
        actions.push(UpdateAction::ResizeWalVolume {
            shard_id: shard_id.clone(),
            wal_volume: wal_volume.clone(),
        });
    }

    if old.flavor_id != new.flavor_id {
        actions.push(UpdateAction::ResizeFlavor {
            shard_id: shard_id.clone(),
            flavor_id: new.flavor_id.clone(),
        });
    }

    if new.size > old.size {
        let count = new.size - old.size;
        actions.push(UpdateAction::Grow {
            shard_id: shard_id.clone(),
            count,
            instances: shard_requests(new, keypair, count)?,
        });
    } else if new.size < old.size {
        let count = old.size - new.size;
        let instance_ids = match &new.shrink_options {
            Some(ids) => Some(validate_shrink_options(old, ids, count)?),
            None => None,
        };
        actions.push(UpdateAction::Shrink {
            shard_id: shard_id.clone(),
            count,
            instance_ids,
        });
    }

    Ok(())
}

fn validate_shrink_options(old: &ShardSpec, ids: &[String], count: u32) -> Result<Vec<String>> {
    let shard_id = &old.shard_id;

    if ids.len() != count as usize {
        return Err(CloudError::ShrinkOptions {
            shard_id: shard_id.clone(),
            reason: format!(
                "expected exactly {} instance id(s) to remove, got {}",
                count,
                ids.len()
            ),
        });
    }

    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id.as_str()) {
            return Err(CloudError::ShrinkOptions {
                shard_id: shard_id.clone(),
                reason: format!("instance {} listed more than once", id),
            });
        }
    }

    // Membership is re-checked against the live topology before the remote call;
    // here we only know what the last reconcile saw.
    if !old.instances.is_empty() {
        let known = old.instance_ids();
        if let Some(unknown) = ids.iter().find(|id| !known.contains(&id.as_str())) {
            return Err(CloudError::ShrinkOptions {
                shard_id: shard_id.clone(),
                reason: format!("instance {} is not part of the shard", unknown),
            });
        }
    }

    Ok(ids.to_vec())
}

/// Changed fields that cannot be updated in place
fn immutable_changes(previous: &ClusterSpec, desired: &ClusterSpec) -> Vec<String> {
    let mut changes = Vec::new();

    if previous.name != desired.name {
        changes.push("name".to_string());
    }
    if previous.datastore != desired.datastore {
        changes.push("datastore".to_string());
    }
    if previous.floating_ip_enabled != desired.floating_ip_enabled {
        changes.push("floating_ip_enabled".to_string());
    }
    if previous.keypair != desired.keypair {
        changes.push("keypair".to_string());
    }
    if previous.restore_point != desired.restore_point {
        changes.push("restore_point".to_string());
    }

    for shard in &desired.shards {
        match previous.shard(&shard.shard_id) {
            None => changes.push(format!("shard.{} (added)", shard.shard_id)),
            Some(old) => {
                if old.networks != shard.networks {
                    changes.push(format!("shard.{}.network", shard.shard_id));
                }
                if old.availability_zone != shard.availability_zone {
                    changes.push(format!("shard.{}.availability_zone", shard.shard_id));
                }
            }
        }
    }
    for shard in &previous.shards {
        if desired.shard(&shard.shard_id).is_none() {
            changes.push(format!("shard.{} (removed)", shard.shard_id));
        }
    }

    changes
}
