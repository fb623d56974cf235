//! Topology reconciliation
//!
//! The control plane is the only source of truth for shard membership and
//! instance counts, but it does not return shards in a stable order. The local
//! declared order is the only source of truth for presentation order. The
//! reconciler combines both: declared shards keep their position, shards the
//! user never declared are appended sorted by id.

use crate::client::RemoteCluster;
use crate::spec::{ClusterSpec, IMPORTED_VOLUME_TYPE, ShardSpec, Volume, WalVolume};
use crate::topology::{ClusterInstance, ClusterTopology, InstanceView};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A shard as observed remotely
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledShardView {
    pub shard_id: String,
    pub size: u32,
    pub instances: Vec<InstanceView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wal_volume_size: Option<u32>,
}

impl ReconciledShardView {
    fn from_instances(shard_id: &str, instances: &[&ClusterInstance]) -> Self {
        let first = instances.first();
        Self {
            shard_id: shard_id.to_string(),
            size: instances.len() as u32,
            instances: instances.iter().map(|i| InstanceView::from(*i)).collect(),
            flavor_id: first.and_then(|i| i.flavor_id.clone()),
            volume_size: first.and_then(|i| i.volume_size),
            wal_volume_size: first.and_then(|i| i.wal_volume_size),
        }
    }
}

/// Rebuild the shard list from remote topology, keeping `declared_order` stable
pub fn reconcile(
    topology: &ClusterTopology,
    declared_order: &[String],
) -> Vec<ReconciledShardView> {
    let mut groups: BTreeMap<&str, Vec<&ClusterInstance>> = BTreeMap::new();
    for instance in &topology.instances {
        groups
            .entry(instance.shard_id.as_str())
            .or_default()
            .push(instance);
    }

    let mut shards = Vec::with_capacity(groups.len());
    for shard_id in declared_order {
        if let Some(instances) = groups.remove(shard_id.as_str()) {
            shards.push(ReconciledShardView::from_instances(shard_id, &instances));
        }
    }

    // BTreeMap iteration yields the remaining (undeclared) shards sorted by id
    shards.extend(
        groups
            .iter()
            .map(|(shard_id, instances)| ReconciledShardView::from_instances(shard_id, instances)),
    );

    shards
}

/// Carry last-declared values the control plane does not report onto reconciled shards.
///
/// Declared shards are matched by shard id. Volume and WAL types, networks and the
/// availability zone come from the declaration; flavor and volume sizes come from
/// the remote side when it reports them. Undeclared shards are marked as imported.
pub fn overlay_declared(views: Vec<ReconciledShardView>, declared: &[ShardSpec]) -> Vec<ShardSpec> {
    views
        .into_iter()
        .map(|view| match declared.iter().find(|s| s.shard_id == view.shard_id) {
            Some(previous) => overlay_shard(view, previous),
            None => imported_shard(view),
        })
        .collect()
}

fn overlay_shard(view: ReconciledShardView, previous: &ShardSpec) -> ShardSpec {
    let wal_volume = match (view.wal_volume_size, &previous.wal_volume) {
        (Some(size), Some(wal)) => Some(WalVolume {
            size,
            volume_type: wal.volume_type.clone(),
        }),
        (Some(size), None) => Some(WalVolume {
            size,
            volume_type: IMPORTED_VOLUME_TYPE.to_string(),
        }),
        (None, declared) => declared.clone(),
    };

    ShardSpec {
        shard_id: view.shard_id,
        size: view.size,
        flavor_id: view.flavor_id.unwrap_or_else(|| previous.flavor_id.clone()),
        volume: Volume {
            size: view.volume_size.or(previous.volume.size),
            volume_type: previous.volume.volume_type.clone(),
        },
        wal_volume,
        networks: previous.networks.clone(),
        availability_zone: previous.availability_zone.clone(),
        shrink_options: None,
        instances: view.instances,
    }
}

fn imported_shard(view: ReconciledShardView) -> ShardSpec {
    ShardSpec {
        shard_id: view.shard_id,
        size: view.size,
        flavor_id: view.flavor_id.unwrap_or_default(),
        volume: Volume {
            size: view.volume_size,
            volume_type: Some(IMPORTED_VOLUME_TYPE.to_string()),
        },
        wal_volume: view.wal_volume_size.map(|size| WalVolume {
            size,
            volume_type: IMPORTED_VOLUME_TYPE.to_string(),
        }),
        networks: Vec::new(),
        availability_zone: None,
        shrink_options: None,
        instances: view.instances,
    }
}

/// Merge a remote read into the last-known spec, producing the next last-known spec
pub fn refresh_spec(remote: &RemoteCluster, previous: &ClusterSpec) -> ClusterSpec {
    let views = reconcile(&remote.topology, &previous.shard_order());
    let shards = overlay_declared(views, &previous.shards);

    let mut spec = previous.clone();
    spec.name = remote.name.clone();
    if let Some(datastore) = &remote.datastore {
        spec.datastore = datastore.clone();
    }
    spec.configuration_id = remote.configuration_id.clone();
    if spec.disk_autoexpand.is_some() {
        if let Some(autoexpand) = &remote.disk_autoexpand {
            spec.disk_autoexpand = Some(autoexpand.clone());
        }
    }
    if spec.wal_disk_autoexpand.is_some() {
        if let Some(autoexpand) = &remote.wal_disk_autoexpand {
            spec.wal_disk_autoexpand = Some(autoexpand.clone());
        }
    }
    if let Some(enabled) = remote.cloud_monitoring_enabled {
        spec.cloud_monitoring_enabled = enabled;
    }
    spec.shards = shards;

    tracing::debug!(
        "Reconciled cluster {}: {} shards, {} instances",
        remote.id,
        spec.shards.len(),
        spec.total_instances()
    );
    spec
}
