//! Desired spec → creation request
//!
//! Every shard expands into `size` identical instance requests tagged with the
//! shard id. Requests are emitted shard by shard in declared order; the position
//! of a request in the flat list carries no meaning beyond that grouping.

use crate::error::{CloudError, Result};
use crate::spec::{
    AutoExpand, Capability, ClusterSpec, Datastore, Network, RestorePoint, ShardSpec, Volume,
    WalVolume,
};
use serde::{Deserialize, Serialize};

/// Body of a cluster creation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRequest {
    pub name: String,
    pub datastore: Datastore,
    pub floating_ip_enabled: bool,
    pub cloud_monitoring_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_autoexpand: Option<AutoExpand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wal_disk_autoexpand: Option<AutoExpand>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<Capability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore_point: Option<RestorePoint>,
    pub instances: Vec<InstanceRequest>,
}

impl CreateRequest {
    /// Requests belonging to one shard
    pub fn shard_instances<'a>(
        &'a self,
        shard_id: &'a str,
    ) -> impl Iterator<Item = &'a InstanceRequest> + 'a {
        self.instances.iter().filter(move |i| i.shard_id == shard_id)
    }
}

/// Creation descriptor of a single instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRequest {
    pub shard_id: String,
    pub flavor_id: String,
    pub volume: Volume,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wal_volume: Option<WalVolume>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<Network>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keypair: Option<String>,
}

/// Translate a desired cluster spec into a creation request
pub fn translate(spec: &ClusterSpec) -> Result<CreateRequest> {
    spec.validate()?;

    let mut instances = Vec::with_capacity(spec.total_instances() as usize);
    for shard in &spec.shards {
        instances.extend(shard_requests(shard, spec.keypair.as_deref(), shard.size)?);
    }

    tracing::debug!(
        "Translated cluster {} into {} instance requests across {} shards",
        spec.name,
        instances.len(),
        spec.shards.len()
    );

    Ok(CreateRequest {
        name: spec.name.clone(),
        datastore: spec.datastore.clone(),
        floating_ip_enabled: spec.floating_ip_enabled,
        cloud_monitoring_enabled: spec.cloud_monitoring_enabled,
        disk_autoexpand: spec.disk_autoexpand.clone(),
        wal_disk_autoexpand: spec.wal_disk_autoexpand.clone(),
        capabilities: spec.capabilities.clone(),
        restore_point: spec.restore_point.clone(),
        instances,
    })
}

/// Build the creation descriptor for one instance of `shard`
pub fn instance_request(shard: &ShardSpec, keypair: Option<&str>) -> Result<InstanceRequest> {
    if shard.volume.volume_type.is_some() && shard.volume.size.is_none() {
        return Err(CloudError::Validation(format!(
            "shard {} declares a volume type without a volume size",
            shard.shard_id
        )));
    }

    Ok(InstanceRequest {
        shard_id: shard.shard_id.clone(),
        flavor_id: shard.flavor_id.clone(),
        volume: shard.volume.clone(),
        wal_volume: shard.wal_volume.clone(),
        networks: shard.networks.clone(),
        availability_zone: shard.availability_zone.clone(),
        keypair: keypair.map(str::to_string),
    })
}

/// Build `count` identical descriptors for `shard`
pub fn shard_requests(
    shard: &ShardSpec,
    keypair: Option<&str>,
    count: u32,
) -> Result<Vec<InstanceRequest>> {
    if count < 1 {
        return Err(CloudError::Validation(format!(
            "shard {} must have size >= 1, got {}",
            shard.shard_id, count
        )));
    }
    let request = instance_request(shard, keypair)?;
    Ok(vec![request; count as usize])
}
