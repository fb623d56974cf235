//! Remote control-plane client boundary
//!
//! The transport (authentication, HTTP, wire schema) lives outside this crate.
//! Everything the lifecycle logic needs from the control plane goes through
//! `ClusterApi`.

use crate::error::Result;
use crate::spec::{AutoExpand, Capability, Datastore};
use crate::topology::{ClusterTopology, OperationStatus};
use crate::translate::{CreateRequest, InstanceRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Control-plane operations on sharded clusters
///
/// All calls are request/response; completion of long-running work is only
/// observable through later `get` calls.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Submit a creation request, returning the new cluster id
    async fn create(&self, request: &CreateRequest) -> Result<String>;

    /// Read status, topology and cluster-level attributes.
    ///
    /// Returns `CloudError::ClusterNotFound` when the cluster does not exist.
    async fn get(&self, cluster_id: &str) -> Result<RemoteCluster>;

    /// Submit deletion
    async fn delete(&self, cluster_id: &str) -> Result<()>;

    /// Submit an update action
    async fn act(&self, cluster_id: &str, action: &ClusterAction) -> Result<()>;

    /// Capabilities applied to the cluster with their status
    async fn get_capabilities(&self, cluster_id: &str) -> Result<Vec<AppliedCapability>>;
}

/// A cluster as reported by the control plane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCluster {
    pub id: String,
    pub name: String,
    pub status: OperationStatus,
    #[serde(default)]
    pub datastore: Option<Datastore>,
    #[serde(default)]
    pub configuration_id: Option<String>,
    #[serde(default)]
    pub disk_autoexpand: Option<AutoExpand>,
    #[serde(default)]
    pub wal_disk_autoexpand: Option<AutoExpand>,
    #[serde(default)]
    pub cloud_monitoring_enabled: Option<bool>,
    #[serde(default)]
    pub topology: ClusterTopology,
}

/// A capability with its remote status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedCapability {
    pub name: String,
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
    pub status: OperationStatus,
}

impl From<&AppliedCapability> for Capability {
    fn from(applied: &AppliedCapability) -> Self {
        Capability {
            name: applied.name.clone(),
            settings: applied.settings.clone(),
        }
    }
}

/// Payload of a single control-plane action call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClusterAction {
    AttachConfiguration { configuration_id: String },
    DetachConfiguration { configuration_id: String },
    UpdateAutoexpand { autoexpand: AutoExpand },
    UpdateWalAutoexpand { autoexpand: AutoExpand },
    ApplyCapabilities { capabilities: Vec<Capability> },
    UpdateCloudMonitoring { enabled: bool },
    ResizeVolume { shard_id: String, size: u32 },
    ResizeWalVolume { shard_id: String, size: u32 },
    ResizeFlavor { shard_id: String, flavor_id: String },
    Grow { instances: Vec<InstanceRequest> },
    Shrink { instance_ids: Vec<String> },
}

impl ClusterAction {
    pub fn name(&self) -> &'static str {
        match self {
            ClusterAction::AttachConfiguration { .. } => "attach_configuration",
            ClusterAction::DetachConfiguration { .. } => "detach_configuration",
            ClusterAction::UpdateAutoexpand { .. } => "update_autoexpand",
            ClusterAction::UpdateWalAutoexpand { .. } => "update_wal_autoexpand",
            ClusterAction::ApplyCapabilities { .. } => "apply_capabilities",
            ClusterAction::UpdateCloudMonitoring { .. } => "update_cloud_monitoring",
            ClusterAction::ResizeVolume { .. } => "resize_volume",
            ClusterAction::ResizeWalVolume { .. } => "resize_wal_volume",
            ClusterAction::ResizeFlavor { .. } => "resize_flavor",
            ClusterAction::Grow { .. } => "grow",
            ClusterAction::Shrink { .. } => "shrink",
        }
    }
}
