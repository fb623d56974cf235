//! Remote truth: cluster status and instance topology as reported by the control plane

use serde::{Deserialize, Serialize};

/// Lifecycle status of a cluster or of a long-running remote operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OperationStatus {
    /// Being created or busy applying an action
    Building,
    /// Idle and ready for the next action
    Active,
    /// Delete in progress
    Deleting,
    /// Gone
    Deleted,
    /// Failed; never resolves on its own
    Error,
    /// Anything else the control plane reports
    Other(String),
}

impl OperationStatus {
    /// Parse a status string as reported by the control plane
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "BUILD" | "BUILDING" | "BACKUP" | "RESIZE" | "RESTART_REQUIRED" | "GROWING"
            | "SHRINKING" => OperationStatus::Building,
            "ACTIVE" | "HEALTHY" => OperationStatus::Active,
            "DELETING" | "SHUTDOWN" => OperationStatus::Deleting,
            "DELETED" => OperationStatus::Deleted,
            "ERROR" | "FAILED" => OperationStatus::Error,
            _ => OperationStatus::Other(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            OperationStatus::Building => "building",
            OperationStatus::Active => "active",
            OperationStatus::Deleting => "deleting",
            OperationStatus::Deleted => "deleted",
            OperationStatus::Error => "error",
            OperationStatus::Other(raw) => raw,
        }
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<String> for OperationStatus {
    fn from(raw: String) -> Self {
        OperationStatus::parse(&raw)
    }
}

impl From<OperationStatus> for String {
    fn from(status: OperationStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Role of an instance inside its shard, as reported by the control plane
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceRole {
    Leader,
    Replica,
    #[default]
    #[serde(other)]
    Unknown,
}

/// One instance of the cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterInstance {
    pub instance_id: String,
    pub shard_id: String,
    #[serde(default)]
    pub ips: Vec<String>,
    #[serde(default)]
    pub role: InstanceRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wal_volume_size: Option<u32>,
}

impl ClusterInstance {
    pub fn new(instance_id: impl Into<String>, shard_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            shard_id: shard_id.into(),
            ips: Vec::new(),
            role: InstanceRole::Unknown,
            flavor_id: None,
            volume_size: None,
            wal_volume_size: None,
        }
    }

    pub fn with_role(mut self, role: InstanceRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ips.push(ip.into());
        self
    }

    pub fn is_leader(&self) -> bool {
        self.role == InstanceRole::Leader
    }
}

/// Instance list of a cluster, in the order the control plane returned it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterTopology {
    pub instances: Vec<ClusterInstance>,
}

impl ClusterTopology {
    pub fn new(instances: Vec<ClusterInstance>) -> Self {
        Self { instances }
    }

    /// Instances of one shard, in remote order
    pub fn shard_instances<'a>(
        &'a self,
        shard_id: &'a str,
    ) -> impl Iterator<Item = &'a ClusterInstance> + 'a {
        self.instances.iter().filter(move |i| i.shard_id == shard_id)
    }

    pub fn contains_shard(&self, shard_id: &str) -> bool {
        self.instances.iter().any(|i| i.shard_id == shard_id)
    }
}

/// Instance identity as persisted with a shard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceView {
    pub instance_id: String,
    #[serde(default)]
    pub ips: Vec<String>,
}

impl From<&ClusterInstance> for InstanceView {
    fn from(instance: &ClusterInstance) -> Self {
        Self {
            instance_id: instance.instance_id.clone(),
            ips: instance.ips.clone(),
        }
    }
}
