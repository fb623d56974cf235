//! Desired-state model for a sharded cluster
//!
//! A `ClusterSpec` is what the user declares. The same type, with each shard's
//! `instances` filled in from the last reconcile, is what gets persisted as the
//! last-known state and fed back as `previous` into the next plan.

use crate::error::{CloudError, Result};
use crate::topology::InstanceView;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Volume type recorded for shards that were discovered remotely and never declared.
///
/// The control plane does not report volume types, so imported shards carry this
/// marker until the user declares the real value.
pub const IMPORTED_VOLUME_TYPE: &str = "imported";

/// Declared configuration of a sharded cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSpec {
    /// Cluster name (immutable)
    pub name: String,

    /// Datastore type and version (immutable)
    pub datastore: Datastore,

    /// Whether a floating IP is allocated (immutable)
    #[serde(default)]
    pub floating_ip_enabled: bool,

    /// Keypair shared by every instance (immutable)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keypair: Option<String>,

    /// Cloud monitoring toggle
    #[serde(default)]
    pub cloud_monitoring_enabled: bool,

    /// Data volume autoresize
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_autoexpand: Option<AutoExpand>,

    /// WAL volume autoresize
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wal_disk_autoexpand: Option<AutoExpand>,

    /// Attached configuration group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration_id: Option<String>,

    /// Capabilities applied to the cluster, in declared order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<Capability>,

    /// Backup to restore from at creation (immutable)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_point: Option<RestorePoint>,

    /// Shards in user-declared order
    pub shards: Vec<ShardSpec>,
}

impl ClusterSpec {
    /// Look up a shard by id
    pub fn shard(&self, shard_id: &str) -> Option<&ShardSpec> {
        self.shards.iter().find(|s| s.shard_id == shard_id)
    }

    /// Shard ids in declared order
    pub fn shard_order(&self) -> Vec<String> {
        self.shards.iter().map(|s| s.shard_id.clone()).collect()
    }

    /// Total number of instances across all shards
    pub fn total_instances(&self) -> u32 {
        self.shards.iter().map(|s| s.size).sum()
    }

    /// Check the cross-field invariants the schema layer cannot express
    pub fn validate(&self) -> Result<()> {
        if self.datastore.datastore_type.trim().is_empty() {
            return Err(CloudError::Validation(
                "datastore type must be set".to_string(),
            ));
        }

        if self.shards.is_empty() {
            return Err(CloudError::Validation(format!(
                "cluster {} must declare at least one shard",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for shard in &self.shards {
            shard.validate()?;
            if !seen.insert(shard.shard_id.as_str()) {
                return Err(CloudError::Validation(format!(
                    "shard id {} is declared more than once",
                    shard.shard_id
                )));
            }
        }

        Ok(())
    }
}

/// Datastore identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datastore {
    #[serde(rename = "type")]
    pub datastore_type: String,
    pub version: String,
}

/// Autoresize settings for a volume class
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoExpand {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_disk_size: Option<u32>,
}

impl AutoExpand {
    pub fn disabled() -> Self {
        Self::default()
    }
}

/// Capability applied to the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub settings: BTreeMap<String, String>,
}

impl Capability {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: BTreeMap::new(),
        }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestorePoint {
    pub backup_id: String,
}

/// Declared configuration of one shard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardSpec {
    /// Stable shard identity (immutable)
    pub shard_id: String,

    /// Desired number of instances
    pub size: u32,

    pub flavor_id: String,

    pub volume: Volume,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wal_volume: Option<WalVolume>,

    /// Network bindings (immutable)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<Network>,

    /// Availability zone (immutable)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,

    /// Instance ids to remove when `size` decreases.
    ///
    /// Only consulted while shrinking and never persisted.
    #[serde(default, skip_serializing)]
    pub shrink_options: Option<Vec<String>>,

    /// Instances observed at the last reconcile
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instances: Vec<InstanceView>,
}

impl ShardSpec {
    pub fn new(shard_id: impl Into<String>, size: u32, flavor_id: impl Into<String>) -> Self {
        Self {
            shard_id: shard_id.into(),
            size,
            flavor_id: flavor_id.into(),
            volume: Volume::default(),
            wal_volume: None,
            networks: Vec::new(),
            availability_zone: None,
            shrink_options: None,
            instances: Vec::new(),
        }
    }

    pub fn with_volume(mut self, size: u32, volume_type: impl Into<String>) -> Self {
        self.volume = Volume {
            size: Some(size),
            volume_type: Some(volume_type.into()),
        };
        self
    }

    pub fn with_wal_volume(mut self, size: u32, volume_type: impl Into<String>) -> Self {
        self.wal_volume = Some(WalVolume {
            size,
            volume_type: volume_type.into(),
        });
        self
    }

    /// Instance ids observed at the last reconcile
    pub fn instance_ids(&self) -> Vec<&str> {
        self.instances.iter().map(|i| i.instance_id.as_str()).collect()
    }

    fn validate(&self) -> Result<()> {
        if self.shard_id.trim().is_empty() {
            return Err(CloudError::Validation(
                "shard id must not be empty".to_string(),
            ));
        }
        if self.size < 1 {
            return Err(CloudError::Validation(format!(
                "shard {} must have size >= 1, got {}",
                self.shard_id, self.size
            )));
        }
        if self.volume.volume_type.is_some() && self.volume.size.is_none() {
            return Err(CloudError::Validation(format!(
                "shard {} declares a volume type without a volume size",
                self.shard_id
            )));
        }
        if let Some(wal) = &self.wal_volume {
            if wal.size == 0 {
                return Err(CloudError::Validation(format!(
                    "shard {} declares a wal volume of size 0",
                    self.shard_id
                )));
            }
        }
        Ok(())
    }
}

/// Data volume of every instance in a shard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<String>,
}

/// WAL volume of every instance in a shard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalVolume {
    pub size: u32,
    pub volume_type: String,
}

/// Network binding of a shard's instances
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub security_groups: BTreeSet<String>,
}
