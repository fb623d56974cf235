//! Shared test data

use crate::spec::{ClusterSpec, Datastore, Network, ShardSpec};
use crate::topology::{ClusterInstance, ClusterTopology, InstanceView};

/// One shard "shard-1" of three instances
pub fn sample_spec() -> ClusterSpec {
    ClusterSpec {
        name: "analytics".to_string(),
        datastore: Datastore {
            datastore_type: "clickhouse".to_string(),
            version: "23.8".to_string(),
        },
        floating_ip_enabled: false,
        keypair: Some("ops".to_string()),
        cloud_monitoring_enabled: false,
        disk_autoexpand: None,
        wal_disk_autoexpand: None,
        configuration_id: None,
        capabilities: Vec::new(),
        restore_point: None,
        shards: vec![ShardSpec::new("shard-1", 3, "flavor-s").with_volume(20, "ceph-ssd")],
    }
}

/// Declared order `[shard-b, shard-a]`; shard-b has a WAL volume and a network
pub fn two_shard_spec() -> ClusterSpec {
    let mut shard_b = ShardSpec::new("shard-b", 2, "flavor-m")
        .with_volume(20, "ceph-ssd")
        .with_wal_volume(10, "ceph-ssd");
    shard_b.networks = vec![Network {
        uuid: Some("net-1".to_string()),
        ..Default::default()
    }];

    ClusterSpec {
        shards: vec![
            shard_b,
            ShardSpec::new("shard-a", 3, "flavor-s").with_volume(20, "ceph-ssd"),
        ],
        ..sample_spec()
    }
}

/// Topology from `(instance_id, shard_id)` pairs, in the given order
pub fn topology(instances: &[(&str, &str)]) -> ClusterTopology {
    ClusterTopology::new(
        instances
            .iter()
            .map(|(instance_id, shard_id)| ClusterInstance::new(*instance_id, *shard_id))
            .collect(),
    )
}

/// Record `instance_ids` as the last-observed members of `shard_id`
pub fn with_instances(mut spec: ClusterSpec, shard_id: &str, instance_ids: &[&str]) -> ClusterSpec {
    if let Some(shard) = spec.shards.iter_mut().find(|s| s.shard_id == shard_id) {
        shard.instances = instance_ids
            .iter()
            .map(|id| InstanceView {
                instance_id: id.to_string(),
                ips: Vec::new(),
            })
            .collect();
    }
    spec
}
