use async_trait::async_trait;
use shardflow_cloud::{
    AppliedCapability, Capability, CloudError, ClusterAction, ClusterApi, ClusterInstance,
    ClusterOperator, ClusterSpec, ClusterTopology, CreateRequest, Datastore, InstanceRole,
    OperationStatus, OperatorContext, RemoteCluster, Result, ShardSpec,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// In-memory control plane.
///
/// Every create and action leaves the cluster busy for `busy_polls` reads
/// before it reports Active again. Grow and shrink really change membership,
/// so a read after an update sees the new topology.
#[derive(Default)]
pub struct FakeControlPlane {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    clusters: BTreeMap<String, FakeCluster>,
    next_cluster: u32,
    next_instance: u32,
    busy_polls: u32,
    creates: Vec<CreateRequest>,
    acts: Vec<ClusterAction>,
    fail_on: Option<&'static str>,
    capability_status: Option<OperationStatus>,
}

struct FakeCluster {
    remote: RemoteCluster,
    capabilities: Vec<AppliedCapability>,
    busy: u32,
    deleting: bool,
}

impl FakeControlPlane {
    pub fn new() -> Arc<Self> {
        let plane = Self::default();
        plane.inner.lock().unwrap().busy_polls = 1;
        Arc::new(plane)
    }

    /// Keep clusters busy for `polls` reads after every call
    #[allow(dead_code)]
    pub fn set_busy_polls(&self, polls: u32) {
        self.inner.lock().unwrap().busy_polls = polls;
    }

    /// Make the named action call fail with an API error
    #[allow(dead_code)]
    pub fn fail_on(&self, action: &'static str) {
        self.inner.lock().unwrap().fail_on = Some(action);
    }

    /// Report every capability applied from now on with `status`
    #[allow(dead_code)]
    pub fn report_capabilities_as(&self, status: OperationStatus) {
        self.inner.lock().unwrap().capability_status = Some(status);
    }

    /// Force the reported status of a cluster
    #[allow(dead_code)]
    pub fn set_status(&self, cluster_id: &str, status: OperationStatus) {
        let mut inner = self.inner.lock().unwrap();
        let cluster = inner.clusters.get_mut(cluster_id).unwrap();
        cluster.remote.status = status;
        cluster.busy = 0;
    }

    /// Remove a cluster behind the operator's back
    #[allow(dead_code)]
    pub fn forget(&self, cluster_id: &str) {
        self.inner.lock().unwrap().clusters.remove(cluster_id);
    }

    /// Action calls received so far, including failed ones
    pub fn acts(&self) -> Vec<ClusterAction> {
        self.inner.lock().unwrap().acts.clone()
    }

    pub fn act_names(&self) -> Vec<&'static str> {
        self.acts().iter().map(ClusterAction::name).collect()
    }

    #[allow(dead_code)]
    pub fn creates(&self) -> Vec<CreateRequest> {
        self.inner.lock().unwrap().creates.clone()
    }

    /// Current instance list of a cluster
    #[allow(dead_code)]
    pub fn instances(&self, cluster_id: &str) -> Vec<ClusterInstance> {
        self.inner.lock().unwrap().clusters[cluster_id]
            .remote
            .topology
            .instances
            .clone()
    }

    /// Register an existing cluster directly, bypassing `create`
    #[allow(dead_code)]
    pub fn seed(&self, name: &str, topology: ClusterTopology) -> String {
        let mut inner = self.inner.lock().unwrap();
        inner.next_cluster += 1;
        let id = format!("cluster-{}", inner.next_cluster);
        inner.clusters.insert(
            id.clone(),
            FakeCluster {
                remote: RemoteCluster {
                    id: id.clone(),
                    name: name.to_string(),
                    status: OperationStatus::Active,
                    datastore: Some(datastore()),
                    configuration_id: None,
                    disk_autoexpand: None,
                    wal_disk_autoexpand: None,
                    cloud_monitoring_enabled: Some(false),
                    topology,
                },
                capabilities: Vec::new(),
                busy: 0,
                deleting: false,
            },
        );
        id
    }
}

impl Inner {
    fn new_instance(
        &mut self,
        shard_id: &str,
        role: InstanceRole,
        flavor_id: &str,
        volume: Option<u32>,
    ) -> ClusterInstance {
        self.next_instance += 1;
        let mut instance = ClusterInstance::new(format!("inst-{}", self.next_instance), shard_id)
            .with_role(role)
            .with_ip(format!("10.0.0.{}", self.next_instance));
        instance.flavor_id = Some(flavor_id.to_string());
        instance.volume_size = volume;
        instance
    }

    fn cluster(&mut self, cluster_id: &str) -> Result<&mut FakeCluster> {
        self.clusters
            .get_mut(cluster_id)
            .ok_or_else(|| CloudError::ClusterNotFound(cluster_id.to_string()))
    }
}

#[async_trait]
impl ClusterApi for FakeControlPlane {
    async fn create(&self, request: &CreateRequest) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();
        inner.creates.push(request.clone());
        inner.next_cluster += 1;
        let id = format!("cluster-{}", inner.next_cluster);

        let mut instances = Vec::with_capacity(request.instances.len());
        for req in &request.instances {
            let role = if instances.iter().any(|i: &ClusterInstance| i.shard_id == req.shard_id) {
                InstanceRole::Replica
            } else {
                InstanceRole::Leader
            };
            let mut instance =
                inner.new_instance(&req.shard_id, role, &req.flavor_id, req.volume.size);
            instance.wal_volume_size = req.wal_volume.as_ref().map(|wal| wal.size);
            instances.push(instance);
        }

        let busy = inner.busy_polls;
        inner.clusters.insert(
            id.clone(),
            FakeCluster {
                remote: RemoteCluster {
                    id: id.clone(),
                    name: request.name.clone(),
                    status: OperationStatus::Active,
                    datastore: Some(request.datastore.clone()),
                    configuration_id: None,
                    disk_autoexpand: request.disk_autoexpand.clone(),
                    wal_disk_autoexpand: request.wal_disk_autoexpand.clone(),
                    cloud_monitoring_enabled: Some(request.cloud_monitoring_enabled),
                    topology: ClusterTopology::new(instances),
                },
                capabilities: applied(&request.capabilities),
                busy,
                deleting: false,
            },
        );
        Ok(id)
    }

    async fn get(&self, cluster_id: &str) -> Result<RemoteCluster> {
        let mut inner = self.inner.lock().unwrap();
        let cluster = inner.cluster(cluster_id)?;

        if cluster.busy > 0 {
            cluster.busy -= 1;
            let mut remote = cluster.remote.clone();
            remote.status = if cluster.deleting {
                OperationStatus::Deleting
            } else {
                OperationStatus::Building
            };
            return Ok(remote);
        }

        if cluster.deleting {
            inner.clusters.remove(cluster_id);
            return Err(CloudError::ClusterNotFound(cluster_id.to_string()));
        }

        Ok(cluster.remote.clone())
    }

    async fn delete(&self, cluster_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let busy = inner.busy_polls;
        let cluster = inner.cluster(cluster_id)?;
        cluster.deleting = true;
        cluster.busy = busy;
        Ok(())
    }

    async fn act(&self, cluster_id: &str, action: &ClusterAction) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.acts.push(action.clone());
        if inner.fail_on == Some(action.name()) {
            return Err(CloudError::Api(format!("{} rejected", action.name())));
        }

        let busy = inner.busy_polls;
        let capability_status = inner.capability_status.clone();
        let mut added = Vec::new();
        if let ClusterAction::Grow { instances } = action {
            for req in instances {
                let mut instance = inner.new_instance(
                    &req.shard_id,
                    InstanceRole::Replica,
                    &req.flavor_id,
                    req.volume.size,
                );
                instance.wal_volume_size = req.wal_volume.as_ref().map(|wal| wal.size);
                added.push(instance);
            }
        }

        let cluster = inner.cluster(cluster_id)?;
        let remote = &mut cluster.remote;
        match action {
            ClusterAction::AttachConfiguration { configuration_id } => {
                remote.configuration_id = Some(configuration_id.clone());
            }
            ClusterAction::DetachConfiguration { .. } => remote.configuration_id = None,
            ClusterAction::UpdateAutoexpand { autoexpand } => {
                remote.disk_autoexpand = Some(autoexpand.clone());
            }
            ClusterAction::UpdateWalAutoexpand { autoexpand } => {
                remote.wal_disk_autoexpand = Some(autoexpand.clone());
            }
            ClusterAction::ApplyCapabilities { capabilities } => {
                cluster.capabilities = applied(capabilities);
                if let Some(status) = capability_status {
                    for capability in &mut cluster.capabilities {
                        capability.status = status.clone();
                    }
                }
            }
            ClusterAction::UpdateCloudMonitoring { enabled } => {
                remote.cloud_monitoring_enabled = Some(*enabled);
            }
            ClusterAction::ResizeVolume { shard_id, size } => {
                for i in remote.topology.instances.iter_mut().filter(|i| &i.shard_id == shard_id) {
                    i.volume_size = Some(*size);
                }
            }
            ClusterAction::ResizeWalVolume { shard_id, size } => {
                for i in remote.topology.instances.iter_mut().filter(|i| &i.shard_id == shard_id) {
                    i.wal_volume_size = Some(*size);
                }
            }
            ClusterAction::ResizeFlavor { shard_id, flavor_id } => {
                for i in remote.topology.instances.iter_mut().filter(|i| &i.shard_id == shard_id) {
                    i.flavor_id = Some(flavor_id.clone());
                }
            }
            ClusterAction::Grow { .. } => remote.topology.instances.extend(added),
            ClusterAction::Shrink { instance_ids } => {
                remote
                    .topology
                    .instances
                    .retain(|i| !instance_ids.contains(&i.instance_id));
            }
        }
        cluster.busy = busy;
        Ok(())
    }

    async fn get_capabilities(&self, cluster_id: &str) -> Result<Vec<AppliedCapability>> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.cluster(cluster_id)?.capabilities.clone())
    }
}

fn applied(capabilities: &[Capability]) -> Vec<AppliedCapability> {
    capabilities
        .iter()
        .map(|c| AppliedCapability {
            name: c.name.clone(),
            settings: c.settings.clone(),
            status: OperationStatus::Active,
        })
        .collect()
}

pub fn datastore() -> Datastore {
    Datastore {
        datastore_type: "clickhouse".to_string(),
        version: "23.8".to_string(),
    }
}

/// Operator over `plane` with default timeouts and poll policy
pub fn operator(plane: &Arc<FakeControlPlane>) -> ClusterOperator {
    ClusterOperator::new(OperatorContext::new(plane.clone(), "RegionOne"))
}

/// One shard "X" of three instances
pub fn single_shard_spec() -> ClusterSpec {
    ClusterSpec {
        name: "events".to_string(),
        datastore: datastore(),
        floating_ip_enabled: false,
        keypair: None,
        cloud_monitoring_enabled: false,
        disk_autoexpand: None,
        wal_disk_autoexpand: None,
        configuration_id: None,
        capabilities: Vec::new(),
        restore_point: None,
        shards: vec![ShardSpec::new("X", 3, "flavor-s").with_volume(20, "ssd")],
    }
}

/// Shards declared as `[B, A]`
#[allow(dead_code)]
pub fn two_shard_spec() -> ClusterSpec {
    ClusterSpec {
        shards: vec![
            ShardSpec::new("B", 1, "flavor-s").with_volume(20, "ssd"),
            ShardSpec::new("A", 2, "flavor-s").with_volume(20, "ssd"),
        ],
        ..single_shard_spec()
    }
}
