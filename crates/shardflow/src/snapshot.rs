//! 取得済みのクラスタ情報 (JSON) を読み取り専用のコントロールプレーンとして扱う

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use shardflow_cloud::{
    AppliedCapability, Capability, CloudError, ClusterAction, ClusterApi, CreateRequest,
    OperationStatus, RemoteCluster,
};
use std::path::Path;

/// スナップショットファイルの中身
#[derive(Debug, Clone, Deserialize)]
pub struct Snapshot {
    #[serde(flatten)]
    pub cluster: RemoteCluster,

    /// 適用済みのケイパビリティ（省略時は宣言どおり適用済みとみなす）
    #[serde(default)]
    pub capabilities: Option<Vec<AppliedCapability>>,
}

impl Snapshot {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("スナップショットを読み込めません: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("スナップショットの解析に失敗しました: {}", path.display()))
    }
}

/// スナップショット1件だけを返すクライアント。変更系の呼び出しはすべて失敗する
pub struct SnapshotClient {
    snapshot: Snapshot,
    declared: Vec<Capability>,
}

impl SnapshotClient {
    pub fn new(snapshot: Snapshot, declared: &[Capability]) -> Self {
        Self {
            snapshot,
            declared: declared.to_vec(),
        }
    }

    fn read_only(&self, call: &str) -> CloudError {
        CloudError::Api(format!(
            "snapshot of cluster {} is read-only ({})",
            self.snapshot.cluster.id, call
        ))
    }
}

#[async_trait]
impl ClusterApi for SnapshotClient {
    async fn create(&self, _request: &CreateRequest) -> shardflow_cloud::Result<String> {
        Err(self.read_only("create"))
    }

    async fn get(&self, cluster_id: &str) -> shardflow_cloud::Result<RemoteCluster> {
        if cluster_id != self.snapshot.cluster.id {
            return Err(CloudError::ClusterNotFound(cluster_id.to_string()));
        }
        Ok(self.snapshot.cluster.clone())
    }

    async fn delete(&self, _cluster_id: &str) -> shardflow_cloud::Result<()> {
        Err(self.read_only("delete"))
    }

    async fn act(&self, _cluster_id: &str, action: &ClusterAction) -> shardflow_cloud::Result<()> {
        Err(self.read_only(action.name()))
    }

    async fn get_capabilities(
        &self,
        cluster_id: &str,
    ) -> shardflow_cloud::Result<Vec<AppliedCapability>> {
        self.get(cluster_id).await?;
        Ok(match &self.snapshot.capabilities {
            Some(applied) => applied.clone(),
            None => self
                .declared
                .iter()
                .map(|c| AppliedCapability {
                    name: c.name.clone(),
                    settings: c.settings.clone(),
                    status: OperationStatus::Active,
                })
                .collect(),
        })
    }
}
