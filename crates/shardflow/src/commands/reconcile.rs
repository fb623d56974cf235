use crate::snapshot::{Snapshot, SnapshotClient};
use crate::utils;
use colored::Colorize;
use shardflow_cloud::{ClusterOperator, ClusterState, StateManager};
use shardflow_config::Settings;
use std::path::Path;
use std::sync::Arc;

/// コントロールプレーンから取得したクラスタ情報を記録済みの状態に反映する
pub async fn handle(
    project_root: &Path,
    settings: &Settings,
    spec_path: &Path,
    cluster_id: &str,
    snapshot_path: &Path,
) -> anyhow::Result<()> {
    let declared = utils::load_spec(spec_path)?;
    let snapshot = Snapshot::load(snapshot_path)?;

    if snapshot.cluster.id != cluster_id {
        anyhow::bail!(
            "スナップショットのクラスタID {} が指定された {} と一致しません",
            snapshot.cluster.id,
            cluster_id
        );
    }

    let client = Arc::new(SnapshotClient::new(snapshot, &declared.capabilities));
    let operator = ClusterOperator::new(utils::operator_context(settings, client));

    let manager = StateManager::new(project_root);
    let lock = manager.acquire_lock().await?;
    let mut state = manager.load().await?;

    // 宣言どおりのシャード順・ボリューム種別を基準にして読み直す
    let baseline = match state.find_by_id(cluster_id) {
        Some(existing) => existing.refreshed(declared.clone(), existing.status.clone()),
        None => ClusterState::new(cluster_id, &operator.context().region, declared.clone()),
    };
    let record = operator
        .read(&baseline)
        .await?
        .ok_or_else(|| anyhow::anyhow!("クラスタ {} が見つかりません", cluster_id))?;

    // 名前が変わった場合に古いエントリを残さない
    let stale: Vec<String> = state
        .clusters
        .iter()
        .filter(|(name, c)| c.id == cluster_id && **name != record.spec.name)
        .map(|(name, _)| name.clone())
        .collect();
    for name in stale {
        state.remove_cluster(&name);
    }

    println!(
        "{} {} ({}): {}",
        "✓".green().bold(),
        record.spec.name.cyan(),
        cluster_id,
        record.status
    );
    for shard in &record.spec.shards {
        println!(
            "    - {} ({}台: {})",
            shard.shard_id.cyan(),
            shard.size,
            shard.instance_ids().join(", ")
        );
    }

    state.set_cluster(record);
    manager.save(&state).await?;
    lock.release().await?;
    Ok(())
}
