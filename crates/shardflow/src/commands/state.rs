use colored::Colorize;
use shardflow_cloud::StateManager;
use std::path::Path;

pub async fn handle_list(project_root: &Path) -> anyhow::Result<()> {
    let state = StateManager::new(project_root).load().await?;

    if state.clusters.is_empty() {
        println!("記録済みのクラスタはありません");
        return Ok(());
    }

    for (name, cluster) in &state.clusters {
        println!(
            "{}  {}  {}  {}シャード / {}台  ({})",
            name.cyan(),
            cluster.id,
            cluster.region,
            cluster.spec.shards.len(),
            cluster.spec.total_instances(),
            cluster.status
        );
    }
    Ok(())
}

pub async fn handle_show(project_root: &Path, name: &str) -> anyhow::Result<()> {
    let state = StateManager::new(project_root).load().await?;
    let Some(cluster) = state.get_cluster(name) else {
        anyhow::bail!("クラスタ {} の記録が見つかりません", name);
    };

    println!("{}", serde_json::to_string_pretty(cluster)?);
    Ok(())
}

pub async fn handle_rm(project_root: &Path, name: &str) -> anyhow::Result<()> {
    let manager = StateManager::new(project_root);
    let lock = manager.acquire_lock().await?;
    let mut state = manager.load().await?;

    match state.remove_cluster(name) {
        Some(removed) => {
            manager.save(&state).await?;
            println!(
                "{} {} ({}) の記録を削除しました",
                "✓".green().bold(),
                name.cyan(),
                removed.id
            );
        }
        None => {
            lock.release().await?;
            anyhow::bail!("クラスタ {} の記録が見つかりません", name);
        }
    }

    lock.release().await?;
    Ok(())
}
