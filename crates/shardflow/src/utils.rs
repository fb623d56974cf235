use anyhow::Context;
use shardflow_cloud::{ClusterApi, ClusterSpec, OperatorContext, PollPolicy, Timeouts};
use shardflow_config::Settings;
use std::path::Path;
use std::sync::Arc;

/// クラスタ定義 (YAML) を読み込んで検証
pub fn load_spec(path: &Path) -> anyhow::Result<ClusterSpec> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("クラスタ定義を読み込めません: {}", path.display()))?;
    let spec: ClusterSpec = serde_yaml::from_str(&content)
        .with_context(|| format!("クラスタ定義の解析に失敗しました: {}", path.display()))?;
    spec.validate()?;
    tracing::debug!("Loaded cluster spec {} from {}", spec.name, path.display());
    Ok(spec)
}

/// 設定からリージョン・タイムアウト・ポーリング間隔を引き継いだコンテキストを作る
pub fn operator_context(settings: &Settings, client: Arc<dyn ClusterApi>) -> OperatorContext {
    let timeouts = Timeouts {
        create: settings.timeouts.create(),
        delete: settings.timeouts.delete(),
        update: settings.timeouts.update(),
    };
    let poll = PollPolicy {
        delay: settings.poll.delay(),
        min_interval: settings.poll.min_interval(),
        max_interval: settings.poll.max_interval(),
        backoff_multiplier: settings.poll.multiplier,
    };

    OperatorContext::new(client, settings.region.clone())
        .with_timeouts(timeouts)
        .with_poll_policy(poll)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{Snapshot, SnapshotClient};
    use std::time::Duration;

    #[test]
    fn test_operator_context_follows_settings() {
        let mut settings = Settings::default();
        settings.region = "RegionTwo".to_string();
        settings.timeouts.update = 42;
        settings.poll.delay = 1;
        settings.poll.max_interval = 60;
        settings.poll.multiplier = 3.0;

        let snapshot: Snapshot =
            serde_json::from_str(r#"{ "id": "c-1", "name": "events", "status": "ACTIVE" }"#)
                .unwrap();
        let ctx = operator_context(&settings, Arc::new(SnapshotClient::new(snapshot, &[])));

        assert_eq!(ctx.region, "RegionTwo");
        assert_eq!(ctx.timeouts.create, Duration::from_secs(1800));
        assert_eq!(ctx.timeouts.update, Duration::from_secs(42));
        assert_eq!(ctx.poll.delay, Duration::from_secs(1));
        assert_eq!(ctx.poll.min_interval, Duration::from_secs(3));
        assert_eq!(ctx.poll.max_interval, Duration::from_secs(60));
        assert_eq!(ctx.poll.backoff_multiplier, 3.0);
    }
}
