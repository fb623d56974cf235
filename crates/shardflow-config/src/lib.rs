pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 設定ファイルのパスを直接指定する環境変数
pub const CONFIG_PATH_ENV: &str = "SHARDFLOW_CONFIG_PATH";

/// リージョンを上書きする環境変数
pub const REGION_ENV: &str = "SHARDFLOW_REGION";

const CANDIDATES: [&str; 4] = [
    "shardflow.local.yaml",
    ".shardflow.local.yaml",
    "shardflow.yaml",
    ".shardflow.yaml",
];

/// shardflow の設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// 操作対象のリージョン
    pub region: String,

    /// 操作種別ごとのタイムアウト
    pub timeouts: TimeoutSettings,

    /// ステータスポーリングの間隔
    pub poll: PollSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            region: "RegionOne".to_string(),
            timeouts: TimeoutSettings::default(),
            poll: PollSettings::default(),
        }
    }
}

/// タイムアウト（秒）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub create: u64,
    pub delete: u64,
    /// アクション1つごとに適用される
    pub update: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            create: 1800,
            delete: 1800,
            update: 1800,
        }
    }
}

impl TimeoutSettings {
    pub fn create(&self) -> Duration {
        Duration::from_secs(self.create)
    }

    pub fn delete(&self) -> Duration {
        Duration::from_secs(self.delete)
    }

    pub fn update(&self) -> Duration {
        Duration::from_secs(self.update)
    }
}

/// ポーリング設定（秒）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    /// 初回ポーリングまでの待機
    pub delay: u64,
    pub min_interval: u64,
    pub max_interval: u64,
    /// 待機のたびに間隔に掛ける倍率
    pub multiplier: f64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            delay: 10,
            min_interval: 3,
            max_interval: 10,
            multiplier: 2.0,
        }
    }
}

impl PollSettings {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_secs(self.max_interval)
    }
}

impl Settings {
    /// 環境変数による上書きを適用
    pub fn apply_env(mut self) -> Self {
        if let Ok(region) = std::env::var(REGION_ENV) {
            if !region.trim().is_empty() {
                self.region = region;
            }
        }
        self
    }

    /// 値の整合性を検証
    pub fn validate(&self) -> Result<()> {
        if self.region.trim().is_empty() {
            return Err(ConfigError::Invalid("region が空です".to_string()));
        }

        let timeouts = [
            ("timeouts.create", self.timeouts.create),
            ("timeouts.delete", self.timeouts.delete),
            ("timeouts.update", self.timeouts.update),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} は 1 以上にしてください", name)));
            }
        }

        if self.poll.min_interval == 0 || self.poll.max_interval == 0 {
            return Err(ConfigError::Invalid(
                "poll.min_interval と poll.max_interval は 1 以上にしてください".to_string(),
            ));
        }
        if self.poll.min_interval > self.poll.max_interval {
            return Err(ConfigError::Invalid(format!(
                "poll.min_interval ({}) が poll.max_interval ({}) を超えています",
                self.poll.min_interval, self.poll.max_interval
            )));
        }
        if self.poll.multiplier.is_nan() || self.poll.multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "poll.multiplier は 1.0 以上にしてください: {}",
                self.poll.multiplier
            )));
        }

        Ok(())
    }
}

/// グローバル設定ファイルのパス (~/.config/shardflow/config.yaml)
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("shardflow").join("config.yaml"))
}

/// 設定ファイルを探す
///
/// 以下の優先順位で設定ファイルを検索:
/// 1. 環境変数 SHARDFLOW_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ: shardflow.local.yaml, .shardflow.local.yaml, shardflow.yaml, .shardflow.yaml
/// 3. ./.shardflow/ ディレクトリ内: 同様の順序
/// 4. ~/.config/shardflow/config.yaml (グローバル設定)
pub fn find_config_file() -> Result<PathBuf> {
    // 1. 環境変数で直接指定
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;

    // 2. カレントディレクトリで検索
    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    // 3. ./.shardflow/ ディレクトリで検索
    let shardflow_dir = current_dir.join(".shardflow");
    if shardflow_dir.is_dir() {
        for filename in &CANDIDATES {
            let path = shardflow_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    // 4. グローバル設定ファイル
    if let Some(global_config) = global_config_path() {
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// 指定したファイルから設定を読み込む
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)?;
    let settings: Settings = if content.trim().is_empty() {
        Settings::default()
    } else {
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?
    };

    let settings = settings.apply_env();
    settings.validate()?;
    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// 設定を読み込む。設定ファイルが無ければデフォルト値を使う
pub fn load_settings() -> Result<Settings> {
    match find_config_file() {
        Ok(path) => load_settings_from(&path),
        Err(ConfigError::ConfigFileNotFound) => {
            tracing::debug!("No settings file found, using defaults");
            let settings = Settings::default().apply_env();
            settings.validate()?;
            Ok(settings)
        }
        Err(e) => Err(e),
    }
}
