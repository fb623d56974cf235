mod commands;
mod snapshot;
mod utils;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "shardflow")]
#[command(about = "シャード構成のマネージドDBクラスタを宣言どおりに保つ", long_about = None)]
struct Cli {
    /// デバッグログを出力
    #[arg(short, long, global = true)]
    verbose: bool,

    /// プロジェクトルート（.shardflow/state.json の置き場所）
    #[arg(short = 'C', long, global = true, env = "SHARDFLOW_PROJECT")]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// クラスタ定義を検証
    Validate {
        /// クラスタ定義ファイル (YAML)
        spec: PathBuf,
    },
    /// 記録済みの状態に対する更新計画を表示
    Plan {
        /// クラスタ定義ファイル (YAML)
        spec: PathBuf,
    },
    /// 取得済みのトポロジーを状態に反映
    Reconcile {
        /// クラスタ定義ファイル (YAML)
        spec: PathBuf,
        /// リモートのクラスタID
        #[arg(long)]
        cluster_id: String,
        /// コントロールプレーンから取得したクラスタ情報 (JSON)
        #[arg(long)]
        snapshot: PathBuf,
    },
    /// 記録済みの状態を操作
    State {
        #[command(subcommand)]
        command: StateCommands,
    },
    /// バージョン情報を表示
    Version,
}

#[derive(Subcommand)]
enum StateCommands {
    /// 記録済みのクラスタ一覧
    List,
    /// クラスタの記録を表示
    Show {
        /// クラスタ名
        name: String,
    },
    /// クラスタの記録を削除（リモートのクラスタには触れない）
    Rm {
        /// クラスタ名
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ログはstderrに出力
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let project_root = match cli.project {
        Some(path) => path,
        None => std::env::current_dir()?,
    };

    // コマンドディスパッチ
    match cli.command {
        Commands::Validate { spec } => {
            commands::validate::handle(&spec)?;
        }
        Commands::Plan { spec } => {
            commands::plan::handle(&project_root, &spec).await?;
        }
        Commands::Reconcile {
            spec,
            cluster_id,
            snapshot,
        } => {
            let settings = shardflow_config::load_settings()?;
            tracing::debug!("Settings: {:?}", settings);
            commands::reconcile::handle(&project_root, &settings, &spec, &cluster_id, &snapshot)
                .await?;
        }
        Commands::State { command } => match command {
            StateCommands::List => commands::state::handle_list(&project_root).await?,
            StateCommands::Show { name } => {
                commands::state::handle_show(&project_root, &name).await?
            }
            StateCommands::Rm { name } => commands::state::handle_rm(&project_root, &name).await?,
        },
        Commands::Version => {
            println!("shardflow {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
