use crate::utils;
use colored::Colorize;
use shardflow_cloud::StateManager;
use std::path::Path;

pub async fn handle(project_root: &Path, spec_path: &Path) -> anyhow::Result<()> {
    let desired = utils::load_spec(spec_path)?;
    let state = StateManager::new(project_root).load().await?;

    let Some(recorded) = state.get_cluster(&desired.name) else {
        let request = shardflow_cloud::translate(&desired)?;
        println!(
            "{} {} は未作成です。{}台のインスタンスで作成されます",
            "+".green().bold(),
            desired.name.cyan(),
            request.instances.len()
        );
        return Ok(());
    };

    let plan = shardflow_cloud::plan(&recorded.spec, &desired)?;

    if !plan.has_changes() {
        println!(
            "{} {} ({}) は最新です",
            "✓".green().bold(),
            desired.name.cyan(),
            recorded.id
        );
        return Ok(());
    }

    println!("{} ({}) の更新計画:", desired.name.cyan(), recorded.id);
    for (i, action) in plan.actions.iter().enumerate() {
        println!("  {}. {} {}", i + 1, "~".yellow().bold(), action.describe());
    }

    if plan.requires_replacement() {
        println!();
        println!("{}", "✗ 変更できない項目が含まれています:".red().bold());
        for field in &plan.replacements {
            println!("    - {}", field);
        }
        println!("  クラスタの再作成が必要です");
    }

    println!();
    println!("{}", plan.summary());
    Ok(())
}
