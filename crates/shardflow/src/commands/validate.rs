use crate::utils;
use colored::Colorize;
use std::path::Path;

pub fn handle(spec_path: &Path) -> anyhow::Result<()> {
    println!("{}", "クラスタ定義を検証中...".blue());

    let spec = match utils::load_spec(spec_path) {
        Ok(spec) => spec,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ 定義エラー".red().bold());
            eprintln!("  {:#}", e);
            std::process::exit(1);
        }
    };
    let request = shardflow_cloud::translate(&spec)?;

    println!("{}", "✓ クラスタ定義は正常です！".green().bold());
    println!();
    println!("サマリー:");
    println!("  クラスタ: {}", spec.name.cyan());
    println!(
        "  データストア: {} {}",
        spec.datastore.datastore_type, spec.datastore.version
    );
    println!("  シャード: {}個", spec.shards.len());
    for shard in &spec.shards {
        let volume = shard
            .volume
            .size
            .map(|size| format!("{}GB", size))
            .unwrap_or_else(|| "(未設定)".to_string());
        println!(
            "    - {} ({}台, flavor: {}, volume: {})",
            shard.shard_id.cyan(),
            shard.size,
            shard.flavor_id,
            volume
        );
    }
    println!("  インスタンス: {}台", request.instances.len());
    if !spec.capabilities.is_empty() {
        let names: Vec<_> = spec.capabilities.iter().map(|c| c.name.as_str()).collect();
        println!("  ケイパビリティ: {}", names.join(", "));
    }

    Ok(())
}
