use clap::Parser;
use treeindex::config::{validate_app_config, Cli, Command};
use treeindex::monitoring;
use treeindex::Engine;
use utilities::{init_logging, RealFileSystem};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut cfg = cli.resolve_app_config()?;
    validate_app_config(&mut cfg)?;

    match &cli.command {
        Some(Command::Status(args)) => {
            let status = monitoring::collect_status(&cfg, args.prefix.as_deref())?;
            monitoring::print_status(&status, args.json)
        }
        Some(Command::Scan(args)) => {
            init_logging(&cfg.resolved_log_path(), &RealFileSystem::new())?;
            let engine = Engine::new(cfg)?;
            let summary = engine.scan_once().await;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "Added {}, removed {}, {} issue(s)",
                    summary.files_added,
                    summary.files_removed,
                    summary.issues.len()
                );
                for issue in &summary.issues {
                    println!("  {}: {}", issue.path, issue.message);
                }
            }
            Ok(())
        }
        Some(Command::Run) | None => {
            init_logging(&cfg.resolved_log_path(), &RealFileSystem::new())?;
            let engine = Engine::new(cfg)?;
            engine.run().await
        }
    }
}
