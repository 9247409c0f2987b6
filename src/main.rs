use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use homeboard::config::Config;
use homeboard::error::{AppError, Result, ResultExt};
use homeboard::models::Snapshot;
use homeboard::services::Caller;
use homeboard::App;

/// Identity the command line acts under.
const CLI_CALLER: &str = "homeboard-cli";

const USAGE: &str = "\
Usage:
  homeboard --init                  create the config file and the database
  homeboard --backup USER           print a snapshot of USER's dashboard as JSON
  homeboard --restore USER FILE     recreate USER's dashboard from a snapshot
  homeboard --refresh USER          refresh every feed on USER's tabs";

enum Command {
    Init,
    Backup(String),
    Restore(String, PathBuf),
    Refresh(String),
}

fn parse_args(args: &[String]) -> Option<Command> {
    match args {
        [flag] if flag == "--init" => Some(Command::Init),
        [flag, user] if flag == "--backup" => Some(Command::Backup(user.clone())),
        [flag, user, file] if flag == "--restore" => {
            Some(Command::Restore(user.clone(), PathBuf::from(file)))
        }
        [flag, user] if flag == "--refresh" => Some(Command::Refresh(user.clone())),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = parse_args(&args) else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    let config = Config::load()?;
    let app = App::new(&config).await?;
    let caller = Caller::admin(CLI_CALLER);
    let timeout = config.request_timeout_secs;

    let result = match command {
        Command::Init => {
            println!("Config: {}", Config::config_path().display());
            println!(
                "Storage: {} ({})",
                config.storage.db_path.display(),
                app.repository().backend()
            );
            Ok(())
        }
        Command::Backup(user_id) => {
            bounded(timeout, async {
                let snapshot = app.backup_user(&caller, &user_id).await?;
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
                Ok::<_, AppError>(())
            })
            .await
        }
        Command::Restore(user_id, path) => {
            bounded(timeout, async {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {} failed", path.display()))?;
                let snapshot: Snapshot = serde_json::from_str(&content)?;
                let tabs = snapshot.tabs.len();
                app.restore_user(&caller, &user_id, snapshot).await?;
                println!("Restored {} tabs for {}", tabs, user_id);
                Ok::<_, AppError>(())
            })
            .await
        }
        Command::Refresh(user_id) => {
            bounded(timeout, async {
                let summary = app.refresh_user_feeds(&caller, &user_id).await?;
                println!(
                    "Refreshed {} feeds ({} failed)",
                    summary.refreshed, summary.failed
                );
                Ok::<_, AppError>(())
            })
            .await
        }
    };

    if let Err(e) = &result {
        tracing::error!("Command failed: {}", e);
        eprintln!("Error: {}", e.public_message());
        std::process::exit(1);
    }
    Ok(())
}

/// Drops `work` once `secs` have passed; dropping it cancels whatever it was waiting on.
async fn bounded<T>(secs: u64, work: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(Duration::from_secs(secs), work)
        .await
        .map_err(|_| AppError::Cancelled(format!("gave up after {secs}s")))?
}
