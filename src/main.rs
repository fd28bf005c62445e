//! maildeck CLI.
//!
//! Every invocation writes exactly one JSON line on stdout and exits 0 on
//! `{"ok": true}`, non-zero otherwise. Logs go to stderr and to
//! `BASE/logs/sync.log`, never stdout.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::json;

use maildeck::config::{Config, CredentialProvider, EnvCredentials};
use maildeck::corpus::account_state::AccountState;
use maildeck::corpus::paths::CorpusPaths;
use maildeck::daemon::pidfile;
use maildeck::daemon::Supervisor;
use maildeck::error::Result;
use maildeck::services::sync::{self, PassOverrides};

#[derive(Parser)]
#[command(name = "maildeck", version, about = "Local agent-native email client")]
struct Cli {
    /// Corpus base directory (default: ~/.maildeck).
    #[arg(long, global = true)]
    base: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon in the foreground until signalled.
    Start {
        /// Restrict to a single account.
        #[arg(long)]
        account: Option<String>,
    },
    /// Signal a running daemon to shut down.
    Stop,
    /// Report daemon liveness and per-account sync state.
    Status,
    /// Run one sync pass and exit.
    Sync {
        /// Restrict to a single account.
        #[arg(long)]
        account: Option<String>,
        /// Depth in days for a full pass.
        #[arg(long)]
        days: Option<i64>,
        /// Cap on fetched messages.
        #[arg(long)]
        max: Option<usize>,
        /// Force a full pass even when a high-water mark exists.
        #[arg(long)]
        full: bool,
        /// Fetch unseen messages only; does not advance the high-water
        /// mark.
        #[arg(long)]
        unread: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let paths = CorpusPaths::new(cli.base.clone());

    let output = match cli.command {
        Command::Start { account } => cmd_start(&paths, account.as_deref()).await,
        Command::Stop => cmd_stop(&paths).await,
        Command::Status => cmd_status(&paths),
        Command::Sync {
            account,
            days,
            max,
            full,
            unread,
        } => {
            cmd_sync(
                &paths,
                account.as_deref(),
                PassOverrides {
                    days,
                    max,
                    full,
                    unread,
                },
            )
            .await
        }
    };

    let (line, code) = match output {
        Ok(value) => (value, ExitCode::SUCCESS),
        Err(e) => (json!({"ok": false, "error": e.to_string()}), ExitCode::FAILURE),
    };

    println!("{}", line);
    code
}

async fn cmd_start(paths: &CorpusPaths, account: Option<&str>) -> Result<serde_json::Value> {
    let config = Config::load(paths)?;
    let _log_guard = maildeck::logging::init(paths, true)?;

    let credentials: Arc<dyn CredentialProvider> = Arc::new(EnvCredentials);
    let supervisor = Supervisor::new(paths.clone(), config, credentials);
    supervisor.run(account).await?;

    Ok(json!({
        "ok": true,
        "msg": "daemon stopped",
        "pid": std::process::id(),
    }))
}

async fn cmd_stop(paths: &CorpusPaths) -> Result<serde_json::Value> {
    let Some(pid) = pidfile::read_pid(paths) else {
        return Err(maildeck::Error::Config("daemon not running".into()));
    };
    if !pidfile::process_alive(pid) {
        return Err(maildeck::Error::Config(format!(
            "daemon not running (stale pid {})",
            pid
        )));
    }

    pidfile::signal_stop(pid)?;

    // Wait for the process to exit and remove its pid file.
    for _ in 0..50 {
        if !pidfile::process_alive(pid) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    Ok(json!({"ok": true, "stopped_pid": pid}))
}

fn cmd_status(paths: &CorpusPaths) -> Result<serde_json::Value> {
    let config = Config::load(paths)?;

    let pid = pidfile::read_pid(paths);
    let running = pid.map(pidfile::process_alive).unwrap_or(false);

    let mut accounts = Vec::new();
    for email in &config.accounts {
        let state = AccountState::load(paths, email)?;
        accounts.push(json!({
            "email": email,
            "sync_state": state.sync_state,
            "last_uid": state.last_uid,
            "last_sync": state.last_sync,
            "threads": maildeck::corpus::jsonl::read_all(&paths.threads_index(email))?.len(),
            "contacts": maildeck::corpus::jsonl::read_all(&paths.contacts_index(email))?.len(),
            "outbox": count_json_files(&paths.outbox_dir(email)),
            "sent": count_json_files(&paths.sent_dir(email)),
            "failed": count_json_files(&paths.failed_dir(email)),
        }));
    }

    Ok(json!({
        "ok": true,
        "running": running,
        "pid": if running { pid } else { None },
        "accounts": accounts,
    }))
}

fn count_json_files(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .filter(|e| {
                    e.file_name()
                        .to_string_lossy()
                        .ends_with(".json")
                })
                .count()
        })
        .unwrap_or(0)
}

async fn cmd_sync(
    paths: &CorpusPaths,
    account: Option<&str>,
    overrides: PassOverrides,
) -> Result<serde_json::Value> {
    let config = Config::load(paths)?;
    let _log_guard = maildeck::logging::init(paths, true)?;

    let accounts: Vec<String> = config
        .accounts
        .iter()
        .filter(|email| account.map_or(true, |only| only == email.as_str()))
        .cloned()
        .collect();

    if accounts.is_empty() {
        return Err(match account {
            Some(email) => maildeck::Error::AccountNotFound(email.to_string()),
            None => maildeck::Error::Config("no accounts configured".into()),
        });
    }

    let credentials = EnvCredentials;
    let mut results = Vec::new();
    for email in &accounts {
        let outcome = sync::run_one_shot(paths, &config, &credentials, email, &overrides).await?;
        results.push(json!({
            "account": email,
            "threads_touched": outcome.threads_touched,
            "messages_written": outcome.messages_written,
            "last_uid": outcome.last_uid,
        }));
    }

    Ok(json!({"ok": true, "results": results}))
}
