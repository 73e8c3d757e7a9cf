#![forbid(unsafe_code)]

//! Command-line front end: one discrete subcommand per operation, per the
//! redesign note against the source's single flat flag set.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use crosspost_sync::config::{self, RuntimeOverrides};
use crosspost_sync::controller::Controller;
use crosspost_sync::domain::{Channel, FilterRule};
use crosspost_sync::fetcher::YtDlpFetcher;
use crosspost_sync::publisher::ExternalUploader;
use crosspost_sync::rules::{self, RuleEngine};
use crosspost_sync::scanner::Scanner;
use crosspost_sync::security::ensure_not_root;
use crosspost_sync::store::Store;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sync-cli", about = "Cross-posting discovery/filtering/sync pipeline")]
struct Cli {
    #[arg(long)]
    db_path: Option<PathBuf>,
    #[arg(long)]
    output_dir: Option<PathBuf>,
    #[arg(long)]
    upload_command: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    AddChannel {
        channel_id: String,
        name: String,
        url: String,
    },
    RemoveChannel {
        channel_id: String,
    },
    ListChannels,
    Scan {
        channel_id: String,
        #[arg(long, default_value_t = 25)]
        limit: u32,
    },
    ScanAll {
        #[arg(long, default_value_t = 25)]
        limit: u32,
    },
    Sync {
        channel_id: String,
        #[arg(long, default_value_t = 25)]
        limit: u32,
    },
    SyncVideo {
        video_id: String,
    },
    Filter {
        #[arg(long, default_value_t = 25)]
        limit: u32,
    },
    Rules {
        #[command(subcommand)]
        action: RulesCommand,
    },
    Candidates {
        #[command(subcommand)]
        action: CandidatesCommand,
    },
}

#[derive(Subcommand)]
enum RulesCommand {
    Seed,
    Add {
        name: String,
        #[arg(value_name = "TYPE")]
        rule_type: String,
        field: String,
        value: String,
        #[arg(long, default_value_t = 0)]
        priority: i64,
    },
    List,
    Delete {
        name: String,
    },
    Import {
        path: PathBuf,
    },
}

#[derive(Subcommand)]
enum CandidatesCommand {
    List {
        channel_id: String,
        #[arg(long, default_value_t = 25)]
        limit: u32,
    },
    Rejected {
        #[arg(long, default_value_t = 25)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    ensure_not_root("sync-cli")?;

    let cli = Cli::parse();
    let runtime = config::resolve_runtime_config(RuntimeOverrides {
        db_path: cli.db_path.clone(),
        output_dir: cli.output_dir.clone(),
        ..RuntimeOverrides::default()
    })
    .context("resolving runtime configuration")?;

    let store = Store::open(&runtime.db_path)
        .await
        .context("opening store")?;
    let token = CancellationToken::new();
    {
        let token = token.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            token.cancel();
        });
    }

    match cli.command {
        Command::AddChannel { channel_id, name, url } => {
            store.add_channel(&Channel::new(channel_id, name, url)).await?;
            info!("channel added");
        }
        Command::RemoveChannel { channel_id } => {
            store.deactivate_channel(&channel_id).await?;
            info!("channel deactivated");
        }
        Command::ListChannels => {
            for channel in store.list_active_channels().await? {
                println!("{}\t{}\t{}", channel.channel_id, channel.name, channel.url);
            }
        }
        Command::Scan { channel_id, limit } => {
            let fetcher = YtDlpFetcher::new();
            let scanner = Scanner::new(store, fetcher, runtime.auto_filter);
            let count = scanner.scan_channel(&channel_id, limit, &token).await?;
            info!(count, "scan complete");
        }
        Command::ScanAll { limit } => {
            let fetcher = YtDlpFetcher::new();
            let scanner = Scanner::new(store, fetcher, runtime.auto_filter);
            let count = scanner.scan_all_active(limit, &token).await?;
            info!(count, "sweep complete");
        }
        Command::Sync { channel_id, limit } => {
            let fetcher = YtDlpFetcher::new();
            let upload_command = cli
                .upload_command
                .unwrap_or_else(|| PathBuf::from("upload-video"));
            let publisher = ExternalUploader::new(upload_command);
            let controller = Controller::new(store, fetcher, publisher, runtime.output_dir.clone())
                .context("constructing controller")?;
            match controller.sync_channel(&channel_id, limit, &token).await {
                Ok(counts) => info!(?counts, "sync complete"),
                Err((counts, err)) => {
                    info!(?counts, "sync aborted with partial progress");
                    return Err(err).context("syncing channel");
                }
            }
        }
        Command::SyncVideo { video_id } => {
            let fetcher = YtDlpFetcher::new();
            let upload_command = cli
                .upload_command
                .unwrap_or_else(|| PathBuf::from("upload-video"));
            let publisher = ExternalUploader::new(upload_command);
            let controller = Controller::new(store, fetcher, publisher, runtime.output_dir.clone())
                .context("constructing controller")?;
            match controller.sync_video(&video_id, &token).await {
                Ok(counts) => info!(?counts, "video sync complete"),
                Err((counts, err)) => {
                    info!(?counts, "video sync aborted with partial progress");
                    return Err(err).context("syncing video");
                }
            }
        }
        Command::Filter { limit } => {
            let engine = RuleEngine::new(store);
            let (passed, rejected) = engine.filter_pending_candidates(limit).await?;
            info!(passed = passed.len(), rejected = rejected.len(), "filter pass complete");
        }
        Command::Rules { action } => handle_rules(store, action).await?,
        Command::Candidates { action } => handle_candidates(store, action).await?,
    }

    Ok(())
}

async fn handle_rules(store: Store, action: RulesCommand) -> Result<()> {
    let engine = RuleEngine::new(store.clone());
    match action {
        RulesCommand::Seed => {
            engine.seed_default_rules().await?;
            info!("default rules seeded");
        }
        RulesCommand::Add {
            name,
            rule_type,
            field,
            value,
            priority,
        } => {
            let rule_type = rule_type.parse().context("parsing rule type")?;
            store
                .add_rule(&FilterRule {
                    id: 0,
                    rule_name: name,
                    rule_type,
                    field,
                    value,
                    is_active: true,
                    priority,
                    created_at: Utc::now(),
                })
                .await?;
            info!("rule added");
        }
        RulesCommand::List => {
            for rule in store.list_all_rules().await? {
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    rule.rule_name, rule.rule_type, rule.field, rule.value, rule.priority, rule.is_active
                );
            }
        }
        RulesCommand::Delete { name } => {
            store.delete_rule(&name).await?;
            info!("rule deleted");
        }
        RulesCommand::Import { path } => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let imported = rules::import_rules_from_json(&raw)?;
            for rule in &imported {
                store.add_rule(rule).await?;
            }
            info!(count = imported.len(), "rules imported");
        }
    }
    Ok(())
}

async fn handle_candidates(store: Store, action: CandidatesCommand) -> Result<()> {
    match action {
        CandidatesCommand::List { channel_id, limit } => {
            for candidate in store.list_candidates_by_channel(&channel_id, limit).await? {
                println!("{}\t{}\t{}", candidate.video_id, candidate.title, candidate.view_count);
            }
        }
        CandidatesCommand::Rejected { limit } => {
            for summary in store.list_rejected_candidates(limit).await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    summary.video_id, summary.title, summary.reject_rule_name, summary.reject_reason
                );
            }
        }
    }
    Ok(())
}
