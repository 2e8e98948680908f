use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::auth::StaticAuth;
use crate::commands;
use crate::db::Database;
use crate::import::{ImportSession, LogNotifier};
use crate::models::{FileImportState, IncomingFile, Outcome, PositionIdPolicy, TradeFilters, UpdateSettingsInput};
use crate::store::SqliteTradeStore;

/// Import MT5 trade history exports into the journal database.
#[derive(Debug, Parser)]
#[command(name = "trading-journal-import", author, version, about = "Import CSV/Excel trade history", long_about = None)]
pub struct Cli {
    /// Path to the journal database file
    #[arg(short = 'd', long = "db", default_value = "./trading_journal.db", global = true)]
    pub db_path: PathBuf,

    /// User the imported trades belong to
    #[arg(short = 'u', long = "user", default_value = "local", global = true)]
    pub user: String,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Parse the given files and store their trades as one batch
    Import {
        /// Fail files whose rows have no position id instead of generating one
        #[arg(long)]
        require_position_id: bool,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List stored trades, newest first
    Trades {
        #[arg(long)]
        asset: Option<String>,
        #[arg(long)]
        outcome: Option<Outcome>,
        /// Earliest entry time (RFC 3339)
        #[arg(long)]
        from: Option<String>,
        /// Latest entry time (RFC 3339)
        #[arg(long)]
        to: Option<String>,
        /// Trades per page
        #[arg(long)]
        limit: Option<i32>,
        /// 1-based page number, used together with --limit
        #[arg(long, requires = "limit")]
        page: Option<i32>,
    },
    /// List previous imports
    History,
    /// Delete an import batch and the trades it added
    Undo { batch_id: String },
    /// Show or change import settings
    Settings {
        #[arg(long)]
        policy: Option<PositionIdPolicy>,
        #[arg(long)]
        account: Option<String>,
        #[arg(long)]
        asset_type: Option<String>,
    },
}

#[derive(Debug, Serialize)]
struct FileReport<'a> {
    name: &'a str,
    status: &'static str,
    trades: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl<'a> From<&'a FileImportState> for FileReport<'a> {
    fn from(state: &'a FileImportState) -> Self {
        Self {
            name: &state.file.name,
            status: state.status.as_str(),
            trades: state.trade_count(),
            error: state.error.as_deref(),
        }
    }
}

fn open_database(path: &Path) -> Result<Arc<Database>> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow!("Database path is not valid UTF-8: {:?}", path))?;
    let db = Database::new(path_str).with_context(|| format!("Failed to open database {:?}", path))?;
    Ok(Arc::new(db))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run one command. `Ok(false)` means the command ran but did not succeed.
pub async fn run(cli: Cli) -> Result<bool> {
    let db = open_database(&cli.db_path)?;

    match cli.command {
        Command::Import {
            require_position_id,
            files,
        } => import_files(db, &cli.user, require_position_id, &files, cli.json).await,
        Command::Trades {
            asset,
            outcome,
            from,
            to,
            limit,
            page,
        } => {
            let filters = TradeFilters {
                asset,
                outcome,
                start_time: from,
                end_time: to,
                page: limit.map(|_| page.unwrap_or(1)),
                limit,
            };
            let trades = commands::get_trades(&db, &cli.user, Some(filters)).map_err(anyhow::Error::msg)?;
            if cli.json {
                print_json(&trades)?;
            } else {
                for t in &trades {
                    println!(
                        "{:<24} {:<10} {:<6} {:>10.2} {:<5} {}",
                        t.trade.time,
                        t.trade.asset,
                        t.trade.trade_type,
                        t.trade.pnl,
                        t.trade.outcome.as_str(),
                        t.trade.position_id
                    );
                }
                println!("{} trades", trades.len());
            }
            Ok(true)
        }
        Command::History => {
            let history = commands::get_import_history(&db, &cli.user).map_err(anyhow::Error::msg)?;
            if cli.json {
                print_json(&history)?;
            } else {
                for batch in &history {
                    let when = chrono::DateTime::from_timestamp(batch.created_at, 0)
                        .map(|dt| dt.to_rfc3339())
                        .unwrap_or_else(|| batch.created_at.to_string());
                    println!(
                        "{}  {}  submitted {}, inserted {}, duplicates {}",
                        batch.id, when, batch.submitted, batch.inserted, batch.duplicates
                    );
                }
            }
            Ok(true)
        }
        Command::Undo { batch_id } => {
            let removed = commands::delete_import_batch(&db, &cli.user, &batch_id).map_err(anyhow::Error::msg)?;
            if cli.json {
                print_json(&serde_json::json!({ "batch_id": batch_id, "removed": removed }))?;
            } else {
                println!("Removed batch {} ({} trades)", batch_id, removed);
            }
            Ok(true)
        }
        Command::Settings {
            policy,
            account,
            asset_type,
        } => {
            let settings = if policy.is_none() && account.is_none() && asset_type.is_none() {
                commands::get_settings(&db)
            } else {
                commands::update_settings(
                    &db,
                    UpdateSettingsInput {
                        position_id_policy: policy,
                        default_account_number: account,
                        asset_type,
                    },
                )
            }
            .map_err(anyhow::Error::msg)?;

            if cli.json {
                print_json(&settings)?;
            } else {
                println!("position_id_policy     {}", settings.position_id_policy);
                println!("default_account_number {}", settings.default_account_number);
                println!("asset_type             {}", settings.asset_type);
            }
            Ok(true)
        }
    }
}

async fn import_files(
    db: Arc<Database>,
    user: &str,
    require_position_id: bool,
    paths: &[PathBuf],
    json: bool,
) -> Result<bool> {
    let mut settings = commands::get_settings(&db).map_err(anyhow::Error::msg)?;
    if require_position_id {
        settings.position_id_policy = PositionIdPolicy::Require;
    }

    let incoming = paths
        .iter()
        .map(|p| IncomingFile::from_path(p).with_context(|| format!("Failed to read {:?}", p)))
        .collect::<Result<Vec<_>>>()?;

    let session = ImportSession::new(
        settings,
        Arc::new(StaticAuth::signed_in(user)),
        Arc::new(SqliteTradeStore::new(Arc::clone(&db))),
        Arc::new(LogNotifier),
    );

    let report = session.ingest(incoming);
    if report.accepted.is_empty() {
        bail!("No supported files given (expected .csv, .xlsx or .xls)");
    }

    session.settle().await;
    let result = session.import_trades().await;

    let files = session.files();
    let file_reports: Vec<FileReport> = files.iter().map(FileReport::from).collect();

    if json {
        let (summary, error) = match &result {
            Ok(summary) => (Some(summary), None),
            Err(e) => (None, Some(e.to_string())),
        };
        print_json(&serde_json::json!({
            "files": file_reports,
            "rejected": report.rejected,
            "summary": summary,
            "error": error,
        }))?;
    } else {
        for f in &file_reports {
            match f.error {
                Some(err) => println!("{:<9} {} ({})", f.status, f.name, err),
                None => println!("{:<9} {} ({} trades)", f.status, f.name, f.trades),
            }
        }
        for name in &report.rejected {
            println!("{:<9} {}", "skipped", name);
        }
        match &result {
            Ok(summary) => println!(
                "✓ Imported {} trades, {} duplicates skipped",
                summary.imported, summary.duplicates
            ),
            Err(e) => println!("✗ {}", e),
        }
    }

    Ok(result.is_ok())
}
