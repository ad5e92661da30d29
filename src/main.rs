mod config;
mod error;
mod filter;
mod google;
mod model;
mod notion;
mod pipeline;
mod raindrop;
mod reader;
mod sheets;
mod zotero;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;

use crate::config::Settings;
use crate::filter::{MatchMode, SiteFilter};
use crate::google::GoogleCredentials;
use crate::notion::NotionWriter;
use crate::pipeline::RunStats;
use crate::raindrop::{RaindropApi, RaindropClient};
use crate::reader::{RaindropReader, Relocation};
use crate::sheets::{SheetReader, SheetWriter, SheetsClient};

#[derive(Parser)]
#[command(name = "paperlink", about = "Move paper bookmarks from Raindrop.io into Notion or Google Sheets")]
struct Cli {
    /// Settings file (toml, json or yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a Notion page per paper
    Notion {
        #[command(flatten)]
        run: RunArgs,
        /// Where to read papers from
        #[arg(long, value_enum, default_value_t = Source::Google)]
        source: Source,
    },
    /// Append papers from Raindrop.io to the spreadsheet
    Sheet {
        #[command(flatten)]
        run: RunArgs,
        /// Delete processed bookmarks instead of moving them to the read collection
        #[arg(long)]
        purge: bool,
    },
    /// List Raindrop.io collections
    Collections,
    /// Print top items of the Zotero library (experimental)
    Zotero {
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Source {
    Google,
    Raindrop,
}

#[derive(Args)]
struct RunArgs {
    /// Print payloads instead of writing; nothing is relocated
    #[arg(long)]
    dry_run: bool,
    /// Mark processed records on the source (default)
    #[arg(long, overrides_with = "no_delete")]
    delete: bool,
    /// Leave processed records on the source
    #[arg(long, overrides_with = "delete")]
    no_delete: bool,
    /// Max records to read from the source
    #[arg(short = 'n', long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
    limit: u32,
    /// Seconds to wait between writes
    #[arg(long)]
    interval: Option<u64>,
    /// How URLs are checked against the site allow-list
    #[arg(long = "match", value_enum)]
    match_mode: Option<MatchMode>,
}

struct RunOptions {
    dry_run: bool,
    relocate: bool,
    limit: usize,
    interval: Duration,
    match_mode: MatchMode,
}

impl RunArgs {
    fn resolve(&self, default_match: MatchMode, default_interval: u64) -> RunOptions {
        let mut relocate = self.delete || !self.no_delete;
        if self.dry_run && relocate {
            info!("Dry run, processed records will not be relocated");
            relocate = false;
        }
        RunOptions {
            dry_run: self.dry_run,
            relocate,
            limit: self.limit as usize,
            interval: Duration::from_secs(self.interval.unwrap_or(default_interval)),
            match_mode: self.match_mode.unwrap_or(default_match),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    let http = reqwest::Client::new();

    let result = match cli.command {
        Commands::Notion { run, source } => {
            let opts = run.resolve(MatchMode::Hostname, 2);
            let filter = SiteFilter::new(settings.sites.clone(), opts.match_mode);
            let mut sink = NotionWriter::new(http.clone(), &settings.notion, opts.dry_run)?;

            let stats = match source {
                Source::Raindrop => {
                    let relocation = if opts.relocate {
                        Relocation::MoveTo(settings.raindrop.read_collection.clone())
                    } else {
                        Relocation::Keep
                    };
                    let mut reader = open_raindrop(&http, &settings, relocation, opts.limit).await?;
                    pipeline::run(&mut reader, &filter, &mut sink, opts.interval).await?
                }
                Source::Google => {
                    let api = connect_sheets(&http, &settings).await?;
                    let mut reader =
                        SheetReader::new(api, &settings.sheets.sheet_name, opts.relocate, opts.limit);
                    pipeline::run(&mut reader, &filter, &mut sink, opts.interval).await?
                }
            };
            print_stats(&stats);
            Ok(())
        }
        Commands::Sheet { run, purge } => {
            let opts = run.resolve(MatchMode::Substring, 0);
            let filter = SiteFilter::new(settings.sites.clone(), opts.match_mode);
            let relocation = match (opts.relocate, purge) {
                (false, _) => Relocation::Keep,
                (true, true) => Relocation::Delete,
                (true, false) => Relocation::MoveTo(settings.raindrop.read_collection.clone()),
            };

            let mut reader = open_raindrop(&http, &settings, relocation, opts.limit).await?;
            let mut sink = if opts.dry_run {
                SheetWriter::<SheetsClient>::dry_run(&settings.sheets.sheet_name)
            } else {
                SheetWriter::new(connect_sheets(&http, &settings).await?, &settings.sheets.sheet_name)
            };
            let stats = pipeline::run(&mut reader, &filter, &mut sink, opts.interval).await?;
            print_stats(&stats);
            Ok(())
        }
        Commands::Collections => {
            let api = RaindropClient::new(http.clone(), &settings.raindrop, settings.raindrop_token()?);
            let collections = api.collections().await?;
            if collections.is_empty() {
                println!("No collections.");
                return Ok(());
            }
            println!("{:>10} | {:<32} | {:>6}", "ID", "Title", "Count");
            println!("{}", "-".repeat(54));
            for c in &collections {
                println!("{:>10} | {:<32} | {:>6}", c.id, c.title, c.count);
            }
            Ok(())
        }
        Commands::Zotero { limit } => {
            let items = zotero::top_items(&http, &settings.zotero, limit).await?;
            for item in &items {
                println!("{}", serde_json::to_string_pretty(item)?);
            }
            println!("\n{} items", items.len());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn open_raindrop(
    http: &reqwest::Client,
    settings: &Settings,
    relocation: Relocation,
    limit: usize,
) -> anyhow::Result<RaindropReader<RaindropClient>> {
    let token = settings.raindrop_token()?;
    let api = RaindropClient::new(http.clone(), &settings.raindrop, token);
    let reader = RaindropReader::open(
        api,
        &settings.raindrop.source_collection,
        relocation,
        settings.raindrop.page_size,
        limit,
    )
    .await?;
    Ok(reader)
}

async fn connect_sheets(http: &reqwest::Client, settings: &Settings) -> anyhow::Result<SheetsClient> {
    let spreadsheet_id = crate::config::required(&settings.sheets.spreadsheet_id, "sheets.spreadsheet_id")?;
    let mut creds = GoogleCredentials::load(settings)?;
    creds.refresh(http).await.context("Failed to refresh Google access token")?;
    Ok(SheetsClient::new(http.clone(), &settings.sheets, spreadsheet_id, creds.access_token)?)
}

fn print_stats(stats: &RunStats) {
    println!(
        "Done: {} read, {} skipped, {} written, {} relocated.",
        stats.seen, stats.skipped, stats.written, stats.relocated
    );
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
