//! harvestq CLI — operator interface to the ingestion work queue.

use clap::{Parser, Subcommand};
use harvestq::config::Config;
use harvestq::db::Db;
use harvestq::model::{ImageId, SourceId, SourceState};
use harvestq::scheduler::{RefreshConfig, RefreshScheduler};
use harvestq::telemetry::{TelemetryConfig, init_telemetry};
use secrecy::ExposeSecret;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "harvestq", about = "Work queue for the content-ingestion pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the refresh scheduler daemon; emits claims as JSON lines
    Serve {
        /// Seconds between refresh sweeps (overrides REFRESH_INTERVAL_SECS)
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Perform one refresh sweep and print the claimed sources
    Refresh,
    /// Site registry operations
    Site {
        #[command(subcommand)]
        action: SiteAction,
    },
    /// Source queue operations
    Source {
        #[command(subcommand)]
        action: SourceAction,
    },
    /// Image ledger operations
    Image {
        #[command(subcommand)]
        action: ImageAction,
    },
}

#[derive(Subcommand)]
enum SiteAction {
    /// Register a site (idempotent)
    Add { name: String },
}

#[derive(Subcommand)]
enum SourceAction {
    /// Create a source in pending state
    Add {
        site: String,
        remote_identifier: String,
    },
    /// List sources
    List {
        /// Filter by site
        #[arg(long)]
        site: Option<String>,
        /// Filter by state
        #[arg(long)]
        state: Option<String>,
        /// Maximum rows to show
        #[arg(long, default_value_t = 20)]
        limit: i64,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show a source
    Show {
        id: i64,
        #[arg(long)]
        json: bool,
    },
    /// Claim sources for initial ingestion
    Claim {
        site: String,
        #[arg(long, default_value_t = 1)]
        count: i64,
    },
    /// Report ingestion cursors for a claimed source
    Progress {
        id: i64,
        #[arg(long)]
        earliest: Option<String>,
        #[arg(long)]
        latest: Option<String>,
    },
    /// Move claimed sources back to standby
    Finish {
        ids: Vec<i64>,
        /// Label for the operator log (e.g. "initial", "refresh")
        #[arg(long, default_value = "manual")]
        action: String,
    },
    /// Mark sources as errored
    Fail { ids: Vec<i64> },
}

#[derive(Subcommand)]
enum ImageAction {
    /// Record discovered image URLs for a source
    Record { source_id: i64, urls: Vec<String> },
    /// List images with no archived location
    Pending {
        #[arg(long)]
        json: bool,
    },
    /// Claim images for archival
    Claim {
        #[arg(long, default_value_t = 10)]
        count: i64,
    },
    /// Record the archived location of an image
    Stored { id: i64, url: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Serve { interval } => cmd_serve(config, interval).await,
        command => {
            let db = Db::connect(config.database_url.expose_secret()).await?;
            db.migrate().await?;

            match command {
                Command::Serve { .. } => unreachable!("handled above"),
                Command::Refresh => cmd_refresh(&db).await,
                Command::Site { action } => match action {
                    SiteAction::Add { name } => {
                        db.register_site(&name).await?;
                        println!("Registered site {name}");
                        Ok(())
                    }
                },
                Command::Source { action } => cmd_source(&db, action).await,
                Command::Image { action } => cmd_image(&db, action).await,
            }
        }
    }
}

async fn cmd_serve(config: Config, interval: Option<u64>) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "harvestq".to_string(),
    })?;

    let db = Db::connect(config.database_url.expose_secret()).await?;
    db.migrate().await?;

    let interval_secs = interval.unwrap_or(config.refresh_interval_secs);
    let (tx, mut rx) = tokio::sync::mpsc::channel(64);
    let scheduler = RefreshScheduler::new(
        Arc::new(db),
        RefreshConfig {
            interval: std::time::Duration::from_secs(interval_secs),
        },
        tx,
    );

    let shutdown = scheduler.shutdown_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        shutdown.notify_one();
    });

    // Claims go to stdout as JSON lines; the scraper fleet consumes them.
    let printer = tokio::spawn(async move {
        while let Some(claim) = rx.recv().await {
            match serde_json::to_string(&claim) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::error!("failed to serialize claim: {e}"),
            }
        }
    });

    scheduler.run().await?;
    drop(scheduler);
    printer.await.ok();
    Ok(())
}

async fn cmd_refresh(db: &Db) -> anyhow::Result<()> {
    let claims = db.claim_sources_to_refresh().await?;
    if claims.is_empty() {
        println!("No sources due for refresh.");
        return Ok(());
    }
    for claim in &claims {
        println!(
            "{:<8}  {:<24}  latest: {}",
            claim.id,
            claim.remote_identifier,
            claim.latest_marker.as_deref().unwrap_or("-")
        );
    }
    println!("\n{} source(s) claimed for refresh", claims.len());
    Ok(())
}

async fn cmd_source(db: &Db, action: SourceAction) -> anyhow::Result<()> {
    match action {
        SourceAction::Add {
            site,
            remote_identifier,
        } => {
            let id = db.create_source(&site, &remote_identifier).await?;
            println!("Created source {id} ({site}/{remote_identifier})");
        }
        SourceAction::List {
            site,
            state,
            limit,
            json,
        } => {
            let state_filter: Option<SourceState> = match state {
                Some(s) => Some(s.parse().map_err(|_| anyhow::anyhow!("invalid state: {s}"))?),
                None => None,
            };
            let sources = db.list_sources(site.as_deref(), state_filter, limit).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&sources)?);
                return Ok(());
            }
            if sources.is_empty() {
                println!("No sources found.");
                return Ok(());
            }
            println!(
                "{:<8}  {:<12}  {:<24}  {:<12}  REFRESHED",
                "ID", "SITE", "REMOTE", "STATE"
            );
            println!("{}", "-".repeat(80));
            for s in &sources {
                println!(
                    "{:<8}  {:<12}  {:<24}  {:<12}  {}",
                    s.id,
                    s.site,
                    s.remote_identifier,
                    s.state,
                    s.last_refreshed_at
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
            }
            println!("\n{} source(s)", sources.len());
        }
        SourceAction::Show { id, json } => {
            let source = db.get_source(SourceId(id)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&source)?);
                return Ok(());
            }
            println!("ID:        {}", source.id);
            println!("Site:      {}", source.site);
            println!("Remote:    {}", source.remote_identifier);
            println!("State:     {}", source.state);
            println!(
                "Earliest:  {}",
                source.earliest_processed_marker.as_deref().unwrap_or("-")
            );
            println!(
                "Latest:    {}",
                source.latest_processed_marker.as_deref().unwrap_or("-")
            );
            println!(
                "Refreshed: {}",
                source
                    .last_refreshed_at
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "never".to_string())
            );
            println!("Created:   {}", source.created_at);
            println!("Updated:   {}", source.updated_at);
        }
        SourceAction::Claim { site, count } => {
            let claims = db.claim_sources_to_populate(&site, count).await?;
            if claims.is_empty() {
                println!("No sources available to populate for {site}.");
                return Ok(());
            }
            for claim in &claims {
                println!(
                    "{:<8}  {:<24}  earliest: {}",
                    claim.id,
                    claim.remote_identifier,
                    claim.earliest_marker.as_deref().unwrap_or("-")
                );
            }
            println!("\n{} source(s) claimed", claims.len());
        }
        SourceAction::Progress {
            id,
            earliest,
            latest,
        } => {
            db.report_progress(SourceId(id), earliest.as_deref(), latest.as_deref())
                .await?;
            println!("Progress recorded for source {id}");
        }
        SourceAction::Finish { ids, action } => {
            let ids: Vec<SourceId> = ids.into_iter().map(SourceId).collect();
            let summary = db.finish_processing(&ids, &action).await?;
            println!(
                "{} of {} source(s) moved to standby",
                summary.affected, summary.requested
            );
        }
        SourceAction::Fail { ids } => {
            let ids: Vec<SourceId> = ids.into_iter().map(SourceId).collect();
            let summary = db.mark_errors(&ids).await?;
            println!(
                "{} of {} source(s) marked as errored",
                summary.affected, summary.requested
            );
        }
    }
    Ok(())
}

async fn cmd_image(db: &Db, action: ImageAction) -> anyhow::Result<()> {
    match action {
        ImageAction::Record { source_id, urls } => {
            let summary = db.record_discovered_images(SourceId(source_id), &urls).await?;
            println!(
                "{} of {} URL(s) recorded (rest were duplicates)",
                summary.inserted,
                summary.submitted.len()
            );
        }
        ImageAction::Pending { json } => {
            let images = db.list_images_pending_storage().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&images)?);
                return Ok(());
            }
            if images.is_empty() {
                println!("No images pending storage.");
                return Ok(());
            }
            for img in &images {
                println!("{:<8}  source {:<8}  {}", img.id, img.source_id, img.source_url);
            }
            println!("\n{} image(s) pending", images.len());
        }
        ImageAction::Claim { count } => {
            let images = db.claim_images_to_store(count).await?;
            if images.is_empty() {
                println!("No images available to claim.");
                return Ok(());
            }
            for img in &images {
                println!("{:<8}  source {:<8}  {}", img.id, img.source_id, img.source_url);
            }
            println!("\n{} image(s) claimed", images.len());
        }
        ImageAction::Stored { id, url } => {
            db.record_stored_location(ImageId(id), &url).await?;
            println!("Stored location recorded for image {id}");
        }
    }
    Ok(())
}
