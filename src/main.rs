use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::Mutex;

use inbox_digest::classifier::Classifier;
use inbox_digest::config::Config;
use inbox_digest::database::Database;
use inbox_digest::email::{IngestionPipeline, RunReport};
use inbox_digest::imap_client::ImapClient;
use inbox_digest::ollama_client::OllamaClient;
use inbox_digest::server::{self, AppState};
use inbox_digest::watermark::Watermark;

type Pipeline = IngestionPipeline<OllamaClient>;

#[derive(Parser)]
#[command(name = "inbox-digest")]
#[command(about = "Reads new mail over IMAP, keeps AI summaries of the important messages and serves them as an RSS digest")]
#[command(version = "0.1.0")]
struct Args {
    /// Dry-run: classify and print, without writing summaries or the watermark
    #[arg(short, long)]
    dry_run: bool,

    /// Daemon: startup run, scheduled runs and the HTTP server (/rss, /status)
    #[arg(long)]
    daemon: bool,

    /// Directory holding summaries.db and last_uid.txt (default: DATA_DIR or ./data)
    #[arg(short = 'o', long)]
    data_dir: Option<String>,

    /// Check the configuration without connecting
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    dotenv::dotenv().ok();

    let args = Args::parse();

    env_logger::init();

    if args.dry_run {
        info!("🧪 Starting inbox-digest in DRY-RUN mode");
    } else {
        info!("🚀 Starting inbox-digest");
    }

    let mut config = Config::new()?;

    if let Some(data_dir) = &args.data_dir {
        config.data_dir = data_dir.clone();
    }

    if args.check_config {
        println!("✅ Configuration is valid!");
        println!("📧 IMAP: {}@{}:{} ({})", config.imap.username, config.imap.host, config.imap.port, config.imap.folder);
        println!("🤖 Ollama: {} (model {}, timeout {}s)", config.ollama.api_url, config.ollama.model, config.ollama.timeout_secs);
        println!("✅ Whitelist: {:?}", config.classifier.whitelist);
        println!("⛔ Blacklist: {:?}", config.classifier.blacklist);
        println!("📁 Data directory: {}", config.data_dir);
        println!("📅 Schedule: {:?}", config.scheduler.schedule_times);
        println!("🌐 Server: {}:{} (feed {})", config.server.host, config.server.port, config.server.public_url);
        return Ok(());
    }

    if args.daemon {
        info!("🔄 Starting in daemon mode");
        return run_daemon_mode(config, args.dry_run).await;
    }

    let database = if args.dry_run {
        None
    } else {
        Some(
            Database::new(&config.database_path())
                .await
                .context("Unable to initialize summary store")?,
        )
    };

    let pipeline = build_pipeline(&config, database)?;
    match run_once(&config, &pipeline).await {
        Ok(report) => {
            info!(
                "✅ Done: {} stored, {} previewed, {} skipped, {} failed",
                report.emails_stored, report.emails_previewed, report.emails_skipped, report.emails_failed
            );
            Ok(())
        }
        Err(e) => {
            error!("❌ Error while processing emails: {:#}", e);
            Err(e)
        }
    }
}

/// Without a store the pipeline runs in dry-run mode.
fn build_pipeline(config: &Config, database: Option<Database>) -> Result<Pipeline> {
    let generator = OllamaClient::new(&config.ollama).context("Unable to create Ollama client")?;
    let classifier = Classifier::new(config.classifier.clone(), generator);
    let watermark = Watermark::new(config.watermark_path());

    Ok(match database {
        Some(database) => IngestionPipeline::new(classifier, database, watermark),
        None => IngestionPipeline::new_dry_run(classifier, watermark),
    })
}

/// One mailbox session: connect, run the pipeline, log out.
async fn run_once(config: &Config, pipeline: &Pipeline) -> Result<RunReport> {
    let mut client = ImapClient::connect(&config.imap)
        .await
        .context("Unable to connect to IMAP server")?;

    let report = pipeline.run(&mut client).await;

    if let Err(e) = client.logout().await {
        warn!("IMAP logout failed: {}", e);
    }

    report
}

/// Runs unless another run holds the lock.
async fn guarded_run(config: &Config, pipeline: &Mutex<Pipeline>, trigger: &str) {
    let Ok(pipeline) = pipeline.try_lock() else {
        warn!("⏭️  {} run skipped: previous run still in progress", trigger);
        return;
    };

    info!("⏰ {} run - fetching emails...", trigger);
    match run_once(config, &pipeline).await {
        Ok(report) => info!(
            "✅ {} run finished: {} listed, {} stored, watermark {:?}",
            trigger, report.emails_listed, report.emails_stored, report.watermark_after
        ),
        Err(e) => error!("❌ {} run failed: {:#}", trigger, e),
    }
}

async fn run_daemon_mode(config: Config, dry_run: bool) -> Result<()> {
    use tokio_cron_scheduler::{Job, JobScheduler};

    if config.scheduler.schedule_times.is_empty() {
        error!("❌ No schedule defined (SCHEDULER_TIMES)");
        anyhow::bail!("No schedule defined");
    }

    // The HTTP surface always needs a store to read from
    let database = Database::new(&config.database_path())
        .await
        .context("Unable to initialize summary store")?;

    let pipeline = build_pipeline(&config, (!dry_run).then(|| database.clone()))?;

    let config = Arc::new(config);
    let pipeline = Arc::new(Mutex::new(pipeline));

    // Startup run, before anything is scheduled
    guarded_run(&config, &pipeline, "Startup").await;

    info!("📅 Configured run times: {:?}", config.scheduler.schedule_times);
    let mut scheduler = JobScheduler::new().await?;

    for schedule_time in &config.scheduler.schedule_times {
        let Some((hour, minute)) = parse_schedule_time(schedule_time) else {
            error!("❌ Invalid schedule time: {}. Use the HH:MM format", schedule_time);
            continue;
        };

        // Cron format: "sec min hour * * *" (every day)
        let cron_expr = format!("0 {} {} * * *", minute, hour);
        info!("📆 Adding scheduled job: {} (cron: {})", schedule_time, cron_expr);

        let config = Arc::clone(&config);
        let pipeline = Arc::clone(&pipeline);
        let label = format!("Scheduled ({})", schedule_time);

        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _l| {
            let config = Arc::clone(&config);
            let pipeline = Arc::clone(&pipeline);
            let label = label.clone();
            Box::pin(async move {
                guarded_run(&config, &pipeline, &label).await;
            })
        })?;

        scheduler.add(job).await?;
    }

    scheduler.start().await?;
    info!("✅ Scheduler started");

    let store = database.clone();
    let state = AppState {
        config: Arc::clone(&config),
        database: Arc::new(database),
    };
    info!("⏸️  Press Ctrl+C to stop the daemon");

    let result = tokio::select! {
        result = server::run_server(state) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("👋 Shutting down");
            Ok(())
        }
    };

    if let Err(e) = scheduler.shutdown().await {
        warn!("Scheduler shutdown failed: {}", e);
    }
    store.close().await;
    result
}

fn parse_schedule_time(time: &str) -> Option<(u32, u32)> {
    let (hour, minute) = time.trim().split_once(':')?;
    let hour: u32 = hour.parse().ok()?;
    let minute: u32 = minute.parse().ok()?;
    (hour < 24 && minute < 60).then_some((hour, minute))
}
