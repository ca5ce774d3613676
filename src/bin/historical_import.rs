use std::time::Instant;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

use turbine_telemetry_service::config::ImportConfig;
use turbine_telemetry_service::db::{connect, ReadingRepository};
use turbine_telemetry_service::historian::HistorianClient;
use turbine_telemetry_service::orchestrator::{ImportOptions, ImportOrchestrator};
use turbine_telemetry_service::stats::ImportStats;
use turbine_telemetry_service::utils::parse_cli_timestamp;

#[derive(Parser)]
#[command(name = "historical-import")]
#[command(about = "Import historical unit telemetry from the plant historian", long_about = None)]
struct Cli {
    /// Database connection string
    #[arg(long, env)]
    database_url: String,

    /// Import range start (YYYY-MM-DD[THH:MM:SS]); defaults to the resume
    /// point (latest persisted timestamp plus one sample interval)
    start: Option<String>,

    /// Import range end; defaults to now
    end: Option<String>,

    /// Ignore the resume point and the completeness skip logic
    #[arg(long)]
    force: bool,

    /// Repair gap runs of null-bearing rows instead of importing a range
    #[arg(long)]
    fix_nulls: bool,

    /// Chunk size in days (overrides CHUNK_DAYS)
    #[arg(long)]
    chunk_days: Option<i64>,

    /// Device discriminator written to imported rows (overrides DEVICE_ID)
    #[arg(long)]
    device_id: Option<String>,

    /// Skip confirmation prompt
    #[arg(short = 'y', long)]
    yes: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if it exists (ignore errors if not found)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = ImportConfig::from_env().map_err(|e| {
        format!("missing configuration (HISTORIAN_URL and HISTORIAN_API_KEY required): {e}")
    })?;
    if let Some(chunk_days) = cli.chunk_days {
        config.chunk_days = chunk_days;
    }
    if let Some(device_id) = cli.device_id.clone() {
        config.device_id = Some(device_id);
    }

    let start = cli.start.as_deref().map(parse_cli_timestamp).transpose()?;
    let end = cli.end.as_deref().map(parse_cli_timestamp).transpose()?;

    let opts = ImportOptions {
        start,
        end,
        force: cli.force,
        fix_nulls: cli.fix_nulls,
    };

    // Confirmation prompt
    if !cli.yes {
        if opts.fix_nulls {
            println!("\n⚠️  This will re-fetch and repair null gap runs in the database.");
        } else {
            println!("\n⚠️  This will import historical data into the database.");
            println!(
                "Range: {} to {}",
                start.map_or_else(|| "resume point".to_string(), |s| s.to_string()),
                end.map_or_else(|| "now".to_string(), |e| e.to_string())
            );
            if opts.force {
                println!("Force: resume and skip logic disabled");
            }
        }
        println!("\nContinue? [y/N]: ");

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Import cancelled.");
            return Ok(());
        }
    }

    let pool = connect(&cli.database_url).await?;
    let repo = ReadingRepository::new(pool.clone());
    let client = HistorianClient::new(&config);
    let orchestrator = ImportOrchestrator::new(client, repo, config);

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(if opts.fix_nulls {
        "Repairing null gap runs...".to_string()
    } else {
        "Importing historical telemetry...".to_string()
    });
    pb.enable_steady_tick(std::time::Duration::from_millis(120));

    let started = Instant::now();
    let mut stats = ImportStats::default();
    let result = orchestrator.run(&opts, &mut stats).await;

    // The pool spans the whole run; release it on every exit path before the
    // final report.
    pool.close().await;

    match result {
        Ok(()) => {
            pb.finish_with_message("✓ Import complete");
            stats.print_summary(started.elapsed());
            info!("Import completed successfully!");
            Ok(())
        }
        Err(e) => {
            pb.finish_with_message("✗ Import aborted");
            stats.print_summary(started.elapsed());
            error!("Import aborted: {e}");
            Err(e.into())
        }
    }
}
