use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use weather_pipeline::config::{default_locations, Config};
use weather_pipeline::geocoder::{Geocoder, LocationSpec};
use weather_pipeline::services::PipelineService;
use weather_pipeline::summary::SummaryClient;
use weather_pipeline::weather::{Mode, WeatherFetcher};

#[derive(Parser)]
#[command(name = "weather-pipeline")]
#[command(about = "Hourly weather ingestion and aggregation pipeline", long_about = None)]
struct Cli {
    /// Run mode: 'history' (24h backfill window) or 'forecast' (next hour, for cron)
    #[arg(long)]
    mode: String,

    /// Location to ingest, as 'City, State' or a free-form place name.
    /// Can be repeated; defaults to the built-in location list when omitted.
    #[arg(long)]
    location: Vec<String>,

    /// Execute the full pipeline but skip the raw insert and analytics merge
    #[arg(long)]
    dry_run: bool,

    /// Database connection string
    #[arg(long, env)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if it exists (ignore errors if not found)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,weather_pipeline=debug")),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let cli = Cli::parse();
    let mode = match cli.mode.as_str() {
        "history" => Mode::History,
        "forecast" => Mode::Forecast,
        other => {
            return Err(format!("Unknown mode '{other}', expected 'history' or 'forecast'").into())
        }
    };

    let config = Config::from_env();
    info!("Starting weather pipeline in {} mode", mode.as_str());

    let locations: Vec<LocationSpec> = if cli.location.is_empty() {
        default_locations()
    } else {
        cli.location
            .iter()
            .map(|raw| LocationSpec::parse(raw))
            .collect()
    };
    info!("Ingesting {} locations", locations.len());

    // A dry run never issues a query, so the lazy pool needs no reachable
    // database behind it.
    let database_url = match (cli.database_url.or(config.database_url.clone()), cli.dry_run) {
        (Some(url), _) => url,
        (None, true) => "postgres://localhost/weather".to_string(),
        (None, false) => {
            return Err("DATABASE_URL must be set unless --dry-run is given".into());
        }
    };
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect_lazy(&database_url)?;

    if !cli.dry_run {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Database migrations completed");
    }

    let geocoder = Geocoder::with_base_url(config.geocoder_url.clone());
    let weather = WeatherFetcher::with_base_url(config.weather_url.clone());
    let summarizer = config
        .anthropic_api_key
        .clone()
        .map(|key| SummaryClient::new(key, config.summary_model.clone()));
    if summarizer.is_none() {
        info!("ANTHROPIC_API_KEY not set; aggregates will be merged without summaries");
    }

    let service = PipelineService::new(pool, geocoder, weather, summarizer);
    let report = service.run(mode, &locations, cli.dry_run).await?;

    for outcome in &report.succeeded {
        info!(
            "{}: {} grid points, {} observations",
            outcome.label, outcome.grid_points, outcome.observations
        );
    }
    for failure in &report.failed {
        warn!("{}: {}", failure.label, failure.error);
    }
    info!(
        "Computed {} hourly aggregates ({})",
        report.aggregates.len(),
        if report.merged { "merged" } else { "not merged" }
    );

    if report.succeeded.is_empty() && !report.failed.is_empty() {
        error!("All locations failed");
        std::process::exit(1);
    }

    Ok(())
}
