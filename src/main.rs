use anyhow::Result;
use clap::{Parser, Subcommand};
use sensor_ops::*;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[derive(Parser, Debug)]
#[command(name = "sensor-ops", version = version::VERSION)]
#[command(about = "Sensor readings maintenance: THI forecast backfill, collection conversion, readings API")]
struct Cli {
    /// TOML config file
    #[arg(long, env = "CONFIG_FILE", default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Predict THI for historical readings and write it back as the forecast field
    Backfill {
        /// Compute and log forecasts without writing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Move the readings collection to an uncapped collection of the same name
    Convert,
    /// List collections and count the readings collection
    Inspect,
    /// Serve the readings API
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let app_config = config::AppConfig::load_from_path(&cli.config)?;

    let store = store::connect(&app_config.store)
        .await
        .map_err(error::OpsError::Connection)?;

    match cli.command {
        Command::Backfill { dry_run } => {
            tracing::info!("loading model artifacts");
            let artifacts = forecast::ForecastArtifacts::load(&app_config.forecast)
                .map_err(error::OpsError::ArtifactLoad)?;
            let settings = backfill::BackfillSettings::from_config(&app_config, dry_run);
            let report = backfill::run_backfill(
                store.as_ref(),
                &artifacts.model,
                &artifacts.scaler,
                artifacts.formula,
                &settings,
            )
            .await?;
            if dry_run {
                for f in &report.forecasts {
                    tracing::info!(id = %f.id, position = f.position, forecast = f.value, "dry run");
                }
            }
            tracing::info!(
                updated = report.updated,
                rejected = report.rejected_records,
                skipped = report.skipped_targets,
                "updated historical readings; refresh the dashboard to see the forecast line"
            );
        }
        Command::Convert => {
            let settings = convert::ConvertSettings::from_config(&app_config);
            match convert::convert_collection(store.as_ref(), &settings).await {
                Ok(outcome) => {
                    tracing::info!(?outcome, "collection converted to a standard collection");
                }
                Err(error::OpsError::EmptyCollection(name)) => {
                    tracing::warn!(collection = %name, "collection is empty, nothing to do");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Inspect => {
            let readings = &app_config.collections.readings;
            let report = inspect::inspect(store.as_ref(), readings).await?;
            inspect::log_report(&report, readings);
        }
        Command::Serve => serve(store, app_config).await?,
    }

    Ok(())
}

async fn serve(
    store: std::sync::Arc<dyn store::DocumentStore>,
    app_config: config::AppConfig,
) -> Result<()> {
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let app = routes::app(store, app_config);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            #[cfg(unix)]
            {
                let mut sigterm = match tokio::signal::unix::signal(
                    tokio::signal::unix::SignalKind::terminate(),
                ) {
                    Ok(s) => s,
                    Err(_) => {
                        let _ = tokio::signal::ctrl_c().await;
                        return;
                    }
                };
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            #[cfg(not(unix))]
            {
                let _ = tokio::signal::ctrl_c().await;
            }
            tracing::info!("Received shutdown signal");
        })
        .await?;
    Ok(())
}
