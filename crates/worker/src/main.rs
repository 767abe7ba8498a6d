use std::sync::Arc;

use crackx_pipeline::config::{LogFormat, WorkerConfig};
use crackx_pipeline::detector::HttpDetector;
use crackx_pipeline::driver::{DriverSettings, PollingDriver};
use crackx_pipeline::fetcher::HttpVideoFetcher;
use crackx_pipeline::sampler::FfmpegFrameSampler;
use crackx_pipeline::scratch::ScratchDir;
use crackx_pipeline::store::PgReportStore;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "crackx_worker=info,crackx_pipeline=info".into());
    match LogFormat::from_env() {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    // --- Configuration ---
    let config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid worker configuration");
            std::process::exit(1);
        }
    };
    tracing::info!(
        detector_url = %config.detector_url,
        scratch_dir = %config.scratch_dir.display(),
        "Loaded worker configuration"
    );

    // --- Database ---
    let pool = match crackx_db::create_pool(&config.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database");
            std::process::exit(1);
        }
    };
    if let Err(e) = crackx_db::health_check(&pool).await {
        tracing::error!(error = %e, "Database health check failed");
        std::process::exit(1);
    }
    tracing::info!("Database health check passed");

    if let Err(e) = crackx_db::run_migrations(&pool).await {
        tracing::error!(error = %e, "Failed to run database migrations");
        std::process::exit(1);
    }
    tracing::info!("Database migrations applied");

    // --- Pipeline adapters ---
    let scratch = ScratchDir::new(&config.scratch_dir);
    if let Err(e) = scratch.ensure().await {
        tracing::error!(error = %e, path = %scratch.root().display(), "Failed to create scratch directory");
        std::process::exit(1);
    }

    let detector = match HttpDetector::new(
        &config.detector_url,
        config.detect_timeout,
        config.min_confidence,
    ) {
        Ok(detector) => detector,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build detection client");
            std::process::exit(1);
        }
    };
    let fetcher = match HttpVideoFetcher::new(
        scratch.clone(),
        config.fetch_timeout,
        config.max_video_bytes,
    ) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build download client");
            std::process::exit(1);
        }
    };

    let driver = PollingDriver::new(
        Arc::new(PgReportStore::new(pool.clone())),
        Arc::new(fetcher),
        Arc::new(FfmpegFrameSampler::new(config.max_sampled_frames)),
        Arc::new(detector),
        scratch,
        DriverSettings::from(&config),
    );

    // --- Shutdown ---
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    driver.run(cancel).await;

    pool.close().await;
    tracing::info!("Worker shut down");
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), finishing current report and stopping");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, finishing current report and stopping");
        }
    }
}
