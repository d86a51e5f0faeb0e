use std::path::PathBuf;

use dni_capture::camera::CameraSource;
use dni_capture::controller::{CaptureRunner, SessionOutcome, Timing};
use dni_capture::detect::EdgeDensityDetector;
use dni_capture::upload::OcrClient;
use dni_capture_common::config::Config;
use dni_capture_common::handoff::{take_extracted, MemoryStore};
use dni_capture_form::ReviewForm;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        camera_mode = config.camera.mode,
        camera_url = config.camera.url,
        backend = config.upload.base_url,
        "starting dni-capture"
    );

    let client = match OcrClient::new(&config.upload) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to create backend client");
            std::process::exit(1);
        }
    };

    match client.health().await {
        Ok(health) if health.is_ok() => info!(
            status = health.status,
            version = health.version.as_deref(),
            "backend is up"
        ),
        Ok(health) => warn!(status = health.status, "backend reports a degraded status"),
        Err(e) => warn!(error = %e, "backend health check failed, continuing anyway"),
    }

    let camera = match CameraSource::from_config(&config.camera) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "invalid camera configuration");
            std::process::exit(1);
        }
    };

    let (close_tx, close_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, closing camera");
            let _ = close_tx.send(true);
        }
    });

    let store = MemoryStore::new();
    let mut runner = CaptureRunner::new(
        camera,
        client,
        EdgeDensityDetector::from_config(&config.detection),
        config.detection.confirm_frames,
        Timing::from_config(&config.detection, &config.upload),
    );

    match runner.run(&store, close_rx).await {
        SessionOutcome::Completed => {}
        SessionOutcome::Closed => {
            info!("camera closed, nothing captured");
            return;
        }
        SessionOutcome::Failed(failure) => {
            eprintln!("❌ {}\n\nPor favor, inténtelo nuevamente.", failure.message);
            std::process::exit(1);
        }
    }

    let datos = match take_extracted(&store) {
        Ok(Some(datos)) => datos,
        Ok(None) => {
            error!("capture completed but nothing was handed off");
            std::process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "failed to read extracted data");
            std::process::exit(1);
        }
    };

    let mut form = ReviewForm::new(chrono::Local::now().naive_local());
    form.populate(&datos);

    match serde_json::to_string_pretty(&form.submit()) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            error!(error = %e, "failed to serialize form submission");
            std::process::exit(1);
        }
    }
}
