// Telemetry edge agent: one process per vehicle, parameterised by VIN.

use std::env;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info};

use telemetry_agent::agent::Agent;
use telemetry_agent::buffer::{buffer_path, BufferStore};
use telemetry_agent::constants::DEFAULT_INGEST_URL;
use telemetry_agent::link;
use telemetry_agent::source::{resolve_data_dir, resolve_source_path, SampleSource};
use telemetry_agent::transport::HttpTransport;
use telemetry_core::predictor::{Predictor, PredictorConfig};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let vin = match env::args().nth(1).or_else(|| env::var("TELEMETRY_VIN").ok()) {
        Some(vin) if !vin.is_empty() => vin,
        _ => {
            error!("no VIN supplied; pass it as the first argument or TELEMETRY_VIN");
            return ExitCode::FAILURE;
        }
    };

    let ingest_url = env::var("INGEST_URL").unwrap_or_else(|_| DEFAULT_INGEST_URL.to_string());
    let data_dir = resolve_data_dir();

    let source_path = match resolve_source_path(&data_dir, &vin) {
        Some(path) => path,
        None => {
            error!(vin = %vin, data_dir = %data_dir.display(), "no drive log found");
            return ExitCode::FAILURE;
        }
    };
    let mut source = match SampleSource::open(&source_path).await {
        Ok(source) => source,
        Err(err) => {
            error!(path = %source_path.display(), ?err, "failed to open drive log");
            return ExitCode::FAILURE;
        }
    };

    let db_path = buffer_path(&data_dir, &vin);
    let buffer = match BufferStore::open(&db_path) {
        Ok(buffer) => buffer,
        Err(err) => {
            error!(path = %db_path.display(), ?err, "failed to open buffer store");
            return ExitCode::FAILURE;
        }
    };

    let link_online = Arc::new(AtomicBool::new(true));
    tokio::spawn(link::watch_stdin_toggle(link_online.clone()));

    let transport = HttpTransport::new(&ingest_url, &vin);
    let predictor = Predictor::new(PredictorConfig::default(), Instant::now());
    let agent = match Agent::new(vin.clone(), predictor, buffer, transport, link_online) {
        Ok(agent) => agent,
        Err(err) => {
            error!(?err, "failed to initialise agent state");
            return ExitCode::FAILURE;
        }
    };

    info!(
        vin = %vin,
        source = %source_path.display(),
        buffer = %db_path.display(),
        ingest = %ingest_url,
        "agent started"
    );
    agent.run(&mut source).await;
    ExitCode::SUCCESS
}
