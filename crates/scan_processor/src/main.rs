mod config;

use common::nats::NatsClient;
use common::telemetry::{init_telemetry, TelemetryConfig};
use config::ServiceConfig;
use scan_runner::Runner;
use scan_worker::domain::{ProcessorBackend, ScanProcessor};
use scan_worker::ScanWorker;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_telemetry(&TelemetryConfig {
        service_name: "scan-processor".to_string(),
        log_level: config.log_level.clone(),
        json: config.log_json,
    }) {
        eprintln!("Failed to initialize telemetry: {}", e);
        std::process::exit(1);
    }

    info!(
        backend = ?config.backend_type,
        concurrency = config.concurrency,
        "Starting scan-processor service"
    );
    debug!("Configuration: {:?}", config);

    let nats_client = match initialize_nats(&config).await {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to initialize NATS: {:#}", e);
            std::process::exit(1);
        }
    };

    // One backend instance shared by every worker
    let backend = Arc::new(ProcessorBackend::from_config(&config.processor_config()));
    let processor: Arc<dyn ScanProcessor> = backend.clone();

    let jetstream = nats_client.create_consumer_client();
    let worker_config = config.worker_config();

    let mut runner = Runner::new();
    for worker_id in 1..=config.concurrency {
        let worker = match ScanWorker::new(
            worker_id,
            Arc::clone(&jetstream),
            Arc::clone(&processor),
            &worker_config,
        )
        .await
        {
            Ok(worker) => worker,
            Err(e) => {
                error!(worker_id, "Failed to initialize scan worker: {:#}", e);
                std::process::exit(1);
            }
        };

        runner = runner.with_app_process(move |ctx| async move { worker.run(ctx).await });
    }

    runner = runner
        .with_closer(move || async move {
            info!("Closing scan processor backend");
            backend.close().await;
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(config.shutdown_timeout_secs));

    runner.run().await;
}

async fn initialize_nats(config: &ServiceConfig) -> anyhow::Result<NatsClient> {
    let startup_timeout = Duration::from_secs(config.startup_timeout_secs);

    let nats_client = tokio::time::timeout(
        startup_timeout,
        NatsClient::connect(&config.nats_url, startup_timeout),
    )
    .await
    .map_err(|_| anyhow::anyhow!("timed out connecting to NATS after {:?}", startup_timeout))??;

    nats_client
        .ensure_stream(&config.nats_stream, &config.nats_subject)
        .await?;

    Ok(nats_client)
}
