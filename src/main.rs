//! Service entrypoint: configuration, component wiring, task spawning, and
//! graceful shutdown.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use faxtriage::api::{self, ApiContext};
use faxtriage::classify::LlmClassifier;
use faxtriage::config::{self, AppConfig};
use faxtriage::fetch::{FaxSource, HttpFaxFetcher};
use faxtriage::notify::EmailNotifier;
use faxtriage::ocr::HttpTextExtractor;
use faxtriage::pipeline::{
    fax_queue, spawn_retention_sweeper, spawn_worker, FaxPipeline, StagingArea,
};
use faxtriage::poller::spawn_poller;
use faxtriage::redact::{HttpPhiRedactor, PhiRedactor};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration, refusing to start");
            std::process::exit(1);
        }
    };

    let staging = StagingArea::new(config.staging_dir.clone());
    if let Err(e) = staging.ensure_dir() {
        tracing::error!(dir = %staging.dir().display(), error = %e, "Cannot create staging directory");
        std::process::exit(1);
    }

    let provider = Arc::new(HttpFaxFetcher::new(&config.provider));
    let redactor: Option<Arc<dyn PhiRedactor>> = if config.redaction.enabled {
        config
            .redaction
            .endpoint
            .as_deref()
            .map(|endpoint| Arc::new(HttpPhiRedactor::new(endpoint)) as Arc<dyn PhiRedactor>)
    } else {
        None
    };
    tracing::info!(
        redaction = config.redaction.enabled,
        sender_mappings = config.sender_map.len(),
        categories = config.classifier.categories.len(),
        "Pipeline configured"
    );

    let pipeline = Arc::new(FaxPipeline::new(
        Arc::new(config.sender_map.clone()),
        staging.clone(),
        provider.clone(),
        Arc::new(HttpTextExtractor::new(&config.ocr_endpoint)),
        redactor,
        Arc::new(LlmClassifier::new(config.classifier.clone())),
        Arc::new(EmailNotifier::new(config.mail.clone())),
        config.classifier.default_label.clone(),
    ));

    let (queue, receiver) = fax_queue();
    let worker = spawn_worker(pipeline, receiver);
    let poller = spawn_poller(provider as Arc<dyn FaxSource>, queue, config.poll_interval);
    let sweeper = spawn_retention_sweeper(staging, config.staging_retention, config.sweep_interval);

    let api_ctx = ApiContext { worker_running: worker.running_flag() };
    let health_port = config.health_port;
    let health = tokio::spawn(async move {
        if let Err(e) = api::serve(api_ctx, health_port).await {
            tracing::error!(error = %e, "Health server failed");
        }
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Cannot listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received, draining pipeline");

    // Stop discovery first so nothing new lands in the queue, then let the
    // worker finish the backlog and the in-flight fax.
    poller.abort();
    sweeper.abort();
    worker.drain();
    worker.join().await;
    health.abort();

    tracing::info!("Faxtriage stopped");
}
