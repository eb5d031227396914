#![warn(
    rust_2024_compatibility,
    clippy::all,
    clippy::future_not_send,
    clippy::mod_module_files,
    clippy::needless_pass_by_ref_mut,
    clippy::unused_async
)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use opentelemetry::{KeyValue, global, trace::TracerProvider};
use opentelemetry_sdk::{resource::Resource, trace as sdktrace};
use rama::{
    Layer as RamaLayer,
    graceful::Shutdown,
    http::{layer::trace::TraceLayer, server::HttpServer},
    layer::ConsumeErrLayer,
    rt::Executor,
    tcp::server::TcpListener,
};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing_subscriber::{
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use edgeway::config::Config;
use edgeway::gateway::EdgeGateway;
use edgeway_adapter::{EdgeCache, MemoryCache};

#[derive(Debug, Parser)]
#[command(version, about = "Edgeway multi-origin edge gateway")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the Edgeway gateway server
    Serve {
        /// Path to the configuration file
        #[arg(long, default_value = "edgeway.toml")]
        config: PathBuf,
    },
    /// Perform a health check against a running Edgeway instance
    Health {
        /// URL of the health endpoint (defaults to local gateway)
        #[arg(long, default_value = "http://127.0.0.1:8402/up")]
        url: String,
        /// Timeout in seconds for the request
        #[arg(long, default_value_t = 5)]
        timeout: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve { config } => run_server(config),
        Command::Health { url, timeout } => run_health(url, timeout),
    }
}

fn run_server(config_path: PathBuf) -> Result<()> {
    let config = Arc::new(Config::load(Some(config_path)).context("loading configuration")?);
    config.validate().context("validating configuration")?;
    init_tracing(&config)?;

    let cache: Arc<dyn EdgeCache> = Arc::new(MemoryCache::new(
        config.cache.max_entries,
        Duration::from_secs(config.cache.default_ttl_secs),
    ));

    // Set up the cache purge scheduler if enabled
    if !config.cache.purge_schedule.is_empty() {
        let cache_clone = cache.clone();
        let schedule = config.cache.purge_schedule.clone();

        // Spawn the scheduler on a dedicated long-lived runtime thread
        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("Failed to create scheduler runtime");

            rt.block_on(async {
                let sched = JobScheduler::new()
                    .await
                    .expect("Failed to create job scheduler");

                let job = Job::new_async(schedule.as_str(), move |_uuid, _l| {
                    let cache = cache_clone.clone();
                    Box::pin(async move {
                        match cache.purge_expired().await {
                            Ok(0) => {}
                            Ok(removed) => {
                                tracing::info!(removed, "purged expired cache entries");
                            }
                            Err(err) => tracing::error!(error = %err, "cache purge failed"),
                        }
                    })
                })
                .expect("Failed to create purge job");

                sched
                    .add(job)
                    .await
                    .expect("Failed to add purge job to scheduler");

                sched.start().await.expect("Failed to start job scheduler");

                tracing::info!(schedule = %schedule, "Cache purge scheduler started");

                // Keep the scheduler runtime alive forever
                loop {
                    tokio::time::sleep(tokio::time::Duration::from_secs(3600)).await;
                }
            });
        });
    }

    let gateway = EdgeGateway::new(config.clone(), cache);

    let rt_server = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.workers)
        .enable_all()
        .build()
        .context("constructing server runtime")?;

    rt_server.block_on(async move {
        let graceful = Shutdown::default();
        let addr = format!("{}:{}", config.server.host, config.server.port);

        tracing::info!(%addr, "starting Edgeway HTTP server");

        graceful.spawn_task_fn(move |guard| {
            let gateway = gateway.clone();
            let addr = addr.clone();
            async move {
                let tcp_service = TcpListener::build()
                    .bind(addr)
                    .await
                    .expect("bind tcp gateway");

                let exec = Executor::graceful(guard.clone());
                let http_service = HttpServer::auto(exec).service(
                    (TraceLayer::new_for_http(), ConsumeErrLayer::default()).into_layer(gateway),
                );

                tcp_service.serve_graceful(guard, http_service).await;
            }
        });

        // Wait for ctrl+c to initiate graceful shutdown
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for shutdown signal");

        graceful
            .shutdown_with_limit(Duration::from_secs(30))
            .await?;

        Ok::<(), anyhow::Error>(())
    })?;

    Ok(())
}

fn run_health(url: String, timeout: u64) -> Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout))
        .build()
        .context("building health check client")?;

    let response = client
        .get(&url)
        .send()
        .context("sending health check request")?;

    if response.status().is_success() {
        println!("Edgeway healthy: {}", response.status());
        Ok(())
    } else {
        bail!("health endpoint returned status {}", response.status());
    }
}

fn init_tracing(config: &Config) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.logging.level))
        .context("building log filter")?;

    let fmt_layer = if config.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_target(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(false).boxed()
    };

    let registry = tracing_subscriber::registry().with(filter).with(fmt_layer);

    if let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        use opentelemetry_otlp::WithExportConfig;

        let resource = Resource::builder_empty()
            .with_attributes([
                KeyValue::new("service.name", "edgeway"),
                KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            ])
            .build();

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(endpoint)
            .build()?;

        let provider = sdktrace::SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(resource)
            .build();

        let tracer = provider.tracer("edgeway");
        global::set_tracer_provider(provider);

        registry
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .try_init()?;
    } else {
        registry.try_init()?;
    }
    Ok(())
}
