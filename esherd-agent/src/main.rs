mod logging;
mod server;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use esherd::config::{Agent, Config};
use esherd::retention::Snapshooter;
use esherd::{Cluster, Drainer, StatsCollector, Throttler, Ticker};
use esherd_aws::{AutoScalingClient, Ec2Instances, EcsServices, SqsQueue};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "esherd")]
#[command(about = "Control loops for Elasticsearch on AWS auto-scaling groups")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = "esherd.toml", env = "ESHERD_CONFIG")]
    config: PathBuf,

    /// Elasticsearch URL; repeat for failover
    #[arg(long = "es-url", global = true, env = "ESHERD_ES_URL", value_delimiter = ',')]
    es_urls: Vec<String>,

    /// AWS region
    #[arg(long, global = true, env = "AWS_REGION")]
    region: Option<String>,

    /// Log intended writes instead of performing them
    #[arg(long, global = true)]
    dry_run: bool,

    /// Log level when RUST_LOG is unset
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    /// Port for the health and metrics endpoints
    #[arg(short, long, global = true)]
    port: Option<u16>,

    #[arg(long, global = true)]
    health_path: Option<String>,

    #[arg(long, global = true)]
    metrics_path: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Plain,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Drain nodes ahead of instance termination
    Drain {
        /// SQS queue receiving the lifecycle and spot events
        #[arg(long)]
        queue_url: Option<String>,

        /// Shard placement polling interval in milliseconds
        #[arg(long)]
        poll_interval_ms: Option<u64>,
    },
    /// Suspend scaling while the cluster is unstable
    Throttle {
        /// Auto Scaling group to manage; repeatable
        #[arg(long = "group")]
        groups: Vec<String>,

        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Publish cluster-wide node statistics
    Stats {
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Take snapshots and prune them on the retention schedule
    Snapshot {
        #[arg(long)]
        repository: Option<String>,

        #[arg(long)]
        interval_ms: Option<u64>,
    },
}

impl Command {
    fn agent(&self) -> Agent {
        match self {
            Command::Drain { .. } => Agent::Drain,
            Command::Throttle { .. } => Agent::Throttle,
            Command::Stats { .. } => Agent::Stats,
            Command::Snapshot { .. } => Agent::Snapshot,
        }
    }
}

/// Flags take precedence over the file
fn apply_overrides(config: &mut Config, args: &Args) -> Result<()> {
    if !args.es_urls.is_empty() {
        config.elasticsearch.urls = args.es_urls.clone();
    }
    if args.region.is_some() {
        config.aws.region = args.region.clone();
    }
    if args.dry_run {
        config.dry_run = true;
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = args.log_format {
        config.logging.format = match format {
            LogFormat::Plain => "plain".to_string(),
            LogFormat::Json => "json".to_string(),
        };
    }
    if let Some(port) = args.port {
        let mut addr: SocketAddr = config
            .server
            .bind_addr
            .parse()
            .with_context(|| format!("invalid bind address {}", config.server.bind_addr))?;
        addr.set_port(port);
        config.server.bind_addr = addr.to_string();
    }
    if let Some(path) = &args.health_path {
        config.server.health_path = path.clone();
    }
    if let Some(path) = &args.metrics_path {
        config.server.metrics_path = path.clone();
    }

    match &args.command {
        Command::Drain {
            queue_url,
            poll_interval_ms,
        } => {
            if let Some(url) = queue_url {
                config.drainer.queue_url = url.clone();
            }
            if let Some(ms) = poll_interval_ms {
                config.drainer.poll_interval_ms = *ms;
            }
        }
        Command::Throttle {
            groups,
            interval_ms,
        } => {
            if !groups.is_empty() {
                config.throttler.groups = groups.clone();
            }
            if let Some(ms) = interval_ms {
                config.throttler.interval_ms = *ms;
            }
        }
        Command::Stats { interval_ms } => {
            if let Some(ms) = interval_ms {
                config.stats.interval_ms = *ms;
            }
        }
        Command::Snapshot {
            repository,
            interval_ms,
        } => {
            if let Some(repository) = repository {
                config.snapshots.repository = repository.clone();
            }
            if let Some(ms) = interval_ms {
                config.snapshots.interval_ms = *ms;
            }
        }
    }
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
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
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn run_agent(config: &Config, agent: Agent, shutdown: watch::Receiver<bool>) -> Result<()> {
    let cluster = Arc::new(Cluster::from_config(&config.elasticsearch)?);
    let sdk = esherd_aws::load_sdk_config(config.aws.region.as_deref()).await;

    match agent {
        Agent::Drain => {
            if config.dry_run {
                tracing::warn!("dry run does not apply to the drainer, draining for real");
            }
            let queue = Arc::new(SqsQueue::new(
                &sdk,
                config.drainer.queue_url.clone(),
                config.drainer.visibility_timeout(),
            ));
            let hooks = Arc::new(AutoScalingClient::new(&sdk));
            let drainer = Arc::new(Drainer::new(cluster, queue, hooks, &config.drainer));
            drainer.run(shutdown).await;
        }
        Agent::Throttle => {
            let t = &config.throttler;
            let mut throttler = Throttler::new(
                cluster,
                Arc::new(AutoScalingClient::new(&sdk)),
                t.groups.clone(),
                t.processes.clone(),
                config.dry_run,
            );
            if let Some((ecs_cluster, service)) = t.ecs_service() {
                throttler =
                    throttler.with_ecs_service(Arc::new(EcsServices::new(&sdk)), ecs_cluster, service);
            }
            throttler
                .run(Ticker::new("throttle", t.interval()), shutdown)
                .await;
        }
        Agent::Stats => {
            let collector = StatsCollector::new(
                cluster,
                Arc::new(Ec2Instances::new(&sdk)),
                config.stats.dimension_pairs(),
            );
            collector
                .run(Ticker::new("stats", config.stats.interval()), shutdown)
                .await;
        }
        Agent::Snapshot => {
            let s = &config.snapshots;
            let snapshooter =
                Snapshooter::new(cluster, s.repository.clone(), s.retention, config.dry_run)?;
            snapshooter
                .run(Ticker::new("snapshot", s.interval()), shutdown)
                .await;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let agent = args.command.agent();

    let mut config = Config::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    apply_overrides(&mut config, &args)?;

    logging::init(&config.logging.level, &config.logging.format)?;
    config
        .validate(agent)
        .with_context(|| format!("invalid configuration for the {} agent", agent.as_str()))?;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("installing Prometheus recorder")?;
    metrics::gauge!("esherd_agent_info", "agent" => agent.as_str(), "version" => env!("CARGO_PKG_VERSION"))
        .set(1.0);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    let addr = config.server.parse_bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    let router = server::router(&config.server.health_path, &config.server.metrics_path, handle);
    let server = tokio::spawn(server::serve(listener, router, shutdown_rx.clone()));

    tracing::info!(
        agent = agent.as_str(),
        addr = %addr,
        dry_run = config.dry_run,
        "esherd starting"
    );

    run_agent(&config, agent, shutdown_rx).await?;

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "health server failed"),
        Err(e) => tracing::error!(error = %e, "health server task failed"),
    }
    tracing::info!("esherd stopped");
    Ok(())
}
