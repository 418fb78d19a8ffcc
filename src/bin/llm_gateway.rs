//! llm-gateway — 统一 LLM 网关服务
//!
//! Usage:
//!   llm-gateway [--config <file>] [serve]     Run the HTTP gateway
//!   llm-gateway [--config <file>] check       Validate configuration and exit
//!   llm-gateway hash-key <key>                Print the key_sha256 for an API key

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use llm_gateway::config::GatewayConfig;
use llm_gateway::gateway::builder_from_config;
use llm_gateway::identity::hash_token;
use llm_gateway::store::{KvStore, MemoryStore, RedisStore};
use llm_gateway::telemetry::BackgroundQueue;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "llm-gateway", version)]
#[command(about = "Unified chat-completion gateway for OpenAI, Anthropic and Gemini", long_about = None)]
struct Cli {
    /// YAML configuration file; environment variables override it
    #[arg(short, long, value_name = "FILE", env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve,

    /// Validate configuration and print a summary
    Check,

    /// Print the SHA-256 digest to store as `key_sha256`
    #[command(name = "hash-key")]
    HashKey {
        #[arg(value_name = "KEY")]
        key: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::HashKey { key }) = &cli.command {
        println!("{}", hash_token(key));
        return Ok(());
    }

    let config = load_config(cli.config.as_deref(), std::io::stderr)
        .context("Failed to load configuration")?;
    init_logging(&config.logging.level, &config.logging.format)?;

    match cli.command {
        Some(Commands::Check) => {
            let providers: Vec<&str> = config
                .providers
                .configured()
                .into_iter()
                .map(|p| p.as_str())
                .collect();
            println!("configuration OK");
            println!("  listen:    {}", config.bind_addr());
            println!("  providers: {}", providers.join(", "));
            println!("  api keys:  {}", config.api_keys.len());
            println!(
                "  store:     {}",
                if config.store.redis_url.is_some() { "redis" } else { "memory" }
            );
            Ok(())
        }
        Some(Commands::Serve) | None => serve(config).await,
        Some(Commands::HashKey { .. }) => Ok(()),
    }
}

async fn serve(config: GatewayConfig) -> Result<()> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "llm-gateway starting");

    let store: Arc<dyn KvStore> = match config.store.redis_url.as_deref() {
        Some(url) => {
            let store = RedisStore::connect(url)
                .await
                .context("Failed to connect to Redis")?;
            store.ping().await.context("Redis did not answer PING")?;
            tracing::info!("connected to redis");
            Arc::new(store)
        }
        None => {
            tracing::warn!("REDIS_URL not set, using in-process store; cache and rate limits are not shared between replicas");
            Arc::new(MemoryStore::new())
        }
    };

    let (queue, worker) = BackgroundQueue::start();
    let gateway = builder_from_config(&config, store, queue.clone())
        .context("Failed to build gateway")?
        .build();

    let app = llm_gateway::server::router(gateway);
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(addr = %addr, "listening (health: /health, api: /v1/chat/completions)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("draining background jobs");
    queue.flush().await;
    drop(queue);
    let _ = tokio::time::timeout(std::time::Duration::from_secs(10), worker).await;
    tracing::info!("llm-gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

/// Loads configuration under a warn-level subscriber, since the configured
/// one does not exist yet and loader warnings would otherwise be lost.
fn load_config<W>(path: Option<&Path>, writer: W) -> llm_gateway::Result<GatewayConfig>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("warn"))
        .with_writer(writer)
        .with_ansi(false)
        .finish();
    tracing::subscriber::with_default(bootstrap, || GatewayConfig::load(path))
}

fn init_logging(level: &str, format: &str) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()?;
        }
        "pretty" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()?;
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().compact())
                .try_init()?;
        }
    }

    Ok(())
}
