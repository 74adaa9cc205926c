use anyhow::Context;
use clap::Parser;
use funil_core::{Campaign, CampaignStore, FunilConfig, GenerationParams};
use funil_engine::{Engine, MemoryCampaignStore, MemoryStateStore};
use funil_gateway::{BroadcastRealtime, GatewayServer};
use funil_llm::GeminiClient;
use funil_waha::WahaClient;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "funil.toml")]
    config: String,

    /// Directory of campaign definition files (*.json)
    #[arg(long, default_value = "campaigns")]
    campaigns: String,

    /// Override the bind host
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port
    #[arg(long)]
    port: Option<u16>,
}

/// Load and publish every campaign definition in the directory.
async fn load_campaigns(dir: &Path, store: &MemoryCampaignStore) -> anyhow::Result<usize> {
    let mut loaded = 0;
    if !dir.is_dir() {
        warn!("Campaign directory {} not found; starting empty", dir.display());
        return Ok(0);
    }
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_none_or(|ext| ext != "json") {
            continue;
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let campaign: Campaign = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse campaign {}", path.display()))?;
        for defect in campaign.graph.validate() {
            warn!("{}: {}", campaign.name, defect);
        }
        info!(
            "Loaded campaign '{}' ({:?}) on session '{}'",
            campaign.name, campaign.status, campaign.session_name
        );
        store.upsert(campaign).await?;
        loaded += 1;
    }
    Ok(loaded)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    info!("Loading config from {}...", args.config);
    let mut config = FunilConfig::load_or_default(&args.config);
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let campaigns = Arc::new(MemoryCampaignStore::new());
    let count = load_campaigns(Path::new(&args.campaigns), &campaigns).await?;
    info!("{} campaign(s) loaded", count);

    let states = Arc::new(MemoryStateStore::new());
    let transport = Arc::new(WahaClient::new(
        &config.waha.base_url,
        config.waha.api_key.clone(),
    )?);
    let model = Arc::new(GeminiClient::new(&config.llm)?);
    let (realtime, events_tx) = BroadcastRealtime::channel(256);

    let engine = Arc::new(Engine::new(
        campaigns,
        states,
        transport,
        model,
        Arc::new(realtime),
        config.engine.clone(),
        GenerationParams {
            max_tokens: config.llm.max_tokens,
            temperature: config.llm.temperature,
        },
    ));
    engine.router().rebuild().await?;

    let server = GatewayServer::new(
        engine,
        events_tx,
        &config.server.host,
        config.server.port,
    );
    let handle = server.start();

    info!("Funil online. Ctrl-C to stop.");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down.");
    handle.abort();
    Ok(())
}
