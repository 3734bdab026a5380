use clap::Parser;
use client::api::{GameApi, HttpGameApi};
use client::app::Client;
use client::config::SyncConfig;
use client::mock_api::MockGameApi;
use client::session::SessionContext;
use client::terrain::TerrainConfig;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Game server base URL
    #[arg(short = 's', long)]
    server: Option<String>,

    /// Player to control
    #[arg(short = 'p', long)]
    player_id: Option<u32>,

    /// JSON configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// JSON terrain map exported from the editor
    #[arg(short = 't', long)]
    terrain: Option<PathBuf>,

    /// Minimum delay between move submissions
    #[arg(long)]
    cooldown_ms: Option<u64>,

    /// Play against an in-process simulated server
    #[arg(long)]
    offline: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SyncConfig::load(path)?,
        None => SyncConfig::default(),
    };
    if let Some(server) = args.server {
        config.server_url = server;
    }
    if let Some(player_id) = args.player_id {
        config.player_id = player_id;
    }
    if let Some(cooldown_ms) = args.cooldown_ms {
        config.move_cooldown_ms = cooldown_ms;
    }
    config.validate()?;

    let file_terrain = match &args.terrain {
        Some(path) => Some(TerrainConfig::load(path)?),
        None => None,
    };

    let (api, terrain): (Arc<dyn GameApi>, TerrainConfig) = if args.offline {
        info!("Starting offline world for player {}", config.player_id);
        let (mock, demo_terrain) = MockGameApi::demo(config.grid_size, config.player_id);
        let api: Arc<dyn GameApi> = Arc::new(mock);
        (api, file_terrain.unwrap_or(demo_terrain))
    } else {
        info!("Connecting to: {}", config.server_url);
        if file_terrain.is_none() {
            warn!("No terrain map given; terrain fills in as tiles are fetched");
        }
        let api: Arc<dyn GameApi> =
            Arc::new(HttpGameApi::new(&config.server_url, config.request_timeout())?);
        (api, file_terrain.unwrap_or_default())
    };

    info!(
        "Move cooldown {}ms, polling {} tiles every {}ms",
        config.move_cooldown_ms, config.batch_size, config.poll_interval_ms
    );

    let session = SessionContext::bootstrap(config, api, &terrain).await?;
    let mut client = Client::new(session);

    client.run().await?;

    Ok(())
}
