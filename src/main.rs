//! Gambit - realtime chess match engine server.

use clap::Parser;
use gambit::api::ApiServer;
use gambit::auth::StaticTokenAuth;
use gambit::bot::ScriptedOracle;
use gambit::config::ConfigLoader;
use gambit::store::InMemoryStore;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "gambit")]
#[command(about = "Realtime chess match engine")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = args.config {
        loader = loader.with_path(path);
    }
    let mut config = loader.load()?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let store = Arc::new(InMemoryStore::new());
    let auth = Arc::new(StaticTokenAuth::new(config.auth.tokens.clone()));
    let oracle = Arc::new(ScriptedOracle::new());

    ApiServer::new(config, store, auth, oracle).run().await
}
