//! Serves an AG-UI endpoint that echoes the user's message back word by word.
//!
//! Usage: `echo-agent [config.toml]`. Without a file the configuration comes
//! from `AGUI_*` environment variables.

use std::net::SocketAddr;
use std::sync::Arc;

use sayr_agui::{init_tracing, AguiError, AppConfig, EchoRunner, Result, Server};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::from_env_or_file(path)?,
        None => AppConfig::from_env(),
    };
    init_tracing(&config.logging)?;

    let addr: SocketAddr = config
        .server
        .address()
        .parse()
        .map_err(|err| AguiError::Config(format!("invalid listen address: {err}")))?;
    let server = Server::from_config(Arc::new(EchoRunner), &config)?;
    info!(path = server.path(), "echo agent ready");
    server.serve(addr).await
}
