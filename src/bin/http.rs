//! REGON MCP HTTP Server
//!
//! Run with: regon-mcp-http --port 8000

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::lookup_host;

use regon_mcp::config::{init_logging, ServerArgs, ToolConfigLoader};
use regon_mcp::mcp::ToolCatalog;
use regon_mcp::upstream::BirClient;
use regon_mcp::{Dispatcher, ServerContext};

#[derive(Parser, Debug)]
#[command(name = "regon-mcp-http")]
#[command(about = "REGON MCP server for the Polish business registry (HTTP/REST)")]
struct Args {
    #[command(flatten)]
    server: ServerArgs,

    /// Host to bind
    #[arg(long, env = "REGON_HTTP_HOST", default_value = "localhost")]
    host: String,

    /// Port to bind
    #[arg(
        long,
        env = "REGON_HTTP_PORT",
        default_value = "8000",
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.server.log_level, args.server.log_format);

    let config = args.server.into_config()?;
    tracing::info!(
        mode = %config.mode,
        tools_config = config.tools_config.as_deref().unwrap_or("builtin"),
        "Starting REGON MCP HTTP server"
    );

    let loader = ToolConfigLoader::new(&config.config_dir);
    let catalog = ToolCatalog::resolve(&loader, config.tools_config.as_deref());
    let client = BirClient::new(config.mode.environment(), config.timeout)?;
    let dispatcher = Arc::new(Dispatcher::new(ServerContext::new(
        &config,
        Arc::new(client),
        catalog,
    )));

    if let Err(e) = dispatcher.ensure_initialized().await {
        tracing::warn!("REGON API connection failed during startup: {}", e);
    }

    let addr: SocketAddr = lookup_host((args.host.as_str(), args.port))
        .await
        .with_context(|| format!("Failed to resolve {}:{}", args.host, args.port))?
        .next()
        .with_context(|| format!("No address for {}:{}", args.host, args.port))?;

    let app = regon_mcp::http::router(dispatcher);
    regon_mcp::http::serve(app, addr, shutdown_signal()).await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
