//! REGON MCP Server (stdio)
//!
//! Run with: regon-mcp-server

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use regon_mcp::config::{init_logging, ServerArgs, ToolConfigLoader};
use regon_mcp::mcp::{McpServer, ToolCatalog};
use regon_mcp::upstream::BirClient;
use regon_mcp::{Dispatcher, ServerContext};

/// Transport restarts after an I/O failure before giving up
const MAX_RESTARTS: u32 = 3;

#[derive(Parser, Debug)]
#[command(name = "regon-mcp-server")]
#[command(about = "REGON MCP server for the Polish business registry (stdio)")]
struct Args {
    #[command(flatten)]
    server: ServerArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logging goes to stderr; stdout is for MCP protocol
    init_logging(args.server.log_level, args.server.log_format);

    let config = args.server.into_config()?;
    tracing::info!(
        mode = %config.mode,
        tools_config = config.tools_config.as_deref().unwrap_or("builtin"),
        "Starting REGON MCP server"
    );

    let loader = ToolConfigLoader::new(&config.config_dir);
    let catalog = ToolCatalog::resolve(&loader, config.tools_config.as_deref());
    let client = BirClient::new(config.mode.environment(), config.timeout)?;

    let ctx = ServerContext::new(&config, Arc::new(client), catalog);
    let dispatcher = Dispatcher::new(ctx);

    match dispatcher.ensure_initialized().await {
        Ok(()) => {
            tracing::info!("REGON API connection established");
            let report = dispatcher.health().report().await;
            tracing::info!(
                status = ?report.status,
                "Health checks: {} components checked",
                report.checks.len()
            );
        }
        Err(e) => {
            tracing::warn!("REGON API connection failed during startup: {}", e);
            tracing::info!("Server will continue, but REGON API calls may fail");
        }
    }

    let server = McpServer::new(dispatcher);
    let mut restarts = 0;

    loop {
        tracing::info!("MCP server running on stdio");
        let outcome = tokio::select! {
            result = server.run() => result,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Server stopped by signal");
                return Ok(());
            }
        };

        match outcome {
            Ok(()) => {
                tracing::info!("Server shut down normally");
                return Ok(());
            }
            Err(e) => {
                restarts += 1;
                tracing::error!("Server error (restart {}/{}): {}", restarts, MAX_RESTARTS, e);
                if restarts >= MAX_RESTARTS {
                    tracing::error!("Maximum restarts reached, shutting down");
                    return Err(e.into());
                }
                let wait = Duration::from_secs(u64::from(5 * restarts).min(30));
                tracing::info!("Restarting in {:?}", wait);
                tokio::time::sleep(wait).await;
            }
        }
    }
}
