//! Taskweave server
//!
//! Loads a task/workflow configuration file and exposes every task and
//! workflow as an MCP tool over STDIO or Server-Sent Events.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use taskweave_mcp::transport::{sse, stdio, StdioTransport};
use taskweave_server::{bootstrap, config::Settings, logging, McpTransport, Result};

#[derive(Parser)]
#[command(name = "taskweave")]
#[command(about = "Configuration-driven MCP server exposing tasks and workflows as tools")]
#[command(version)]
struct Cli {
    /// Task and workflow configuration file (JSON)
    #[arg(long, short)]
    config: PathBuf,

    /// MCP transport
    #[arg(long, value_enum, default_value = "stdio")]
    mode: McpTransport,

    /// Override server host (sse mode)
    #[arg(long)]
    host: Option<String>,

    /// Override server port (sse mode)
    #[arg(long)]
    port: Option<u16>,

    /// Server settings file
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Override log level
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.settings.as_deref())?;
    apply_cli_overrides(&mut settings, &cli);

    let _log_guard = logging::init(&settings.logging)?;

    info!("Starting Taskweave server in {:?} mode", cli.mode);

    let server = bootstrap::load_server(&cli.config, &settings)?;

    match cli.mode {
        McpTransport::Stdio => {
            let mut transport = StdioTransport::new();
            stdio::serve(&server, &mut transport).await?;
        }
        McpTransport::Sse => {
            sse::serve(Arc::new(server), &settings.address(), settings.sse_config()).await?;
        }
    }

    info!("Taskweave server shut down");
    Ok(())
}

fn apply_cli_overrides(settings: &mut Settings, cli: &Cli) {
    if let Some(host) = &cli.host {
        settings.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    if let Some(level) = &cli.log_level {
        settings.logging.level = level.clone();
    }
}
