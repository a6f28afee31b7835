use anyhow::Result;
use clap::Parser;
use gemini_showcase::app::App;
use gemini_showcase::models::Config;
use gemini_showcase::server;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "gemini-showcase")]
#[command(about = "Serve the Gemini travel planner and image Q&A page")]
struct CliArgs {
    /// Address to bind (overrides HOST).
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides PORT).
    #[arg(long, value_parser = parse_port_arg)]
    port: Option<u16>,
}

fn parse_port_arg(input: &str) -> std::result::Result<u16, String> {
    match input.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(format!("Invalid port '{}'. Expected 1-65535", input)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gemini_showcase=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting gemini-showcase");

    let args = CliArgs::parse();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    let app = Arc::new(App::from_config(&config));

    if let Err(e) = server::run_server(app, &config.host, config.port).await {
        error!("Server failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}
