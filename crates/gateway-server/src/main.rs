use std::path::PathBuf;

use clap::Parser;
use gateway_server::config::GatewayConfig;
use gateway_server::logging::init_logging;
use gateway_server::server::run_server;

#[derive(Parser, Debug, Clone)]
#[command(name = "gateway-server")]
#[command(about = "Resilient streaming inference gateway")]
#[command(version)]
struct Cli {
    /// Enable debug mode
    #[arg(long, env = "DEBUG", default_value = "false")]
    debug: bool,

    /// Server port
    #[arg(long, env = "PORT", default_value = "8081")]
    port: u16,

    /// JSON or TOML configuration file
    #[arg(long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (overrides debug flag)
    #[arg(long, env = "RUST_LOG")]
    log_level: Option<String>,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.log_level.is_some() {
        env_logger::init();
    } else {
        init_logging(cli.debug);
    }

    let config = GatewayConfig::load(cli.config.as_deref())?;

    log::info!("Starting gateway on port {}", cli.port);
    log::info!("Upstream: {} ({})", config.upstream.base_url, config.upstream.model);
    log::info!(
        "Limits: global {} tokens, session {} tokens, context window {}",
        config.global_token_limit,
        config.session_token_limit,
        config.context_window_size
    );
    if cli.debug {
        log::debug!("Breaker: {:?}", config.breaker_config());
        log::debug!("Framing: {:?}", config.framing_mode());
    }

    run_server(config, cli.port).await?;
    Ok(())
}
