use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use fastzap_config::FastzapConfig;

#[derive(Parser)]
#[command(name = "fastzap", about = "Multi-session WhatsApp gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
    /// Config file to load instead of searching the default locations.
    #[arg(long, global = true, env = "FASTZAP_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the sessions API (the default).
    Gateway,
    /// Print the effective configuration as TOML, with the API token hidden.
    Config,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Config file (or discovered defaults) plus environment, then CLI flags.
fn resolve_config(cli: &Cli) -> anyhow::Result<FastzapConfig> {
    let mut config = match cli.config.as_deref() {
        Some(path) => {
            let mut config = fastzap_config::load_config(path)?;
            fastzap_config::apply_env_overrides(&mut config);
            config
        },
        None => fastzap_config::discover_and_load(),
    };
    if let Some(bind) = &cli.bind {
        config.server.bind.clone_from(bind);
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    let mut config = resolve_config(&cli)?;
    match cli.command {
        Some(Commands::Config) => {
            if config.auth.token.take().is_some() {
                info!("api token is set (omitted below)");
            }
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        },
        None | Some(Commands::Gateway) => {
            info!(version = env!("CARGO_PKG_VERSION"), "fastzap starting");
            fastzap_gateway::start_gateway(config).await
        },
    }
}
