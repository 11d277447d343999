mod chat_command;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "supportbot", about = "Supportbot: customer support over WebSocket")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ./supportbot.toml, then ~/.config/supportbot/).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the WebSocket gateway.
    Gateway {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Start the question classifier.
    Classifier {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Start the tool-using assistant worker.
    Assistant {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Start the general chat worker.
    GeneralChat {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Chat with the gateway from the terminal.
    Chat {
        #[arg(long)]
        uid: i64,
        /// Gateway WebSocket endpoint.
        #[arg(long, default_value = "ws://127.0.0.1:8080/ws")]
        url: String,
    },
    /// Print the built-in tool descriptors as JSON.
    Tools,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    let mut config = supportbot_config::discover_and_load(cli.config.as_deref())?;
    info!(version = env!("CARGO_PKG_VERSION"), "supportbot starting");

    match cli.command {
        Commands::Gateway { bind, port } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(port) = port {
                config.server.gateway_port = port;
            }
            supportbot_gateway::start_gateway(&config).await
        },
        Commands::Classifier { port } => {
            if let Some(port) = port {
                config.server.classifier_port = port;
            }
            supportbot_routing::start_classifier(&config).await
        },
        Commands::Assistant { port } => {
            if let Some(port) = port {
                config.server.assistant_port = port;
            }
            supportbot_workers::start_assistant(&config).await
        },
        Commands::GeneralChat { port } => {
            if let Some(port) = port {
                config.server.general_chat_port = port;
            }
            supportbot_workers::start_general_chat(&config).await
        },
        Commands::Chat { uid, url } => chat_command::run_chat(&url, uid, &config.client).await,
        Commands::Tools => {
            let registry = supportbot_tools::builtin_registry()?;
            println!(
                "{}",
                serde_json::to_string_pretty(&registry.descriptors())?
            );
            Ok(())
        },
    }
}
