//! conduit CLI: the main entry point.
//!
//! Commands:
//! - `serve`: Run the runtime behind the HTTP gateway
//! - `send`: Push one message through the pipeline and print the answer
//! - `plugins`: List plugins, executors, and capabilities
//! - `config`: Show, locate, validate, or initialize configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "conduit",
    about = "conduit: plugin pipeline agent runtime",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the runtime and the HTTP gateway
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send a single message and print the response
    Send {
        #[arg(short, long)]
        message: String,

        /// Attach the message to an existing conversation
        #[arg(short, long)]
        conversation: Option<String>,
    },

    /// List registered plugins and capabilities
    Plugins,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: Option<commands::config_cmd::ConfigAction>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Send {
            message,
            conversation,
        } => commands::send::run(message, conversation).await?,
        Commands::Plugins => commands::plugins::run().await?,
        Commands::Config { action } => commands::config_cmd::run(action).await?,
    }

    Ok(())
}
