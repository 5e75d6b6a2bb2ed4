//! Chatloom CLI entry point.
//!
//! Commands:
//! - `init`    - Write a default config file
//! - `chat`    - Interactive chat or single-message mode
//! - `serve`   - Start the HTTP gateway with the browser frontend
//! - `threads` - List stored conversation threads

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "chatloom",
    about = "Chatloom - conversational agent with tools and persistent threads",
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
    /// Write a default config file
    Init,

    /// Chat with the agent from the terminal
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Thread to continue; a new one is created when omitted
        #[arg(short, long)]
        thread: Option<String>,
    },

    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List stored conversation threads
    Threads,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init => commands::init::run().await?,
        Commands::Chat { message, thread } => commands::chat::run(message, thread).await?,
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Threads => commands::threads::run().await?,
    }

    Ok(())
}
