// avatalk command line interface
// Talk to a streaming avatar that answers from a question-answering service

use anyhow::Context;
use avatalk_cli::ask::{self, AskOutcome};
use avatalk_cli::console::Console;
use avatalk_cli::{logging, token_server};
use avatalk_core::{AvatalkConfig, Credential};
use avatalk_session::{HttpAnswerService, ReplyExtractorChain};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "avatalk")]
#[command(about = "Conversational streaming avatar front-end", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (JSON, TOML or YAML)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a conversation session and talk to it from the terminal
    Converse {
        /// Use the in-process avatar instead of the vendor service
        #[arg(long)]
        offline: bool,
    },

    /// Ask the answer service one question and print what the avatar would say
    Ask {
        /// Question text
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },

    /// Serve the access token endpoint
    TokenServer {
        /// Listen address, overriding token_server.bind
        #[arg(long)]
        bind: Option<String>,
    },

    /// Print the effective configuration
    Config,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AvatalkConfig> {
    let mut config = match path {
        Some(path) => AvatalkConfig::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => AvatalkConfig::default(),
    };
    config.apply_env();
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;
    logging::init(&config.logging, cli.verbose);
    debug!("Configuration loaded");

    match cli.command {
        Commands::Converse { offline } => {
            info!("Starting conversation console");
            Console::new(&config, offline)?.run().await?;
        }
        Commands::Ask { question } => {
            let question = question.join(" ");
            let service = HttpAnswerService::new(&config.answer)?;
            match ask::ask(&service, &ReplyExtractorChain::default(), &question).await? {
                AskOutcome::Segments(segments) => {
                    for segment in segments {
                        println!("{}", segment);
                    }
                }
                AskOutcome::NoAnswer => println!("{}", config.session.no_answer_reply),
            }
        }
        Commands::TokenServer { bind } => {
            if let Some(bind) = bind {
                config.token_server.bind = bind;
            }
            token_server::serve(&config.token_server).await?;
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            let api_key = std::env::var(&config.token_server.api_key_env)
                .map(Credential::new)
                .unwrap_or_else(|_| Credential::empty());
            println!("{}: {}", config.token_server.api_key_env, api_key.redacted());
        }
    }

    Ok(())
}
