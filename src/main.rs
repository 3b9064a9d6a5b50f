use clap::{Parser, Subcommand};
use knowledge_qa::{QaError, Result};
use knowledge_qa::commands::{ask, rebuild, serve};
use knowledge_qa::config::{Config, config_toml, show_config};
use knowledge_qa::logging::init_logging;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "knowledge-qa")]
#[command(about = "Question answering over an internal knowledge base")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml, .env, the knowledge base and the index
    #[arg(long, global = true, default_value = ".")]
    base_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API and question page
    Serve,
    /// Rebuild the vector index from the knowledge base directory
    Rebuild,
    /// Answer a single question
    Ask {
        question: String,
        /// Number of chunks to retrieve (1-20)
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=20))]
        top_k: Option<u8>,
    },
    /// Show the resolved configuration
    Config {
        /// Print as config.toml instead of a summary
        #[arg(long)]
        toml: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match Config::load(&cli.base_dir) {
        Ok(config) => config,
        Err(e) => {
            init_logging(None);
            return Err(e.into());
        }
    };

    match cli.command {
        Commands::Config { toml } => {
            init_logging(None);
            if toml {
                let rendered =
                    config_toml(&config).map_err(|e| QaError::Config(e.to_string()))?;
                print!("{}", rendered);
            } else {
                show_config(&config);
            }
        }
        Commands::Serve => {
            init_logging(Some(&config.log_path()));
            serve(config).await?;
        }
        Commands::Rebuild => {
            init_logging(Some(&config.log_path()));
            rebuild(config).await?;
        }
        Commands::Ask { question, top_k } => {
            init_logging(Some(&config.log_path()));
            ask(config, &question, top_k.map(usize::from)).await?;
        }
    }

    Ok(())
}
