//! CLI module for coinrag
//!
//! Provides command-line interface parsing and handling for the coinrag-server binary.
//! Uses clap for argument parsing and owo-colors for colored terminal output.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// coinrag - Crypto Knowledge RAG Server
///
/// Answers cryptocurrency questions from a store of atomic facts, flagging
/// figures and coins the facts do not support.
#[derive(Parser, Debug)]
#[command(
    name = "coinrag-server",
    version,
    about = "coinrag - Crypto Knowledge RAG Server",
    long_about = "Answers cryptocurrency questions from a store of atomic facts.\n\n\
                  Run without arguments to start the server, or use 'ask' to query the\n\
                  pipeline once from the terminal.",
    after_help = "EXAMPLES:\n    \
                  coinrag-server                                  # Start the server (reads coinrag.toml)\n    \
                  coinrag-server --config my.toml                 # Use a custom config file\n    \
                  coinrag-server config --validate                # Check the configuration\n    \
                  coinrag-server ask \"Price of BTC?\" --facts f.json # One-off question"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "coinrag.toml", global = true)]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server (the default)
    Serve,

    /// Show configuration information
    Config {
        /// Validate the configuration and list warnings
        #[arg(long)]
        validate: bool,
    },

    /// Answer one question in-process and exit
    Ask {
        /// The question
        query: String,

        /// Answer without retrieving facts
        #[arg(long)]
        no_rag: bool,

        /// Number of facts to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Only use facts about this coin
        #[arg(long)]
        coin: Option<String>,

        /// JSON file with an array of facts to load first
        #[arg(short, long)]
        facts: Option<PathBuf>,
    },
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_server() {
        let cli = Cli::parse_from(["coinrag-server"]);
        assert_eq!(cli.config, PathBuf::from("coinrag.toml"));
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_ask_arguments() {
        let cli = Cli::parse_from([
            "coinrag-server",
            "ask",
            "What is the price of Bitcoin?",
            "--no-rag",
            "-k",
            "3",
            "--coin",
            "bitcoin",
            "--facts",
            "facts.json",
            "--config",
            "other.toml",
        ]);

        assert_eq!(cli.config, PathBuf::from("other.toml"));
        match cli.command {
            Some(Commands::Ask {
                query,
                no_rag,
                top_k,
                coin,
                facts,
            }) => {
                assert_eq!(query, "What is the price of Bitcoin?");
                assert!(no_rag);
                assert_eq!(top_k, Some(3));
                assert_eq!(coin.as_deref(), Some("bitcoin"));
                assert_eq!(facts, Some(PathBuf::from("facts.json")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_config_validate_flag() {
        let cli = Cli::parse_from(["coinrag-server", "config", "--validate", "--no-color"]);
        assert!(cli.no_color);
        assert!(matches!(cli.command, Some(Commands::Config { validate: true })));
    }
}
