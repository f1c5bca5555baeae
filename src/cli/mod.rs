//! CLI module for Wiseone.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};

/// Wiseone - conversations with a mentor's recorded sessions
///
/// Ingests mentorship session transcripts into a local knowledge base and
/// answers questions in the mentor's voice, citing the sessions it draws on.
#[derive(Parser, Debug)]
#[command(name = "wiseone")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "WISEONE_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest a directory of session transcripts
    Ingest {
        /// Directory containing transcript files (.md / .txt)
        dir: String,

        /// Parse and chunk only; print what would be stored
        #[arg(long)]
        dry_run: bool,

        /// Re-ingest transcripts that are already stored
        #[arg(short, long)]
        force: bool,

        /// Only ingest this file name from the directory
        #[arg(long)]
        file: Option<String>,
    },

    /// Ask a single question
    Ask {
        /// The question to ask
        question: String,

        /// Maximum number of passages to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Minimum vector similarity for a passage to qualify
        #[arg(short, long)]
        threshold: Option<f32>,
    },

    /// Interactive multi-turn conversation
    Chat {
        /// Resume a stored conversation by id
        #[arg(long)]
        conversation: Option<String>,
    },

    /// Search transcripts without generating an answer
    Search {
        /// Search query
        query: String,

        /// Maximum number of results
        #[arg(short, long, default_value = "5")]
        limit: usize,

        /// Minimum vector similarity
        #[arg(short, long)]
        threshold: Option<f32>,
    },

    /// List ingested sessions
    List,

    /// Show the stored chunks of one session
    Show {
        /// Transcript file name, as listed by 'list'
        filename: String,
    },

    /// Remove one session from the knowledge base
    Remove {
        /// Transcript file name, as listed by 'list'
        filename: String,
    },

    /// Show how often each theme appears across sessions
    Themes,

    /// List stored conversations
    History {
        /// Maximum number of conversations
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Start the HTTP API server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Write the default configuration file if none exists
    Init,

    /// Open configuration file in editor
    Edit,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ask_overrides() {
        let cli = Cli::parse_from(["wiseone", "ask", "What is ego?", "-k", "3", "-t", "0.5"]);
        match cli.command {
            Commands::Ask {
                question,
                top_k,
                threshold,
            } => {
                assert_eq!(question, "What is ego?");
                assert_eq!(top_k, Some(3));
                assert_eq!(threshold, Some(0.5));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_ingest_flags() {
        let cli = Cli::parse_from(["wiseone", "-vv", "ingest", "sessions", "--dry-run"]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Ingest {
                dir, dry_run, force, file,
            } => {
                assert_eq!(dir, "sessions");
                assert!(dry_run);
                assert!(!force);
                assert!(file.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
