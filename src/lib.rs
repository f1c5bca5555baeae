//! Wiseone - conversations with a mentor's recorded sessions
//!
//! Ingests mentorship session transcripts into a local knowledge base and
//! answers questions in the mentor's voice, grounded in and citing the
//! sessions it retrieves.
//!
//! # Architecture
//!
//! - `transcript` - Transcript metadata extraction
//! - `chunking` - Section-aware, token-budgeted chunking
//! - `embedding` - Embedding generation
//! - `store` - Transcript and conversation storage with hybrid search
//! - `rag` - Retrieval, context assembly, reflection and response stages
//! - `generation` - Chat model clients (OpenAI and Anthropic)
//! - `conversation` - Multi-turn conversation state
//! - `orchestrator` - Pipeline coordination
//!
//! # Example
//!
//! ```rust,no_run
//! use wiseone::config::Settings;
//! use wiseone::orchestrator::{IngestOptions, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::new(settings)?;
//!
//!     let report = orchestrator
//!         .ingest_directory("sessions".as_ref(), &IngestOptions::default(), |_| {})
//!         .await?;
//!     println!("Ingested {} transcripts", report.ingested());
//!
//!     let outcome = orchestrator.engine(None, None).ask("What is the ego?").await?;
//!     println!("{}", outcome.answer);
//!     Ok(())
//! }
//! ```

pub mod chunking;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod openai;
pub mod orchestrator;
pub mod rag;
pub mod retry;
pub mod store;
pub mod transcript;

#[cfg(test)]
mod test_support;

pub use error::{Result, WiseoneError};
