//! RAG (Retrieval-Augmented Generation) over the transcript corpus.
//!
//! A turn runs as explicit stages: [`Retriever`] finds candidates,
//! [`ContextAssembler`] packs them into a cited context block,
//! [`ReflectionStage`] writes an internal [`Synthesis`], and
//! [`ResponseGenerator`] writes the answer. [`RagEngine`] drives the stages
//! and records the conversation.

pub mod context;
mod engine;
mod reflection;
mod response;
mod retriever;

pub use context::{AssembledContext, ContextAssembler};
pub use engine::{RagEngine, TurnOutcome, NO_SOURCES_REPLY};
pub use reflection::{ReflectionStage, Synthesis};
pub use response::{Answer, ResponseGenerator};
pub use retriever::Retriever;
