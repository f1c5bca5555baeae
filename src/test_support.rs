//! Deterministic stand-ins for the model APIs used across unit tests.

use crate::embedding::Embedder;
use crate::error::{Result, WiseoneError};
use crate::generation::{GenerationRequest, Generator};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A 2-d unit vector whose cosine similarity with `[1, 0]` is `similarity`.
pub(crate) fn unit_at(similarity: f32) -> Vec<f32> {
    vec![similarity, (1.0 - similarity * similarity).max(0.0).sqrt()]
}

/// Embeds every text as `[1, 0]` unless a keyword rule matches.
pub(crate) struct StaticEmbedder {
    rules: Vec<(String, Vec<f32>)>,
    failures_left: AtomicUsize,
    pub(crate) calls: AtomicUsize,
}

impl StaticEmbedder {
    pub(crate) fn new() -> Self {
        Self {
            rules: Vec::new(),
            failures_left: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Texts containing `keyword` (case-insensitive) embed as `vector`.
    pub(crate) fn with_rule(mut self, keyword: &str, vector: Vec<f32>) -> Self {
        self.rules.push((keyword.to_lowercase(), vector));
        self
    }

    /// Fail the next `n` calls with an embedding error.
    pub(crate) fn failing(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        self.rules
            .iter()
            .find(|(keyword, _)| lower.contains(keyword.as_str()))
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| vec![1.0, 0.0])
    }
}

#[async_trait]
impl Embedder for StaticEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(WiseoneError::Embedding("scripted failure".to_string()));
        }
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dimensions(&self) -> usize {
        2
    }
}

/// Replays queued replies in order and records every request.
pub(crate) struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub(crate) fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn push_ok(&self, text: &str) {
        self.replies.lock().unwrap().push_back(Ok(text.to_string()));
    }

    pub(crate) fn push_err(&self, message: &str) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(WiseoneError::generation("chat completion", message)));
    }

    pub(crate) fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("Scripted reply.".to_string()))
    }
}
