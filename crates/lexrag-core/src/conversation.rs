//! Multi-turn conversation engine.
//!
//! Holds the question/answer history and the cumulative token counter,
//! assembles the prompt for each question, and invokes the injected
//! [`ChatBackend`].
//!
//! # Prompt layout
//!
//! ```text
//! system:    persona [+ "\n" + language directive]
//! user:      q1            ┐
//! assistant: a1            │ prior turns, oldest first
//! user:      q2            │ (bounded by max_history_turns)
//! assistant: a2            ┘
//! user:      "Context:\n{top-k chunks}\n\nQuestion: {query}"
//! ```
//!
//! Backend failures propagate unchanged; the engine never retries and
//! never records a turn for a failed call.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::models::{ChatMessage, ConversationTurn};

/// Default completion model.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.2;
/// Default number of chunks retrieved per question.
pub const DEFAULT_TOP_K: usize = 3;

/// Result of one completion call.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    /// Total tokens reported by the backend for this call.
    pub total_tokens: u64,
}

/// A chat completion backend.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        model: &str,
        temperature: f32,
    ) -> Result<Completion>;
}

/// Fixed parameters applied to every question.
#[derive(Debug, Clone)]
pub struct ConversationPolicy {
    pub model: String,
    pub temperature: f32,
    pub top_k: usize,
    /// Most recent turns replayed into the prompt; `None` replays all.
    pub max_history_turns: Option<usize>,
}

impl Default for ConversationPolicy {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            top_k: DEFAULT_TOP_K,
            max_history_turns: None,
        }
    }
}

/// The answer to one question.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    /// Tokens consumed by this call.
    pub usage: u64,
    /// Cumulative tokens for the session, including this call.
    pub total_tokens: u64,
    /// Ids of the chunks used as context, in similarity order.
    pub context_ids: Vec<String>,
}

/// Stateful question answering over a [`VectorIndex`].
pub struct ConversationEngine {
    persona: String,
    policy: ConversationPolicy,
    backend: Box<dyn ChatBackend>,
    history: Vec<ConversationTurn>,
    tokens_used: u64,
}

impl ConversationEngine {
    pub fn new(
        persona: impl Into<String>,
        policy: ConversationPolicy,
        backend: Box<dyn ChatBackend>,
    ) -> Self {
        Self {
            persona: persona.into(),
            policy,
            backend,
            history: Vec::new(),
            tokens_used: 0,
        }
    }

    /// Completed turns, oldest first.
    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    /// Cumulative tokens reported by the backend over the session.
    pub fn tokens_used(&self) -> u64 {
        self.tokens_used
    }

    /// Forget the conversation. The token counter is left untouched.
    ///
    /// This is the only operation that removes turns; everywhere else the
    /// history is append-only.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Assemble the message sequence for `query` given a context block.
    pub fn build_messages(
        &self,
        context: &str,
        query: &str,
        language_instruction: &str,
    ) -> Vec<ChatMessage> {
        let mut system = self.persona.clone();
        if !language_instruction.trim().is_empty() {
            system.push('\n');
            system.push_str(language_instruction);
        }

        let replay = match self.policy.max_history_turns {
            Some(max) => &self.history[self.history.len().saturating_sub(max)..],
            None => &self.history[..],
        };

        let mut messages = Vec::with_capacity(2 + replay.len() * 2);
        messages.push(ChatMessage::system(system));
        for turn in replay {
            messages.push(ChatMessage::user(turn.query.clone()));
            messages.push(ChatMessage::assistant(turn.answer.clone()));
        }
        messages.push(ChatMessage::user(format!(
            "Context:\n{}\n\nQuestion: {}",
            context, query
        )));
        messages
    }

    /// Answer `query` using the top-k chunks of `index` and the history.
    ///
    /// Fails with [`RagError::NotLoaded`] when `index` is `None`, before
    /// the backend is touched.
    pub async fn ask(
        &mut self,
        query: &str,
        index: Option<&dyn VectorIndex>,
        language_instruction: &str,
    ) -> Result<Answer> {
        let index = index.ok_or(RagError::NotLoaded)?;

        let hits = index.query(query, self.policy.top_k).await?;
        let context = hits
            .iter()
            .map(|h| h.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        debug!(collection = index.name(), hits = hits.len(), "context retrieved");

        let messages = self.build_messages(&context, query, language_instruction);
        let completion = self
            .backend
            .complete(&messages, &self.policy.model, self.policy.temperature)
            .await?;

        self.tokens_used = self.tokens_used.saturating_add(completion.total_tokens);
        self.history.push(ConversationTurn {
            query: query.to_string(),
            answer: completion.text.clone(),
        });
        info!(
            usage = completion.total_tokens,
            total = self.tokens_used,
            turns = self.history.len(),
            "question answered"
        );

        Ok(Answer {
            text: completion.text,
            usage: completion.total_tokens,
            total_tokens: self.tokens_used,
            context_ids: hits.into_iter().map(|h| h.id).collect(),
        })
    }
}
