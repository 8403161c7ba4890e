//! Scripted text generators for driving the engine without a network

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;

use scam_call_sim::agentic::{ChatMessage, Generation, TextGenerator, TextStream, ToolDefinition};
use scam_call_sim::agents::{AgentSet, ReplyChunk};
use scam_call_sim::engine::TurnEngine;
use scam_call_sim::Settings;

/// Replies with the queued answers first, then with `answer` (or fails when
/// it is `None`); streams `fragments` when set, otherwise the default
/// single-fragment stream.
#[derive(Clone, Default)]
pub struct Scripted {
    pub queued: Arc<Mutex<VecDeque<String>>>,
    pub answer: Option<String>,
    pub fragments: Option<Vec<std::result::Result<String, String>>>,
    pub calls: Arc<AtomicUsize>,
}

impl Scripted {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: Some(answer.to_string()),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self::default()
    }

    /// Answer `first` once before the standing answer
    pub fn first(self, first: &str) -> Self {
        self.queued.lock().unwrap().push_back(first.to_string());
        self
    }

    pub fn with_fragments(mut self, fragments: &[std::result::Result<&str, &str>]) -> Self {
        self.fragments = Some(
            fragments
                .iter()
                .map(|f| f.map(str::to_string).map_err(str::to_string))
                .collect(),
        );
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for Scripted {
    async fn invoke(&self, _messages: &[ChatMessage]) -> Result<Generation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(next) = self.queued.lock().unwrap().pop_front() {
            return Ok(Generation::text(next));
        }
        self.answer
            .clone()
            .map(Generation::text)
            .ok_or_else(|| anyhow!("scripted failure"))
    }

    async fn stream(&self, messages: &[ChatMessage]) -> Result<TextStream> {
        let Some(fragments) = self.fragments.clone() else {
            let generation = self.invoke(messages).await?;
            let (tx, rx) = mpsc::channel(1);
            let _ = tx.send(Ok(generation.content)).await;
            return Ok(rx);
        };
        let (tx, rx) = mpsc::channel(fragments.len().max(1));
        for fragment in fragments {
            let _ = tx.send(fragment.map_err(|e| anyhow!(e))).await;
        }
        Ok(rx)
    }

    fn bind_tools(&self, _tools: Vec<ToolDefinition>) -> Arc<dyn TextGenerator> {
        Arc::new(self.clone())
    }

    fn model_name(&self) -> &str {
        "scripted"
    }

    fn provider_name(&self) -> &str {
        "Test"
    }
}

pub fn heuristic_engine() -> TurnEngine {
    TurnEngine::new(Settings::heuristic_only(), AgentSet::heuristic())
}

pub fn engine_with(
    director: Option<Scripted>,
    moderator: Option<Scripted>,
    victim: Option<Scripted>,
) -> TurnEngine {
    let wrap = |g: Option<Scripted>| g.map(|g| Arc::new(g) as Arc<dyn TextGenerator>);
    TurnEngine::new(
        Settings::heuristic_only(),
        AgentSet::with_generators(wrap(director), wrap(moderator), wrap(victim)),
    )
}

/// Everything a listener received, in order
pub async fn drain(mut rx: mpsc::Receiver<ReplyChunk>) -> Vec<ReplyChunk> {
    let mut out = Vec::new();
    while let Some(chunk) = rx.recv().await {
        out.push(chunk);
    }
    out
}

/// Text a listener ends up with once retractions are applied
pub fn spoken(chunks: &[ReplyChunk]) -> String {
    let mut text = String::new();
    for chunk in chunks {
        match chunk {
            ReplyChunk::Text(piece) => text.push_str(piece),
            ReplyChunk::Retract => text.clear(),
        }
    }
    text
}
