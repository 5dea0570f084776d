//! Scripted model provider for integration testing.
//!
//! Replies are served in order from a queue; every prompt received is
//! recorded so tests can assert on the correction prompts. All state is
//! in-memory with no external dependencies.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use augur::llm::ModelProvider;
use augur::types::Provider;

#[derive(Clone)]
pub struct ScriptedProvider {
    provider: Provider,
    replies: Arc<Mutex<VecDeque<Result<String, String>>>>,
    prompts: Arc<Mutex<Vec<String>>>,
    /// Served once the queue is empty; `None` turns an empty queue into an error.
    fallback: Option<String>,
}

impl ScriptedProvider {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            replies: Arc::new(Mutex::new(VecDeque::new())),
            prompts: Arc::new(Mutex::new(Vec::new())),
            fallback: None,
        }
    }

    /// Queue a successful reply.
    pub fn reply(self, text: &str) -> Self {
        self.replies.lock().unwrap().push_back(Ok(text.to_string()));
        self
    }

    /// Queue a transport failure.
    pub fn fail(self, message: &str) -> Self {
        self.replies.lock().unwrap().push_back(Err(message.to_string()));
        self
    }

    /// Reply served for every call after the queue runs dry.
    pub fn always(mut self, text: &str) -> Self {
        self.fallback = Some(text.to_string());
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(msg)) => Err(anyhow!(msg)),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| anyhow!("scripted provider exhausted")),
        }
    }

    fn provider(&self) -> Provider {
        self.provider
    }

    fn model_name(&self) -> String {
        format!("scripted-{}", self.provider)
    }
}
