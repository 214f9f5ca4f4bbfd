//! Scripted completion client.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use docrag_core::{ChatMessage, CompletionClient, CompletionParams, RagError, Result};

/// A recorded `complete` call.
#[derive(Debug, Clone)]
pub struct CompletionCall {
    pub messages: Vec<ChatMessage>,
    pub params: CompletionParams,
}

/// A completion client that replays scripted replies and records every call.
///
/// Scripted replies are consumed in order; once exhausted, the default reply
/// is returned.
pub struct MockCompletionClient {
    script: Mutex<VecDeque<std::result::Result<String, String>>>,
    default_reply: String,
    calls: Mutex<Vec<CompletionCall>>,
}

impl MockCompletionClient {
    /// A client that always answers `reply`.
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_reply: reply.into(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful reply.
    pub fn then_reply(self, reply: impl Into<String>) -> Self {
        lock(&self.script).push_back(Ok(reply.into()));
        self
    }

    /// Queue a failure.
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        lock(&self.script).push_back(Err(message.into()));
        self
    }

    /// Number of `complete` calls so far.
    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// All recorded calls, oldest first.
    pub fn calls(&self) -> Vec<CompletionCall> {
        lock(&self.calls).clone()
    }

    /// The most recent call, if any.
    pub fn last_call(&self) -> Option<CompletionCall> {
        lock(&self.calls).last().cloned()
    }
}

impl Default for MockCompletionClient {
    fn default() -> Self {
        Self::new("mock reply")
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl CompletionClient for MockCompletionClient {
    async fn complete(&self, messages: &[ChatMessage], params: CompletionParams) -> Result<String> {
        lock(&self.calls).push(CompletionCall {
            messages: messages.to_vec(),
            params,
        });

        match lock(&self.script).pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(RagError::llm(message)),
            None => Ok(self.default_reply.clone()),
        }
    }
}
