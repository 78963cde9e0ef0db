//! Scripted and offline classifiers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use cybertutor_core::traits::ProficiencyClassifier;

use crate::error::ProviderError;

/// One scripted classifier response.
#[derive(Debug, Clone)]
pub enum Scripted {
    Reply(String),
    Fail(String),
    /// Sleep before replying, for timeout tests.
    Delay(Duration, String),
}

/// A classifier for tests that never leaves the process.
///
/// Scripted responses are consumed in order; once exhausted every call
/// returns the default reply.
pub struct MockClassifier {
    script: Mutex<VecDeque<Scripted>>,
    default_reply: String,
    call_count: AtomicU32,
    last_prompt: Mutex<Option<String>>,
}

impl MockClassifier {
    /// Create a mock that always returns the same reply.
    pub fn with_fixed_reply(reply: &str) -> Self {
        Self::scripted(Vec::new(), reply)
    }

    pub fn scripted(script: Vec<Scripted>, default_reply: &str) -> Self {
        Self {
            script: Mutex::new(script.into()),
            default_reply: default_reply.to_string(),
            call_count: AtomicU32::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    /// Fail `times` calls, then reply with `reply`.
    pub fn failing_then(times: usize, reply: &str) -> Self {
        let script = (0..times)
            .map(|i| Scripted::Fail(format!("scripted failure {}", i + 1)))
            .collect();
        Self::scripted(script, reply)
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl ProficiencyClassifier for MockClassifier {
    fn name(&self) -> &str {
        "mock"
    }

    async fn classify(&self, prompt: &str) -> anyhow::Result<String> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap_or_else(|e| e.into_inner()) = Some(prompt.to_string());

        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        match next {
            None => Ok(self.default_reply.clone()),
            Some(Scripted::Reply(reply)) => Ok(reply),
            Some(Scripted::Fail(message)) => Err(ProviderError::NetworkError(message).into()),
            Some(Scripted::Delay(delay, reply)) => {
                tokio::time::sleep(delay).await;
                Ok(reply)
            }
        }
    }
}

/// Stand-in used when no provider is configured. Every call fails, so the
/// engine assigns its fallback labels.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineClassifier;

#[async_trait]
impl ProficiencyClassifier for OfflineClassifier {
    fn name(&self) -> &str {
        "offline"
    }

    async fn classify(&self, _prompt: &str) -> anyhow::Result<String> {
        Err(ProviderError::NotConfigured.into())
    }
}
