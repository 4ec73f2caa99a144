//! Text generation seam
//!
//! The engine never talks to a model directly. Everything that needs prose goes
//! through [`TextGenerator`], and every call is bounded by a timeout.

use crate::config::GenerationSettings;
use crate::error::GenerationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Sampling parameters for one generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self::from(&GenerationSettings::default())
    }
}

impl From<&GenerationSettings> for GenerationParams {
    fn from(settings: &GenerationSettings) -> Self {
        Self {
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            top_p: settings.top_p,
        }
    }
}

/// External text generator
#[async_trait]
pub trait TextGenerator: Send + Sync + std::fmt::Debug {
    /// Produce text for a prompt
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> std::result::Result<String, GenerationError>;
}

#[async_trait]
impl<T: TextGenerator + ?Sized> TextGenerator for Arc<T> {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> std::result::Result<String, GenerationError> {
        (**self).generate(prompt, params).await
    }
}

/// Run one generator call under a deadline.
///
/// Blank output is reported as [`GenerationError::Malformed`] so callers can
/// treat it like any other failed attempt.
pub async fn generate_with_timeout(
    generator: &dyn TextGenerator,
    prompt: &str,
    params: &GenerationParams,
    timeout: Duration,
) -> std::result::Result<String, GenerationError> {
    let text = match tokio::time::timeout(timeout, generator.generate(prompt, params)).await {
        Ok(result) => result?,
        Err(_) => return Err(GenerationError::Timeout(timeout.as_millis() as u64)),
    };

    if text.trim().is_empty() {
        return Err(GenerationError::Malformed("empty output".to_string()));
    }
    Ok(text)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Generator that replays a script, then repeats a fallback reply
    #[derive(Debug)]
    pub(crate) struct ScriptedGenerator {
        script: Mutex<VecDeque<std::result::Result<String, GenerationError>>>,
        fallback: String,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        pub(crate) fn new(fallback: impl Into<String>) -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                fallback: fallback.into(),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn then_ok(self, text: impl Into<String>) -> Self {
            self.script.lock().push_back(Ok(text.into()));
            self
        }

        pub(crate) fn then_err(self, err: GenerationError) -> Self {
            self.script.lock().push_back(Err(err));
            self
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub(crate) fn prompts(&self) -> Vec<String> {
            self.prompts.lock().clone()
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(
            &self,
            prompt: &str,
            _params: &GenerationParams,
        ) -> std::result::Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().push(prompt.to_string());
            self.script
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(self.fallback.clone()))
        }
    }
}
