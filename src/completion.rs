use async_trait::async_trait;
use chatgpt::prelude::*;
use chatgpt::types::CompletionResponse;
use log::debug;
use thiserror::Error;

use crate::config::BotConfig;

/// Shown to the user in place of a completion whenever the backend fails.
pub const FALLBACK_REPLY: &str =
    "The assistant is unavailable right now. Please try again later.";

#[derive(Debug, Clone, Error)]
pub enum CompletionError {
    #[error("completion backend failed: {0}")]
    Transport(String),

    #[error("completion backend returned an empty response")]
    Empty,
}

/// The generative-text backend: one prompt in, one completion out.
#[async_trait]
pub trait CompletionPort: Send + Sync {
    async fn complete(&self, prompt: &str) -> std::result::Result<String, CompletionError>;
}

pub struct ChatGptCompletion {
    chat_gpt: ChatGPT,
}

impl ChatGptCompletion {
    pub fn new(config: &BotConfig) -> std::result::Result<Self, CompletionError> {
        let mut chat_gpt = ChatGPT::new(config.api_key.clone())
            .map_err(|err| CompletionError::Transport(err.to_string()))?;

        chat_gpt.config.engine = engine_from_name(&config.engine);
        chat_gpt.config.timeout = config.timeout;

        Ok(Self { chat_gpt })
    }
}

fn engine_from_name(name: &str) -> ChatGPTEngine {
    match name {
        "gpt-4" => ChatGPTEngine::Gpt4,
        _ => ChatGPTEngine::Gpt35Turbo,
    }
}

#[async_trait]
impl CompletionPort for ChatGptCompletion {
    async fn complete(&self, prompt: &str) -> std::result::Result<String, CompletionError> {
        let response: CompletionResponse = self
            .chat_gpt
            .send_message(prompt)
            .await
            .map_err(|err| CompletionError::Transport(err.to_string()))?;
        let content = response.message().content.clone();

        debug!("Completion: {:?}", content);

        if content.trim().is_empty() {
            return Err(CompletionError::Empty);
        }
        Ok(content)
    }
}

#[cfg(test)]
pub mod scripted {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Replays queued completions in order and remembers every prompt it was sent.
    #[derive(Default)]
    pub struct ScriptedCompletion {
        replies: Mutex<VecDeque<std::result::Result<String, CompletionError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedCompletion {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(self, text: &str) -> Self {
            self.replies.lock().unwrap().push_back(Ok(text.to_string()));
            self
        }

        pub fn fail(self) -> Self {
            self.replies
                .lock()
                .unwrap()
                .push_back(Err(CompletionError::Transport("quota exceeded".to_string())));
            self
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionPort for ScriptedCompletion {
        async fn complete(&self, prompt: &str) -> std::result::Result<String, CompletionError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(CompletionError::Transport("no scripted reply".to_string())))
        }
    }
}
