use std::{env, time::Duration};

use thiserror::Error;

const DEFAULT_ENGINE: &str = "gpt-3.5-turbo";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_PROMPT_CHARS: usize = 12_000;
const DEFAULT_HISTORY_TURNS: usize = 6;
const DEFAULT_CORRECT_MARKER: &str = "正解";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{name} must be a positive number, got {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Knobs that shape the prompts sent to the completion backend.
#[derive(Clone, Debug)]
pub struct PromptSettings {
    pub max_prompt_chars: usize,
    pub history_turns: usize,
    pub correct_marker: String,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            max_prompt_chars: DEFAULT_MAX_PROMPT_CHARS,
            history_turns: DEFAULT_HISTORY_TURNS,
            correct_marker: DEFAULT_CORRECT_MARKER.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct BotConfig {
    pub api_key: String,
    pub engine: String,
    pub timeout: Duration,
    pub prompts: PromptSettings,
}

impl BotConfig {
    /// Reads the configuration from the process environment.
    /// Call `dotenv()` beforehand to pick up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = lookup("CHATGPT_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::Missing("CHATGPT_API_KEY"))?;

        let timeout_secs = parse_positive(&lookup, "CHATGPT_TIMEOUT_SECS")?
            .unwrap_or(DEFAULT_TIMEOUT_SECS as usize);

        Ok(Self {
            api_key,
            engine: lookup("CHATGPT_ENGINE").unwrap_or_else(|| DEFAULT_ENGINE.to_string()),
            timeout: Duration::from_secs(timeout_secs as u64),
            prompts: PromptSettings {
                max_prompt_chars: parse_positive(&lookup, "DOCQUIZ_MAX_PROMPT_CHARS")?
                    .unwrap_or(DEFAULT_MAX_PROMPT_CHARS),
                history_turns: parse_positive(&lookup, "DOCQUIZ_HISTORY_TURNS")?
                    .unwrap_or(DEFAULT_HISTORY_TURNS),
                correct_marker: lookup("DOCQUIZ_CORRECT_MARKER")
                    .filter(|marker| !marker.is_empty())
                    .unwrap_or_else(|| DEFAULT_CORRECT_MARKER.to_string()),
            },
        })
    }
}

fn parse_positive(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<usize>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(value) => match value.trim().parse::<usize>() {
            Ok(parsed) if parsed > 0 => Ok(Some(parsed)),
            _ => Err(ConfigError::Invalid { name, value }),
        },
    }
}
