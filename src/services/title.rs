//! Conversation title generation.

use std::sync::Arc;
use std::time::Duration;

use crate::api::models::TitleResponse;
use crate::core::config::TitleConfig;
use crate::services::agents::ChatAgent;

const TITLE_PROMPT: &str = "Generate a concise title (max {max_length} characters) for this conversation based on the user's first message.
The title should:
- Capture the main topic or intent
- Be descriptive but brief
- Not include quotes or special characters
- Be in sentence case

User message: {user_message}

Respond with ONLY the title, nothing else.";

/// Output cap for the title model; titles are a handful of words.
pub const TITLE_MAX_TOKENS: u32 = 60;

/// Shorten `text` to at most `max_length` characters.
///
/// A space in the last 40% of the window is used as the cut point;
/// otherwise the text is hard-cut. Either way `...` is appended.
pub fn truncate_at_word_boundary(text: &str, max_length: usize) -> String {
    if max_length == 0 {
        return String::new();
    }
    if text.chars().count() <= max_length {
        return text.to_string();
    }

    let window: Vec<char> = text.chars().take(max_length).collect();
    let last_space = window.iter().rposition(|c| *c == ' ');

    match last_space {
        Some(pos) if pos as f64 > max_length as f64 * 0.6 => {
            let mut out: String = window[..pos].iter().collect();
            out.push_str("...");
            out
        }
        _ => {
            let mut out: String = window[..max_length.saturating_sub(3)].iter().collect();
            out.push_str("...");
            out
        }
    }
}

/// Trim, drop one outer pair of matching quotes, then truncate.
pub fn clean_title(title: &str, max_length: usize) -> String {
    let trimmed = title.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|q| {
            (trimmed.chars().count() >= 2)
                .then(|| trimmed.strip_prefix(*q)?.strip_suffix(*q))
                .flatten()
        })
        .unwrap_or(trimmed);
    truncate_at_word_boundary(unquoted, max_length)
}

#[derive(Clone)]
pub struct TitleGenerator {
    agent: Arc<dyn ChatAgent>,
    max_length: usize,
    timeout: Duration,
}

impl TitleGenerator {
    pub fn new(agent: Arc<dyn ChatAgent>, config: &TitleConfig) -> Self {
        Self {
            agent,
            max_length: config.max_length,
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    fn prompt(&self, user_message: &str) -> String {
        TITLE_PROMPT
            .replace("{max_length}", &self.max_length.to_string())
            .replace("{user_message}", user_message)
    }

    /// Ask the model for a title. Never fails: errors and timeouts yield
    /// an empty title with `use_fallback` set.
    pub async fn generate(&self, user_message: &str, conversation_id: &str) -> TitleResponse {
        let prompt = self.prompt(user_message);

        match tokio::time::timeout(self.timeout, self.agent.run(&prompt, &[])).await {
            Ok(Ok(raw)) => {
                let title = clean_title(&raw, self.max_length);
                tracing::info!(conversation_id = %conversation_id, title = %title, "Generated title");
                TitleResponse {
                    title,
                    use_fallback: false,
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(conversation_id = %conversation_id, error = %e, "Title generation failed");
                fallback()
            }
            Err(_) => {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Title generation timed out"
                );
                fallback()
            }
        }
    }
}

fn fallback() -> TitleResponse {
    TitleResponse {
        title: String::new(),
        use_fallback: true,
    }
}
