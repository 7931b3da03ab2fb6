//! Prompt context and Gemini API types

use serde::{Deserialize, Serialize};

use crate::session::{Message, Role};

/// Everything the model sees for one turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContext {
    pub system_prompt: String,
    /// Recent history, oldest first
    pub history: Vec<Message>,
    pub user_text: String,
}

impl PromptContext {
    /// Build a context from the most recent `window` messages of `history`
    pub fn new(
        system_prompt: impl Into<String>,
        history: &[Message],
        window: usize,
        user_text: impl Into<String>,
    ) -> Self {
        let start = history.len().saturating_sub(window);
        Self {
            system_prompt: system_prompt.into(),
            history: history[start..].to_vec(),
            user_text: user_text.into(),
        }
    }

    /// Render the context as a single transcript ending with the assistant's cue
    pub fn render(&self) -> String {
        let mut context = format!("{}\n\n", self.system_prompt.trim());

        for msg in &self.history {
            context.push_str(msg.role.speaker());
            context.push_str(": ");
            context.push_str(&msg.content);
            context.push('\n');
        }

        context.push_str(&format!(
            "{}: {}\n{}: ",
            Role::User.speaker(),
            self.user_text,
            Role::Assistant.speaker()
        ));
        context
    }
}

/// Request body for `generateContent` / `streamGenerateContent`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
}

impl GenerateContentRequest {
    /// Single user turn carrying the rendered transcript
    pub fn from_context(ctx: &PromptContext) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part { text: ctx.render() }],
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: String,
}

/// Response body (also the payload of each streamed event)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub error: Option<ApiErrorBody>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
}
