//! Google Gemini request format.
//!
//! - Messages are called "contents"
//! - Role is "user" or "model" (not "assistant")
//! - Content is an array of "parts"
//! - System instructions are separate from messages
//!
//! # Example Gemini Request
//! ```json
//! {
//!   "contents": [
//!     { "role": "user", "parts": [{"text": "Hello"}] }
//!   ],
//!   "systemInstruction": { "role": "user", "parts": [{"text": "Additional context: {...}"}] }
//! }
//! ```

use gateway_core::{ContextEntry, Role};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Gemini request format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    /// Conversation history
    pub contents: Vec<GeminiContent>,
    /// Client-supplied context, forwarded as a system instruction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GeminiContent>,
    /// Generation config (temperature, max_tokens, etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<Value>,
}

/// Gemini message/content format
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeminiContent {
    /// "user" or "model"
    pub role: String,
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeminiPart {
    pub text: String,
}

impl GeminiContent {
    fn text(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            parts: vec![GeminiPart { text: text.into() }],
        }
    }
}

impl GeminiRequest {
    /// Build a request from the rolling context, oldest turn first.
    ///
    /// `extra_context` is the optional free-form object a client sends with its
    /// message; it is serialized into the system instruction.
    pub fn from_context(entries: &[ContextEntry], extra_context: Option<&Value>) -> Self {
        let contents = entries
            .iter()
            .map(|entry| {
                let role = match entry.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                };
                GeminiContent::text(role, entry.content.clone())
            })
            .collect();

        let system_instruction = extra_context
            .filter(|value| !value.is_null())
            .map(|value| GeminiContent::text("user", format!("Additional context: {}", value)));

        Self {
            contents,
            system_instruction,
            generation_config: None,
        }
    }
}
