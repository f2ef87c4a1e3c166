//! Text generation backend for conversational replies.
//!
//! Speaks the Gemini `generateContent` REST API: one request, one complete response, no
//! streaming and no retries.

use crate::{config::Llm, helper::NonFatal, log_internal, volatile_state::MemoryEntry};
use anyhow::{anyhow, Result};
use base64::Engine as _;
use serenity::all::Attachment;

/// Discord rejects messages over 2000 characters.
const REPLY_MAX_CHARS: usize = 1900;

/// Everything sent to the backend for one reply
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub text: String,
    pub images: Vec<InlineImage>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InlineImage {
    pub mime_type: String,
    /// Base64 encoded bytes
    pub data: String,
}

impl Prompt {
    /// Persona first, then the channel's memory as `speaker: text` lines, then the new message.
    pub fn build(
        persona: &str,
        history: &[MemoryEntry],
        speaker: &str,
        message: &str,
        images: Vec<InlineImage>,
    ) -> Self {
        let history = history
            .iter()
            .map(|entry| format!("{}: {}", entry.speaker, entry.content))
            .collect::<Vec<_>>()
            .join("\n");

        let text = format!(
            "{}\n\nConversation history:\n{}\n\n{}: {}",
            persona, history, speaker, message
        );

        Self { text, images }
    }
}

/// A text generation backend
#[serenity::async_trait]
pub trait Generate: Sync {
    async fn generate(&self, prompt: &Prompt) -> Result<String>;
}

/// Generation through the Gemini REST API
pub struct Gemini<'a> {
    pub settings: &'a Llm,
}

#[derive(serde::Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(serde::Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(serde::Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData<'a> },
}

#[derive(serde::Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(serde::Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(serde::Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(serde::Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(serde::Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(serde::Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl<'a> GenerateContentRequest<'a> {
    fn new(prompt: &'a Prompt, temperature: f32) -> Self {
        let mut parts = vec![Part::Text {
            text: prompt.text.as_str(),
        }];
        parts.extend(prompt.images.iter().map(|image| Part::InlineData {
            inline_data: InlineData {
                mime_type: &image.mime_type,
                data: &image.data,
            },
        }));

        Self {
            contents: vec![Content {
                role: "user",
                parts,
            }],
            generation_config: GenerationConfig { temperature },
        }
    }
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate
    fn into_text(self) -> Result<String> {
        let text: String = self
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        let text = text.trim();
        if text.is_empty() {
            return Err(anyhow!("Generation returned no text"));
        }
        Ok(truncate_reply(text))
    }
}

#[serenity::async_trait]
impl<'a> Generate for Gemini<'a> {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.settings.api_url.trim_end_matches('/'),
            self.settings.model_name
        );
        let request = GenerateContentRequest::new(prompt, self.settings.temperature);

        log_internal!(
            "Sending request to {} with {} image(s)... ",
            self.settings.model_name,
            prompt.images.len()
        );
        let client = reqwest::Client::new();
        let response = client
            .post(&url)
            .header("x-goog-api-key", &self.settings.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<GenerateContentResponse>()
            .await?;
        log_internal!(
            "Sending request to {} with {} image(s)... done",
            self.settings.model_name,
            prompt.images.len()
        );

        response.into_text()
    }
}

/// Cut at a character boundary to stay within Discord's message limit.
fn truncate_reply(text: &str) -> String {
    match text.char_indices().nth(REPLY_MAX_CHARS) {
        Some((end, _)) => format!("{}\u{2026}", &text[..end]),
        None => text.to_owned(),
    }
}

pub fn is_image(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|mime| mime.starts_with("image/"))
}

/// Download and encode image attachments.  Anything that fails is logged and left out.
pub async fn fetch_images(attachments: &[Attachment]) -> Vec<InlineImage> {
    let client = reqwest::Client::new();
    let mut images = Vec::new();

    for attachment in attachments
        .iter()
        .filter(|a| is_image(a.content_type.as_deref()))
    {
        let what = format!("fetch image attachment `{}`", attachment.filename);
        let Some(bytes) = fetch_bytes(&client, &attachment.url).await.non_fatal(what) else {
            continue;
        };

        images.push(InlineImage {
            mime_type: attachment
                .content_type
                .clone()
                .unwrap_or_else(|| "image/png".to_owned()),
            data: base64::engine::general_purpose::STANDARD.encode(&bytes),
        });
    }

    images
}

async fn fetch_bytes(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    let bytes = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prompt_with_empty_history() {
        let prompt = Prompt::build("Be nice.", &[], "ana", "hello", Vec::new());
        assert_eq!(prompt.text, "Be nice.\n\nConversation history:\n\n\nana: hello");
    }

    #[test]
    fn prompt_renders_history_in_order() {
        let history = [
            MemoryEntry::new("ana", "hi bot"),
            MemoryEntry::new("stockbot", "hey ana"),
        ];
        let prompt = Prompt::build("P", &history, "ana", "how are you", Vec::new());
        assert_eq!(
            prompt.text,
            "P\n\nConversation history:\nana: hi bot\nstockbot: hey ana\n\nana: how are you"
        );
    }

    #[test]
    fn request_puts_text_before_images() {
        let prompt = Prompt {
            text: "look".to_owned(),
            images: vec![InlineImage {
                mime_type: "image/jpeg".to_owned(),
                data: "AAAA".to_owned(),
            }],
        };
        let request = serde_json::to_value(GenerateContentRequest::new(&prompt, 0.5)).unwrap();
        assert_eq!(
            request,
            json!({
                "contents": [{
                    "role": "user",
                    "parts": [
                        { "text": "look" },
                        { "inline_data": { "mime_type": "image/jpeg", "data": "AAAA" } },
                    ],
                }],
                "generationConfig": { "temperature": 0.5 },
            })
        );
    }

    #[test]
    fn response_text_joins_first_candidate_parts() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [
                { "content": { "parts": [{ "text": "Hello " }, { "text": "there" }] } },
                { "content": { "parts": [{ "text": "ignored" }] } },
            ]
        }))
        .unwrap();
        assert_eq!(response.into_text().unwrap(), "Hello there");
    }

    #[test]
    fn empty_response_is_an_error() {
        let response: GenerateContentResponse =
            serde_json::from_value(json!({ "candidates": [] })).unwrap();
        assert!(response.into_text().is_err());

        let blocked: GenerateContentResponse =
            serde_json::from_value(json!({ "promptFeedback": { "blockReason": "SAFETY" } }))
                .unwrap();
        assert!(blocked.into_text().is_err());
    }

    #[test]
    fn long_replies_are_truncated_on_char_boundary() {
        let long = "é".repeat(REPLY_MAX_CHARS + 10);
        let truncated = truncate_reply(&long);
        assert_eq!(truncated.chars().count(), REPLY_MAX_CHARS + 1);
        assert!(truncated.ends_with('\u{2026}'));
        assert_eq!(truncate_reply("short"), "short");
    }

    #[test]
    fn only_image_content_types_are_images() {
        assert!(is_image(Some("image/png")));
        assert!(is_image(Some("image/webp")));
        assert!(!is_image(Some("text/plain")));
        assert!(!is_image(None));
    }
}
