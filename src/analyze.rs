// src/analyze.rs

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::VisionSection;
use crate::error::ScanError;
use crate::parse::{self, MedicationRecord};

/// Environment variable holding the vision API credential.
pub const API_KEY_ENV: &str = "MEDSCAN_API_KEY";

/// Built-in analysis instruction. The labelled lines it asks for are the
/// same six labels `parse::parse_reply` scans for, but nothing forces the
/// model to comply — the parser tolerates any reply shape.
pub const DEFAULT_PROMPT: &str = "Analyze this Brazilian medication box front image. Extract the following information:

NOME: [Product name exactly as shown]
PRINCIPIO ATIVO: [Active ingredient]
DOSAGEM: [Dosage like 5mg, 10ml, etc.]
QUANTIDADE: [Quantity number only, like 30]
LABORATORIO: [Manufacturer name]
TARJA: [TV, TP, VL, or blank if no stripe visible]

Leave any field empty if the information is unclear or not visible. Return only the requested information in the exact format above.";

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

/// Pull the remote error message out of a non-success response body,
/// falling back to the HTTP status text.
fn upstream_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| e.message)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| status.to_string())
        })
}

/// Direct client for a vision-capable chat-completions endpoint.
pub struct VisionClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl VisionClient {
    /// Fails up front when no credential is configured — nothing else in
    /// this client can work without one.
    pub fn new(vision: &VisionSection) -> Result<Self, ScanError> {
        let api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| ScanError::MissingCredential(format!("{API_KEY_ENV} not set")))?;

        info!(
            url = %vision.base_url,
            model = %vision.model,
            "Using direct vision backend"
        );

        Ok(Self {
            client: Client::new(),
            base_url: vision.base_url.clone(),
            model: vision.model.clone(),
            api_key,
        })
    }

    /// One end-to-end analysis attempt: encode the image inline, send a
    /// single user message with a text part and an image part, parse the
    /// free-text reply into a record.
    pub async fn analyze(
        &self,
        prompt: &str,
        image_bytes: &[u8],
    ) -> Result<MedicationRecord, ScanError> {
        if prompt.trim().is_empty() {
            return Err(ScanError::MissingInput(
                "analysis instruction is empty".to_string(),
            ));
        }
        if image_bytes.is_empty() {
            return Err(ScanError::MissingInput("no captured image".to_string()));
        }

        let b64 = STANDARD.encode(image_bytes);
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![
                    ContentPart::Text {
                        text: prompt.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: format!("data:image/jpeg;base64,{b64}"),
                        },
                    },
                ],
            }],
            // Low temperature to bias toward literal extraction.
            max_tokens: 500,
            temperature: 0.1,
        };

        let url = format!("{}/chat/completions", self.base_url);
        info!(url = %url, image_bytes = image_bytes.len(), "Sending image for analysis");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ScanError::Upstream(upstream_message(status, &body)));
        }

        let chat_response: ChatResponse = response.json().await?;
        let content = chat_response
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(ScanError::EmptyResponse);
        }

        info!(chars = content.len(), "Vision reply received");
        Ok(parse::parse_reply(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_client() -> VisionClient {
        VisionClient {
            client: Client::new(),
            base_url: "http://unreachable.invalid/v1".to_string(),
            model: "gpt-4o".to_string(),
            api_key: "test-key".to_string(),
        }
    }

    #[tokio::test]
    async fn test_missing_image_short_circuits() {
        // The base URL is unreachable, so reaching the network would fail
        // with a transport error instead of MissingInput.
        let err = offline_client().analyze(DEFAULT_PROMPT, &[]).await.unwrap_err();
        assert!(matches!(err, ScanError::MissingInput(_)));
    }

    #[tokio::test]
    async fn test_missing_instruction_short_circuits() {
        let err = offline_client().analyze("   ", b"jpeg bytes").await.unwrap_err();
        assert!(matches!(err, ScanError::MissingInput(_)));
    }

    #[test]
    fn test_upstream_message_prefers_remote_error() {
        let msg = upstream_message(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"message":"rate limited"}}"#,
        );
        assert_eq!(msg, "rate limited");
    }

    #[test]
    fn test_upstream_message_falls_back_to_status_text() {
        let msg = upstream_message(reqwest::StatusCode::TOO_MANY_REQUESTS, "not json at all");
        assert_eq!(msg, "Too Many Requests");

        let msg = upstream_message(reqwest::StatusCode::BAD_GATEWAY, r#"{"error":{}}"#);
        assert_eq!(msg, "Bad Gateway");
    }

    #[test]
    fn test_request_wire_shape() {
        let request = ChatRequest {
            model: "gpt-4o".to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![
                    ContentPart::Text {
                        text: "instrução".to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: format!("data:image/jpeg;base64,{}", STANDARD.encode(b"img")),
                        },
                    },
                ],
            }],
            max_tokens: 500,
            temperature: 0.1,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"][0]["type"], "text");
        assert_eq!(json["messages"][0]["content"][1]["type"], "image_url");
        let url = json["messages"][0]["content"][1]["image_url"]["url"]
            .as_str()
            .unwrap();
        assert!(url.starts_with("data:image/jpeg;base64,"));
        assert_eq!(json["max_tokens"], 500);
    }

    #[test]
    fn test_default_prompt_names_all_labels() {
        for label in [
            "NOME:",
            "PRINCIPIO ATIVO:",
            "DOSAGEM:",
            "QUANTIDADE:",
            "LABORATORIO:",
            "TARJA:",
        ] {
            assert!(DEFAULT_PROMPT.contains(label), "missing {label}");
        }
    }
}
