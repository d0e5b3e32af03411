use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use super::{Credential, EncodedImage, ImageDetail, ProviderConfig, QueryError, VisionQuery};

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_PROMPT: &str = "Solve the problem in the image and only tell the answer in a concise but understandable way.";

pub struct OpenAiVisionClient {
    config: ProviderConfig,
    client: Client,
}

impl OpenAiVisionClient {
    pub fn new(config: ProviderConfig) -> Result<Self, QueryError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| QueryError::Network(e.to_string()))?;
        Ok(Self { config, client })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    fn build_request_body(&self, image: &EncodedImage) -> Value {
        json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": [
                {
                    "role": "user",
                    "content": [
                        {
                            "type": "image_url",
                            "image_url": {
                                "url": image.data_url(),
                                "detail": self.config.detail.as_str()
                            }
                        },
                        { "type": "text", "text": self.config.prompt }
                    ]
                }
            ]
        })
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            model: DEFAULT_MODEL.into(),
            prompt: DEFAULT_PROMPT.into(),
            max_tokens: 300,
            detail: ImageDetail::Low,
            timeout: None,
        }
    }
}

#[async_trait]
impl VisionQuery for OpenAiVisionClient {
    async fn query(
        &self,
        image: &EncodedImage,
        credential: &Credential,
    ) -> Result<String, QueryError> {
        let body = self.build_request_body(image);

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", credential.expose()))
            .json(&body)
            .send()
            .await
            .map_err(|e| QueryError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| QueryError::Network(e.to_string()))?;

        log::debug!("Vision endpoint answered HTTP {}", status);
        parse_response(status, &text)
    }

    fn name(&self) -> &str {
        "openai-chat-vision"
    }
}

/// Turn a completed HTTP exchange into an answer or a classified error.
pub(crate) fn parse_response(status: StatusCode, body: &str) -> Result<String, QueryError> {
    if !status.is_success() {
        let message = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| {
                v.pointer("/error/message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());

        return Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => QueryError::Auth(message),
            _ => QueryError::Upstream {
                status: status.as_u16(),
                message,
            },
        });
    }

    let parsed: Value = serde_json::from_str(body)
        .map_err(|e| QueryError::InvalidResponse(format!("Invalid JSON: {}", e)))?;

    parsed
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|c| c.trim().to_string())
        .ok_or_else(|| QueryError::InvalidResponse("missing choices[0].message.content".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenAiVisionClient {
        OpenAiVisionClient::new(ProviderConfig::default()).unwrap()
    }

    #[test]
    fn test_request_body_structure() {
        let image = EncodedImage {
            base64: "base64data".into(),
            size: 512,
        };
        let body = client().build_request_body(&image);

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], json!(300));

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");

        let content = messages[0]["content"].as_array().unwrap();
        assert_eq!(content.len(), 2);
        assert_eq!(content[0]["type"], "image_url");
        assert_eq!(
            content[0]["image_url"]["url"],
            "data:image/jpeg;base64,base64data"
        );
        assert_eq!(content[0]["image_url"]["detail"], "low");
        assert_eq!(content[1]["type"], "text");
        assert_eq!(content[1]["text"], DEFAULT_PROMPT);
    }

    #[test]
    fn test_parse_success_trims_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  B B B \n"}}]}"#;
        assert_eq!(parse_response(StatusCode::OK, body).unwrap(), "B B B");
    }

    #[test]
    fn test_parse_unauthorized_is_auth_error() {
        let body = r#"{"error":{"message":"invalid api key"}}"#;
        assert_eq!(
            parse_response(StatusCode::UNAUTHORIZED, body).unwrap_err(),
            QueryError::Auth("invalid api key".into())
        );
    }

    #[test]
    fn test_parse_upstream_error_message() {
        let body = r#"{"error":{"message":"model overloaded","type":"server_error"}}"#;
        match parse_response(StatusCode::SERVICE_UNAVAILABLE, body) {
            Err(QueryError::Upstream { status, message }) => {
                assert_eq!(status, 503);
                assert_eq!(message, "model overloaded");
            }
            other => panic!("expected Upstream, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_without_body_uses_reason_phrase() {
        match parse_response(StatusCode::TOO_MANY_REQUESTS, "<html>nope</html>") {
            Err(QueryError::Upstream { message, .. }) => assert_eq!(message, "Too Many Requests"),
            other => panic!("expected Upstream, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_missing_content() {
        assert!(matches!(
            parse_response(StatusCode::OK, r#"{"choices":[]}"#),
            Err(QueryError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_response(StatusCode::OK, "not valid json{{{"),
            Err(QueryError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_client_name() {
        assert_eq!(client().name(), "openai-chat-vision");
    }
}
