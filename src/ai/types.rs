use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque bearer token. Never inspected, only checked for presence.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw token. Returns `None` for empty or whitespace-only input.
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        let trimmed = token.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

// Keep tokens out of logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(********)")
    }
}

/// A re-encoded capture ready to be sent upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// Base64-encoded JPEG image data
    pub base64: String,
    /// Square edge length in pixels
    pub size: u32,
}

impl EncodedImage {
    pub fn data_url(&self) -> String {
        format!("data:image/jpeg;base64,{}", self.base64)
    }
}

/// Error type for vision queries
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("{0}")]
    Auth(String),
    #[error("{message}")]
    Upstream { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// How much detail the upstream model should spend on the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    Low,
    High,
    Auto,
}

impl ImageDetail {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageDetail::Low => "low",
            ImageDetail::High => "high",
            ImageDetail::Auto => "auto",
        }
    }
}

/// Configuration for a vision provider
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub endpoint: String,
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub detail: ImageDetail,
    /// `None` leaves the transport's own behaviour in charge.
    pub timeout: Option<std::time::Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_rejects_blank_input() {
        assert!(Credential::new("").is_none());
        assert!(Credential::new("   \n").is_none());
        assert_eq!(Credential::new("  sk-abc ").unwrap().expose(), "sk-abc");
    }

    #[test]
    fn credential_debug_is_masked() {
        let c = Credential::new("sk-secret").unwrap();
        assert!(!format!("{:?}", c).contains("secret"));
    }

    #[test]
    fn data_url_prefix() {
        let img = EncodedImage {
            base64: "AAAA".into(),
            size: 512,
        };
        assert_eq!(img.data_url(), "data:image/jpeg;base64,AAAA");
    }
}
