//! GigaChat provider.
//!
//! GigaChat speaks the OpenAI-style `/chat/completions` format but needs a
//! short-lived access token obtained from an OAuth endpoint with the
//! long-lived authorization key. Tokens are cached until shortly before
//! they expire.

use super::{Provider, ProviderError};
use crate::session::PromptMessage;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use helpdesk_common::{Error, LlmConfig};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Refresh the token this long before it expires.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

const PROVIDER_NAME: &str = "gigachat";

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Unix millis
    expires_at: i64,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<CompletionMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct CompletionMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Provider for the GigaChat chat-completions API.
pub struct GigaChatProvider {
    credentials: String,
    scope: String,
    model: String,
    auth_url: String,
    base_url: String,
    client: Client,
    token: Mutex<Option<AccessToken>>,
}

impl GigaChatProvider {
    /// Build a provider from configuration.
    ///
    /// Fails if credentials are missing, the CA file cannot be read, or the
    /// HTTP client cannot be built.
    pub fn from_config(config: &LlmConfig) -> helpdesk_common::Result<Self> {
        let credentials = config
            .credentials
            .clone()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| Error::Config("GigaChat credentials are not set".into()))?;

        let mut builder = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .connect_timeout(std::time::Duration::from_secs(10));

        if !config.verify_tls {
            tracing::warn!(
                provider = PROVIDER_NAME,
                "TLS certificate verification is DISABLED for the LLM provider"
            );
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(ref path) = config.ca_cert_path {
            let pem = std::fs::read(path)
                .map_err(|e| Error::Io(e).with_context(format!("reading {}", path.display())))?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| Error::Config(format!("Invalid CA certificate {}: {e}", path.display())))?;
            builder = builder.add_root_certificate(cert);
            tracing::info!(path = %path.display(), "Trusting extra CA certificate for the LLM provider");
        }

        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            credentials,
            scope: config.scope.clone(),
            model: config.model.clone(),
            auth_url: config.auth_url.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            token: Mutex::new(None),
        })
    }

    /// Model requested from the API.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn error(&self, message: impl Into<String>, status_code: Option<u16>) -> ProviderError {
        ProviderError {
            provider: PROVIDER_NAME.to_string(),
            model: self.model.clone(),
            message: message.into(),
            status_code,
        }
    }

    /// Return a cached token or fetch a new one.
    async fn access_token(&self) -> Result<String, ProviderError> {
        let mut cached = self.token.lock().await;
        if let Some(ref token) = *cached {
            if token.is_fresh(Utc::now()) {
                return Ok(token.value.clone());
            }
        }

        let token = self.fetch_token().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    async fn fetch_token(&self) -> Result<AccessToken, ProviderError> {
        let response = self
            .client
            .post(&self.auth_url)
            .header("Authorization", format!("Basic {}", self.credentials))
            .header("RqUID", uuid::Uuid::new_v4().to_string())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("Accept", "application/json")
            .body(format!("scope={}", self.scope))
            .send()
            .await
            .map_err(|e| self.error(format!("Token request failed: {e}"), None))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(self.error(
                format!("Token exchange failed ({}): {}", status.as_u16(), error_text),
                Some(status.as_u16()),
            ));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| self.error(format!("Failed to parse token response: {e}"), None))?;

        let expires_at = DateTime::<Utc>::from_timestamp_millis(token.expires_at)
            .ok_or_else(|| self.error(format!("Invalid token expiry: {}", token.expires_at), None))?;

        tracing::debug!(expires_at = %expires_at, "GigaChat access token refreshed");

        Ok(AccessToken {
            value: token.access_token,
            expires_at,
        })
    }
}

/// Pull `choices[0].message.content` out of a completion body.
///
/// Bodies without that field are returned verbatim.
fn extract_reply(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("choices")?
                .get(0)?
                .get("message")?
                .get("content")?
                .as_str()
                .map(ToString::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl Provider for GigaChatProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, ProviderError> {
        let token = self.access_token().await?;

        let request = CompletionRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| CompletionMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
        };

        let url = format!("{}/chat/completions", self.base_url);
        let started = std::time::Instant::now();

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.error(format!("Request failed: {e}"), None))?;

        let status = response.status();
        if !status.is_success() {
            if status.as_u16() == 401 {
                self.invalidate_token().await;
            }
            let error_text = response.text().await.unwrap_or_default();
            return Err(self.error(
                format!("API error ({}): {}", status.as_u16(), error_text),
                Some(status.as_u16()),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.error(format!("Failed to read response: {e}"), None))?;

        tracing::debug!(
            provider = PROVIDER_NAME,
            model = %self.model,
            prompt_messages = messages.len(),
            latency_ms = started.elapsed().as_millis() as u64,
            "Completion received"
        );

        Ok(extract_reply(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LlmConfig {
        LlmConfig {
            credentials: Some("key".into()),
            base_url: "https://gigachat.example.com/api/v1/".into(),
            ..LlmConfig::default()
        }
    }

    #[test]
    fn from_config_requires_credentials() {
        let mut cfg = config();
        cfg.credentials = None;
        assert!(matches!(GigaChatProvider::from_config(&cfg), Err(Error::Config(_))));
    }

    #[test]
    fn from_config_strips_trailing_slash() {
        let provider = GigaChatProvider::from_config(&config()).unwrap();
        assert_eq!(provider.base_url, "https://gigachat.example.com/api/v1");
        assert_eq!(provider.name(), "gigachat");
        assert_eq!(provider.model(), "GigaChat");
    }

    #[test]
    fn from_config_without_tls_verification() {
        let mut cfg = config();
        cfg.verify_tls = false;
        assert!(GigaChatProvider::from_config(&cfg).is_ok());
    }

    #[test]
    fn from_config_missing_ca_file() {
        let mut cfg = config();
        cfg.ca_cert_path = Some("/definitely/not/here.pem".into());
        let err = GigaChatProvider::from_config(&cfg).err().unwrap();
        assert!(err.is_io());
    }

    #[test]
    fn extract_reply_reads_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Restart the router."},"finish_reason":"stop"}]}"#;
        assert_eq!(extract_reply(body), "Restart the router.");
    }

    #[test]
    fn extract_reply_falls_back_to_raw_body() {
        assert_eq!(extract_reply(r#"{"choices":[]}"#), r#"{"choices":[]}"#);
        assert_eq!(extract_reply("plain text"), "plain text");
    }

    #[test]
    fn token_freshness_margin() {
        let now = Utc::now();
        let fresh = AccessToken {
            value: "t".into(),
            expires_at: now + Duration::minutes(30),
        };
        let stale = AccessToken {
            value: "t".into(),
            expires_at: now + Duration::seconds(30),
        };
        assert!(fresh.is_fresh(now));
        assert!(!stale.is_fresh(now));
    }

    #[test]
    fn request_serializes_roles() {
        let messages = [PromptMessage::system("sys"), PromptMessage::user("hi")];
        let request = CompletionRequest {
            model: "GigaChat",
            messages: messages
                .iter()
                .map(|m| CompletionMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "GigaChat");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
    }
}
