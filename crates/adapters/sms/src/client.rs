//! HTTP 短信客户端
//!
//! 请求格式：`POST {base_url}/{api_key}/sms/send.json`，表单字段 `receptor` / `sender` / `message`

use std::time::Duration;

use crm_config::SmsConfig;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{SmsError, SmsReceipt, SmsSender};

#[derive(Debug, Deserialize)]
struct ProviderResponse {
    #[serde(rename = "return")]
    result: ProviderReturn,
    #[serde(default)]
    entries: Option<Vec<ProviderEntry>>,
}

#[derive(Debug, Deserialize)]
struct ProviderReturn {
    status: u16,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ProviderEntry {
    messageid: serde_json::Value,
}

/// 短信客户端
#[derive(Clone)]
pub struct HttpSmsClient {
    http: Client,
    config: SmsConfig,
}

impl HttpSmsClient {
    pub fn new(config: SmsConfig) -> Result<Self, SmsError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SmsError::Transport(e.to_string()))?;
        Ok(Self { http, config })
    }

    fn send_url(&self) -> String {
        format!(
            "{}/{}/sms/send.json",
            self.config.base_url.trim_end_matches('/'),
            self.config.api_key.expose_secret()
        )
    }

    fn parse_response(status: u16, body: &str) -> Result<SmsReceipt, SmsError> {
        let parsed: ProviderResponse = serde_json::from_str(body).map_err(|e| {
            if (200..300).contains(&status) {
                SmsError::Decode(e.to_string())
            } else {
                SmsError::Rejected {
                    status,
                    message: body.chars().take(200).collect(),
                }
            }
        })?;

        if parsed.result.status != 200 {
            return Err(SmsError::Rejected {
                status: parsed.result.status,
                message: parsed.result.message,
            });
        }

        let message_id = parsed
            .entries
            .unwrap_or_default()
            .into_iter()
            .next()
            .map(|entry| match entry.messageid {
                serde_json::Value::String(id) => id,
                other => other.to_string(),
            });
        Ok(SmsReceipt { message_id })
    }
}

#[async_trait::async_trait]
impl SmsSender for HttpSmsClient {
    async fn send_text(&self, phone: &str, body: &str) -> Result<SmsReceipt, SmsError> {
        debug!(sender = %self.config.sender, "Sending SMS");

        let form = [
            ("receptor", phone),
            ("sender", self.config.sender.as_str()),
            ("message", body),
        ];

        let response = self
            .http
            .post(self.send_url())
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SmsError::Timeout
                } else {
                    // 不记录 URL，其中包含 API key
                    SmsError::Transport(e.without_url().to_string())
                }
            })?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| SmsError::Transport(e.without_url().to_string()))?;

        let result = Self::parse_response(status, &text);
        if let Err(e) = &result {
            warn!(status, error = %e, "SMS provider returned an error");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Form, Json, Router, routing::post};
    use secrecy::Secret;
    use std::collections::HashMap;

    fn config(base_url: &str) -> SmsConfig {
        SmsConfig {
            base_url: base_url.to_string(),
            api_key: Secret::new("test-key".to_string()),
            sender: "10004346".to_string(),
            timeout_secs: 2,
            message_template: "code {code}".to_string(),
        }
    }

    #[test]
    fn test_send_url_includes_api_key() {
        let client = HttpSmsClient::new(config("https://sms.example.com/v1/")).unwrap();
        assert_eq!(client.send_url(), "https://sms.example.com/v1/test-key/sms/send.json");
    }

    #[test]
    fn test_parse_accepted_response() {
        let body = r#"{"return":{"status":200,"message":"OK"},"entries":[{"messageid":8792343,"status":1}]}"#;
        let receipt = HttpSmsClient::parse_response(200, body).unwrap();
        assert_eq!(receipt.message_id.as_deref(), Some("8792343"));
    }

    #[test]
    fn test_parse_rejected_response() {
        let body = r#"{"return":{"status":418,"message":"insufficient credit"},"entries":null}"#;
        let err = HttpSmsClient::parse_response(418, body).unwrap_err();
        assert!(matches!(err, SmsError::Rejected { status: 418, .. }));
    }

    #[test]
    fn test_parse_non_json_error_page() {
        let err = HttpSmsClient::parse_response(502, "<html>Bad Gateway</html>").unwrap_err();
        assert!(matches!(err, SmsError::Rejected { status: 502, .. }));

        let err = HttpSmsClient::parse_response(200, "not json").unwrap_err();
        assert!(matches!(err, SmsError::Decode(_)));
    }

    #[tokio::test]
    async fn test_send_text_posts_form_to_provider() {
        let app = Router::new().route(
            "/v1/test-key/sms/send.json",
            post(|Form(form): Form<HashMap<String, String>>| async move {
                assert_eq!(form["receptor"], "09120000001");
                assert_eq!(form["sender"], "10004346");
                assert_eq!(form["message"], "code 1234");
                Json(serde_json::json!({
                    "return": {"status": 200, "message": "OK"},
                    "entries": [{"messageid": "abc-1", "status": 1}]
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let client = HttpSmsClient::new(config(&format!("http://{}/v1", addr))).unwrap();
        let receipt = client.send_text("09120000001", "code 1234").await.unwrap();
        assert_eq!(receipt.message_id.as_deref(), Some("abc-1"));
    }
}
