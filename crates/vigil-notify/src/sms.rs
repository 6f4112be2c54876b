//! Outbound text messages.
//!
//! [`TwilioSms`] reads its account credentials from the preference source
//! on every send, so updated credentials apply without a restart.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use vigil_core::Preferences;
use vigil_core::preferences::{TWILIO_AUTH_TOKEN, TWILIO_PHONE_NUMBER, TWILIO_SID};

use crate::error::{NotifyError, NotifyResult};

const TWILIO_API: &str = "https://api.twilio.com";

/// Text message delivery channel.
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send_text(&self, to: &str, body: &str) -> NotifyResult<()>;
}

/// Sends texts through the Twilio Messages API.
pub struct TwilioSms {
    client: reqwest::Client,
    preferences: Preferences,
    base_url: String,
}

impl TwilioSms {
    pub fn new(preferences: Preferences, timeout: Duration) -> NotifyResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(preferences, client, TWILIO_API))
    }

    /// Use a preconfigured client against a different API host.
    pub fn with_client(preferences: Preferences, client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            preferences,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn credential(&self, key: &str) -> NotifyResult<String> {
        match self.preferences.get(key) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(NotifyError::NotConfigured(key.to_string())),
        }
    }
}

#[async_trait]
impl SmsSender for TwilioSms {
    async fn send_text(&self, to: &str, body: &str) -> NotifyResult<()> {
        let sid = self.credential(TWILIO_SID)?;
        let token = self.credential(TWILIO_AUTH_TOKEN)?;
        let from = self.credential(TWILIO_PHONE_NUMBER)?;

        let url = format!("{}/2010-04-01/Accounts/{sid}/Messages.json", self.base_url);
        let resp = self
            .client
            .post(&url)
            .basic_auth(&sid, Some(&token))
            .header("Accept", "application/json")
            .form(&[("To", to), ("From", from.as_str()), ("Body", body)])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            warn!(%status, %to, "twilio rejected text message");
            return Err(NotifyError::Delivery(format!("twilio responded {status}")));
        }

        let data: serde_json::Value = resp.json().await?;
        debug!(sid = %data["sid"], %to, "text message queued");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn configured_prefs() -> Preferences {
        Preferences::new(HashMap::from([
            (TWILIO_SID.to_string(), "AC123".to_string()),
            (TWILIO_AUTH_TOKEN.to_string(), "secret".to_string()),
            (TWILIO_PHONE_NUMBER.to_string(), "+15550001111".to_string()),
        ]))
    }

    fn local_client() -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .no_proxy()
            .build()
            .unwrap()
    }

    /// Serve one canned HTTP response and hand back the raw request.
    async fn one_shot_server(response: String) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            request
        });
        (format!("http://{addr}"), handle)
    }

    /// Read headers plus a `content-length` body so the socket is drained
    /// before the response goes out.
    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    return text;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    #[tokio::test]
    async fn missing_credentials_are_reported() {
        let sms = TwilioSms::new(Preferences::default(), Duration::from_secs(1)).unwrap();
        let err = sms.send_text("+15550002222", "hi").await.unwrap_err();
        assert!(matches!(err, NotifyError::NotConfigured(ref key) if key == TWILIO_SID));
    }

    #[tokio::test]
    async fn posts_to_account_messages_endpoint() {
        let body = r#"{"sid":"SM1"}"#;
        let response = format!(
            "HTTP/1.1 201 Created\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        let (base, server) = one_shot_server(response).await;

        let sms = TwilioSms::with_client(configured_prefs(), local_client(), &base);
        sms.send_text("+15550002222", "PROBLEM: service HTTP on web")
            .await
            .unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /2010-04-01/Accounts/AC123/Messages.json"));
        assert!(request.to_lowercase().contains("authorization: basic"));
    }

    #[tokio::test]
    async fn non_success_status_is_delivery_error() {
        let (base, _server) = one_shot_server(
            "HTTP/1.1 401 Unauthorized\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                .to_string(),
        )
        .await;

        let sms = TwilioSms::with_client(configured_prefs(), local_client(), &base);
        let err = sms.send_text("+15550002222", "hi").await.unwrap_err();
        assert!(matches!(err, NotifyError::Delivery(_)));
    }
}
