//! Pusher-compatible HTTP transport.
//!
//! Signs every request with HMAC-SHA256 over the canonical
//! `METHOD\n/path\nsorted-params` string and carries an MD5 of the JSON
//! body, as the transport requires. The MD5 is not a security measure; it
//! must run over the UTF-8 bytes so emoji payloads hash consistently.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::EventPublisher;
use crate::clock::Clock;
use crate::crypto::{hmac_sha256_hex, md5_hex};
use crate::{Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct PusherCredentials {
    pub host: String,
    pub app_id: String,
    pub key: String,
    pub secret: String,
}

impl std::fmt::Debug for PusherCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PusherCredentials")
            .field("host", &self.host)
            .field("app_id", &self.app_id)
            .finish()
    }
}

pub struct PusherTransport {
    credentials: PusherCredentials,
    client: reqwest::Client,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for PusherTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PusherTransport")
            .field("credentials", &self.credentials)
            .finish()
    }
}

impl PusherTransport {
    pub fn new(credentials: PusherCredentials, clock: Arc<dyn Clock>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Transport(format!("http client: {e}")))?;
        Ok(Self {
            credentials,
            client,
            clock,
        })
    }

    /// Signed query string for a body posted to the events path at `ts`.
    fn signed_query(&self, body: &str, unix_ts: i64) -> Vec<(String, String)> {
        let mut params = vec![
            ("auth_key".to_string(), self.credentials.key.clone()),
            ("auth_timestamp".to_string(), unix_ts.to_string()),
            ("auth_version".to_string(), "1.0".to_string()),
            ("body_md5".to_string(), md5_hex(body)),
        ];
        params.sort();

        let sorted_query = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let to_sign = format!(
            "POST\n/apps/{}/events\n{sorted_query}",
            self.credentials.app_id
        );
        params.push((
            "auth_signature".to_string(),
            hmac_sha256_hex(&self.credentials.secret, &to_sign),
        ));
        params
    }
}

#[async_trait]
impl EventPublisher for PusherTransport {
    async fn publish(&self, channel: &str, event: &str, payload: Value) -> Result<()> {
        // The transport expects `data` as a JSON-encoded string field.
        let body = serde_json::to_string(&json!({
            "name": event,
            "channel": channel,
            "data": serde_json::to_string(&payload)?,
        }))?;

        let params = self.signed_query(&body, self.clock.now().timestamp());
        let url = format!(
            "{}/apps/{}/events",
            self.credentials.host.trim_end_matches('/'),
            self.credentials.app_id
        );

        let response = self
            .client
            .post(&url)
            .query(&params)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("pusher publish: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Transport(format!(
                "pusher publish: status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn transport() -> PusherTransport {
        let clock = ManualClock::new("2025-01-10T10:00:00Z".parse().unwrap());
        PusherTransport::new(
            PusherCredentials {
                host: "https://api.pusherapp.com".to_string(),
                app_id: "12345".to_string(),
                key: "app-key".to_string(),
                secret: "app-secret".to_string(),
            },
            Arc::new(clock),
        )
        .unwrap()
    }

    #[test]
    fn query_is_sorted_and_signed() {
        let t = transport();
        let body = r#"{"name":"reaction","channel":"stream-s1","data":"{}"}"#;
        let params = t.signed_query(body, 1_736_503_200);

        let keys: Vec<&str> = params.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            [
                "auth_key",
                "auth_timestamp",
                "auth_version",
                "body_md5",
                "auth_signature"
            ]
        );

        let sorted_query = params[..4]
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let expected = hmac_sha256_hex(
            "app-secret",
            &format!("POST\n/apps/12345/events\n{sorted_query}"),
        );
        assert_eq!(params[4].1, expected);
    }

    #[test]
    fn body_md5_covers_utf8_bytes() {
        let t = transport();
        let body = r#"{"data":"🔥"}"#;
        let params = t.signed_query(body, 0);
        let md5 = &params.iter().find(|(k, _)| k == "body_md5").unwrap().1;
        assert_eq!(*md5, md5_hex(body));
    }
}
