//! HTTP client for web-managed switches.
//!
//! The management interface takes a signed login (md5 over
//! `username:password:nonce:timestamp`) and hands back a bearer token;
//! port commands are token-authenticated JSON posts. Sessions are
//! short-lived, so the reconciler logs in before every command batch
//! rather than caching tokens.

use super::{DriverError, SwitchDriver, SwitchSession};
use crate::models::Device;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct SessionRequest<'a> {
    username: &'a str,
    client_id: &'a str,
    nonce: &'a str,
    timestamp: i64,
    sign: &'a str,
}

#[derive(Deserialize)]
struct SessionResponse {
    token: String,
}

#[derive(Serialize)]
struct PortStateRequest {
    enabled: bool,
}

pub struct WebSmartClient {
    http: reqwest::Client,
    /// Stable per-process id sent with every login, so concurrent
    /// controller instances are distinguishable in the switch log.
    client_id: String,
}

impl WebSmartClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: format!("killswitch-{}", uuid::Uuid::new_v4()),
        }
    }

    /// Generate a random nonce for login signing
    fn generate_nonce() -> String {
        let mut rng = rand::rng();
        let random: u128 = rng.random();
        format!("{:032x}", random)
    }

    /// Get current timestamp
    fn get_timestamp() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    /// Calculate the MD5 login signature over `username:password:nonce:timestamp`
    fn calculate_sign(username: &str, password: &str, nonce: &str, timestamp: i64) -> String {
        let sign_string = format!("{}:{}:{}:{}", username, password, nonce, timestamp);
        let digest = md5::compute(sign_string.as_bytes());
        format!("{:x}", digest)
    }

    fn session_url(host: &str) -> String {
        format!("http://{}/api/session", host)
    }

    fn port_url(host: &str, port_index: i32) -> String {
        format!("http://{}/api/ports/{}", host, port_index)
    }

    fn map_request_error(err: reqwest::Error) -> DriverError {
        if err.is_timeout() {
            DriverError::Timeout
        } else {
            DriverError::ConnectionFailed(err.to_string())
        }
    }
}

impl Default for WebSmartClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SwitchDriver for WebSmartClient {
    fn driver_name(&self) -> &'static str {
        "websmart"
    }

    async fn authenticate(&self, device: &Device) -> Result<SwitchSession, DriverError> {
        if device.username.is_empty() || device.password.is_empty() {
            return Err(DriverError::InvalidCredentials);
        }

        let nonce = Self::generate_nonce();
        let timestamp = Self::get_timestamp();
        let sign = Self::calculate_sign(&device.username, &device.password, &nonce, timestamp);

        let response = self
            .http
            .post(Self::session_url(&device.host))
            .timeout(REQUEST_TIMEOUT)
            .json(&SessionRequest {
                username: &device.username,
                client_id: &self.client_id,
                nonce: &nonce,
                timestamp,
                sign: &sign,
            })
            .send()
            .await
            .map_err(Self::map_request_error)?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(DriverError::AuthenticationFailed(format!(
                "switch at {} returned {}",
                device.host, status
            )));
        }
        if !status.is_success() {
            return Err(DriverError::ConnectionFailed(format!(
                "unexpected status {} from {}",
                status, device.host
            )));
        }

        let session: SessionResponse = response.json().await.map_err(Self::map_request_error)?;
        Ok(SwitchSession {
            token: session.token,
        })
    }

    async fn set_port_state(
        &self,
        session: &SwitchSession,
        device: &Device,
        enabled: bool,
    ) -> Result<(), DriverError> {
        let response = self
            .http
            .post(Self::port_url(&device.host, device.port_index))
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(&session.token)
            .json(&PortStateRequest { enabled })
            .send()
            .await
            .map_err(Self::map_request_error)?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(DriverError::AuthenticationFailed(format!(
                "session rejected by {}",
                device.host
            )));
        }
        if !status.is_success() {
            return Err(DriverError::CommandRejected(format!(
                "port {} on {} returned {}",
                device.port_index, device.host, status
            )));
        }

        log::debug!(
            "Port {} on {} set to {}",
            device.port_index,
            device.host,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_nonce() {
        let n1 = WebSmartClient::generate_nonce();
        let n2 = WebSmartClient::generate_nonce();

        assert_eq!(n1.len(), 32);
        assert_eq!(n2.len(), 32);
        assert!(n1.chars().all(|c| c.is_ascii_hexdigit()));
        // Should be different
        assert_ne!(n1, n2);
    }

    #[test]
    fn test_calculate_sign() {
        let sign = WebSmartClient::calculate_sign("admin", "secret", "abc123", 1234567890);

        // 32-character hex string
        assert_eq!(sign.len(), 32);
        assert!(sign.chars().all(|c| c.is_ascii_hexdigit()));

        // Deterministic for identical inputs, different otherwise
        assert_eq!(
            sign,
            WebSmartClient::calculate_sign("admin", "secret", "abc123", 1234567890)
        );
        assert_ne!(
            sign,
            WebSmartClient::calculate_sign("admin", "other", "abc123", 1234567890)
        );
    }

    #[test]
    fn test_url_shapes() {
        assert_eq!(
            WebSmartClient::session_url("192.168.1.20"),
            "http://192.168.1.20/api/session"
        );
        assert_eq!(
            WebSmartClient::port_url("192.168.1.20", 4),
            "http://192.168.1.20/api/ports/4"
        );
    }

    #[test]
    fn test_session_request_serialization() {
        let request = SessionRequest {
            username: "admin",
            client_id: "killswitch-x",
            nonce: "n",
            timestamp: 42,
            sign: "s",
        };
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["username"], "admin");
        assert_eq!(value["client_id"], "killswitch-x");
        assert_eq!(value["nonce"], "n");
        assert_eq!(value["timestamp"], 42);
        assert_eq!(value["sign"], "s");
    }

    #[test]
    fn test_driver_name() {
        assert_eq!(WebSmartClient::new().driver_name(), "websmart");
    }
}
