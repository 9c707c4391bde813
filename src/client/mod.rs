//! Orchestration server client
//!
//! The local runner's view of the orchestration server: create a session,
//! poll for its result, fetch test metadata and resources.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use crate::models::SessionResult;

/// How often the runner re-asks for a session result
pub const SESSION_STATUS_POLL_INTERVAL: Duration = Duration::from_millis(1237);

const CLIENT_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    #[error("connection refused to {0}")]
    ConnectionRefused(String),

    #[error("failed to create session; status: {status}, message: {message}")]
    UnexpectedStatus { status: u16, message: String },

    #[error("failed to decode server response: {0}")]
    Decode(String),

    #[error("no session result within {0} seconds")]
    DeadlineExceeded(u64),
}

/// Reply to a session creation request
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetails {
    pub session_id: u64,
}

/// HTTP client for one orchestration server
#[derive(Clone)]
pub struct SessionClient {
    client: reqwest::Client,
    base_url: String,
    poll_interval: Duration,
}

impl SessionClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(CLIENT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ClientError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            poll_interval: SESSION_STATUS_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn map_send_error(&self, url: &str, e: reqwest::Error) -> ClientError {
        if e.is_timeout() {
            ClientError::Timeout(CLIENT_TIMEOUT_SECS)
        } else if e.is_connect() {
            ClientError::ConnectionRefused(url.to_string())
        } else {
            ClientError::RequestFailed(e.to_string())
        }
    }

    /// Ask the server to open a session for the given configuration.
    /// Anything but 201 is a failure.
    pub async fn create_session<T: Serialize>(
        &self,
        config: &T,
    ) -> Result<SessionDetails, ClientError> {
        let url = self.endpoint("/api/v1/sessions");
        debug!("creating session via {url}");

        let response = self
            .client
            .post(&url)
            .json(config)
            .send()
            .await
            .map_err(|e| self.map_send_error(&url, e))?;

        let status = response.status();
        if status.as_u16() != 201 {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::UnexpectedStatus {
                status: status.as_u16(),
                message,
            });
        }

        let details: SessionDetails = response
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        debug!("session #{} created", details.session_id);
        Ok(details)
    }

    /// Poll until the session result is available. A non-200 reply or an
    /// empty body both mean "not yet"; an optional deadline bounds the wait.
    pub async fn wait_result(
        &self,
        session_id: u64,
        deadline: Option<Duration>,
    ) -> Result<SessionResult, ClientError> {
        match deadline {
            Some(budget) => tokio::time::timeout(budget, self.poll_result(session_id))
                .await
                .map_err(|_| ClientError::DeadlineExceeded(budget.as_secs()))?,
            None => self.poll_result(session_id).await,
        }
    }

    async fn poll_result(&self, session_id: u64) -> Result<SessionResult, ClientError> {
        let url = self.endpoint(&format!("/api/v1/sessions/{session_id}/result"));
        loop {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| self.map_send_error(&url, e))?;

            let status = response.status();
            if status.as_u16() != 200 {
                error!(
                    "unexpected session result response; status: {}, message: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("")
                );
            } else {
                let body = response
                    .text()
                    .await
                    .map_err(|e| ClientError::RequestFailed(e.to_string()))?;
                if !body.is_empty() {
                    return serde_json::from_str(&body)
                        .map_err(|e| ClientError::Decode(e.to_string()));
                }
                debug!("session #{session_id} still running");
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Effective test configuration as the server sees it
    pub async fn fetch_metadata(&self) -> Result<serde_json::Value, ClientError> {
        self.get_json("/api/tests/metadata").await
    }

    /// Test resource references the server will serve to environments
    pub async fn fetch_resources(&self) -> Result<Vec<String>, ClientError> {
        let value: serde_json::Value = self.get_json("/api/tests/resources").await?;
        serde_json::from_value(value).map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value, ClientError> {
        let url = self.endpoint(path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_send_error(&url, e))?;

        let status = response.status();
        if status.as_u16() != 200 {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::UnexpectedStatus {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_base_and_path() {
        let client = SessionClient::new("http://localhost:3000/").unwrap();
        assert_eq!(
            client.endpoint("/api/v1/sessions"),
            "http://localhost:3000/api/v1/sessions"
        );
        assert_eq!(
            client.endpoint("/api/v1/sessions/7/result"),
            "http://localhost:3000/api/v1/sessions/7/result"
        );
    }

    #[test]
    fn poll_interval_is_configurable() {
        let client = SessionClient::new("http://localhost:3000")
            .unwrap()
            .with_poll_interval(Duration::from_millis(50));
        assert_eq!(client.poll_interval, Duration::from_millis(50));

        let default_client = SessionClient::new("http://localhost:3000").unwrap();
        assert_eq!(default_client.poll_interval, SESSION_STATUS_POLL_INTERVAL);
    }

    #[test]
    fn session_details_parse_wire_casing() {
        let details: SessionDetails = serde_json::from_str(r#"{"sessionId":12}"#).unwrap();
        assert_eq!(details.session_id, 12);
    }

    #[test]
    fn status_errors_carry_both_fields() {
        let err = ClientError::UnexpectedStatus {
            status: 409,
            message: "session already exists".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to create session; status: 409, message: session already exists"
        );
    }
}
