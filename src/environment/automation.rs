//! Browser automation client
//!
//! Speaks the WebDriver-style wire protocol of a remote automation endpoint:
//! open a browser session, point it at a URL, close it again.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::launcher::LaunchError;
use super::BrowserKind;

const AUTOMATION_TIMEOUT_SECS: u64 = 30;

/// A live browser session held at the automation endpoint
#[derive(Clone, Debug)]
pub struct BrowserSession {
    pub session_id: String,
}

/// Driving a browser from the outside. Implemented over the wire by
/// [`RemoteAutomation`]; tests substitute their own.
#[async_trait]
pub trait BrowserAutomation: Send + Sync {
    async fn open(&self, kind: BrowserKind) -> Result<BrowserSession, LaunchError>;
    async fn navigate(&self, session: &BrowserSession, url: &str) -> Result<(), LaunchError>;
    async fn close(&self, session: &BrowserSession) -> Result<(), LaunchError>;
}

/// WebDriver-style client for a remote automation endpoint
#[derive(Clone)]
pub struct RemoteAutomation {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct NewSessionReply {
    value: NewSessionValue,
}

#[derive(Deserialize)]
struct NewSessionValue {
    #[serde(rename = "sessionId")]
    session_id: String,
}

impl RemoteAutomation {
    pub fn connect(base_url: impl Into<String>) -> Result<Self, LaunchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(AUTOMATION_TIMEOUT_SECS))
            .build()
            .map_err(|e| LaunchError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn map_send_error(&self, url: &str, e: reqwest::Error) -> LaunchError {
        if e.is_timeout() {
            LaunchError::Timeout(AUTOMATION_TIMEOUT_SECS)
        } else if e.is_connect() {
            LaunchError::ConnectionRefused(url.to_string())
        } else {
            LaunchError::RequestFailed(e.to_string())
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LaunchError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(LaunchError::Protocol {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl BrowserAutomation for RemoteAutomation {
    async fn open(&self, kind: BrowserKind) -> Result<BrowserSession, LaunchError> {
        let url = self.endpoint("/session");
        debug!("opening {} session via {}", kind, url);

        let body = json!({
            "capabilities": {
                "alwaysMatch": { "browserName": kind.name() }
            }
        });
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(&url, e))?;
        let response = Self::check_status(response).await?;

        let reply: NewSessionReply = response
            .json()
            .await
            .map_err(|e| LaunchError::RequestFailed(e.to_string()))?;
        debug!("opened session {}", reply.value.session_id);

        Ok(BrowserSession {
            session_id: reply.value.session_id,
        })
    }

    async fn navigate(&self, session: &BrowserSession, url: &str) -> Result<(), LaunchError> {
        let endpoint = self.endpoint(&format!("/session/{}/url", session.session_id));
        debug!("navigating session {} to {}", session.session_id, url);

        let response = self
            .client
            .post(&endpoint)
            .json(&json!({ "url": url }))
            .send()
            .await
            .map_err(|e| self.map_send_error(&endpoint, e))?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn close(&self, session: &BrowserSession) -> Result<(), LaunchError> {
        let endpoint = self.endpoint(&format!("/session/{}", session.session_id));
        debug!("closing session {}", session.session_id);

        let response = self
            .client
            .delete(&endpoint)
            .send()
            .await
            .map_err(|e| self.map_send_error(&endpoint, e))?;
        Self::check_status(response).await?;
        Ok(())
    }
}
