//! HTTP client for the identity service and work queue
//!
//! Writes that must land (contract creation, mapping registration, message
//! status and response updates) retry with exponential backoff; heartbeat
//! and pending-request fetch are single-attempt, backed off by the loop
//! interval instead.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::json;
use tokio::time::sleep;
use uuid::Uuid;

use crate::contract::MethodContract;
use crate::error::{Result, WavebindError};
use crate::protocol::{MessageStatus, PendingRecord, ResponseEnvelope};

/// Retry policy for service writes
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
        }
    }
}

impl RetryConfig {
    /// Delay before the given retry attempt (1-based), doubling each time
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(0);
        }
        let exponent = (attempt - 1).min(16);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    retry: RetryConfig,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryConfig::default(),
        }
    }

    pub fn http_client(&self) -> &Client {
        &self.client
    }

    /// Reports the connection as alive. Single attempt; the heartbeat loop
    /// provides the backoff.
    pub async fn connection_heartbeat(&self, connection_token: Uuid) -> Result<()> {
        let url = format!(
            "{}/api/hub/connection/compute/{}/1/",
            self.base_url, connection_token
        );
        self.send_once("connection heartbeat", StatusCode::OK, self.client.put(&url))
            .await
            .map(drop)
    }

    pub async fn update_connection_loaded(&self, connection_token: Uuid, loaded: bool) -> Result<()> {
        let url = format!(
            "{}/api/hub/connections/{}/loaded/",
            self.base_url, connection_token
        );
        let payload = json!({ "loaded": loaded });
        self.send_once(
            "loaded-flag update",
            StatusCode::OK,
            self.client.put(&url).json(&payload),
        )
        .await
        .map(drop)
    }

    pub async fn create_compute_contract(
        &self,
        connection_token: Uuid,
        contract: &MethodContract,
    ) -> Result<String> {
        let url = format!("{}/api/hub/compute/contract/", self.base_url);
        let payload = json!({ "id": connection_token, "data": contract });
        self.send_with_retry("compute-contract creation", StatusCode::CREATED, || {
            self.client.post(&url).json(&payload)
        })
        .await
    }

    pub async fn add_connection_mapping(
        &self,
        master_token: Uuid,
        connection_token: Uuid,
        name: &str,
        description: &str,
        connection_type: &str,
    ) -> Result<String> {
        let url = format!("{}/api/hub/connection_mappings/", self.base_url);
        let payload = json!({
            "master_token": master_token,
            "connection_token": connection_token,
            "connection_name": name,
            "connection_type": connection_type,
            "description": description,
        });
        self.send_with_retry("connection-mapping creation", StatusCode::CREATED, || {
            self.client.post(&url).json(&payload)
        })
        .await
    }

    /// Fetches the pending records for a connection. Single attempt; the
    /// poll loop provides the backoff.
    pub async fn fetch_pending_requests(&self, connection_token: Uuid) -> Result<Vec<PendingRecord>> {
        let url = format!(
            "{}/api/hub/get_latest_pending_messages/{}/",
            self.base_url, connection_token
        );
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(WavebindError::ServiceStatus {
                operation: "pending-request fetch",
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json::<Vec<PendingRecord>>().await?)
    }

    pub async fn update_message_status(
        &self,
        connection_token: Uuid,
        message_id: &str,
        status: MessageStatus,
    ) -> Result<()> {
        let url = format!(
            "{}/api/hub/update_message_status/{}/{}/",
            self.base_url, connection_token, message_id
        );
        let payload = json!({ "status": status });
        self.send_with_retry("message-status update", StatusCode::OK, || {
            self.client.patch(&url).json(&payload)
        })
        .await
        .map(drop)
    }

    pub async fn send_message_response(
        &self,
        connection_token: Uuid,
        message_id: Option<&str>,
        response: &ResponseEnvelope,
    ) -> Result<String> {
        let url = format!("{}/api/hub/reply_to_message/", self.base_url);
        let payload = json!({
            "id": message_id,
            "token": connection_token,
            "response": response,
            "status": MessageStatus::Completed,
        });
        self.send_with_retry("message response", StatusCode::OK, || {
            self.client.post(&url).json(&payload)
        })
        .await
    }

    async fn send_once(
        &self,
        operation: &'static str,
        expect: StatusCode,
        request: RequestBuilder,
    ) -> Result<String> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status != expect {
            return Err(WavebindError::ServiceStatus {
                operation,
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    async fn send_with_retry<F>(
        &self,
        operation: &'static str,
        expect: StatusCode,
        build: F,
    ) -> Result<String>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let err = match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    if status == expect {
                        return Ok(body);
                    }
                    WavebindError::ServiceStatus {
                        operation,
                        status: status.as_u16(),
                        body,
                    }
                }
                Err(e) => WavebindError::Transport(e),
            };

            attempt += 1;
            if attempt >= self.retry.max_attempts || !err.is_retryable() {
                return Err(err);
            }
            tracing::warn!(operation, attempt, error = %err, "retrying after transient failure");
            sleep(self.retry.delay_for_attempt(attempt)).await;
        }
    }
}
