//! Signed deployment callbacks.
//!
//! After every attempt that got past validation, a JSON summary is POSTed to
//! the configured URL. When a shared secret is configured the exact body
//! bytes are signed with HMAC-SHA256 and the hex digest is sent in the
//! `x-webhook-signature` header.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use uuid::Uuid;

use crate::crypto::sign_payload;
use crate::error::{AppError, AppResult};
use crate::result_ext::ResultExt;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Deployment parameters echoed back to the receiver.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackParams {
    pub name: String,
    pub image: String,
    pub version: String,
    pub host_port: u16,
    pub container_port: u16,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackPayload {
    pub success: bool,
    pub code: u16,
    pub deployment_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub params: CallbackParams,
}

#[derive(Clone)]
pub struct CallbackNotifier {
    client: reqwest::Client,
    url: String,
    secret: Option<String>,
}

impl CallbackNotifier {
    pub fn new(url: &str, secret: Option<String>, timeout: Duration) -> AppResult<Self> {
        url::Url::parse(url)
            .map_err(|e| AppError::Config(format!("Invalid callback URL '{}': {}", url, e)))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.to_string(),
            secret: secret.filter(|s| !s.is_empty()),
        })
    }

    /// Deliver one payload and wait for the receiver's answer.
    pub async fn send(&self, payload: &CallbackPayload) -> AppResult<()> {
        let body = serde_json::to_vec(payload)?;

        let mut request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json");
        if let Some(ref secret) = self.secret {
            request = request.header(SIGNATURE_HEADER, sign_payload(secret.as_bytes(), &body)?);
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::Callback(format!("POST {}: {}", self.url, e)))?;

        if !response.status().is_success() {
            return Err(AppError::Callback(format!(
                "POST {} returned {}",
                self.url,
                response.status()
            )));
        }

        tracing::debug!(
            deployment_id = %payload.deployment_id,
            success = payload.success,
            "Deployment callback delivered"
        );
        Ok(())
    }

    /// Deliver in the background. Failures are logged and never reach the caller.
    pub fn notify(&self, payload: CallbackPayload) -> tokio::task::JoinHandle<()> {
        let notifier = self.clone();
        tokio::spawn(async move {
            let _ = notifier.send(&payload).await.log("deployment callback");
        })
    }
}
