//! Quota service client.
//!
//! Intake asks the quota service whether the caller has remaining
//! capacity before accepting a job. The check is advisory for the
//! worker: once accepted, a job always runs to completion.

use serde::{Deserialize, Serialize};

use crate::error::{WorkerError, WorkerResult};

/// Quota snapshot for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub plan_type: String,
    pub quota: u32,
    pub used: u32,
    pub remaining: i64,
}

impl QuotaStatus {
    pub fn is_exhausted(&self) -> bool {
        self.remaining <= 0
    }
}

/// Quota service client.
#[derive(Clone)]
pub struct QuotaClient {
    http: reqwest::Client,
    base_url: String,
}

impl QuotaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Fetch the caller's quota snapshot.
    pub async fn check(&self, user_id: &str) -> WorkerResult<QuotaStatus> {
        let url = format!("{}/quota/{}", self.base_url.trim_end_matches('/'), user_id);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| WorkerError::QuotaCheckFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(WorkerError::QuotaCheckFailed(format!(
                "quota service returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| WorkerError::QuotaCheckFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_check_parses_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quota/u1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "plan_type": "pro",
                "quota": 100,
                "used": 100,
                "remaining": 0
            })))
            .mount(&server)
            .await;

        let status = QuotaClient::new(server.uri()).check("u1").await.unwrap();
        assert!(status.is_exhausted());
        assert_eq!(status.plan_type, "pro");
    }

    #[tokio::test]
    async fn test_service_error_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = QuotaClient::new(server.uri()).check("u1").await.unwrap_err();
        assert!(matches!(err, WorkerError::QuotaCheckFailed(_)));
    }
}
