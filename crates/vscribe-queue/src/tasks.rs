//! Cloud Tasks REST client.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gcp_auth::TokenProvider;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::error::{QueueError, QueueResult};
use crate::payload::encode_payload;

/// Header carrying the delivery attempt count on queue callbacks.
pub const RETRY_COUNT_HEADER: &str = "X-CloudTasks-TaskRetryCount";

/// Dispatch deadline for worker tasks: the queue treats a request still
/// open after this as failed and retries.
pub const DISPATCH_DEADLINE_SECS: u64 = 30 * 60;

/// Task queue configuration.
#[derive(Debug, Clone)]
pub struct TaskQueueConfig {
    pub project: String,
    pub location: String,
    pub queue: String,
    /// Base URL of the worker the queue calls back into
    pub worker_base_url: String,
    /// Shared secret placed on task requests as a bearer token
    pub worker_secret: String,
    /// Tasks API base, overridable for tests
    pub api_base: String,
}

impl TaskQueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Ok(Self {
            project: std::env::var("CLOUDTASKS_PROJECT")
                .map_err(|_| QueueError::config_error("CLOUDTASKS_PROJECT not set"))?,
            location: std::env::var("CLOUDTASKS_LOCATION")
                .map_err(|_| QueueError::config_error("CLOUDTASKS_LOCATION not set"))?,
            queue: std::env::var("CLOUDTASKS_QUEUE")
                .unwrap_or_else(|_| "video-processing".to_string()),
            worker_base_url: std::env::var("WORKER_BASE_URL")
                .map_err(|_| QueueError::config_error("WORKER_BASE_URL not set"))?,
            worker_secret: std::env::var("WORKER_SECRET")
                .map_err(|_| QueueError::config_error("WORKER_SECRET not set"))?,
            api_base: std::env::var("CLOUDTASKS_API_URL")
                .unwrap_or_else(|_| "https://cloudtasks.googleapis.com/v2".to_string()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct CreatedTask {
    name: String,
}

/// Client that enqueues HTTP-push tasks targeting the worker.
#[derive(Clone)]
pub struct TaskQueueClient {
    http: Client,
    config: TaskQueueConfig,
    auth: Option<Arc<dyn TokenProvider>>,
}

impl TaskQueueClient {
    /// Create a client without API authentication (tests, emulators).
    pub fn new(config: TaskQueueConfig) -> QueueResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(QueueError::Network)?;
        Ok(Self {
            http,
            config,
            auth: None,
        })
    }

    /// Create a client authenticated against the real Tasks API.
    pub async fn from_env() -> QueueResult<Self> {
        let config = TaskQueueConfig::from_env()?;
        let auth = gcp_auth::provider()
            .await
            .map_err(|e| QueueError::auth_error(e.to_string()))?;

        let mut client = Self::new(config)?;
        client.auth = Some(auth);
        Ok(client)
    }

    fn queue_path(&self) -> String {
        format!(
            "projects/{}/locations/{}/queues/{}",
            self.config.project, self.config.location, self.config.queue
        )
    }

    /// Enqueue a processing task for `/process-task`.
    pub async fn enqueue_process<T: Serialize>(&self, payload: &T) -> QueueResult<String> {
        self.create_task("/process-task", payload, None).await
    }

    /// Enqueue an OCR batch continuation with an optional delay.
    pub async fn enqueue_ocr_batch<T: Serialize>(
        &self,
        payload: &T,
        delay: Option<Duration>,
    ) -> QueueResult<String> {
        self.create_task("/process-ocr-batch", payload, delay).await
    }

    /// Create a task that POSTs `payload` to the worker endpoint.
    ///
    /// Returns the queue-assigned task name.
    pub async fn create_task<T: Serialize>(
        &self,
        endpoint: &str,
        payload: &T,
        delay: Option<Duration>,
    ) -> QueueResult<String> {
        let target_url = format!(
            "{}{}",
            self.config.worker_base_url.trim_end_matches('/'),
            endpoint
        );
        let body = encode_payload(payload)?;

        let mut task = json!({
            "httpRequest": {
                "url": target_url,
                "httpMethod": "POST",
                "headers": {
                    "Authorization": format!("Bearer {}", self.config.worker_secret),
                    "Content-Type": "application/json",
                },
                "body": body,
            },
            "dispatchDeadline": format!("{}s", DISPATCH_DEADLINE_SECS),
        });

        if let Some(delay) = delay {
            let schedule_time = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
            task["scheduleTime"] = json!(schedule_time.to_rfc3339());
        }

        let url = format!("{}/{}/tasks", self.config.api_base, self.queue_path());
        debug!("Creating task targeting {}", target_url);

        let mut request = self.http.post(&url).json(&json!({ "task": task }));
        if let Some(auth) = &self.auth {
            let token = auth
                .token(&["https://www.googleapis.com/auth/cloud-tasks"])
                .await
                .map_err(|e| QueueError::auth_error(e.to_string()))?;
            request = request.bearer_auth(token.as_str());
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(QueueError::create_failed(format!(
                "tasks API returned {}: {}",
                status, body
            )));
        }

        let created: CreatedTask = response.json().await?;
        info!(task = created.name, "Task enqueued");
        Ok(created.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn config(server: &MockServer) -> TaskQueueConfig {
        TaskQueueConfig {
            project: "proj".into(),
            location: "asia-northeast1".into(),
            queue: "video-processing".into(),
            worker_base_url: "https://worker.example.com".into(),
            worker_secret: "shh".into(),
            api_base: server.uri(),
        }
    }

    #[tokio::test]
    async fn test_create_task_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(
                "/projects/proj/locations/asia-northeast1/queues/video-processing/tasks",
            ))
            .and(body_partial_json(serde_json::json!({
                "task": {
                    "httpRequest": {
                        "url": "https://worker.example.com/process-task",
                        "httpMethod": "POST",
                    },
                    "dispatchDeadline": "1800s",
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "projects/proj/locations/asia-northeast1/queues/video-processing/tasks/t1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = TaskQueueClient::new(config(&server)).unwrap();
        let name = client
            .enqueue_process(&serde_json::json!({"upload_id": "up-1"}))
            .await
            .unwrap();
        assert!(name.ends_with("/tasks/t1"));
    }

    #[tokio::test]
    async fn test_delayed_task_sets_schedule_time() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(move |req: &Request| {
                let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
                assert!(body["task"]["scheduleTime"].is_string());
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "name": "tasks/t2" }))
            })
            .mount(&server)
            .await;

        let client = TaskQueueClient::new(config(&server)).unwrap();
        client
            .enqueue_ocr_batch(
                &serde_json::json!({"batch_index": 1}),
                Some(Duration::from_secs(2)),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_api_error_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
            .mount(&server)
            .await;

        let client = TaskQueueClient::new(config(&server)).unwrap();
        let err = client
            .enqueue_process(&serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::CreateFailed(_)));
    }
}
