//! Repository over the `processing_checkpoints` table.

use chrono::Utc;
use tracing::info;

use vscribe_models::Checkpoint;

use crate::client::StatusStoreClient;
use crate::error::StatusResult;
use crate::retry::{with_retry, RetryConfig};

const TABLE: &str = "processing_checkpoints";

/// Checkpoint repository.
///
/// Writes are full-row replacements; the single-writer discipline (one
/// active batch per job) makes that safe.
#[derive(Clone)]
pub struct CheckpointRepo {
    client: StatusStoreClient,
    retry: RetryConfig,
}

impl CheckpointRepo {
    pub fn new(client: StatusStoreClient) -> Self {
        Self {
            client,
            retry: RetryConfig::default(),
        }
    }

    pub async fn get(&self, upload_id: &str) -> StatusResult<Option<Checkpoint>> {
        self.client.get_row(TABLE, "upload_id", upload_id).await
    }

    pub async fn put(&self, checkpoint: &Checkpoint) -> StatusResult<()> {
        with_retry(&self.retry, "checkpoint_put", || async {
            self.client.upsert(TABLE, checkpoint).await
        })
        .await
    }

    /// Delete the checkpoint when the job reaches a terminal state.
    pub async fn delete(&self, upload_id: &str) -> StatusResult<()> {
        self.client.delete(TABLE, "upload_id", upload_id).await
    }

    /// Daily sweep: remove checkpoints past their expiry. Returns how
    /// many rows were deleted.
    pub async fn cleanup_expired(&self) -> StatusResult<u32> {
        let now = Utc::now().to_rfc3339();
        let deleted = self
            .client
            .delete_where(TABLE, &format!("expires_at=lt.{}", now))
            .await?;
        info!(deleted, "Expired checkpoints removed");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use vscribe_models::CheckpointStep;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn repo(server: &MockServer) -> CheckpointRepo {
        let client = crate::client::StatusStoreClient::new(crate::client::StatusStoreConfig {
            base_url: server.uri(),
            service_key: "svc".into(),
            timeout: Duration::from_secs(5),
        })
        .unwrap();
        CheckpointRepo::new(client)
    }

    #[tokio::test]
    async fn test_get_roundtrip() {
        let server = MockServer::start().await;
        let mut cp = Checkpoint::new("up-1", CheckpointStep::Ocr);
        cp.total_scenes = 250;
        cp.completed_ocr_scenes.extend(0..100);

        Mock::given(method("GET"))
            .and(path("/rest/v1/processing_checkpoints"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([cp])))
            .mount(&server)
            .await;

        let loaded = repo(&server).await.get("up-1").await.unwrap().unwrap();
        assert_eq!(loaded.total_scenes, 250);
        assert_eq!(loaded.completed_ocr_scenes.len(), 100);
        assert_eq!(loaded.current_step, CheckpointStep::Ocr);
    }

    #[tokio::test]
    async fn test_cleanup_expired_counts() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/processing_checkpoints"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"upload_id": "old"}])))
            .mount(&server)
            .await;

        let deleted = repo(&server).await.cleanup_expired().await.unwrap();
        assert_eq!(deleted, 1);
    }
}
