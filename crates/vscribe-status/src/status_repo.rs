//! Repository over the `processing_status` table.

use chrono::Utc;
use serde_json::json;
use tracing::info;

use vscribe_models::{
    JobStatusRow, Phase, PhaseStatus, ProcessingMetadata, Stage, StatusKind,
};

use crate::client::StatusStoreClient;
use crate::error::StatusResult;
use crate::retry::{with_retry, RetryConfig};

const TABLE: &str = "processing_status";

/// One update to a job's status row. Unset fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub status: Option<StatusKind>,
    pub progress: Option<u8>,
    pub phase: Option<Phase>,
    pub phase_progress: Option<u8>,
    pub phase_status: Option<PhaseStatus>,
    pub stage: Option<Stage>,
    pub sub_task: Option<String>,
    pub estimated_time_remaining: Option<String>,
}

impl StatusUpdate {
    fn into_patch(self) -> serde_json::Value {
        let mut patch = serde_json::Map::new();
        if let Some(v) = self.status {
            patch.insert("status".into(), json!(v));
        }
        if let Some(v) = self.progress {
            patch.insert("progress".into(), json!(v));
        }
        if let Some(v) = self.phase {
            patch.insert("phase".into(), json!(v));
        }
        if let Some(v) = self.phase_progress {
            patch.insert("phase_progress".into(), json!(v));
        }
        if let Some(v) = self.phase_status {
            patch.insert("phase_status".into(), json!(v));
        }
        if let Some(v) = self.stage {
            patch.insert("stage".into(), json!(v));
        }
        if let Some(v) = self.sub_task {
            patch.insert("sub_task".into(), json!(v));
        }
        if let Some(v) = self.estimated_time_remaining {
            patch.insert("estimated_time_remaining".into(), json!(v));
        }
        patch.insert("updated_at".into(), json!(Utc::now()));
        serde_json::Value::Object(patch)
    }
}

/// Status row repository. All writers are the worker.
#[derive(Clone)]
pub struct StatusRepo {
    client: StatusStoreClient,
    retry: RetryConfig,
}

impl StatusRepo {
    pub fn new(client: StatusStoreClient) -> Self {
        Self {
            client,
            retry: RetryConfig::default(),
        }
    }

    /// Reset the row to a fresh `pending` state. Duplicate submissions
    /// intentionally overwrite the previous run's row, including
    /// clearing any terminal columns a prior run left behind.
    pub async fn init_pending(&self, row: &JobStatusRow) -> StatusResult<()> {
        let mut value = serde_json::to_value(row)?;
        for cleared in [
            "stage",
            "sub_task",
            "estimated_time_remaining",
            "result_key",
            "metadata",
            "error",
        ] {
            value[cleared] = serde_json::Value::Null;
        }

        with_retry(&self.retry, "status_upsert", || async {
            self.client.upsert(TABLE, &value).await
        })
        .await
    }

    /// Fetch a row by upload id.
    pub async fn get(&self, upload_id: &str) -> StatusResult<Option<JobStatusRow>> {
        self.client.get_row(TABLE, "upload_id", upload_id).await
    }

    /// Apply a partial update.
    pub async fn update(&self, upload_id: &str, update: StatusUpdate) -> StatusResult<()> {
        let patch = update.into_patch();
        with_retry(&self.retry, "status_update", || async {
            self.client.patch(TABLE, "upload_id", upload_id, &patch).await
        })
        .await
    }

    /// Touch `updated_at` only: the heartbeat that keeps readers from
    /// declaring a long step stale.
    pub async fn heartbeat(&self, upload_id: &str) -> StatusResult<()> {
        let patch = json!({ "updated_at": Utc::now() });
        with_retry(&self.retry, "status_heartbeat", || async {
            self.client.patch(TABLE, "upload_id", upload_id, &patch).await
        })
        .await
    }

    /// Terminal success write: status, progress 100, result key, and
    /// final metadata in one patch.
    pub async fn complete(
        &self,
        upload_id: &str,
        result_key: &str,
        metadata: &ProcessingMetadata,
    ) -> StatusResult<()> {
        let patch = json!({
            "status": StatusKind::Completed,
            "progress": 100,
            "phase": Phase::Report,
            "phase_progress": 100,
            "phase_status": PhaseStatus::Completed,
            "stage": Stage::Completed,
            "result_key": result_key,
            "metadata": metadata,
            "updated_at": Utc::now(),
        });
        with_retry(&self.retry, "status_complete", || async {
            self.client.patch(TABLE, "upload_id", upload_id, &patch).await
        })
        .await?;
        info!(upload_id, result_key, "Job completed");
        Ok(())
    }

    /// Terminal failure write.
    pub async fn fail(&self, upload_id: &str, error: &str) -> StatusResult<()> {
        let patch = json!({
            "status": StatusKind::Error,
            "error": error,
            "updated_at": Utc::now(),
        });
        with_retry(&self.retry, "status_fail", || async {
            self.client.patch(TABLE, "upload_id", upload_id, &patch).await
        })
        .await?;
        info!(upload_id, error, "Job failed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_patch_shape() {
        let update = StatusUpdate {
            status: Some(StatusKind::Processing),
            progress: Some(30),
            stage: Some(Stage::VadWhisper),
            sub_task: Some("Transcribing chunk 3/10".into()),
            ..Default::default()
        };
        let patch = update.into_patch();

        assert_eq!(patch["status"], "processing");
        assert_eq!(patch["progress"], 30);
        assert_eq!(patch["stage"], "vad_whisper");
        assert_eq!(patch["sub_task"], "Transcribing chunk 3/10");
        assert!(patch.get("phase").is_none());
        assert!(patch.get("updated_at").is_some());
    }

    #[test]
    fn test_empty_update_still_touches_updated_at() {
        let patch = StatusUpdate::default().into_patch();
        assert_eq!(patch.as_object().unwrap().len(), 1);
        assert!(patch.get("updated_at").is_some());
    }
}
