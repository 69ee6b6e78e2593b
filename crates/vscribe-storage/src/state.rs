//! Transient job-state blobs.
//!
//! Batch-chained OCR spans multiple worker requests, so the scene list,
//! transcript, per-batch OCR output, and frame images must outlive a
//! single request. They are stored as blobs under the job's upload
//! prefix and deleted when the job terminates.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use vscribe_models::{JobInfo, Scene, TranscriptSegment, VideoMetadata};

use crate::client::R2Client;
use crate::error::StorageResult;

/// Accessor for a single job's transient state blobs.
#[derive(Clone)]
pub struct JobStateStore {
    client: R2Client,
    prefix: String,
}

impl JobStateStore {
    pub fn new(client: R2Client, user_id: &str, upload_id: &str) -> Self {
        Self {
            client,
            prefix: format!("uploads/{}/{}/state", user_id, upload_id),
        }
    }

    fn key(&self, name: &str) -> String {
        format!("{}/{}", self.prefix, name)
    }

    /// Key of a scene's stored frame image.
    pub fn frame_key(&self, scene_number: u32) -> String {
        self.key(&format!("frames/scene_{:04}.png", scene_number))
    }

    pub async fn put_scenes(&self, scenes: &[Scene]) -> StorageResult<()> {
        self.put_json("scenes.json", scenes).await
    }

    pub async fn get_scenes(&self) -> StorageResult<Vec<Scene>> {
        self.get_json("scenes.json").await
    }

    pub async fn put_transcript(&self, segments: &[TranscriptSegment]) -> StorageResult<()> {
        self.put_json("transcript.json", segments).await
    }

    pub async fn get_transcript(&self) -> StorageResult<Vec<TranscriptSegment>> {
        self.get_json("transcript.json").await
    }

    pub async fn put_job_info(&self, info: &JobInfo) -> StorageResult<()> {
        self.put_json("job.json", info).await
    }

    pub async fn get_job_info(&self) -> StorageResult<JobInfo> {
        self.get_json("job.json").await
    }

    pub async fn put_video_metadata(&self, metadata: &VideoMetadata) -> StorageResult<()> {
        self.put_json("metadata.json", metadata).await
    }

    pub async fn get_video_metadata(&self) -> StorageResult<VideoMetadata> {
        self.get_json("metadata.json").await
    }

    /// Store one batch's OCR output keyed by batch index.
    pub async fn put_ocr_batch(&self, batch_index: u32, texts: &[(u32, String)]) -> StorageResult<()> {
        self.put_json(&format!("ocr/batch_{:04}.json", batch_index), &texts)
            .await
    }

    /// Load one batch's OCR output, if stored (replay merging).
    pub async fn get_ocr_batch(&self, batch_index: u32) -> StorageResult<Option<Vec<(u32, String)>>> {
        match self
            .get_json(&format!("ocr/batch_{:04}.json", batch_index))
            .await
        {
            Ok(batch) => Ok(Some(batch)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Load every stored OCR batch as (scene_index, text) pairs.
    pub async fn get_all_ocr(&self) -> StorageResult<Vec<(u32, String)>> {
        let keys = self.client.list_keys(&self.key("ocr/")).await?;
        let mut out: Vec<(u32, String)> = Vec::new();
        for key in keys {
            let bytes = self.client.download_bytes(&key).await?;
            let batch: Vec<(u32, String)> = serde_json::from_slice(&bytes)?;
            out.extend(batch);
        }
        out.sort_by_key(|(index, _)| *index);
        out.dedup_by_key(|(index, _)| *index);
        Ok(out)
    }

    /// Upload a scene's frame image.
    pub async fn put_frame(&self, scene_number: u32, path: &std::path::Path) -> StorageResult<()> {
        self.client
            .upload_file(path, &self.frame_key(scene_number), "image/png")
            .await
    }

    /// Download a scene's frame image bytes.
    pub async fn get_frame(&self, scene_number: u32) -> StorageResult<Vec<u8>> {
        self.client.download_bytes(&self.frame_key(scene_number)).await
    }

    /// Remove every state blob for this job.
    pub async fn clear(&self) -> StorageResult<u32> {
        let deleted = self.client.delete_prefix(&format!("{}/", self.prefix)).await?;
        debug!("Cleared {} state blobs under {}", deleted, self.prefix);
        Ok(deleted)
    }

    async fn put_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> StorageResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.client
            .upload_bytes(bytes, &self.key(name), "application/json")
            .await
    }

    async fn get_json<T: DeserializeOwned>(&self, name: &str) -> StorageResult<T> {
        let bytes = self.client.download_bytes(&self.key(name)).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
