//! OCR batch planning and progress mapping.

use std::time::Duration;

use vscribe_models::BatchTask;

/// Scenes per batch.
pub const BATCH_SIZE: u32 = 100;

/// Queue delivery attempts allowed per batch before the job fails.
pub const MAX_BATCH_RETRIES: u32 = 3;

/// Delay before the next chained batch fires.
pub const BATCH_CHAIN_DELAY: Duration = Duration::from_secs(2);

/// Overall progress floor while batches run.
pub const BATCH_PROGRESS_FLOOR: u8 = 25;

/// Hard cap on batch-phase progress; 90-100 belongs to report assembly.
pub const BATCH_PROGRESS_CAP: u8 = 89;

/// Split `total_scenes` into chained batch tasks.
pub fn plan_batches(
    upload_id: &str,
    user_id: &str,
    video_key: &str,
    video_duration: f64,
    total_scenes: u32,
    batch_size: u32,
) -> Vec<BatchTask> {
    let batch_size = batch_size.max(1);
    let total_batches = total_scenes.div_ceil(batch_size);

    (0..total_batches)
        .map(|batch_index| {
            let start = batch_index * batch_size;
            let end = (start + batch_size).min(total_scenes);
            BatchTask {
                upload_id: upload_id.to_string(),
                user_id: user_id.to_string(),
                batch_index,
                total_batches,
                batch_size,
                start_scene_index: start,
                end_scene_index: end,
                video_key: video_key.to_string(),
                video_duration,
                is_last_batch: batch_index + 1 == total_batches,
            }
        })
        .collect()
}

/// The task that continues the chain after `task`, or `None` when
/// `task` was the last batch.
pub fn next_batch(task: &BatchTask, total_scenes: u32) -> Option<BatchTask> {
    if task.is_last_batch {
        return None;
    }
    let next_index = task.batch_index + 1;
    let start = task.end_scene_index;
    Some(BatchTask {
        batch_index: next_index,
        start_scene_index: start,
        end_scene_index: (start + task.batch_size).min(total_scenes),
        is_last_batch: next_index + 1 == task.total_batches,
        ..task.clone()
    })
}

/// Whether phase 2 must switch to batch-chained execution.
pub fn needs_batching(total_scenes: u32, batch_size: u32) -> bool {
    total_scenes > batch_size
}

/// Overall progress after batch `batch_index` completes:
/// `25 + ⌊((batch_index+1)/total_batches)·65⌋`, capped at 89.
pub fn batch_progress(batch_index: u32, total_batches: u32) -> u8 {
    let total_batches = total_batches.max(1) as u64;
    let raw = BATCH_PROGRESS_FLOOR as u64 + ((batch_index as u64 + 1) * 65) / total_batches;
    (raw as u8).min(BATCH_PROGRESS_CAP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_250_scenes() {
        let batches = plan_batches("up-1", "u1", "key", 3600.0, 250, 100);
        assert_eq!(batches.len(), 3);

        let sizes: Vec<u32> = batches
            .iter()
            .map(|b| b.end_scene_index - b.start_scene_index)
            .collect();
        assert_eq!(sizes, vec![100, 100, 50]);

        assert!(!batches[0].is_last_batch);
        assert!(!batches[1].is_last_batch);
        assert!(batches[2].is_last_batch);
        assert_eq!(batches[2].start_scene_index, 200);
        assert_eq!(batches[2].end_scene_index, 250);
        assert!(batches.iter().all(|b| b.total_batches == 3));
    }

    #[test]
    fn test_every_scene_in_exactly_one_batch() {
        let batches = plan_batches("up-1", "u1", "key", 100.0, 250, 100);
        let mut covered = vec![0u32; 250];
        for batch in &batches {
            for i in batch.scene_range() {
                covered[i as usize] += 1;
            }
        }
        assert!(covered.iter().all(|&c| c == 1));
    }

    #[test]
    fn test_exact_multiple() {
        let batches = plan_batches("up-1", "u1", "key", 100.0, 200, 100);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].end_scene_index, 200);
    }

    #[test]
    fn test_next_batch_chain_covers_plan() {
        let planned = plan_batches("up-1", "u1", "key", 100.0, 250, 100);
        let mut chained = vec![planned[0].clone()];
        while let Some(next) = next_batch(chained.last().unwrap(), 250) {
            chained.push(next);
        }

        assert_eq!(chained.len(), planned.len());
        for (a, b) in chained.iter().zip(planned.iter()) {
            assert_eq!(a.batch_index, b.batch_index);
            assert_eq!(a.start_scene_index, b.start_scene_index);
            assert_eq!(a.end_scene_index, b.end_scene_index);
            assert_eq!(a.is_last_batch, b.is_last_batch);
        }
    }

    #[test]
    fn test_needs_batching_threshold() {
        assert!(!needs_batching(100, 100));
        assert!(needs_batching(101, 100));
        assert!(!needs_batching(5, 100));
    }

    #[test]
    fn test_progress_mapping() {
        // Three batches: 46, 68, then capped at 89
        assert_eq!(batch_progress(0, 3), 46);
        assert_eq!(batch_progress(1, 3), 68);
        assert_eq!(batch_progress(2, 3), 89);
    }

    #[test]
    fn test_progress_cap() {
        assert_eq!(batch_progress(0, 1), 89);
        assert_eq!(batch_progress(9, 10), 89);
    }

    #[test]
    fn test_progress_is_monotonic() {
        let total = 7;
        let mut last = 0;
        for i in 0..total {
            let p = batch_progress(i, total);
            assert!(p >= last);
            last = p;
        }
        assert_eq!(last, BATCH_PROGRESS_CAP);
    }
}
