/*!
 * Per-story lanes.
 *
 * Chapters of the same story run one at a time so each sees the context
 * written by the previous one. Different stories do not block each other.
 */

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Held while a chapter of the story is being processed
pub type LaneGuard = OwnedMutexGuard<()>;

#[derive(Debug, Default)]
pub struct StoryLanes {
    lanes: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl StoryLanes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the story's lane; waiters are served in FIFO order
    pub async fn acquire(&self, story_id: &str) -> LaneGuard {
        let lane = {
            let mut lanes = self.lanes.lock();
            // Drop lanes nobody holds or waits on
            lanes.retain(|_, lane| Arc::strong_count(lane) > 1);
            lanes
                .entry(story_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lane.lock_owned().await
    }

    /// Number of stories with a held or awaited lane
    pub fn active(&self) -> usize {
        self.lanes
            .lock()
            .values()
            .filter(|lane| Arc::strong_count(lane) > 1)
            .count()
    }
}
