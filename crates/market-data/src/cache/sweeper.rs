//! Background task that purges expired cache entries.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::ValidatedCache;

/// Owns the sweeper task. Dropping the handle cancels the task.
#[derive(Debug)]
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper.
    pub fn shutdown(self) {
        info!("Stopping cache sweeper");
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawn a task that calls [`ValidatedCache::purge_expired`] every `interval`.
/// Each sweep also runs the store's pending maintenance.
///
/// Must be called from within a tokio runtime.
pub fn spawn_sweeper(cache: Arc<ValidatedCache>, interval: Duration) -> SweeperHandle {
    let period = interval.max(Duration::from_millis(100));
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = cache.purge_expired();
            if removed > 0 {
                debug!("Cache sweep removed {} expired entries", removed);
            }
        }
    });
    info!("Cache sweeper started (every {:?})", period);
    SweeperHandle { task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachePayload;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_purges_expired_entries() {
        let cache = Arc::new(ValidatedCache::with_capacity(10));
        cache.set("search:a", CachePayload::Search(vec![]), Duration::from_secs(5));
        cache.set("search:b", CachePayload::Search(vec![]), Duration::from_secs(500));

        let handle = spawn_sweeper(Arc::clone(&cache), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().expirations, 1);
        handle.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_task() {
        let cache = Arc::new(ValidatedCache::with_capacity(10));
        let handle = spawn_sweeper(Arc::clone(&cache), Duration::from_secs(1));
        drop(handle);
        tokio::task::yield_now().await;

        // Only the test holds the cache once the task is gone
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(Arc::strong_count(&cache), 1);
    }
}
