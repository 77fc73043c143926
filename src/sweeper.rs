use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

use crate::cache::ResponseCache;

/// 周期性清理过期缓存条目，防止只查询一次的键无限堆积。
pub fn spawn(cache: Arc<ResponseCache>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(target = "sweeper", interval_secs = every.as_secs(), "cache sweeper started");
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = cache.purge_expired();
            if removed > 0 {
                debug!(target = "sweeper", removed, remaining = cache.len(), "expired entries purged");
            }
        }
    })
}
