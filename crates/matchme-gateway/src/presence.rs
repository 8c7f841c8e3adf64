use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use matchme_types::models::{PresenceRecord, PresenceStatus, UserId};

use crate::error::GatewayError;
use crate::store::{ChatStore, run_blocking};

/// Online/offline tracking on top of the store.
///
/// A user is online while their last activity is within `threshold`.
/// Stale records are downgraded lazily on [`PresenceTracker::query`] and in
/// bulk by the sweep loop. Only [`PresenceTracker::touch`] brings a user back.
#[derive(Clone)]
pub struct PresenceTracker {
    store: Arc<dyn ChatStore>,
    threshold: chrono::Duration,
}

impl PresenceTracker {
    pub fn new(store: Arc<dyn ChatStore>, threshold: Duration) -> Self {
        Self {
            store,
            threshold: chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::seconds(60)),
        }
    }

    /// Record activity: online, last active now.
    pub async fn touch(&self, user_id: UserId) -> Result<(), GatewayError> {
        self.set_status(user_id, PresenceStatus::Online).await
    }

    /// Explicit status from the client. Still refreshes `last_active`.
    pub async fn set_status(&self, user_id: UserId, status: PresenceStatus) -> Result<(), GatewayError> {
        let now = Utc::now();
        run_blocking(&self.store, move |store| store.upsert_presence(user_id, status, now)).await
    }

    pub async fn query(&self, user_id: UserId) -> Result<PresenceRecord, GatewayError> {
        let now = Utc::now();
        let Some(mut record) =
            run_blocking(&self.store, move |store| store.get_presence(user_id)).await?
        else {
            return Ok(PresenceRecord::unknown(user_id));
        };

        if record.status == PresenceStatus::Online && self.is_stale(&record, now) {
            let cutoff = now - self.threshold;
            run_blocking(&self.store, move |store| store.mark_offline_if_stale(user_id, cutoff))
                .await?;
            record.status = PresenceStatus::Offline;
        }

        Ok(record)
    }

    /// Downgrade every stale online user. Returns how many changed.
    pub async fn sweep(&self) -> Result<usize, GatewayError> {
        let cutoff = Utc::now() - self.threshold;
        run_blocking(&self.store, move |store| store.mark_stale_offline(cutoff)).await
    }

    /// Background task: sweep every `interval` until `shutdown` fires.
    pub async fn run_sweep_loop(self, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        info!("Presence sweep running every {:?}", interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match self.sweep().await {
                        Ok(count) => {
                            if count > 0 {
                                debug!("Presence sweep: {} users went offline", count);
                            }
                        }
                        Err(e) => {
                            warn!("Presence sweep error: {}", e);
                        }
                    }
                }
            }
        }

        info!("Presence sweep stopped");
    }

    fn is_stale(&self, record: &PresenceRecord, now: DateTime<Utc>) -> bool {
        match record.last_active {
            Some(last_active) => now - last_active > self.threshold,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchme_db::Database;

    fn tracker() -> (Arc<dyn ChatStore>, PresenceTracker) {
        let store: Arc<dyn ChatStore> = Arc::new(Database::open_in_memory().unwrap());
        let tracker = PresenceTracker::new(store.clone(), Duration::from_secs(60));
        (store, tracker)
    }

    #[tokio::test]
    async fn unknown_user_is_offline() {
        let (_, tracker) = tracker();
        let record = tracker.query(3).await.unwrap();
        assert_eq!(record.status, PresenceStatus::Offline);
        assert!(record.last_active.is_none());
    }

    #[tokio::test]
    async fn touch_makes_user_online() {
        let (_, tracker) = tracker();
        tracker.touch(3).await.unwrap();
        let record = tracker.query(3).await.unwrap();
        assert_eq!(record.status, PresenceStatus::Online);
        assert!(record.last_active.is_some());
    }

    #[tokio::test]
    async fn stale_user_is_downgraded_on_query() {
        let (store, tracker) = tracker();
        let long_ago = Utc::now() - chrono::Duration::seconds(61);
        store.upsert_presence(3, PresenceStatus::Online, long_ago).unwrap();

        assert_eq!(tracker.query(3).await.unwrap().status, PresenceStatus::Offline);
        // the downgrade was written back
        assert_eq!(store.get_presence(3).unwrap().unwrap().status, PresenceStatus::Offline);

        tracker.touch(3).await.unwrap();
        assert_eq!(tracker.query(3).await.unwrap().status, PresenceStatus::Online);
    }

    #[tokio::test]
    async fn recent_user_stays_online() {
        let (store, tracker) = tracker();
        let recently = Utc::now() - chrono::Duration::seconds(30);
        store.upsert_presence(3, PresenceStatus::Online, recently).unwrap();
        assert_eq!(tracker.query(3).await.unwrap().status, PresenceStatus::Online);
    }

    #[tokio::test]
    async fn sweep_downgrades_only_stale_users() {
        let (store, tracker) = tracker();
        let long_ago = Utc::now() - chrono::Duration::minutes(5);
        store.upsert_presence(1, PresenceStatus::Online, long_ago).unwrap();
        store.upsert_presence(2, PresenceStatus::Online, Utc::now()).unwrap();

        assert_eq!(tracker.sweep().await.unwrap(), 1);
        assert_eq!(store.get_presence(1).unwrap().unwrap().status, PresenceStatus::Offline);
        assert_eq!(store.get_presence(2).unwrap().unwrap().status, PresenceStatus::Online);
    }

    #[tokio::test]
    async fn sweep_loop_stops_on_shutdown() {
        let (store, tracker) = tracker();
        let long_ago = Utc::now() - chrono::Duration::minutes(5);
        store.upsert_presence(1, PresenceStatus::Online, long_ago).unwrap();

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(tracker.run_sweep_loop(Duration::from_millis(10), shutdown.clone()));

        tokio::time::timeout(Duration::from_secs(2), async {
            while store.get_presence(1).unwrap().unwrap().status == PresenceStatus::Online {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
    }
}
