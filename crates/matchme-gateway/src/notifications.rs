use std::sync::Arc;

use chrono::Utc;

use matchme_types::api::NotificationCounts;
use matchme_types::models::UserId;

use crate::error::GatewayError;
use crate::store::{ChatStore, run_blocking};

/// Unread-message and new-match counters, always computed fresh against the
/// user's two checkpoints.
#[derive(Clone)]
pub struct NotificationCenter {
    store: Arc<dyn ChatStore>,
}

impl NotificationCenter {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    pub async fn counts(&self, user_id: UserId) -> Result<NotificationCounts, GatewayError> {
        run_blocking(&self.store, move |store| {
            let checkpoints = store.checkpoints(user_id)?;
            Ok(NotificationCounts {
                unread_messages: store.count_unread(user_id, checkpoints.last_message_check)?,
                new_matches: store.count_new_matches(user_id, checkpoints.last_match_check)?,
            })
        })
        .await
    }

    pub async fn acknowledge_messages(&self, user_id: UserId) -> Result<(), GatewayError> {
        let now = Utc::now();
        run_blocking(&self.store, move |store| store.advance_message_checkpoint(user_id, now)).await
    }

    pub async fn acknowledge_matches(&self, user_id: UserId) -> Result<(), GatewayError> {
        let now = Utc::now();
        run_blocking(&self.store, move |store| store.advance_match_checkpoint(user_id, now)).await
    }
}
