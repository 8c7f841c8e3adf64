use std::time::Duration;

use axum::extract::ws::Message;
use tracing::{debug, warn};

use matchme_types::events::{NotificationKind, OutboundEvent, TypingEvent};
use matchme_types::models::{ChatMessage, UserId};

use crate::error::GatewayError;
use crate::registry::{ChannelKey, ConnectionHandle, ConnectionRegistry};

/// Outcome of one broadcast.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Fans events out to every connection registered on a channel.
///
/// A connection whose send fails or times out is removed from the registry
/// and told to close; the rest of the broadcast carries on. No retries.
///
/// This is the single point where events leave the process, so a shared
/// pub/sub layer for multiple instances would hook in here.
#[derive(Clone)]
pub struct Dispatcher {
    registry: ConnectionRegistry,
    send_timeout: Duration,
}

impl Dispatcher {
    pub fn new(registry: ConnectionRegistry, send_timeout: Duration) -> Self {
        Self {
            registry,
            send_timeout,
        }
    }

    /// Serialize `event` once and deliver it to a snapshot of the channel.
    pub async fn broadcast(
        &self,
        key: ChannelKey,
        event: &OutboundEvent,
    ) -> Result<DeliveryReport, GatewayError> {
        let members = self.registry.members_of(key).await;
        let mut report = DeliveryReport::default();
        if members.is_empty() {
            return Ok(report);
        }

        let frame = Message::Text(serde_json::to_string(event)?.into());

        for conn in members {
            if self.deliver(key, &conn, frame.clone()).await {
                report.delivered += 1;
            } else {
                report.dropped += 1;
            }
        }

        debug!(
            "{} event on {}: delivered={} dropped={}",
            event.name(),
            key,
            report.delivered,
            report.dropped
        );
        Ok(report)
    }

    pub async fn broadcast_message(&self, message: &ChatMessage) -> Result<DeliveryReport, GatewayError> {
        self.broadcast(
            ChannelKey::Conversation(message.match_id),
            &OutboundEvent::Message(message.clone()),
        )
        .await
    }

    pub async fn broadcast_typing(&self, typing: TypingEvent) -> Result<DeliveryReport, GatewayError> {
        self.broadcast(ChannelKey::Conversation(typing.match_id), &OutboundEvent::Typing(typing))
            .await
    }

    /// Wake `user_id`'s notification sockets. A user with none is a no-op.
    pub async fn notify(&self, user_id: UserId, kind: NotificationKind) -> Result<DeliveryReport, GatewayError> {
        self.broadcast(ChannelKey::User(user_id), &OutboundEvent::Notification(kind.into()))
            .await
    }

    /// Send to one connection only, with the same failure policy as a broadcast.
    pub async fn send_to(
        &self,
        key: ChannelKey,
        conn: &ConnectionHandle,
        event: &OutboundEvent,
    ) -> Result<bool, GatewayError> {
        let frame = Message::Text(serde_json::to_string(event)?.into());
        Ok(self.deliver(key, conn, frame).await)
    }

    async fn deliver(&self, key: ChannelKey, conn: &ConnectionHandle, frame: Message) -> bool {
        match conn.send(frame, self.send_timeout).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropping user {} from {}: {}", conn.user_id(), key, e);
                self.registry.deregister(key, conn.id()).await;
                conn.close();
                false
            }
        }
    }
}
