use std::fmt;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use chrono::{SubsecRound, Utc};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use matchme_types::events::{
    ChatFrame, InboundFrame, NotificationCommand, NotificationKind, OutboundEvent, TypingEvent,
    TypingFrame,
};
use matchme_types::models::{ChatMessage, MatchId, UserId};

use crate::Gateway;
use crate::error::GatewayError;
use crate::registry::{ChannelKey, ConnectionHandle};
use crate::store::run_blocking;

/// Result of a successful chat authorization: who connected, to which
/// conversation, and who is on the other side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatAuthorization {
    pub match_id: MatchId,
    pub user_id: UserId,
    pub peer_id: UserId,
}

/// Authenticate and check membership before any upgrade happens.
pub async fn authorize_chat(
    gateway: &Gateway,
    credential: Option<&str>,
    match_id: MatchId,
) -> Result<ChatAuthorization, GatewayError> {
    let user_id = authenticate(gateway, credential)?;

    let peer = run_blocking(&gateway.store, move |store| {
        store.conversation_peer(match_id, user_id)
    })
    .await?;

    match peer {
        Some(peer_id) => Ok(ChatAuthorization {
            match_id,
            user_id,
            peer_id,
        }),
        None => {
            warn!("User {} rejected from match {}: not a participant", user_id, match_id);
            Err(GatewayError::Forbidden {
                user_id,
                channel: ChannelKey::Conversation(match_id).to_string(),
            })
        }
    }
}

/// The notification channel is keyed by the caller's own id, so
/// authentication is the only check.
pub fn authorize_notifications(
    gateway: &Gateway,
    credential: Option<&str>,
) -> Result<UserId, GatewayError> {
    authenticate(gateway, credential)
}

fn authenticate(gateway: &Gateway, credential: Option<&str>) -> Result<UserId, GatewayError> {
    let credential =
        credential.ok_or_else(|| GatewayError::Unauthenticated("no token provided".into()))?;
    gateway.identity.resolve_user(credential).inspect_err(|e| {
        debug!("Rejected credential: {}", e);
    })
}

pub async fn handle_chat_socket(socket: WebSocket, gateway: Gateway, auth: ChatAuthorization) {
    let (sink, stream) = socket.split();
    run_chat_session(sink, stream, gateway, auth).await;
}

pub async fn handle_notification_socket(socket: WebSocket, gateway: Gateway, user_id: UserId) {
    let (sink, stream) = socket.split();
    run_notification_session(sink, stream, gateway, user_id).await;
}

/// Per-connection loop for a conversation socket.
///
/// Typing frames are relayed as-is with the sender stamped from the
/// authenticated identity. Chat frames are stamped, persisted, and only then
/// broadcast. Malformed frames are dropped. The connection is deregistered
/// exactly once on the way out, whatever ended it.
pub async fn run_chat_session<S, R, E>(sink: S, mut stream: R, gateway: Gateway, auth: ChatAuthorization)
where
    S: Sink<Message> + Send + Unpin + 'static,
    S::Error: fmt::Display,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    let key = ChannelKey::Conversation(auth.match_id);
    let session = Session::open(&gateway, key, auth.user_id, sink, None).await;
    info!("User {} joined match {} (conn {})", auth.user_id, auth.match_id, session.handle.id());

    while let Some(text) = session.next_text(&mut stream).await {
        handle_chat_frame(&gateway, &auth, text.as_str()).await;
    }

    session.close(&gateway).await;
    info!("User {} left match {}", auth.user_id, auth.match_id);
}

/// Per-connection loop for a user's notification socket. Greets with
/// `{"type":"connected"}` and answers `{"type":"ping"}` with a pong.
pub async fn run_notification_session<S, R, E>(sink: S, mut stream: R, gateway: Gateway, user_id: UserId)
where
    S: Sink<Message> + Send + Unpin + 'static,
    S::Error: fmt::Display,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    let key = ChannelKey::User(user_id);
    let connected = OutboundEvent::Notification(NotificationKind::Connected.into());
    let greeting = match serde_json::to_string(&connected) {
        Ok(json) => Message::Text(json.into()),
        Err(e) => {
            warn!("Failed to encode greeting for user {}: {}", user_id, e);
            return;
        }
    };

    let session = Session::open(&gateway, key, user_id, sink, Some(greeting)).await;
    info!("User {} subscribed to notifications (conn {})", user_id, session.handle.id());

    let pong = OutboundEvent::Notification(NotificationKind::Pong.into());
    while let Some(text) = session.next_text(&mut stream).await {
        match serde_json::from_str::<NotificationCommand>(text.as_str()) {
            Ok(NotificationCommand::Ping) => {
                match gateway.dispatcher.send_to(key, &session.handle, &pong).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => warn!("Failed to answer ping for user {}: {}", user_id, e),
                }
            }
            Err(e) => debug!("Ignoring notification frame from user {}: {}", user_id, e),
        }
    }

    session.close(&gateway).await;
    info!("User {} unsubscribed from notifications", user_id);
}

async fn handle_chat_frame(gateway: &Gateway, auth: &ChatAuthorization, text: &str) {
    let frame = match InboundFrame::parse(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(
                "Dropping frame from user {} on match {}: {} -- raw: {}",
                auth.user_id,
                auth.match_id,
                e,
                text.chars().take(200).collect::<String>()
            );
            return;
        }
    };

    match frame {
        InboundFrame::Typing(TypingFrame { typing }) => {
            let event = TypingEvent {
                match_id: auth.match_id,
                user_id: auth.user_id,
                typing,
            };
            if let Err(e) = gateway.dispatcher.broadcast_typing(event).await {
                warn!("Typing broadcast failed on match {}: {}", auth.match_id, e);
            }
        }

        InboundFrame::Chat(ChatFrame { id, content }) => {
            let message = ChatMessage {
                id,
                match_id: auth.match_id,
                sender_id: auth.user_id,
                content,
                // stored at microsecond precision; broadcast the same value
                timestamp: Utc::now().trunc_subsecs(6),
                read: false,
            };

            if let Err(e) = persist(gateway, message.clone()).await {
                warn!(
                    "Message {} from user {} on match {} dropped: {}",
                    message.id, auth.user_id, auth.match_id, e
                );
                return;
            }

            if let Err(e) = gateway.dispatcher.broadcast_message(&message).await {
                warn!("Message broadcast failed on match {}: {}", auth.match_id, e);
            }

            if let Err(e) = gateway
                .dispatcher
                .notify(auth.peer_id, NotificationKind::NewMessage)
                .await
            {
                warn!("New-message notification to user {} failed: {}", auth.peer_id, e);
            }

            if let Err(e) = gateway.presence.touch(auth.user_id).await {
                warn!("Presence touch failed for user {}: {}", auth.user_id, e);
            }
        }
    }
}

async fn persist(gateway: &Gateway, message: ChatMessage) -> Result<(), GatewayError> {
    run_blocking(&gateway.store, move |store| store.append_message(&message))
        .await
        .map_err(|e| match e {
            GatewayError::Store(inner) => GatewayError::Persistence(inner),
            other => other,
        })
}

/// A registered connection plus its writer task.
struct Session {
    key: ChannelKey,
    handle: ConnectionHandle,
    closed: CancellationToken,
    writer: JoinHandle<()>,
}

impl Session {
    /// Register a new connection under `key`. `greeting` is queued before
    /// registration so it is the first frame the client sees.
    async fn open<S>(
        gateway: &Gateway,
        key: ChannelKey,
        user_id: UserId,
        sink: S,
        greeting: Option<Message>,
    ) -> Self
    where
        S: Sink<Message> + Send + Unpin + 'static,
        S::Error: fmt::Display,
    {
        let (handle, outbound) = ConnectionHandle::new(user_id, gateway.config.outbound_capacity);
        let closed = handle.close_token();

        if let Some(greeting) = greeting {
            if let Err(e) = handle.send(greeting, gateway.config.send_timeout).await {
                debug!("Greeting for user {} on {} not queued: {}", user_id, key, e);
            }
        }

        let writer = tokio::spawn(write_loop(sink, outbound, closed.clone()));
        gateway.registry.register(key, handle.clone()).await;

        if let Err(e) = gateway.presence.touch(user_id).await {
            warn!("Presence touch failed for user {}: {}", user_id, e);
        }

        Self {
            key,
            handle,
            closed,
            writer,
        }
    }

    /// Wait for the next text frame. Pings are answered by the socket layer.
    /// `None` once the socket is closed, errored, or the dispatcher dropped us.
    async fn next_text<R, E>(&self, stream: &mut R) -> Option<Utf8Bytes>
    where
        R: Stream<Item = Result<Message, E>> + Unpin,
        E: fmt::Display,
    {
        loop {
            tokio::select! {
                _ = self.closed.cancelled() => return None,
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => return Some(text),
                    Some(Ok(Message::Close(_))) | None => return None,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("Read error on {} (conn {}): {}", self.key, self.handle.id(), e);
                        return None;
                    }
                },
            }
        }
    }

    async fn close(self, gateway: &Gateway) {
        let Session {
            key,
            handle,
            closed,
            mut writer,
        } = self;

        gateway.registry.deregister(key, handle.id()).await;
        closed.cancel();
        drop(handle);

        // The writer flushes what is queued, then closes the socket. A
        // client that stopped reading gets cut off.
        if tokio::time::timeout(gateway.config.send_timeout, &mut writer)
            .await
            .is_err()
        {
            debug!("Writer for {} did not finish in time, aborting", key);
            writer.abort();
        }
    }
}

async fn write_loop<S>(mut sink: S, mut outbound: mpsc::Receiver<Message>, closed: CancellationToken)
where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
{
    loop {
        tokio::select! {
            biased;
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = sink.send(frame).await {
                    debug!("Socket write failed: {}", e);
                    closed.cancel();
                    return;
                }
            }
            _ = closed.cancelled() => break,
        }
    }

    closed.cancel();
    if let Err(e) = sink.close().await {
        trace!("Socket close failed: {}", e);
    }
}
