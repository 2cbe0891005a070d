//! Per-socket lifecycle: `PendingAccept -> Open -> Closed`.
//!
//! A [`Session`] owns the receive half of an upgraded socket and a writer task
//! that drains the socket's outbound queue into the sink. Everything else in
//! the process talks to the socket through a cloned [`SocketHandle`].

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::close_code;
use super::registry::{SocketHandle, SocketKind};
use crate::db::models::UserId;

/// Upper bound on flushing queued frames once the session is over.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    PendingAccept,
    Open,
    Closed,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("illegal session transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: SessionState,
    pub to: SessionState,
}

impl SessionState {
    /// Validate a move to `next`. `Closed` is terminal; a handshake that never
    /// completes may go straight from `PendingAccept` to `Closed`.
    pub fn transition(self, next: SessionState) -> Result<SessionState, TransitionError> {
        use SessionState::*;
        match (self, next) {
            (PendingAccept, Open) | (PendingAccept, Closed) | (Open, Closed) => Ok(next),
            (from, to) => Err(TransitionError { from, to }),
        }
    }

    pub fn is_open(self) -> bool {
        self == SessionState::Open
    }
}

/// Application-level frame surfaced to the socket's actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Binary,
}

pub struct Session {
    user_id: UserId,
    kind: SocketKind,
    state: SessionState,
    handle: SocketHandle,
    receiver: SplitStream<WebSocket>,
    writer: JoinHandle<()>,
}

impl Session {
    /// Complete the handshake for an upgraded socket: split it, start the
    /// writer task and move to `Open`.
    pub fn accept(
        socket: WebSocket,
        user_id: UserId,
        kind: SocketKind,
        peer: Option<UserId>,
    ) -> Self {
        let mut state = SessionState::PendingAccept;
        let (ws_sender, receiver) = socket.split();
        let (tx, rx) = mpsc::unbounded_channel::<Message>();

        let mut handle = SocketHandle::new(tx);
        if let Some(peer) = peer {
            handle = handle.with_peer(peer);
        }

        let writer = tokio::spawn(writer_task(ws_sender, rx));

        // PendingAccept -> Open is always legal
        if let Ok(next) = state.transition(SessionState::Open) {
            state = next;
        }

        tracing::info!(
            user_id = %user_id,
            kind = %kind,
            socket_id = %handle.id(),
            "Socket accepted"
        );

        Self {
            user_id,
            kind,
            state,
            handle,
            receiver,
            writer,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn kind(&self) -> SocketKind {
        self.kind
    }

    pub fn handle(&self) -> &SocketHandle {
        &self.handle
    }

    /// Wait for the next text or binary frame.
    ///
    /// Pings are answered here. A close frame, the end of the stream or a
    /// receive error moves the session to `Closed` and yields `None`.
    pub async fn next_frame(&mut self) -> Option<Inbound> {
        if !self.state.is_open() {
            return None;
        }

        loop {
            match self.receiver.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Some(Inbound::Text(text.as_str().to_owned()))
                }
                Some(Ok(Message::Binary(_))) => return Some(Inbound::Binary),
                Some(Ok(Message::Ping(data))) => {
                    self.handle.send(Message::Pong(data));
                }
                Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(
                        user_id = %self.user_id,
                        kind = %self.kind,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
                Some(Err(e)) => {
                    tracing::warn!(
                        user_id = %self.user_id,
                        kind = %self.kind,
                        error = %e,
                        "WebSocket receive error"
                    );
                    break;
                }
                None => {
                    tracing::info!(
                        user_id = %self.user_id,
                        kind = %self.kind,
                        "WebSocket stream ended"
                    );
                    break;
                }
            }
        }

        self.mark_closed();
        None
    }

    fn mark_closed(&mut self) {
        match self.state.transition(SessionState::Closed) {
            Ok(next) => self.state = next,
            Err(e) => tracing::debug!(error = %e, "Session already closed"),
        }
    }

    /// Send a close frame with `code` and stop. Frames queued before the
    /// close are flushed first, bounded by a drain timeout.
    pub async fn shutdown(mut self, code: u16, reason: &str) {
        if self.state.is_open() {
            self.mark_closed();
        }
        self.handle.close(code, reason);

        match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut self.writer).await {
            Ok(_) => {}
            Err(_) => {
                tracing::warn!(
                    user_id = %self.user_id,
                    kind = %self.kind,
                    "Writer did not drain in time, aborting"
                );
                self.writer.abort();
            }
        }

        tracing::info!(
            user_id = %self.user_id,
            kind = %self.kind,
            socket_id = %self.handle.id(),
            close_code = code,
            "Socket closed"
        );
    }

    /// Close with 1000.
    pub async fn finish(self) {
        self.shutdown(close_code::NORMAL, "").await;
    }
}

/// Forward queued frames to the sink until the queue closes, a send fails or a
/// close frame has gone out.
async fn writer_task(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        let is_close = matches!(msg, Message::Close(_));
        if ws_sender.send(msg).await.is_err() {
            break;
        }
        if is_close {
            break;
        }
    }
}
