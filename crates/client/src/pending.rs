//! Correlation of outbound requests with the acknowledgements that answer
//! them, keyed by message id.

use std::{collections::HashMap, time::Duration};

use {
    tokio::sync::{Mutex, oneshot},
    tracing::{debug, warn},
};

use supportbot_protocol::ResponseFrame;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PendingError {
    /// No reply arrived within the window; the entry has been removed.
    #[error("no reply to {0} before the timeout")]
    RequestTimeout(String),
    /// The gateway answered with `success: false`.
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("request {0} was cancelled")]
    Cancelled(String),
    #[error("message id {0} is already awaiting a reply")]
    DuplicateId(String),
    #[error("connection closed before the request was written")]
    TransportWriteFailure,
}

/// Waiting side of one registered request.
#[derive(Debug)]
pub struct PendingReply {
    id: String,
    rx: oneshot::Receiver<ResponseFrame>,
}

impl PendingReply {
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Table of requests still waiting for a reply.
pub struct PendingResponses {
    entries: Mutex<HashMap<String, oneshot::Sender<ResponseFrame>>>,
    timeout: Duration,
}

impl PendingResponses {
    pub fn new(timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Register `id` before the request is written, so a fast reply is
    /// never missed.
    pub async fn register(&self, id: &str) -> Result<PendingReply, PendingError> {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(id) {
            return Err(PendingError::DuplicateId(id.to_string()));
        }
        let (tx, rx) = oneshot::channel();
        entries.insert(id.to_string(), tx);
        Ok(PendingReply {
            id: id.to_string(),
            rx,
        })
    }

    /// Wait for the reply to a registered request.
    pub async fn wait(&self, reply: PendingReply) -> Result<ResponseFrame, PendingError> {
        let PendingReply { id, mut rx } = reply;
        match tokio::time::timeout(self.timeout, &mut rx).await {
            Ok(received) => settle(id, received.ok()),
            Err(_) => self.expire(PendingReply { id, rx }).await,
        }
    }

    /// Settle a request whose window has elapsed. Whoever removes the entry
    /// first wins: if a reply already claimed it, that reply is returned.
    async fn expire(&self, reply: PendingReply) -> Result<ResponseFrame, PendingError> {
        let PendingReply { id, mut rx } = reply;
        if self.entries.lock().await.remove(&id).is_some() {
            warn!(message_id = %id, timeout_ms = self.timeout.as_millis() as u64, "request timed out");
            return Err(PendingError::RequestTimeout(id));
        }
        debug!(message_id = %id, "reply arrived as the window closed");
        settle(id, rx.try_recv().ok())
    }

    /// Hand a reply to its waiter. Returns false when nobody is waiting for
    /// that id (unknown, timed out or already resolved).
    pub async fn resolve(&self, frame: ResponseFrame) -> bool {
        // Send under the lock so a waiter that finds the entry gone also
        // finds the reply in its channel.
        let mut entries = self.entries.lock().await;
        let Some(tx) = entries.remove(&frame.message_id) else {
            debug!(message_id = %frame.message_id, "reply for unknown request");
            return false;
        };
        tx.send(frame).is_ok()
    }

    /// Drop one entry; its waiter sees [`PendingError::Cancelled`].
    pub async fn cancel(&self, id: &str) -> bool {
        self.entries.lock().await.remove(id).is_some()
    }

    /// Drop every entry. Returns how many were waiting.
    pub async fn cancel_all(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let n = entries.len();
        entries.clear();
        n
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

fn settle(id: String, received: Option<ResponseFrame>) -> Result<ResponseFrame, PendingError> {
    match received {
        Some(frame) if frame.success => Ok(frame),
        Some(frame) => Err(PendingError::Rejected(frame.message)),
        None => Err(PendingError::Cancelled(id)),
    }
}
