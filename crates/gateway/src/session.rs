use std::time::Duration;

use {
    serde::Serialize,
    tokio::{sync::mpsc, time::Instant},
    tokio_util::sync::CancellationToken,
};

use supportbot_protocol::UserId;

// ── Transport handle ─────────────────────────────────────────────────────────

/// Write half of one connection: a queue feeding the connection's writer
/// task, plus a token that closes the connection when cancelled.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    sender: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

impl TransportHandle {
    pub fn new(sender: mpsc::UnboundedSender<String>, cancel: CancellationToken) -> Self {
        Self { sender, cancel }
    }

    /// A handle with a fresh queue and token. The receiver is the writer
    /// task's end of the queue.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx, CancellationToken::new()), rx)
    }

    /// Queue a serialized frame. Returns false when the connection is gone.
    pub fn send(&self, frame: String) -> bool {
        !self.cancel.is_cancelled() && self.sender.send(frame).is_ok()
    }

    /// Terminate the underlying connection. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.sender.is_closed()
    }

    /// Token the connection task watches for closure.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

// ── Session ──────────────────────────────────────────────────────────────────

/// Live binding between a user and one connection.
#[derive(Debug)]
pub struct Session {
    pub user_id: UserId,
    /// Unique per connection attempt.
    pub session_id: String,
    pub display_name: String,
    /// Remote address of the client, when known.
    pub origin: Option<String>,
    pub handle: TransportHandle,
    pub connected_at: Instant,
    pub last_heartbeat: Instant,
    pub missed_heartbeats: u32,
}

impl Session {
    pub fn new(
        user_id: UserId,
        session_id: String,
        origin: Option<String>,
        handle: TransportHandle,
        now: Instant,
    ) -> Self {
        Self {
            user_id,
            display_name: default_display_name(user_id),
            session_id,
            origin,
            handle,
            connected_at: now,
            last_heartbeat: now,
            missed_heartbeats: 0,
        }
    }

    /// Reset liveness after a heartbeat.
    pub fn touch(&mut self, now: Instant) {
        self.last_heartbeat = now;
        self.missed_heartbeats = 0;
    }

    pub fn since_heartbeat(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_heartbeat)
    }
}

pub fn default_display_name(user_id: UserId) -> String {
    format!("user{user_id}")
}

/// Diagnostic view of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub user_id: UserId,
    pub session_id: String,
    pub display_name: String,
    pub origin: Option<String>,
    pub missed_heartbeats: u32,
    pub secs_since_heartbeat: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_after_close_fails() {
        let (handle, mut rx) = TransportHandle::channel();
        assert!(handle.send("a".into()));
        handle.close();
        assert!(handle.is_closed());
        assert!(!handle.send("b".into()));
        assert_eq!(rx.try_recv().unwrap(), "a");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn send_fails_when_writer_is_gone() {
        let (handle, rx) = TransportHandle::channel();
        drop(rx);
        assert!(handle.is_closed());
        assert!(!handle.send("x".into()));
    }

    #[test]
    fn touch_resets_missed_beats() {
        let (handle, _rx) = TransportHandle::channel();
        let start = Instant::now();
        let mut s = Session::new(7, "s1".into(), None, handle, start);
        assert_eq!(s.display_name, "user7");
        s.missed_heartbeats = 2;
        s.touch(start + Duration::from_secs(5));
        assert_eq!(s.missed_heartbeats, 0);
        assert_eq!(s.since_heartbeat(start + Duration::from_secs(6)), Duration::from_secs(1));
    }
}
