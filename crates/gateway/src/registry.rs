use std::{collections::HashMap, time::Duration};

use {
    serde::Serialize,
    tokio::{sync::RwLock, time::Instant},
    tracing::{debug, info, warn},
};

use supportbot_protocol::UserId;

use crate::{
    error::GatewayError,
    session::{Session, SessionInfo, TransportHandle},
};

/// Both indices live under one lock so no reader ever sees a half-applied
/// update.
#[derive(Default)]
struct Indices {
    /// user_id → Session
    by_user: HashMap<UserId, Session>,
    /// session_id → user_id (reverse lookup for cleanup on disconnect)
    by_session: HashMap<String, UserId>,
}

impl Indices {
    fn remove_user(&mut self, user_id: UserId) -> Option<Session> {
        let session = self.by_user.remove(&user_id)?;
        self.by_session.remove(&session.session_id);
        Some(session)
    }

    fn remove_session(&mut self, session_id: &str) -> Option<Session> {
        let user_id = self.by_session.remove(session_id)?;
        self.by_user.remove(&user_id)
    }
}

/// Outcome of one heartbeat scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    /// Sessions that missed this beat but stay registered: (user, missed count).
    pub late: Vec<(UserId, u32)>,
    /// Sessions removed by this scan: (user, session id).
    pub evicted: Vec<(UserId, String)>,
}

/// Concurrency-safe store of live sessions, at most one per user.
pub struct SessionRegistry {
    inner: RwLock<Indices>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Indices::default()),
        }
    }

    /// Register a connection for `user_id`, taking ownership of its handle.
    ///
    /// A prior session for the same user is closed and removed from both
    /// indices before the new one is inserted.
    pub async fn register(
        &self,
        user_id: UserId,
        handle: TransportHandle,
        session_id: String,
        origin: Option<String>,
    ) {
        let session = Session::new(user_id, session_id.clone(), origin, handle, Instant::now());
        let mut inner = self.inner.write().await;

        if let Some(previous) = inner.remove_user(user_id) {
            info!(
                user_id,
                old_session_id = %previous.session_id,
                new_session_id = %session_id,
                "user reconnected, closing previous session"
            );
            previous.handle.close();
        }
        // Session ids are generated per connection; a clash means a caller bug.
        if let Some(stale) = inner.remove_session(&session_id) {
            warn!(
                user_id = stale.user_id,
                session_id = %session_id,
                "session id reused, closing stale session"
            );
            stale.handle.close();
        }

        inner.by_session.insert(session_id.clone(), user_id);
        inner.by_user.insert(user_id, session);
        info!(
            user_id,
            session_id = %session_id,
            online = inner.by_user.len(),
            "session registered"
        );
    }

    /// Queue a serialized frame for a user's live session.
    ///
    /// A failed write tears that session down (by session id, so a newer
    /// registration for the same user is left alone) and is reported.
    pub async fn send_to(&self, user_id: UserId, frame: String) -> Result<(), GatewayError> {
        let failed_session = {
            let inner = self.inner.read().await;
            let Some(session) = inner.by_user.get(&user_id) else {
                warn!(user_id, "user offline, message not delivered");
                return Err(GatewayError::UserOffline(user_id));
            };
            if session.handle.send(frame) {
                debug!(user_id, session_id = %session.session_id, "frame queued");
                return Ok(());
            }
            session.session_id.clone()
        };

        warn!(user_id, session_id = %failed_session, "write failed, removing session");
        self.remove_by_session_id(&failed_session).await;
        Err(GatewayError::TransportWriteFailure {
            user_id,
            session_id: failed_session,
        })
    }

    /// Serialize `payload` as JSON and [`send_to`](Self::send_to) it.
    pub async fn send_json<T: Serialize>(
        &self,
        user_id: UserId,
        payload: &T,
    ) -> Result<(), GatewayError> {
        let frame =
            serde_json::to_string(payload).map_err(|e| GatewayError::Encode(e.to_string()))?;
        self.send_to(user_id, frame).await
    }

    /// Remove and close the session with this id. No-op when absent.
    pub async fn remove_by_session_id(&self, session_id: &str) -> Option<UserId> {
        let removed = self.inner.write().await.remove_session(session_id)?;
        removed.handle.close();
        info!(user_id = removed.user_id, session_id, "session removed");
        Some(removed.user_id)
    }

    /// Remove and close the user's session. No-op when absent.
    pub async fn remove_by_identity(&self, user_id: UserId) -> Option<String> {
        let removed = self.inner.write().await.remove_user(user_id)?;
        removed.handle.close();
        info!(user_id, session_id = %removed.session_id, "session removed");
        Some(removed.session_id)
    }

    /// Number of online users.
    pub async fn count(&self) -> usize {
        self.inner.read().await.by_user.len()
    }

    pub async fn is_online(&self, user_id: UserId) -> bool {
        self.inner.read().await.by_user.contains_key(&user_id)
    }

    pub async fn session_id_of(&self, user_id: UserId) -> Option<String> {
        self.inner
            .read()
            .await
            .by_user
            .get(&user_id)
            .map(|s| s.session_id.clone())
    }

    pub async fn user_of(&self, session_id: &str) -> Option<UserId> {
        self.inner.read().await.by_session.get(session_id).copied()
    }

    /// Record a heartbeat on the connection with this session id.
    pub async fn touch_heartbeat(&self, session_id: &str) -> bool {
        self.touch_heartbeat_at(session_id, Instant::now()).await
    }

    pub async fn touch_heartbeat_at(&self, session_id: &str, now: Instant) -> bool {
        let mut inner = self.inner.write().await;
        let Some(user_id) = inner.by_session.get(session_id).copied() else {
            return false;
        };
        match inner.by_user.get_mut(&user_id) {
            Some(session) => {
                session.touch(now);
                debug!(user_id, session_id, "heartbeat");
                true
            },
            None => false,
        }
    }

    /// Record a heartbeat on whatever session the user currently has.
    pub async fn touch_heartbeat_for(&self, user_id: UserId) -> bool {
        match self.inner.write().await.by_user.get_mut(&user_id) {
            Some(session) => {
                session.touch(Instant::now());
                true
            },
            None => false,
        }
    }

    /// One liveness scan.
    ///
    /// Every session whose last heartbeat is older than `timeout` gains a
    /// missed beat; reaching `max_missed` evicts it. Runs under the exclusive
    /// lock, so a heartbeat is either fully applied before the scan reads the
    /// session or applied after the scan finished.
    pub async fn sweep(&self, now: Instant, timeout: Duration, max_missed: u32) -> SweepReport {
        let mut inner = self.inner.write().await;
        let mut report = SweepReport {
            scanned: inner.by_user.len(),
            ..Default::default()
        };

        let mut expired = Vec::new();
        for (user_id, session) in inner.by_user.iter_mut() {
            if session.since_heartbeat(now) <= timeout {
                continue;
            }
            session.missed_heartbeats += 1;
            if session.missed_heartbeats >= max_missed {
                expired.push(*user_id);
            } else {
                info!(
                    user_id,
                    missed = session.missed_heartbeats,
                    "heartbeat missed"
                );
                report.late.push((*user_id, session.missed_heartbeats));
            }
        }

        for user_id in expired {
            if let Some(session) = inner.remove_user(user_id) {
                warn!(
                    user_id,
                    session_id = %session.session_id,
                    missed = session.missed_heartbeats,
                    "evicting unresponsive session"
                );
                session.handle.close();
                report.evicted.push((user_id, session.session_id));
            }
        }
        report
    }

    /// Per-session diagnostics, ordered by user id.
    pub async fn snapshot(&self) -> Vec<SessionInfo> {
        let now = Instant::now();
        let inner = self.inner.read().await;
        let mut sessions: Vec<SessionInfo> = inner
            .by_user
            .values()
            .map(|s| SessionInfo {
                user_id: s.user_id,
                session_id: s.session_id.clone(),
                display_name: s.display_name.clone(),
                origin: s.origin.clone(),
                missed_heartbeats: s.missed_heartbeats,
                secs_since_heartbeat: s.since_heartbeat(now).as_secs(),
            })
            .collect();
        sessions.sort_by_key(|s| s.user_id);
        sessions
    }

    /// Close every session. Used on shutdown.
    pub async fn close_all(&self) {
        let mut inner = self.inner.write().await;
        for (_, session) in inner.by_user.drain() {
            session.handle.close();
        }
        inner.by_session.clear();
    }

    /// True when every entry in each index has its counterpart in the other.
    #[cfg(test)]
    async fn is_consistent(&self) -> bool {
        let inner = self.inner.read().await;
        inner.by_user.len() == inner.by_session.len()
            && inner
                .by_session
                .iter()
                .all(|(sid, uid)| inner.by_user.get(uid).is_some_and(|s| &s.session_id == sid))
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::sync::Arc};

    const TIMEOUT: Duration = Duration::from_secs(60);

    async fn register(
        reg: &SessionRegistry,
        user: UserId,
        sid: &str,
    ) -> (TransportHandle, tokio::sync::mpsc::UnboundedReceiver<String>) {
        let (handle, rx) = TransportHandle::channel();
        reg.register(user, handle.clone(), sid.into(), Some("127.0.0.1".into()))
            .await;
        (handle, rx)
    }

    #[tokio::test]
    async fn second_registration_evicts_first() {
        let reg = SessionRegistry::new();
        let (first, _rx1) = register(&reg, 42, "s1").await;
        let (second, mut rx2) = register(&reg, 42, "s2").await;

        assert!(first.is_closed());
        assert!(!second.is_closed());
        assert_eq!(reg.count().await, 1);
        assert_eq!(reg.session_id_of(42).await.as_deref(), Some("s2"));
        assert_eq!(reg.user_of("s1").await, None);
        assert_eq!(reg.user_of("s2").await, Some(42));
        assert!(reg.is_consistent().await);

        reg.send_to(42, "hello".into()).await.unwrap();
        assert_eq!(rx2.recv().await.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn removal_is_idempotent() {
        let reg = SessionRegistry::new();
        let (handle, _rx) = register(&reg, 1, "s1").await;
        register(&reg, 2, "s2").await;

        assert_eq!(reg.remove_by_session_id("s1").await, Some(1));
        assert!(handle.is_closed());
        assert_eq!(reg.remove_by_session_id("s1").await, None);
        assert_eq!(reg.remove_by_identity(1).await, None);

        assert_eq!(reg.remove_by_identity(2).await.as_deref(), Some("s2"));
        assert_eq!(reg.remove_by_identity(2).await, None);
        assert_eq!(reg.count().await, 0);
        assert!(reg.is_consistent().await);
    }

    #[tokio::test]
    async fn stale_session_removal_keeps_newer_registration() {
        let reg = SessionRegistry::new();
        register(&reg, 5, "old").await;
        register(&reg, 5, "new").await;
        // The old connection task exits and cleans up by its own id.
        assert_eq!(reg.remove_by_session_id("old").await, None);
        assert!(reg.is_online(5).await);
    }

    #[tokio::test]
    async fn send_to_offline_user() {
        let reg = SessionRegistry::new();
        assert_eq!(
            reg.send_to(9, "x".into()).await,
            Err(GatewayError::UserOffline(9))
        );
    }

    #[tokio::test]
    async fn failed_write_tears_down_session() {
        let reg = SessionRegistry::new();
        let (handle, rx) = register(&reg, 3, "s3").await;
        drop(rx);

        let err = reg.send_to(3, "x".into()).await.unwrap_err();
        assert_eq!(err, GatewayError::TransportWriteFailure {
            user_id: 3,
            session_id: "s3".into(),
        });
        assert!(!reg.is_online(3).await);
        assert!(handle.is_closed());
        assert!(reg.is_consistent().await);
    }

    #[tokio::test]
    async fn sweep_counts_then_evicts() {
        let reg = SessionRegistry::new();
        let (handle, _rx) = register(&reg, 1, "s1").await;
        let base = Instant::now();

        // Fresh session: nothing happens.
        let report = reg.sweep(base, TIMEOUT, 3).await;
        assert_eq!(report.scanned, 1);
        assert!(report.late.is_empty() && report.evicted.is_empty());

        let late = base + Duration::from_secs(61);
        assert_eq!(reg.sweep(late, TIMEOUT, 3).await.late, vec![(1, 1)]);
        assert_eq!(
            reg.sweep(late + Duration::from_secs(30), TIMEOUT, 3).await.late,
            vec![(1, 2)]
        );
        let report = reg.sweep(late + Duration::from_secs(60), TIMEOUT, 3).await;
        assert_eq!(report.evicted, vec![(1, "s1".to_string())]);
        assert!(handle.is_closed());
        assert_eq!(reg.count().await, 0);
        assert!(reg.is_consistent().await);
    }

    #[tokio::test]
    async fn heartbeat_before_scan_prevents_increment() {
        let reg = SessionRegistry::new();
        register(&reg, 1, "s1").await;
        let base = Instant::now();

        let t1 = base + Duration::from_secs(61);
        reg.sweep(t1, TIMEOUT, 3).await;
        let t2 = t1 + Duration::from_secs(30);
        reg.sweep(t2, TIMEOUT, 3).await;

        // Heartbeat lands just before the third scan.
        let t3 = t2 + Duration::from_secs(30);
        assert!(reg.touch_heartbeat_at("s1", t3 - Duration::from_millis(1)).await);
        let report = reg.sweep(t3, TIMEOUT, 3).await;
        assert!(report.evicted.is_empty());
        assert!(report.late.is_empty());
        assert_eq!(reg.snapshot().await[0].missed_heartbeats, 0);
    }

    #[tokio::test]
    async fn heartbeat_on_superseded_session_is_ignored() {
        let reg = SessionRegistry::new();
        register(&reg, 1, "old").await;
        register(&reg, 1, "new").await;
        assert!(!reg.touch_heartbeat("old").await);
        assert!(reg.touch_heartbeat("new").await);
        assert!(reg.touch_heartbeat_for(1).await);
        assert!(!reg.touch_heartbeat_for(2).await);
    }

    #[tokio::test]
    async fn concurrent_reregistration_keeps_one_session() {
        let reg = Arc::new(SessionRegistry::new());
        let mut tasks = Vec::new();
        for i in 0..32 {
            let reg = Arc::clone(&reg);
            tasks.push(tokio::spawn(async move {
                let (handle, rx) = TransportHandle::channel();
                reg.register(42, handle.clone(), format!("s{i}"), None).await;
                (handle, rx)
            }));
        }
        let mut handles = Vec::new();
        for t in tasks {
            handles.push(t.await.unwrap());
        }

        assert_eq!(reg.count().await, 1);
        assert!(reg.is_consistent().await);
        let live = handles
            .iter()
            .filter(|(h, _)| !h.cancellation().is_cancelled())
            .count();
        assert_eq!(live, 1);
    }

    #[tokio::test]
    async fn snapshot_lists_sessions() {
        let reg = SessionRegistry::new();
        register(&reg, 2, "b").await;
        register(&reg, 1, "a").await;
        let snap = reg.snapshot().await;
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].user_id, 1);
        assert_eq!(snap[0].display_name, "user1");
        assert_eq!(snap[1].origin.as_deref(), Some("127.0.0.1"));
    }

    #[tokio::test]
    async fn close_all_empties_registry() {
        let reg = SessionRegistry::new();
        let (handle, _rx) = register(&reg, 1, "a").await;
        reg.close_all().await;
        assert!(handle.is_closed());
        assert_eq!(reg.count().await, 0);
    }
}
