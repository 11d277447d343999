//! Per-user recent questions, fed into the classification prompt.

use std::{
    collections::{HashMap, VecDeque},
    time::Duration,
};

use {
    tokio::{sync::Mutex, time::Instant},
    tracing::debug,
};

use supportbot_protocol::UserId;

/// Questions kept per user.
pub const DEFAULT_HISTORY_LEN: usize = 5;

/// A user's history expires this long after their last question.
pub const DEFAULT_HISTORY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Upper bound on how often `push` sweeps out expired users.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Entry {
    questions: VecDeque<String>,
    expires_at: Instant,
}

/// In-memory history store, bounded in length and in age.
pub struct HistoryStore {
    inner: Mutex<Inner>,
    max_len: usize,
    ttl: Duration,
}

struct Inner {
    entries: HashMap<UserId, Entry>,
    next_sweep: Instant,
}

impl Inner {
    fn sweep(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        before - self.entries.len()
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LEN, DEFAULT_HISTORY_TTL)
    }
}

impl HistoryStore {
    pub fn new(max_len: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                next_sweep: Instant::now(),
            }),
            max_len: max_len.max(1),
            ttl,
        }
    }

    /// Oldest first.
    pub async fn recent(&self, user_id: UserId) -> Vec<String> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let entries = &mut inner.entries;
        match entries.get(&user_id) {
            Some(entry) if entry.expires_at > now => entry.questions.iter().cloned().collect(),
            Some(_) => {
                entries.remove(&user_id);
                Vec::new()
            },
            None => Vec::new(),
        }
    }

    /// Append a question and refresh the user's expiry. Users who never
    /// come back are swept out here, at most once per sweep interval.
    pub async fn push(&self, user_id: UserId, question: &str) {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        if now >= inner.next_sweep {
            let dropped = inner.sweep(now);
            inner.next_sweep = now + SWEEP_INTERVAL.min(self.ttl);
            if dropped > 0 {
                debug!(dropped, "expired question history swept");
            }
        }
        let entry = inner.entries.entry(user_id).or_insert_with(|| Entry {
            questions: VecDeque::with_capacity(self.max_len),
            expires_at: now,
        });
        if entry.expires_at <= now {
            entry.questions.clear();
        }
        entry.questions.push_back(question.to_string());
        while entry.questions.len() > self.max_len {
            entry.questions.pop_front();
        }
        entry.expires_at = now + self.ttl;
    }

    /// Drop expired users. Returns how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        self.inner.lock().await.sweep(Instant::now())
    }

    pub async fn users(&self) -> usize {
        self.inner.lock().await.entries.len()
    }
}
