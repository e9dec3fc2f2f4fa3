
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::ChatConfig;

/// Thread used when the caller does not supply one
pub const DEFAULT_THREAD: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

#[derive(Debug)]
struct Thread {
    turns: VecDeque<Turn>,
    last_active: Instant,
}

/// Per-thread conversation history, held in process memory.
///
/// Threads idle for longer than the TTL are dropped. The LRU cache evicts the
/// least recently used thread once `max_threads` is reached, and each thread
/// keeps at most `max_turns` turns. Reads count as use.
#[derive(Debug)]
pub struct ConversationMemory {
    threads: Mutex<LruCache<String, Thread>>,
    ttl: Duration,
    max_turns: usize,
}

impl ConversationMemory {
    #[inline]
    pub fn new(ttl: Duration, max_threads: usize, max_turns: usize) -> Self {
        let capacity = NonZeroUsize::new(max_threads).unwrap_or(NonZeroUsize::MIN);
        Self {
            threads: Mutex::new(LruCache::new(capacity)),
            ttl,
            max_turns: max_turns.max(1),
        }
    }

    #[inline]
    pub fn from_config(config: &ChatConfig) -> Self {
        Self::new(
            Duration::from_secs(config.thread_ttl_seconds),
            config.max_threads,
            config.max_turns,
        )
    }

    /// The last `limit` turns of a thread, oldest first
    #[inline]
    pub async fn history(&self, thread_id: &str, limit: usize) -> Vec<Turn> {
        let mut threads = self.threads.lock().await;
        let now = Instant::now();
        self.evict_expired(&mut threads, now);

        let Some(thread) = threads.get_mut(thread_id) else {
            return Vec::new();
        };
        thread.last_active = now;

        let skip = thread.turns.len().saturating_sub(limit);
        thread.turns.iter().skip(skip).cloned().collect()
    }

    #[inline]
    pub async fn append(&self, thread_id: &str, turn: Turn) {
        let mut threads = self.threads.lock().await;
        let now = Instant::now();
        self.evict_expired(&mut threads, now);

        if !threads.contains(thread_id) {
            let thread = Thread {
                turns: VecDeque::new(),
                last_active: now,
            };
            if let Some((evicted, _)) = threads.push(thread_id.to_string(), thread) {
                debug!("Evicting least recently used thread {}", evicted);
            }
        }

        let Some(thread) = threads.get_mut(thread_id) else {
            return;
        };
        thread.turns.push_back(turn);
        while thread.turns.len() > self.max_turns {
            thread.turns.pop_front();
        }
        thread.last_active = now;
    }

    /// Forget a thread; returns whether it existed
    #[inline]
    pub async fn reset(&self, thread_id: &str) -> bool {
        self.threads.lock().await.pop(thread_id).is_some()
    }

    #[inline]
    pub async fn thread_count(&self) -> usize {
        let mut threads = self.threads.lock().await;
        self.evict_expired(&mut threads, Instant::now());
        threads.len()
    }

    fn evict_expired(&self, threads: &mut LruCache<String, Thread>, now: Instant) {
        let expired: Vec<String> = threads
            .iter()
            .filter(|(_, thread)| now.duration_since(thread.last_active) > self.ttl)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            threads.pop(id);
        }
        if !expired.is_empty() {
            debug!("Expired {} idle conversation threads", expired.len());
        }
    }
}
