use super::router::Topic;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

const HISTORY_LEN: usize = 2;
const MAX_SESSIONS: usize = 1000;
const IDLE_TTL: Duration = Duration::from_secs(2 * 60 * 60);

/// Conversation state kept between messages of one chat session.
#[derive(Debug, Clone, Default)]
pub struct ChatSession {
    pub last_topic: Option<Topic>,
    history: VecDeque<String>,
    pub last_interaction_id: Option<String>,
}

impl ChatSession {
    pub fn remember(&mut self, query: &str) {
        self.history.push_back(query.to_string());
        while self.history.len() > HISTORY_LEN {
            self.history.pop_front();
        }
    }

    pub fn history(&self) -> Vec<&str> {
        self.history.iter().map(String::as_str).collect()
    }
}

/// Live chat sessions keyed by host session id. Sessions idle longer than
/// `IDLE_TTL` are dropped, and the least recently used one makes room once
/// `MAX_SESSIONS` is reached.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<String, (ChatSession, Instant)>,
}

impl SessionStore {
    pub fn touch(&mut self, id: &str) -> &mut ChatSession {
        self.touch_at(id, Instant::now())
    }

    fn touch_at(&mut self, id: &str, now: Instant) -> &mut ChatSession {
        let before = self.sessions.len();
        self.sessions
            .retain(|key, (_, used)| key == id || now.saturating_duration_since(*used) < IDLE_TTL);
        if !self.sessions.contains_key(id) && self.sessions.len() >= MAX_SESSIONS {
            let oldest = self
                .sessions
                .iter()
                .min_by_key(|(_, (_, used))| *used)
                .map(|(key, _)| key.clone());
            if let Some(key) = oldest {
                self.sessions.remove(&key);
            }
        }
        let evicted = before - self.sessions.len();
        if evicted > 0 {
            tracing::debug!(evicted, "chat sessions evicted");
        }
        let entry = self
            .sessions
            .entry(id.to_string())
            .or_insert_with(|| (ChatSession::default(), now));
        entry.1 = now;
        &mut entry.0
    }

    pub fn get(&self, id: &str) -> Option<&ChatSession> {
        self.sessions.get(id).map(|(s, _)| s)
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    pub fn clear(&mut self) {
        self.sessions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_keeps_last_two_queries() {
        let mut s = ChatSession::default();
        for q in ["one", "two", "three"] {
            s.remember(q);
        }
        assert_eq!(s.history(), vec!["two", "three"]);
    }

    #[test]
    fn idle_sessions_are_dropped() {
        let mut store = SessionStore::default();
        let start = Instant::now();
        store.touch_at("a", start).remember("hello");
        store.touch_at("b", start + Duration::from_secs(60 * 60));
        store.touch_at("b", start + IDLE_TTL + Duration::from_secs(1));
        assert!(store.get("a").is_none());
        assert_eq!(store.count(), 1);

        let again = store.touch_at("a", start + IDLE_TTL + Duration::from_secs(2));
        assert!(again.history().is_empty());
    }

    #[test]
    fn full_store_evicts_least_recently_used() {
        let mut store = SessionStore::default();
        let start = Instant::now();
        for i in 0..MAX_SESSIONS {
            store.touch_at(&format!("s{}", i), start + Duration::from_millis(i as u64));
        }
        let later = start + Duration::from_secs(10);
        store.touch_at("s0", later).remember("still here");
        store.touch_at("fresh", later);
        assert_eq!(store.count(), MAX_SESSIONS);
        assert!(store.get("s1").is_none());
        assert_eq!(store.get("s0").map(|s| s.history()), Some(vec!["still here"]));
        assert!(store.get("fresh").is_some());
    }
}
