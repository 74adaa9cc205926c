//! Inbound event deduplication.
//!
//! WhatsApp providers redeliver webhooks; the guard keeps a bounded-time
//! set of seen (session, provider message id) pairs and admits each pair
//! at most once within the retention window. Check-and-insert happens
//! under a single lock so concurrent admissions of the same key have
//! exactly one winner. Eviction is time-based, swept on admission, so
//! behavior stays predictable under bursty load.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct IdempotencyGuard {
    retention: Duration,
    seen: Mutex<HashMap<(String, String), Instant>>,
}

impl IdempotencyGuard {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true and records the pair if it has not been seen within
    /// the retention window; false for a duplicate (caller no-ops).
    pub fn admit(&self, session: &str, provider_message_id: &str) -> bool {
        let now = Instant::now();
        let mut seen = self.seen.lock().expect("dedup lock poisoned");

        seen.retain(|_, recorded| now.duration_since(*recorded) < self.retention);

        let key = (session.to_string(), provider_message_id.to_string());
        match seen.get(&key) {
            Some(_) => false,
            None => {
                seen.insert(key, now);
                true
            }
        }
    }

    /// Number of pairs currently retained (observability).
    pub fn len(&self) -> usize {
        self.seen.lock().expect("dedup lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_first_admission_wins() {
        let guard = IdempotencyGuard::new(Duration::from_secs(60));
        assert!(guard.admit("vendas", "msg-1"));
        assert!(!guard.admit("vendas", "msg-1"));
    }

    #[test]
    fn test_sessions_are_independent() {
        let guard = IdempotencyGuard::new(Duration::from_secs(60));
        assert!(guard.admit("vendas", "msg-1"));
        assert!(guard.admit("suporte", "msg-1"));
    }

    #[test]
    fn test_expired_pair_readmitted() {
        let guard = IdempotencyGuard::new(Duration::from_millis(10));
        assert!(guard.admit("vendas", "msg-1"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(guard.admit("vendas", "msg-1"));
    }

    #[test]
    fn test_eviction_bounds_memory() {
        let guard = IdempotencyGuard::new(Duration::from_millis(10));
        for i in 0..100 {
            guard.admit("vendas", &format!("msg-{i}"));
        }
        std::thread::sleep(Duration::from_millis(20));
        guard.admit("vendas", "fresh");
        assert_eq!(guard.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_admission_single_winner() {
        let guard = Arc::new(IdempotencyGuard::new(Duration::from_secs(60)));
        let mut handles = Vec::new();
        for _ in 0..32 {
            let guard = guard.clone();
            handles.push(tokio::spawn(async move { guard.admit("vendas", "race") }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
