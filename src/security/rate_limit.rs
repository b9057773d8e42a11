use std::sync::Arc;
use std::{
    collections::{HashMap, VecDeque},
    time::{Duration, Instant},
};
use tokio::sync::Mutex;

/// Sliding-window limiter keyed by an arbitrary string (a phone number for OTP issuance).
#[derive(Debug, Clone)]
pub struct RateLimiter {
    window: Duration,
    limit: usize,
    inner: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            window,
            limit,
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn new_per_minute(limit: usize) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    /// Records a hit for `key` and reports whether it fits in the window.
    /// A limit of zero disables limiting.
    pub async fn allow(&self, key: &str) -> bool {
        if self.limit == 0 {
            return true;
        }
        let now = Instant::now();
        let mut map = self.inner.lock().await;
        let hits = map.entry(key.to_string()).or_default();
        while let Some(&front) = hits.front() {
            if now.duration_since(front) >= self.window {
                hits.pop_front();
            } else {
                break;
            }
        }
        if hits.len() < self.limit {
            hits.push_back(now);
            true
        } else {
            false
        }
    }

    /// Drops keys whose hits have all aged out.
    pub async fn purge(&self) -> usize {
        let now = Instant::now();
        let window = self.window;
        let mut map = self.inner.lock().await;
        let before = map.len();
        map.retain(|_, hits| hits.back().is_some_and(|&t| now.duration_since(t) < window));
        before - map.len()
    }
}
