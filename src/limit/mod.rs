// Module: Limit
// Token-bucket rate limiter shared by all workers of a unit.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Admits at most `limit` iterations per second across every worker holding
/// a reference. `limit == 0` disables throttling. Capacity is one token, so
/// admissions are evenly spaced instead of bursting a full second at once.
#[derive(Debug)]
pub struct RateLimit {
    limit: u64,
    state: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    refreshed: Instant,
}

impl RateLimit {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            state: Mutex::new(Bucket {
                tokens: 1.0,
                refreshed: Instant::now(),
            }),
        }
    }

    /// Waits until one admission token is available, then consumes it.
    pub async fn acquire(&self) {
        if self.limit == 0 {
            return;
        }
        let rate = self.limit as f64;
        loop {
            let wait = {
                let mut bucket = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(bucket.refreshed).as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * rate).min(1.0);
                bucket.refreshed = now;
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / rate)
            };
            tokio::time::sleep(wait).await;
        }
    }
}
