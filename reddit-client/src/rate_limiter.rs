use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub time_window: Duration,
    pub burst_allowance: u32,
}

impl RateLimitConfig {
    pub fn reddit_oauth() -> Self {
        Self {
            max_requests: 100, // OAuth clients get 100 queries per minute
            time_window: Duration::from_secs(60),
            burst_allowance: 10,
        }
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct TokenBucket {
    state: Mutex<BucketState>,
    capacity: f64,
    refill_rate: f64, // tokens per second
}

impl TokenBucket {
    pub fn new(config: &RateLimitConfig) -> Self {
        let capacity = config.burst_allowance.max(1) as f64;
        let refill_rate = config.max_requests as f64 / config.time_window.as_secs_f64();

        Self {
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            capacity,
            refill_rate,
        }
    }

    /// Takes `tokens_needed` tokens, or returns how long until they would be available.
    pub async fn acquire(&self, tokens_needed: f64) -> Result<(), Duration> {
        let mut state = self.state.lock().await;
        self.refill(&mut state);

        if state.tokens >= tokens_needed {
            state.tokens -= tokens_needed;
            Ok(())
        } else {
            let missing = tokens_needed - state.tokens;
            Err(Duration::from_secs_f64(missing / self.refill_rate))
        }
    }

    pub async fn available_tokens(&self) -> f64 {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        state.tokens
    }

    /// Drops every token so the next caller has to wait for a refill.
    pub async fn drain(&self) {
        let mut state = self.state.lock().await;
        state.tokens = 0.0;
        state.last_refill = Instant::now();
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill);
        state.tokens = (state.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.capacity);
        state.last_refill = now;
    }
}

/// Client-side pacing for Reddit requests.
///
/// Combines a local token bucket with the `x-ratelimit-*` headers Reddit returns on
/// every response: when the server reports the window as used up, the next request
/// waits for the advertised reset.
#[derive(Debug)]
pub struct RateLimiter {
    token_bucket: TokenBucket,
    config: RateLimitConfig,
    server_reset_at: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            token_bucket: TokenBucket::new(&config),
            config,
            server_reset_at: Mutex::new(None),
        }
    }

    pub async fn acquire_permit(&self) {
        let reset_at = self.server_reset_at.lock().await.take();
        if let Some(reset_at) = reset_at {
            let wait = reset_at.saturating_duration_since(Instant::now());
            if !wait.is_zero() {
                warn!("Reddit rate limit window exhausted, waiting {:?}", wait);
                sleep(wait).await;
            }
        }

        loop {
            match self.token_bucket.acquire(1.0).await {
                Ok(()) => break,
                Err(wait_time) => {
                    debug!("Rate limit reached, waiting {:?}", wait_time);
                    sleep(wait_time).await;
                }
            }
        }
    }

    /// Feeds back the `x-ratelimit-remaining` / `x-ratelimit-reset` pair from a response.
    pub async fn observe_server_window(&self, remaining: Option<f64>, reset_secs: Option<u64>) {
        if let (Some(remaining), Some(reset_secs)) = (remaining, reset_secs) {
            if remaining < 1.0 {
                *self.server_reset_at.lock().await =
                    Some(Instant::now() + Duration::from_secs(reset_secs));
                self.token_bucket.drain().await;
            }
        }
    }

    pub async fn available_tokens(&self) -> u32 {
        self.token_bucket.available_tokens().await as u32
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.config.max_requests
    }
}
