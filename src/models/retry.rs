use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Exponential backoff used for store writes that must land.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: u64,
}

pub const DEFAULT_LADDER_MS: [u64; 5] = [1_000, 3_000, 5_000, 10_000, 20_000];

/// Fixed delivery retry ladder. Retry `k` waits `delays[k - 1]`.
#[derive(Debug, Clone)]
pub struct RetryLadder {
    delays: Vec<Duration>,
    jitter_ratio: f64,
}

impl RetryLadder {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self {
            delays,
            jitter_ratio: 0.0,
        }
    }

    pub fn from_millis(delays_ms: &[u64]) -> Self {
        Self::new(delays_ms.iter().map(|ms| Duration::from_millis(*ms)).collect())
    }

    pub fn with_jitter(mut self, jitter_ratio: f64) -> Self {
        self.jitter_ratio = jitter_ratio.clamp(0.0, 1.0);
        self
    }

    pub fn len(&self) -> usize {
        self.delays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delays.is_empty()
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    pub fn jitter_ratio(&self) -> f64 {
        self.jitter_ratio
    }
}

impl Default for RetryLadder {
    fn default() -> Self {
        Self::from_millis(&DEFAULT_LADDER_MS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryPhase {
    Scheduled,
    Attempting,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryState {
    pub request_id: String,
    pub attempts_made: u32,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub ladder_index: usize,
    pub exhausted: bool,
    pub phase: RetryPhase,
}

impl RetryState {
    pub fn new(request_id: String, attempts_made: u32) -> Self {
        Self {
            request_id,
            attempts_made,
            next_attempt_at: None,
            ladder_index: 0,
            exhausted: false,
            phase: RetryPhase::Scheduled,
        }
    }
}
