// src/sleeper.rs
//
// Sleep abstraction so the polling loop can be tested without real delays.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

/// Waits between loop iterations.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep_sec(&self, seconds: u64);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep_sec(&self, seconds: u64) {
        tokio::time::sleep(Duration::from_secs(seconds)).await;
    }
}

/// Returns immediately and remembers every requested duration.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<u64>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Durations requested so far, in seconds.
    pub fn slept(&self) -> Vec<u64> {
        self.slept.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep_sec(&self, seconds: u64) {
        if let Ok(mut slept) = self.slept.lock() {
            slept.push(seconds);
        }
        // Let other tasks observe loop progress.
        tokio::task::yield_now().await;
    }
}
