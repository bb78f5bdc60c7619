use serde::Deserialize;
use std::time::Duration;

/// Reconnect schedule for the real-time channel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
  pub initial_delay_ms: u64,
  pub max_delay_ms: u64,
  pub multiplier: f64,
  /// Give up after this many consecutive failed attempts; unlimited when unset
  pub max_attempts: Option<u32>,
}

impl Default for BackoffConfig {
  fn default() -> Self {
    Self {
      initial_delay_ms: 5_000,
      max_delay_ms: 60_000,
      multiplier: 2.0,
      max_attempts: None,
    }
  }
}

/// Exponential backoff state. `reset` after a successful connection.
#[derive(Debug, Clone)]
pub struct Backoff {
  config: BackoffConfig,
  attempts: u32,
}

impl Backoff {
  pub fn new(config: BackoffConfig) -> Self {
    Self {
      config,
      attempts: 0,
    }
  }

  /// Delay before the next attempt, or `None` once attempts are exhausted.
  pub fn next_delay(&mut self) -> Option<Duration> {
    if let Some(max) = self.config.max_attempts {
      if self.attempts >= max {
        return None;
      }
    }

    let factor = self.config.multiplier.max(1.0).powi(self.attempts as i32);
    let delay = (self.config.initial_delay_ms as f64 * factor).min(self.config.max_delay_ms as f64);
    self.attempts = self.attempts.saturating_add(1);

    Some(Duration::from_millis(delay as u64))
  }

  pub fn reset(&mut self) {
    self.attempts = 0;
  }

  pub fn attempts(&self) -> u32 {
    self.attempts
  }
}
