//! Reconnect state machine for the core connection
//!
//! `Idle → Connecting → Connected → Backoff → Connecting … → GaveUp`.
//! Delays grow exponentially up to a ceiling; after `max_attempts`
//! consecutive failed attempts the relay gives up.

use std::time::Duration;

use crate::infrastructure::config::ReconnectConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting { attempt: u32 },
    Connected,
    Backoff { attempt: u32, delay: Duration },
    GaveUp { attempts: u32 },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// `0` never gives up
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&ReconnectConfig::default())
    }
}

impl ReconnectPolicy {
    pub fn from_config(config: &ReconnectConfig) -> Self {
        let initial_delay = Duration::from_secs(config.initial_delay_secs);
        Self {
            initial_delay,
            max_delay: Duration::from_secs(config.max_delay_secs).max(initial_delay),
            multiplier: 2.0,
            max_attempts: config.max_attempts,
        }
    }

    /// Next backoff delay, clamped to `max_delay`
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next_ms = (current.as_millis() as f64 * self.multiplier) as u64;
        Duration::from_millis(next_ms).min(self.max_delay)
    }
}

/// Tracks attempts and delays across connection cycles
#[derive(Debug)]
pub struct Reconnector {
    policy: ReconnectPolicy,
    state: ConnectionState,
    failures: u32,
    delay: Duration,
}

impl Reconnector {
    pub fn new(policy: ReconnectPolicy) -> Self {
        let delay = policy.initial_delay;
        Self {
            policy,
            state: ConnectionState::Idle,
            failures: 0,
            delay,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn begin_attempt(&mut self) -> &ConnectionState {
        self.state = ConnectionState::Connecting {
            attempt: self.failures + 1,
        };
        &self.state
    }

    pub fn connected(&mut self) -> &ConnectionState {
        self.failures = 0;
        self.delay = self.policy.initial_delay;
        self.state = ConnectionState::Connected;
        &self.state
    }

    /// An attempt failed: back off, or give up once attempts are exhausted
    pub fn failed(&mut self) -> &ConnectionState {
        self.failures += 1;
        if self.policy.max_attempts > 0 && self.failures >= self.policy.max_attempts {
            self.state = ConnectionState::GaveUp {
                attempts: self.failures,
            };
        } else {
            self.state = ConnectionState::Backoff {
                attempt: self.failures,
                delay: self.delay,
            };
            self.delay = self.policy.next_delay(self.delay);
        }
        &self.state
    }

    /// An established connection dropped; the attempt budget starts over
    pub fn disconnected(&mut self) -> &ConnectionState {
        self.failures = 0;
        self.delay = self.policy.next_delay(self.policy.initial_delay);
        self.state = ConnectionState::Backoff {
            attempt: 0,
            delay: self.policy.initial_delay,
        };
        &self.state
    }
}
