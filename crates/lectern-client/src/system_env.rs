//! Production Environment implementation using system time and RNG.
//!
//! # Capabilities
//!
//! - Real monotonic time (`std::time::Instant`) that advances naturally
//! - Wall clock from the system (`chrono::Utc::now`)
//! - OS randomness (getrandom) for reconnection jitter
//! - Tokio async sleep for actual wall-clock delays
//!
//! Randomness here only spreads reconnection attempts, so an OS RNG failure
//! degrades to clock-derived bytes instead of aborting the session.

use std::time::Duration;

use chrono::{DateTime, Utc};
use lectern_core::Environment;

/// Production environment using system time and OS randomness.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        if let Err(err) = getrandom::fill(buffer) {
            tracing::warn!(%err, "OS RNG unavailable, deriving jitter from the clock");
            let seed = Utc::now().timestamp_subsec_nanos().to_le_bytes();
            for (i, byte) in buffer.iter_mut().enumerate() {
                *byte = seed[i % seed.len()].rotate_left(u32::try_from(i % 8).unwrap_or(0));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_env_time_advances() {
        let env = SystemEnv::new();

        let t1 = env.now();
        std::thread::sleep(Duration::from_millis(10));
        let t2 = env.now();

        assert!(t2 > t1, "Time should advance");
    }

    #[test]
    fn system_env_random_bytes_are_random() {
        let env = SystemEnv::new();

        let mut bytes1 = [0u8; 32];
        let mut bytes2 = [0u8; 32];

        env.random_bytes(&mut bytes1);
        env.random_bytes(&mut bytes2);

        assert_ne!(bytes1, bytes2, "Random bytes should differ");
    }

    #[test]
    fn wall_clock_is_after_epoch() {
        assert!(SystemEnv::new().wall_clock() > DateTime::UNIX_EPOCH);
    }

    #[tokio::test]
    async fn system_env_sleep_works() {
        let env = SystemEnv::new();

        let start = env.now();
        env.sleep(Duration::from_millis(50)).await;
        let elapsed = env.now() - start;

        assert!(elapsed >= Duration::from_millis(50), "Sleep should wait at least 50ms");
    }
}
