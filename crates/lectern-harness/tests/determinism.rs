//! Property tests for the simulated environment.
//!
//! Simulations are only reproducible if the same seed gives the same
//! randomness and time moves exactly as far as the test says.

use std::time::Duration;

use lectern_core::{ConnectOptions, Connection, ConnectionAction, Environment};
use lectern_harness::{SIM_SERVER_URL, SimEnv};
use proptest::prelude::*;

/// Reconnection delays chosen while a server keeps refusing the socket.
fn refused_reconnect_delays(seed: u64, options: &ConnectOptions) -> Vec<Duration> {
    let env = SimEnv::with_seed(seed);
    let mut conn = Connection::new(env.clone(), options.clone());
    let mut delays = Vec::new();

    let mut actions = conn.connect(SIM_SERVER_URL, env.now());
    while matches!(actions.as_slice(), [ConnectionAction::OpenSocket { .. }]) {
        actions = conn.handle_socket_closed(env.now(), "refused");
        if let Some(ConnectionAction::Reconnecting { delay, .. }) = actions.last() {
            delays.push(*delay);
            env.advance(*delay);
            actions = conn.handle_tick(env.now());
        }
    }
    delays
}

proptest! {
    #[test]
    fn same_seed_same_bytes(seed in any::<u64>(), len in 1usize..64) {
        let (a, b) = (SimEnv::with_seed(seed), SimEnv::with_seed(seed));
        let (mut left, mut right) = (vec![0u8; len], vec![0u8; len]);

        a.random_bytes(&mut left);
        b.random_bytes(&mut right);

        prop_assert_eq!(left, right);
    }

    #[test]
    fn clock_moves_exactly_as_advanced(steps in prop::collection::vec(0u64..10_000, 0..20)) {
        let env = SimEnv::new();
        let start = env.now();
        let wall_start = env.wall_clock();

        for millis in &steps {
            env.advance(Duration::from_millis(*millis));
        }

        let total = Duration::from_millis(steps.iter().sum());
        prop_assert_eq!(env.now() - start, total);
        prop_assert_eq!(
            (env.wall_clock() - wall_start).to_std().unwrap_or_default(),
            total
        );
    }

    #[test]
    fn reconnect_jitter_replays_for_a_seed(seed in any::<u64>()) {
        let options = ConnectOptions::default();

        let first = refused_reconnect_delays(seed, &options);
        let second = refused_reconnect_delays(seed, &options);

        prop_assert_eq!(first.len(), options.reconnection_attempts as usize);
        prop_assert!(first.iter().all(|d| *d <= options.reconnection_delay_max));
        prop_assert_eq!(first, second);
    }
}
