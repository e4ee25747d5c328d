//! Host-side polling of the guard's exit flag
//!
//! The host never calls into the guard's internals; it checks
//! `should_exit()` once per tick from its own loop.

use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

/// Resolve once `should_exit` reports true, checking every `poll_interval`
pub async fn wait_for_exit<F>(should_exit: F, poll_interval: Duration)
where
    F: Fn() -> bool,
{
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if should_exit() {
            info!("exit combination detected");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_resolves_when_flag_set() {
        let polls = AtomicUsize::new(0);

        tokio_test::block_on(wait_for_exit(
            || polls.fetch_add(1, Ordering::SeqCst) >= 2,
            Duration::from_millis(5),
        ));

        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_keeps_waiting_while_flag_clear() {
        let timed_out = tokio_test::block_on(async {
            tokio::time::timeout(
                Duration::from_millis(30),
                wait_for_exit(|| false, Duration::from_millis(5)),
            )
            .await
            .is_err()
        });
        assert!(timed_out);
    }
}
