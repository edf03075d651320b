//! Periodic reconnect sweep.

use std::time::{Duration, Instant};

use tokio::time::{interval_at, Interval, MissedTickBehavior};

use fairway_shared::GolferId;

use crate::connections::ConnectionTable;

/// Timer for the sweep. The first tick fires one full period after start;
/// a late tick does not cause a burst of catch-up sweeps.
pub fn retry_timer(period: Duration) -> Interval {
    let mut timer = interval_at(tokio::time::Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

/// Claim a connection attempt for every friend that is neither connected
/// nor already being dialed, returning the ones to dial.
pub fn sweep<'a>(
    table: &mut ConnectionTable,
    friends: impl IntoIterator<Item = &'a GolferId>,
    now: Instant,
) -> Vec<GolferId> {
    friends
        .into_iter()
        .filter(|id| table.begin_attempt(id, now))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use libp2p::PeerId;

    #[test]
    fn test_sweep_skips_connected_and_in_flight() {
        let period = Duration::from_secs(60);
        let mut table = ConnectionTable::new(period);
        let ids: Vec<GolferId> = ["GF-A0000001", "GF-B0000002", "GF-C0000003"]
            .iter()
            .map(|s| GolferId::parse(s).unwrap())
            .collect();
        let t0 = Instant::now();

        table.identify(ids[0].clone(), PeerId::random(), t0);
        table.begin_attempt(&ids[1], t0);

        assert_eq!(sweep(&mut table, &ids, t0), vec![ids[2].clone()]);
        // nothing new until the in-flight attempts go stale
        assert!(sweep(&mut table, &ids, t0 + Duration::from_secs(1)).is_empty());
        assert_eq!(
            sweep(&mut table, &ids, t0 + period),
            vec![ids[1].clone(), ids[2].clone()]
        );
    }

    #[tokio::test]
    async fn test_first_tick_waits_one_period() {
        let mut timer = retry_timer(Duration::from_millis(200));
        let early = tokio::time::timeout(Duration::from_millis(50), timer.tick()).await;
        assert!(early.is_err(), "no immediate tick");

        tokio::time::timeout(Duration::from_secs(2), timer.tick())
            .await
            .expect("tick after one period");
    }
}
