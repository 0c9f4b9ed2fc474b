//! Publish cycle timing and snapshot assembly
//!
//! The cycle fires when the wrapping tick difference since the last publish
//! reaches the current rate. Polling between boundary crossings is a no-op,
//! so the loop can check at high frequency without double-firing.

use tracing::debug;

use crate::agent::AgentState;
use crate::snapshot::{StatusSnapshot, SystemDescriptors, SystemProbe};
use crate::ticks::Tick;

#[derive(Debug)]
pub struct PublishCycle {
    last_publish: Tick,
}

impl PublishCycle {
    pub fn new(start: Tick) -> Self {
        Self {
            last_publish: start,
        }
    }

    pub fn due(&self, now: Tick, rate_ms: u32) -> bool {
        now.since(self.last_publish) >= rate_ms
    }

    pub fn mark(&mut self, now: Tick) {
        self.last_publish = now;
    }
}

/// Build a snapshot when the interval has elapsed, advancing the cycle.
/// Returns None between boundary crossings.
pub fn maybe_snapshot(
    state: &mut AgentState,
    now: Tick,
    client_id: &str,
    ip: &str,
    rssi: Option<i64>,
    descriptors: &SystemDescriptors,
    probe: &mut dyn SystemProbe,
) -> Option<StatusSnapshot> {
    let rate = state.rate.current();
    if !state.cycle.due(now, rate) {
        return None;
    }

    let stats = probe.stats();
    state.cycle.mark(now);
    debug!("publish cycle fired at {}ms interval", rate);

    Some(StatusSnapshot {
        client_id: client_id.to_string(),
        uptime: now.millis() as u64,
        ip: ip.to_string(),
        rate,
        ts: StatusSnapshot::timestamp_now(),
        rssi,
        stats,
        system: descriptors.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(ms: u32) -> Tick {
        Tick::from_millis(ms)
    }

    #[test]
    fn fires_once_per_boundary() {
        let mut cycle = PublishCycle::new(t(0));
        let rate = 2_000;

        assert!(!cycle.due(t(500), rate));
        assert!(!cycle.due(t(1_999), rate));
        assert!(cycle.due(t(2_000), rate));

        cycle.mark(t(2_000));
        // Re-entrant checks on the same boundary are no-ops.
        assert!(!cycle.due(t(2_000), rate));
        assert!(!cycle.due(t(2_500), rate));
        assert!(cycle.due(t(4_000), rate));
    }

    #[test]
    fn rate_change_takes_effect_on_next_check() {
        let mut cycle = PublishCycle::new(t(0));
        cycle.mark(t(2_000));

        assert!(!cycle.due(t(4_000), 10_000));
        assert!(!cycle.due(t(11_999), 10_000));
        assert!(cycle.due(t(12_000), 10_000));
    }

    #[test]
    fn robust_to_tick_wraparound() {
        let mut cycle = PublishCycle::new(t(u32::MAX - 1_000));

        // 500ms elapsed, approaching the wrap point: not due yet.
        assert!(!cycle.due(t(u32::MAX - 500), 2_000));
        // ~2000ms elapsed, counter has wrapped: fires exactly once.
        let now = t(1_000);
        assert!(cycle.due(now, 2_000));
        cycle.mark(now);
        assert!(!cycle.due(t(1_001), 2_000));
        assert!(cycle.due(t(3_000), 2_000));
    }
}
