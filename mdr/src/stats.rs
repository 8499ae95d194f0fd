//! Routing counters.
//!
//! Failures never propagate out of the I/O core; these counters and the log
//! stream are the only visibility into drops and timing slips. The struct is
//! shared between the reactor worker and whoever holds the router handle, so
//! everything is atomic.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counter block shared by the router and its observers.
#[derive(Debug, Default)]
pub struct RouterStats {
    /// Valid SOKF datagrams received (each one is a tick).
    pub sokf_ticks: AtomicU64,
    /// K-Frames the timing stream skipped over.
    pub kframes_missed: AtomicU64,
    /// Downlink group messages decoded successfully.
    pub groups_parsed: AtomicU64,
    /// Downlink group messages discarded by the decoder.
    pub invalid_groups_discarded: AtomicU64,
    /// Uplink ITMs discarded by mission-data ingest validation.
    pub itms_discarded: AtomicU64,
    /// Packets dropped by the ground-bound (to-SIM) policy.
    pub dropped_to_sim: AtomicU64,
    /// Packets dropped by the SV-bound (to-SV) policy.
    pub dropped_to_sv: AtomicU64,
    /// Datagrams received on the bus-ingress socket and ignored.
    pub bus_ingress_ignored: AtomicU64,
}

impl RouterStats {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sokf_ticks: self.sokf_ticks.load(Ordering::Relaxed),
            kframes_missed: self.kframes_missed.load(Ordering::Relaxed),
            groups_parsed: self.groups_parsed.load(Ordering::Relaxed),
            invalid_groups_discarded: self.invalid_groups_discarded.load(Ordering::Relaxed),
            itms_discarded: self.itms_discarded.load(Ordering::Relaxed),
            dropped_to_sim: self.dropped_to_sim.load(Ordering::Relaxed),
            dropped_to_sv: self.dropped_to_sv.load(Ordering::Relaxed),
            bus_ingress_ignored: self.bus_ingress_ignored.load(Ordering::Relaxed),
        }
    }
}

/// Plain-value copy of [`RouterStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub sokf_ticks: u64,
    pub kframes_missed: u64,
    pub groups_parsed: u64,
    pub invalid_groups_discarded: u64,
    pub itms_discarded: u64,
    pub dropped_to_sim: u64,
    pub dropped_to_sv: u64,
    pub bus_ingress_ignored: u64,
}
