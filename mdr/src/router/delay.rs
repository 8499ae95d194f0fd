//! Frame-keyed delay scheduling.
//!
//! [`DelayQueue`] holds packets until the frame counter reaches their
//! release frame; [`DelayTable`] supplies the per-route delay in K-Frames.
//! Both are owned and touched exclusively by the reactor worker.

use std::collections::{BTreeMap, HashMap};

/// Ordered multi-queue keyed by release frame.
///
/// Equal release frames drain in insertion order; a monotonically increasing
/// sequence number paired with the key supplies the tiebreak the map itself
/// would not guarantee.
#[derive(Debug)]
pub struct DelayQueue<T> {
    entries: BTreeMap<(u32, u64), T>,
    next_seq: u64,
}

impl<T> Default for DelayQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DelayQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Holds `value` until the frame counter reaches `release_frame`.
    pub fn insert(&mut self, release_frame: u32, value: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert((release_frame, seq), value);
    }

    /// Removes and visits every entry due at or before `frame`, in ascending
    /// release-frame order. Each entry is visited exactly once.
    pub fn drain_due(&mut self, frame: u32, mut visit: impl FnMut(T)) {
        while self
            .entries
            .first_key_value()
            .is_some_and(|(&(release_frame, _), _)| release_frame <= frame)
        {
            if let Some((_, value)) = self.entries.pop_first() {
                visit(value);
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-route ITM delay lookup, in K-Frames.
///
/// A route without an override uses the default delay. The table is mutated
/// only through the config-change path, which runs on the worker.
#[derive(Debug, Clone)]
pub struct DelayTable {
    default_frames: u32,
    routes: HashMap<(u8, u8), u32>,
    initial_default: u32,
    initial_routes: HashMap<(u8, u8), u32>,
}

impl DelayTable {
    /// Builds the table from its configured initial values.
    #[must_use]
    pub fn new(default_frames: u32, routes: &[(u8, u8, u32)]) -> Self {
        let routes: HashMap<(u8, u8), u32> = routes
            .iter()
            .map(|&(src, dst, frames)| ((src, dst), frames))
            .collect();
        Self {
            default_frames,
            routes: routes.clone(),
            initial_default: default_frames,
            initial_routes: routes,
        }
    }

    /// Delay for the `(source_node, dest_node)` route.
    #[must_use]
    pub fn frames(&self, source_node: u8, dest_node: u8) -> u32 {
        self.routes
            .get(&(source_node, dest_node))
            .copied()
            .unwrap_or(self.default_frames)
    }

    /// Replaces the default delay applied to non-overridden routes.
    pub fn set_default(&mut self, frames: u32) {
        self.default_frames = frames;
    }

    /// Adds or replaces one route's delay override.
    pub fn set_route(&mut self, source_node: u8, dest_node: u8, frames: u32) {
        self.routes.insert((source_node, dest_node), frames);
    }

    /// Restores the configured initial default and overrides.
    pub fn change_config_to_default(&mut self) {
        self.default_frames = self.initial_default;
        self.routes = self.initial_routes.clone();
    }
}
