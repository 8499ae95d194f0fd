//! Commands posted from the public handle into the reactor worker.
//!
//! The worker is the only place endpoint state, the delay table and the
//! drop policies are touched; external threads describe what they want with
//! these types and wake the poll.

use crate::router::policy::PolicyConfig;

/// Work item for the reactor worker.
#[derive(Debug)]
pub(crate) enum RouterCommand {
    /// Register every endpoint and begin reading.
    Start,
    /// Apply a dynamic configuration change.
    ChangeConfig(ConfigUpdate),
    /// Restore all dynamic configuration items to their configured defaults.
    ChangeConfigToDefault,
    /// Exit the poll loop; sockets close as the worker unwinds.
    Shutdown,
}

/// A dynamic configuration change. Each field is applied independently when
/// present.
#[derive(Debug, Clone, Default)]
pub struct ConfigUpdate {
    /// New default ITM delay, in K-Frames, for routes without an override.
    pub default_delay_frames: Option<u32>,
    /// One route's delay override.
    pub route_delay: Option<RouteDelayUpdate>,
    /// Ground-bound (to-SIM) drop-policy change for one payload type.
    pub drop_to_sim: Option<PolicyUpdate>,
    /// SV-bound (to-SV) drop-policy change for one payload type.
    pub drop_to_sv: Option<PolicyUpdate>,
}

/// Delay override for a single `(source_node, dest_node)` route.
#[derive(Debug, Clone, Copy)]
pub struct RouteDelayUpdate {
    pub source_node: u8,
    pub dest_node: u8,
    pub frames: u32,
}

/// Drop-policy replacement for a single payload type.
#[derive(Debug, Clone, Copy)]
pub struct PolicyUpdate {
    pub payload_type: u8,
    pub policy: PolicyConfig,
}
