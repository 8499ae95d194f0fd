//! Configuration items consumed by the router.
//!
//! Loading (files, CLI) happens outside this crate; the router takes the
//! resolved values as a plain struct. Destination endpoints may be
//! [`Endpoint::INVALID`] to disable that route: traffic toward a disabled
//! destination is silently dropped.

use crate::net::Endpoint;
use crate::router::policy::PolicyConfig;

/// Everything the router needs to come up.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Listen address for the bus-switch (VMW) endpoint.
    pub bus_switch_listen: Endpoint,
    /// Listen address for the mission-data (GW-Sim) endpoint.
    pub mission_data_listen: Endpoint,
    /// Listen address for the ingest-proxy (KBA) endpoint.
    pub ingest_proxy_listen: Endpoint,
    /// Listen address for the bus-ingress (TPN) endpoint.
    pub bus_ingress_listen: Endpoint,
    /// Listen address for the K-Frame timing (SOKF) endpoint.
    pub frame_clock_listen: Endpoint,

    /// Control-plane destination for uplink group messages and passthrough.
    pub control_plane_dest: Endpoint,
    /// Data-plane destination for uplink group messages.
    pub data_plane_dest: Endpoint,
    /// Destination for downlink mission-data ITMs.
    pub mission_data_dest: Endpoint,
    /// Destination for downlink passthrough messages (the KBA).
    pub ingest_proxy_dest: Endpoint,
    /// Destination for downlink MPLS packets (the TPN).
    pub bus_ingress_dest: Endpoint,

    /// Node id whose packets pass through to the KBA wholesale.
    pub hpl_node_id: u8,
    /// Node id this router speaks for on the downlink mission-data path.
    pub local_node_id: u8,
    /// Per-destination-node flag: route downlink mission data straight to
    /// the mission-data endpoint instead of the bus-ingress endpoint.
    pub mission_data_bypass: [bool; 256],
    /// MPLS QoS applied when framing a VITM that carries an ITE data message.
    pub ite_data_qos: u8,

    /// Initial ITM delay table.
    pub delay: DelayConfig,
    /// Initial ground-bound (to-SIM) drop policies, one per payload type.
    pub drop_to_sim: [PolicyConfig; 8],
    /// Initial SV-bound (to-SV) drop policies, one per payload type.
    pub drop_to_sv: [PolicyConfig; 8],

    /// Kernel receive-buffer size requested for every endpoint socket.
    pub recv_buffer_size: Option<usize>,
}

/// Initial ITM delay values, in K-Frames.
#[derive(Debug, Clone, Default)]
pub struct DelayConfig {
    /// Delay applied to any route without an override.
    pub default_frames: u32,
    /// Per-route overrides: `(source_node, dest_node, frames)`.
    pub routes: Vec<(u8, u8, u32)>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            bus_switch_listen: Endpoint::any(0),
            mission_data_listen: Endpoint::any(0),
            ingest_proxy_listen: Endpoint::any(0),
            bus_ingress_listen: Endpoint::any(0),
            frame_clock_listen: Endpoint::any(0),
            control_plane_dest: Endpoint::INVALID,
            data_plane_dest: Endpoint::INVALID,
            mission_data_dest: Endpoint::INVALID,
            ingest_proxy_dest: Endpoint::INVALID,
            bus_ingress_dest: Endpoint::INVALID,
            hpl_node_id: 0,
            local_node_id: 0,
            mission_data_bypass: [false; 256],
            ite_data_qos: 0,
            delay: DelayConfig::default(),
            drop_to_sim: [PolicyConfig::default(); 8],
            drop_to_sv: [PolicyConfig::default(); 8],
            recv_buffer_size: Some(1 << 20),
        }
    }
}
