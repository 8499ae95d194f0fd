//! The reactor worker: one thread, one poll, all five endpoints.
//!
//! Every completion handler and every posted command runs here, so the
//! endpoint states, the delay table and the drop policies need no locks.
//! Handlers run to completion between suspensions and never block.

use std::io;
use std::mem;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use mio::{Events, Poll, Registry, Token};

use crate::config::RouterConfig;
use crate::protocol::group::{decode_group, UplinkPacket};
use crate::protocol::itm::{self, ground_source_node, ItmHeader, IteHeader};
use crate::protocol::mpls::{self, MplsHeader};
use crate::protocol::{
    qos, FIXED_ITM_PAYLOAD_SIZE, MAX_UDP_PACKET_SIZE, MAX_VITM_PAYLOAD_SIZE,
    MIN_VITM_PAYLOAD_SIZE,
};
use crate::router::batcher::{GroupBatcher, Plane};
use crate::router::commands::{ConfigUpdate, RouterCommand};
use crate::router::delay::{DelayQueue, DelayTable};
use crate::router::endpoint::EndpointIo;
use crate::router::frame_clock::FrameClock;
use crate::router::policy::DropPolicySet;
use crate::router::{BoundAddresses, SpawnError};
use crate::stats::RouterStats;
use crate::trace::{debug, error, info, trace, warn};

const BUS_SWITCH: Token = Token(0);
const MISSION_DATA: Token = Token(1);
const INGEST_PROXY: Token = Token(2);
const BUS_INGRESS: Token = Token(3);
const FRAME_CLOCK: Token = Token(4);
pub(crate) const WAKER: Token = Token(5);

/// Bus-switch endpoint: group-message I/O toward the Control and Data
/// planes, with the uplink delay queue in front of the batcher.
struct BusSwitch {
    io: EndpointIo,
    frame_count: u32,
    delayed: DelayQueue<UplinkPacket>,
}

/// Mission-data endpoint: bare ITMs to and from the ground simulator, with
/// its own downlink delay queue.
struct MissionData {
    io: EndpointIo,
    frame_count: u32,
    delayed: DelayQueue<Vec<u8>>,
}

pub(crate) struct RouterWorker {
    poll: Poll,
    registry: Registry,
    cfg: RouterConfig,
    stats: Arc<RouterStats>,
    delay_table: DelayTable,
    to_sim_policies: DropPolicySet,
    to_sv_policies: DropPolicySet,
    bus_switch: BusSwitch,
    mission_data: MissionData,
    ingest_proxy: EndpointIo,
    bus_ingress: EndpointIo,
    frame_clock: FrameClock,
    recv_buf: Vec<u8>,
}

impl RouterWorker {
    pub(crate) fn new(
        cfg: RouterConfig,
        poll: Poll,
        stats: Arc<RouterStats>,
    ) -> Result<Self, SpawnError> {
        let registry = poll.registry().try_clone()?;
        let recv = cfg.recv_buffer_size;

        let bind = |name, listen, token| {
            EndpointIo::bind(name, listen, token, recv).map_err(|source| SpawnError::Bind {
                endpoint: name,
                source,
            })
        };

        let bus_switch = bind("bus-switch", cfg.bus_switch_listen, BUS_SWITCH)?;
        let mission_data = bind("mission-data", cfg.mission_data_listen, MISSION_DATA)?;
        let ingest_proxy = bind("ingest-proxy", cfg.ingest_proxy_listen, INGEST_PROXY)?;
        let bus_ingress = bind("bus-ingress", cfg.bus_ingress_listen, BUS_INGRESS)?;
        let frame_clock = FrameClock::bind(cfg.frame_clock_listen, FRAME_CLOCK, recv)
            .map_err(|source| SpawnError::Bind {
                endpoint: "frame-clock",
                source,
            })?;

        let delay_table = DelayTable::new(cfg.delay.default_frames, &cfg.delay.routes);
        let to_sim_policies = DropPolicySet::new(cfg.drop_to_sim);
        let to_sv_policies = DropPolicySet::new(cfg.drop_to_sv);

        Ok(Self {
            poll,
            registry,
            cfg,
            stats,
            delay_table,
            to_sim_policies,
            to_sv_policies,
            bus_switch: BusSwitch {
                io: bus_switch,
                frame_count: 0,
                delayed: DelayQueue::new(),
            },
            mission_data: MissionData {
                io: mission_data,
                frame_count: 0,
                delayed: DelayQueue::new(),
            },
            ingest_proxy,
            bus_ingress,
            frame_clock,
            recv_buf: vec![0u8; MAX_UDP_PACKET_SIZE],
        })
    }

    pub(crate) fn bound_addresses(&self) -> io::Result<BoundAddresses> {
        Ok(BoundAddresses {
            bus_switch: self.bus_switch.io.local_addr()?,
            mission_data: self.mission_data.io.local_addr()?,
            ingest_proxy: self.ingest_proxy.local_addr()?,
            bus_ingress: self.bus_ingress.local_addr()?,
            frame_clock: self.frame_clock.local_addr()?,
        })
    }

    /// The worker loop. Returns when a shutdown command arrives or the poll
    /// itself dies.
    pub(crate) fn run(mut self, commands: &Receiver<RouterCommand>) {
        let mut events = Events::with_capacity(128);
        info!("router worker running");

        loop {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                error!(error = %e, "poll failed, stopping router worker");
                return;
            }

            for event in events.iter() {
                match event.token() {
                    WAKER => {
                        if self.drain_commands(commands) {
                            info!("router worker stopped");
                            return;
                        }
                    }
                    BUS_SWITCH => {
                        if event.is_writable() {
                            self.bus_switch.io.on_writable(&self.registry);
                        }
                        if event.is_readable() {
                            self.on_bus_switch_readable();
                        }
                    }
                    MISSION_DATA => {
                        if event.is_writable() {
                            self.mission_data.io.on_writable(&self.registry);
                        }
                        if event.is_readable() {
                            self.on_mission_data_readable();
                        }
                    }
                    INGEST_PROXY => {
                        if event.is_writable() {
                            self.ingest_proxy.on_writable(&self.registry);
                        }
                        if event.is_readable() {
                            self.on_ingest_proxy_readable();
                        }
                    }
                    BUS_INGRESS => {
                        if event.is_writable() {
                            self.bus_ingress.on_writable(&self.registry);
                        }
                        if event.is_readable() {
                            self.on_bus_ingress_readable();
                        }
                    }
                    FRAME_CLOCK => {
                        if event.is_readable() {
                            self.on_frame_clock_readable();
                        }
                    }
                    other => debug!(token = other.0, "event for unknown token"),
                }
            }
        }
    }

    /// Applies queued commands; true means shut down.
    fn drain_commands(&mut self, commands: &Receiver<RouterCommand>) -> bool {
        while let Ok(command) = commands.try_recv() {
            match command {
                RouterCommand::Start => self.start(),
                RouterCommand::ChangeConfig(update) => self.change_config(&update),
                RouterCommand::ChangeConfigToDefault => self.change_config_to_default(),
                RouterCommand::Shutdown => return true,
            }
        }
        false
    }

    /// Registers every endpoint with the poll and begins reading.
    fn start(&mut self) {
        info!("starting endpoints");
        let registry = &self.registry;
        if let Err(e) = self.bus_switch.io.register(registry) {
            error!(error = %e, "failed to start bus-switch endpoint");
        }
        if let Err(e) = self.mission_data.io.register(registry) {
            error!(error = %e, "failed to start mission-data endpoint");
        }
        if let Err(e) = self.ingest_proxy.register(registry) {
            error!(error = %e, "failed to start ingest-proxy endpoint");
        }
        if let Err(e) = self.bus_ingress.register(registry) {
            error!(error = %e, "failed to start bus-ingress endpoint");
        }
        if let Err(e) = self.frame_clock.register(registry) {
            error!(error = %e, "failed to start frame-clock endpoint");
        }
        debug!(
            bus_switch = self.bus_switch.io.is_open(),
            mission_data = self.mission_data.io.is_open(),
            ingest_proxy = self.ingest_proxy.is_open(),
            bus_ingress = self.bus_ingress.is_open(),
            timing = self.frame_clock.is_running(),
            "endpoint liveness after start"
        );
    }

    fn change_config(&mut self, update: &ConfigUpdate) {
        if let Some(frames) = update.default_delay_frames {
            info!(frames, "applying dynamic config: default ITM delay");
            self.delay_table.set_default(frames);
        }
        if let Some(route) = update.route_delay {
            info!(
                source_node = route.source_node,
                dest_node = route.dest_node,
                frames = route.frames,
                "applying dynamic config: route delay"
            );
            self.delay_table
                .set_route(route.source_node, route.dest_node, route.frames);
        }
        if let Some(update) = update.drop_to_sim {
            info!(payload_type = update.payload_type, "applying dynamic config: to-SIM drop policy");
            self.to_sim_policies
                .change_config(update.payload_type, update.policy);
        }
        if let Some(update) = update.drop_to_sv {
            info!(payload_type = update.payload_type, "applying dynamic config: to-SV drop policy");
            self.to_sv_policies
                .change_config(update.payload_type, update.policy);
        }
    }

    fn change_config_to_default(&mut self) {
        info!("restoring all dynamic config items to configured defaults");
        self.delay_table.change_config_to_default();
        self.to_sim_policies.change_config_to_default();
        self.to_sv_policies.change_config_to_default();
    }

    // ----- bus-switch (VMW) -----

    fn on_bus_switch_readable(&mut self) {
        let mut buf = mem::take(&mut self.recv_buf);
        while let Some(len) = self.bus_switch.io.try_recv(&self.registry, &mut buf) {
            if len == 0 {
                warn!("ignoring empty datagram on bus-switch endpoint");
                continue;
            }
            self.handle_bus_switch_datagram(&buf[..len]);
        }
        self.recv_buf = buf;
    }

    /// Decodes a downlink group and routes each packet. A packet destined
    /// for the HPL node marks the whole original message for passthrough.
    fn handle_bus_switch_datagram(&mut self, datagram: &[u8]) {
        let view = match decode_group(datagram) {
            Ok(view) => view,
            Err(e) => {
                error!(error = %e, "discarding downlink group message");
                RouterStats::bump(&self.stats.invalid_groups_discarded);
                return;
            }
        };
        if view.trailing_bytes > 0 {
            warn!(
                bytes = view.trailing_bytes,
                "ignoring extraneous bytes after group records"
            );
        }

        let mut passthrough = false;
        for packet in &view.packets {
            let Some(header) = ItmHeader::parse(&packet[mpls::HEADER_SIZE..]) else {
                continue;
            };
            if header.dest_node == self.cfg.hpl_node_id {
                passthrough = true;
            } else {
                self.route_downlink_mpls(packet, &header);
            }
        }

        if passthrough {
            self.route_downlink_passthrough(datagram);
        }
        RouterStats::bump(&self.stats.groups_parsed);
    }

    /// Downlink MPLS packet: either the bare ITM bypasses to the
    /// mission-data endpoint, or the intact packet goes to the bus-ingress
    /// endpoint after the to-SIM drop policy.
    fn route_downlink_mpls(&mut self, packet: &[u8], header: &ItmHeader) {
        if self.cfg.mission_data_bypass[usize::from(header.dest_node)] && header.is_mission_data()
        {
            self.send_downlink_itm(&packet[mpls::HEADER_SIZE..]);
            return;
        }
        if self.to_sim_policies.apply(header.payload_type) {
            RouterStats::bump(&self.stats.dropped_to_sim);
            return;
        }
        self.bus_ingress
            .enqueue_send(&self.registry, packet.to_vec(), self.cfg.bus_ingress_dest);
    }

    /// Whole-message passthrough toward the KBA. A disabled KBA destination
    /// silently drops it.
    fn route_downlink_passthrough(&mut self, message: &[u8]) {
        self.ingest_proxy
            .enqueue_send(&self.registry, message.to_vec(), self.cfg.ingest_proxy_dest);
    }

    /// Downlink ITM toward the ground simulator, delayed by the route's
    /// K-Frame count. Zero delay skips the queue entirely.
    fn send_downlink_itm(&mut self, itm_bytes: &[u8]) {
        let dest_node = itm_bytes[1];
        let delay = self.delay_table.frames(self.cfg.local_node_id, dest_node);
        if delay == 0 {
            self.mission_data.io.enqueue_send(
                &self.registry,
                itm_bytes.to_vec(),
                self.cfg.mission_data_dest,
            );
        } else {
            let release = self.mission_data.frame_count.wrapping_add(delay);
            self.mission_data.delayed.insert(release, itm_bytes.to_vec());
        }
    }

    // ----- mission-data (GW-Sim) -----

    fn on_mission_data_readable(&mut self) {
        let mut buf = mem::take(&mut self.recv_buf);
        while let Some(len) = self.mission_data.io.try_recv(&self.registry, &mut buf) {
            self.handle_mission_data_datagram(&buf[..len]);
        }
        self.recv_buf = buf;
    }

    /// Validates an uplink ITM from the ground simulator and routes it.
    fn handle_mission_data_datagram(&mut self, itm_bytes: &[u8]) {
        if itm_bytes.len() < itm::HEADER_SIZE {
            error!(
                received = itm_bytes.len(),
                "uplink ITM shorter than its header, dropping"
            );
            RouterStats::bump(&self.stats.itms_discarded);
            return;
        }
        let Some(header) = ItmHeader::parse(itm_bytes) else {
            return;
        };

        let payload_size = itm_bytes.len() - itm::HEADER_SIZE;
        if header.is_vitm() {
            if !(MIN_VITM_PAYLOAD_SIZE..=MAX_VITM_PAYLOAD_SIZE).contains(&payload_size) {
                error!(payload_size, "VITM payload size out of bounds, dropping");
                RouterStats::bump(&self.stats.itms_discarded);
                return;
            }
        } else if payload_size != FIXED_ITM_PAYLOAD_SIZE {
            error!(
                payload_size,
                expected = FIXED_ITM_PAYLOAD_SIZE,
                "fixed ITM payload size incorrect, dropping"
            );
            RouterStats::bump(&self.stats.itms_discarded);
            return;
        }

        if !header.is_mission_data() {
            warn!(
                payload_type = header.payload_type,
                "non-mission payload type on mission-data endpoint, dropping"
            );
            RouterStats::bump(&self.stats.itms_discarded);
            return;
        }

        // Ground-origin ITMs carry the source node in the last header byte.
        let source_node = ground_source_node(itm_bytes);
        self.route_uplink_itm(itm_bytes, source_node, header.dest_node);
    }

    // ----- ingest-proxy (KBA) -----

    fn on_ingest_proxy_readable(&mut self) {
        let mut buf = mem::take(&mut self.recv_buf);
        while let Some(len) = self.ingest_proxy.try_recv(&self.registry, &mut buf) {
            if len == 0 {
                warn!("ignoring empty datagram on ingest-proxy endpoint");
                continue;
            }
            debug!(bytes = len, "uplink passthrough from KBA");
            self.route_uplink_passthrough(&buf[..len]);
        }
        self.recv_buf = buf;
    }

    /// Uplink passthrough toward the Control plane, bypassing the delay
    /// scheduler. A disabled Control-plane destination silently drops it.
    fn route_uplink_passthrough(&mut self, message: &[u8]) {
        self.bus_switch
            .io
            .enqueue_send(&self.registry, message.to_vec(), self.cfg.control_plane_dest);
    }

    // ----- bus-ingress (TPN) -----

    fn on_bus_ingress_readable(&mut self) {
        let mut buf = mem::take(&mut self.recv_buf);
        while let Some(len) = self.bus_ingress.try_recv(&self.registry, &mut buf) {
            // Bus-ingress ingest is handled by a separate component; this
            // router only transmits on that socket.
            trace!(bytes = len, "ignoring datagram on bus-ingress endpoint");
            RouterStats::bump(&self.stats.bus_ingress_ignored);
        }
        self.recv_buf = buf;
    }

    // ----- uplink framing and scheduling -----

    /// Frames a bare uplink ITM with a synthetic MPLS label and schedules it.
    ///
    /// QoS comes from the payload type for fixed ITMs; a VITM uses OAM
    /// unless its ITE header marks a data message, which takes the
    /// configured QoS instead. Fixed mission-data ITMs lose their last
    /// payload byte, replicating the bus hardware being emulated.
    fn route_uplink_itm(&mut self, itm_bytes: &[u8], source_node: u8, dest_node: u8) {
        let Some(header) = ItmHeader::parse(itm_bytes) else {
            return;
        };
        let payload_type = header.payload_type;

        let mut qos_value = payload_type;
        let mut framed = itm_bytes;
        if header.is_vitm() {
            qos_value = qos::OAM;
            if let Some(ite) = IteHeader::parse(&itm_bytes[itm::HEADER_SIZE..]) {
                if ite.data_message {
                    qos_value = self.cfg.ite_data_qos;
                }
            }
        } else if header.is_mission_data() {
            framed = &itm_bytes[..itm_bytes.len() - 1];
        }

        let label = MplsHeader::synthetic(qos_value).to_be_bytes();
        let mut bytes = Vec::with_capacity(label.len() + framed.len());
        bytes.extend_from_slice(&label);
        bytes.extend_from_slice(framed);

        self.schedule_uplink(
            UplinkPacket {
                payload_type,
                bytes,
            },
            source_node,
            dest_node,
        );
    }

    /// Schedules an already-framed uplink MPLS packet.
    fn route_uplink_mpls(&mut self, packet: &[u8], source_node: u8, dest_node: u8) {
        let Some(header) = ItmHeader::parse(packet.get(mpls::HEADER_SIZE..).unwrap_or(&[]))
        else {
            warn!(bytes = packet.len(), "uplink MPLS packet too short, dropping");
            return;
        };
        self.schedule_uplink(
            UplinkPacket {
                payload_type: header.payload_type,
                bytes: packet.to_vec(),
            },
            source_node,
            dest_node,
        );
    }

    /// Every uplink packet goes through the delay queue, even at zero delay,
    /// to keep ordering against the batcher.
    fn schedule_uplink(&mut self, packet: UplinkPacket, source_node: u8, dest_node: u8) {
        let delay = self.delay_table.frames(source_node, dest_node);
        let release = self.bus_switch.frame_count.wrapping_add(delay);
        self.bus_switch.delayed.insert(release, packet);
    }

    // ----- K-Frame ticks -----

    fn on_frame_clock_readable(&mut self) {
        let ticks = self.frame_clock.poll_ticks(&self.registry, &self.stats);
        for _ in 0..ticks {
            self.on_kframe_tick();
        }
        if !self.frame_clock.is_running() {
            warn!("timing endpoint closed; delayed uplink traffic is frozen");
        }
    }

    /// One tick for every subscriber, mission-data first.
    fn on_kframe_tick(&mut self) {
        self.tick_mission_data();
        self.tick_bus_switch();
    }

    fn tick_mission_data(&mut self) {
        let MissionData {
            io,
            frame_count,
            delayed,
        } = &mut self.mission_data;
        *frame_count = frame_count.wrapping_add(1);

        let registry = &self.registry;
        let dest = self.cfg.mission_data_dest;
        delayed.drain_due(*frame_count, |itm_bytes| {
            io.enqueue_send(registry, itm_bytes, dest);
        });
    }

    fn tick_bus_switch(&mut self) {
        let BusSwitch {
            io,
            frame_count,
            delayed,
        } = &mut self.bus_switch;
        *frame_count = frame_count.wrapping_add(1);

        let mut batcher = GroupBatcher::new(&mut self.to_sv_policies, &self.stats);
        delayed.drain_due(*frame_count, |packet| batcher.add(packet));

        let registry = &self.registry;
        let control = self.cfg.control_plane_dest;
        let data = self.cfg.data_plane_dest;
        for (plane, bytes) in batcher.finalize() {
            let dest = match plane {
                Plane::Control => control,
                Plane::Data => data,
            };
            io.enqueue_send(registry, bytes, dest);
        }
    }
}
