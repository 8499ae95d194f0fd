//! K-Frame timing endpoint.
//!
//! Receives SOKF datagrams, validates them, tracks the offset ring to count
//! missed frames, and reports how many ticks to fan out. Unlike the data
//! endpoints, a datagram that decodes but fails content validation kills
//! this socket: a bad timing source is not something to route around.

use std::io;

use mio::{Interest, Registry, Token};

use crate::net::{Endpoint, UdpSocket};
use crate::protocol::timing::{decode_sokf, elapsed_kframes, SOKF_SIZE};
use crate::stats::RouterStats;
use crate::trace::{debug, error, info, warn};

/// Life cycle of the timing endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClockState {
    /// Socket closed; nothing will tick again.
    Closed,
    /// Listening, waiting for the first valid SOKF to synchronize on.
    Synchronizing,
    /// Synchronized; `prev_offset` anchors missed-frame accounting.
    Running { prev_offset: u32 },
}

/// The SOKF socket plus synchronization state.
pub(crate) struct FrameClock {
    socket: UdpSocket,
    token: Token,
    state: ClockState,
    registered: bool,
}

impl FrameClock {
    pub(crate) fn bind(
        listen: Endpoint,
        token: Token,
        recv_buffer_size: Option<usize>,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind(listen)?;
        if let Some(bytes) = recv_buffer_size {
            if let Err(e) = socket.set_recv_buffer_size(bytes) {
                debug!(error = %e, "could not grow timing receive buffer");
            }
        }
        Ok(Self {
            socket,
            token,
            state: ClockState::Closed,
            registered: false,
        })
    }

    /// Starts listening for SOKF datagrams.
    pub(crate) fn register(&mut self, registry: &Registry) -> io::Result<()> {
        if self.registered || self.state != ClockState::Closed {
            return Ok(());
        }
        registry.register(&mut self.socket, self.token, Interest::READABLE)?;
        self.registered = true;
        self.state = ClockState::Synchronizing;
        Ok(())
    }

    pub(crate) fn local_addr(&self) -> io::Result<Endpoint> {
        self.socket.local_addr()
    }

    /// Drains the socket and returns how many ticks to deliver, one per
    /// valid datagram. Missed frames are accumulated into `stats`.
    pub(crate) fn poll_ticks(&mut self, registry: &Registry, stats: &RouterStats) -> u32 {
        let mut ticks = 0;
        let mut buf = [0u8; crate::protocol::MAX_UDP_PACKET_SIZE];

        while !matches!(self.state, ClockState::Closed) {
            let len = match self.socket.try_recv_from(&mut buf) {
                Ok(Some((len, _from))) => len,
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "timing receive failed, closing socket");
                    self.cancel_and_close(registry);
                    break;
                }
            };

            // A wrong-sized datagram is noise, not a broken timing source.
            if len != SOKF_SIZE {
                warn!(
                    received = len,
                    expected = SOKF_SIZE,
                    "ignoring datagram that is not SOKF-sized"
                );
                continue;
            }

            let Ok(datagram) = <&[u8; SOKF_SIZE]>::try_from(&buf[..SOKF_SIZE]) else {
                continue;
            };
            let offset = match decode_sokf(datagram) {
                Ok(offset) => offset,
                Err(e) => {
                    error!(error = %e, "invalid SOKF, closing timing socket");
                    self.cancel_and_close(registry);
                    break;
                }
            };

            match self.state {
                ClockState::Synchronizing => {
                    info!(kframe_offset = offset, "timing synchronized");
                }
                ClockState::Running { prev_offset } => {
                    let missed = elapsed_kframes(prev_offset, offset) - 1;
                    if missed > 0 {
                        warn!(missed, "missed start-of-K-Frame signals");
                        RouterStats::add(&stats.kframes_missed, u64::from(missed));
                    }
                }
                ClockState::Closed => unreachable!("loop exits while closed"),
            }
            self.state = ClockState::Running {
                prev_offset: offset,
            };

            RouterStats::bump(&stats.sokf_ticks);
            ticks += 1;
        }

        ticks
    }

    /// Idempotent cancel-and-close; the clock never ticks again afterwards.
    pub(crate) fn cancel_and_close(&mut self, registry: &Registry) {
        if matches!(self.state, ClockState::Closed) && !self.registered {
            return;
        }
        if self.registered {
            let _ = registry.deregister(&mut self.socket);
            self.registered = false;
        }
        self.state = ClockState::Closed;
        debug!("timing socket closed");
    }

    pub(crate) fn is_running(&self) -> bool {
        !matches!(self.state, ClockState::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::timing::encode_sokf;
    use mio::Poll;
    use std::time::Duration;

    fn clock_with_feeder() -> (Poll, FrameClock, std::net::UdpSocket, Endpoint) {
        let poll = Poll::new().unwrap();
        let mut clock = FrameClock::bind(Endpoint::localhost(0), Token(4), None).unwrap();
        clock.register(poll.registry()).unwrap();
        let feeder = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let dest = clock.local_addr().unwrap();
        (poll, clock, feeder, dest)
    }

    fn feed_and_poll(
        clock: &mut FrameClock,
        poll: &Poll,
        feeder: &std::net::UdpSocket,
        dest: Endpoint,
        datagram: &[u8],
        stats: &RouterStats,
    ) -> u32 {
        feeder.send_to(datagram, dest.as_socket_addr()).unwrap();
        // Loopback delivery is asynchronous; poll until the datagram lands.
        let deadline = std::time::Instant::now() + Duration::from_secs(1);
        loop {
            let ticks = clock.poll_ticks(poll.registry(), stats);
            if ticks > 0 || !clock.is_running() || std::time::Instant::now() > deadline {
                return ticks;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn one_tick_per_valid_datagram_and_missed_accounting() {
        let (poll, mut clock, feeder, dest) = clock_with_feeder();
        let stats = RouterStats::default();

        for offset in [3u32, 4, 6] {
            let ticks = feed_and_poll(&mut clock, &poll, &feeder, dest, &encode_sokf(offset), &stats);
            assert_eq!(ticks, 1);
        }

        let snap = stats.snapshot();
        assert_eq!(snap.sokf_ticks, 3);
        assert_eq!(snap.kframes_missed, 1);
        assert!(clock.is_running());
    }

    #[test]
    fn wrong_size_datagram_is_ignored_and_socket_stays_open() {
        let (poll, mut clock, feeder, dest) = clock_with_feeder();
        let stats = RouterStats::default();

        feeder.send_to(&[0u8; 11], dest.as_socket_addr()).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(clock.poll_ticks(poll.registry(), &stats), 0);
        assert!(clock.is_running());

        // A valid SOKF afterwards still ticks.
        let ticks = feed_and_poll(&mut clock, &poll, &feeder, dest, &encode_sokf(0), &stats);
        assert_eq!(ticks, 1);
    }

    #[test]
    fn invalid_content_closes_the_socket() {
        let (poll, mut clock, feeder, dest) = clock_with_feeder();
        let stats = RouterStats::default();

        let mut bad = encode_sokf(3);
        bad[0] ^= 0xff; // wrong message id
        feed_and_poll(&mut clock, &poll, &feeder, dest, &bad, &stats);
        assert!(!clock.is_running());

        // Closing again is a no-op.
        clock.cancel_and_close(poll.registry());
        assert!(!clock.is_running());
    }
}
