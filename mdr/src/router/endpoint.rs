//! Per-endpoint socket state shared by all five endpoints.
//!
//! Every endpoint owns one UDP socket and one FIFO send queue. Servicing of
//! the queue starts exactly once per empty→non-empty transition and runs
//! until the queue drains or the socket would block, in which case write
//! readiness re-arms it. Any socket error other than `WouldBlock` is fatal
//! to the endpoint: it is logged and the socket is cancelled and closed, and
//! the endpoint goes quiet.

use std::collections::VecDeque;
use std::io;

use mio::{Interest, Registry, Token};

use crate::net::{Endpoint, UdpSocket};
use crate::trace::{debug, error, trace};

struct Outbound {
    bytes: Vec<u8>,
    dest: Endpoint,
}

/// Socket, send queue and liveness for one endpoint.
pub(crate) struct EndpointIo {
    name: &'static str,
    socket: UdpSocket,
    token: Token,
    send_queue: VecDeque<Outbound>,
    wants_writable: bool,
    registered: bool,
    open: bool,
}

impl EndpointIo {
    /// Binds the endpoint's socket. Registration with the poll happens later
    /// via [`register`](Self::register), on the start command.
    pub(crate) fn bind(
        name: &'static str,
        listen: Endpoint,
        token: Token,
        recv_buffer_size: Option<usize>,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind(listen)?;
        if let Some(bytes) = recv_buffer_size {
            // Best effort; the kernel may clamp it.
            if let Err(e) = socket.set_recv_buffer_size(bytes) {
                debug!(endpoint = name, error = %e, "could not grow receive buffer");
            }
        }
        Ok(Self {
            name,
            socket,
            token,
            send_queue: VecDeque::new(),
            wants_writable: false,
            registered: false,
            open: true,
        })
    }

    /// Starts reading: registers the socket with the poll.
    pub(crate) fn register(&mut self, registry: &Registry) -> io::Result<()> {
        if self.registered || !self.open {
            return Ok(());
        }
        registry.register(&mut self.socket, self.token, Interest::READABLE)?;
        self.registered = true;
        Ok(())
    }

    /// The address this endpoint actually listens on.
    pub(crate) fn local_addr(&self) -> io::Result<Endpoint> {
        self.socket.local_addr()
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open
    }

    /// Receives one datagram into `buf`, or `None` when the socket has no
    /// more data, is closed, or just died (fatal errors close it here).
    pub(crate) fn try_recv(&mut self, registry: &Registry, buf: &mut [u8]) -> Option<usize> {
        if !self.open {
            return None;
        }
        match self.socket.try_recv_from(buf) {
            Ok(Some((len, _from))) => Some(len),
            Ok(None) => None,
            Err(e) => {
                error!(endpoint = self.name, error = %e, "receive failed, closing socket");
                self.cancel_and_close(registry);
                None
            }
        }
    }

    /// Appends a datagram to the send queue, kicking off servicing when the
    /// queue was empty. A disabled (invalid-sentinel) destination is a
    /// silent drop.
    pub(crate) fn enqueue_send(&mut self, registry: &Registry, bytes: Vec<u8>, dest: Endpoint) {
        if !self.open {
            return;
        }
        if dest.is_invalid() {
            trace!(endpoint = self.name, "destination disabled, dropping datagram");
            return;
        }

        let initiate = self.send_queue.is_empty();
        self.send_queue.push_back(Outbound { bytes, dest });
        if initiate {
            self.service_send_queue(registry);
        }
    }

    /// Write-readiness event: continue servicing the queue.
    pub(crate) fn on_writable(&mut self, registry: &Registry) {
        if self.open {
            self.service_send_queue(registry);
        }
    }

    fn service_send_queue(&mut self, registry: &Registry) {
        while let Some(front) = self.send_queue.front() {
            match self.socket.try_send_to(&front.bytes, front.dest) {
                Ok(Some(_)) => {
                    self.send_queue.pop_front();
                }
                Ok(None) => {
                    // Socket full: wait for write readiness.
                    self.set_write_interest(registry, true);
                    return;
                }
                Err(e) => {
                    error!(endpoint = self.name, error = %e, "send failed, closing socket");
                    self.cancel_and_close(registry);
                    return;
                }
            }
        }
        self.set_write_interest(registry, false);
    }

    fn set_write_interest(&mut self, registry: &Registry, wanted: bool) {
        if self.wants_writable == wanted || !self.registered {
            return;
        }
        let interest = if wanted {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };
        match registry.reregister(&mut self.socket, self.token, interest) {
            Ok(()) => self.wants_writable = wanted,
            Err(e) => {
                error!(endpoint = self.name, error = %e, "reregister failed, closing socket");
                self.cancel_and_close(registry);
            }
        }
    }

    /// Cancels outstanding interest and closes the socket. Calling this on
    /// an already-closed endpoint is a no-op.
    pub(crate) fn cancel_and_close(&mut self, registry: &Registry) {
        if !self.open {
            return;
        }
        if self.registered {
            // Suppress deregistration problems; the socket drops regardless.
            let _ = registry.deregister(&mut self.socket);
            self.registered = false;
        }
        self.open = false;
        self.wants_writable = false;
        self.send_queue.clear();
        debug!(endpoint = self.name, "socket closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::Poll;

    fn io_pair() -> (Poll, EndpointIo) {
        let poll = Poll::new().unwrap();
        let io = EndpointIo::bind("test", Endpoint::localhost(0), Token(0), None).unwrap();
        (poll, io)
    }

    #[test]
    fn cancel_and_close_is_idempotent() {
        let (poll, mut io) = io_pair();
        io.register(poll.registry()).unwrap();
        assert!(io.is_open());

        io.cancel_and_close(poll.registry());
        assert!(!io.is_open());
        // Second close must be a quiet no-op.
        io.cancel_and_close(poll.registry());
        assert!(!io.is_open());
    }

    #[test]
    fn invalid_destination_is_a_silent_drop() {
        let (poll, mut io) = io_pair();
        io.register(poll.registry()).unwrap();

        io.enqueue_send(poll.registry(), vec![1, 2, 3], Endpoint::INVALID);
        io.enqueue_send(
            poll.registry(),
            vec![4, 5],
            Endpoint::new_v4(127, 0, 0, 1, 0),
        );
        assert!(io.send_queue.is_empty());
        assert!(io.is_open());
    }

    #[test]
    fn send_queue_drains_to_a_peer() {
        let (poll, mut io) = io_pair();
        io.register(poll.registry()).unwrap();

        let peer = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        peer.set_read_timeout(Some(std::time::Duration::from_secs(1)))
            .unwrap();
        let dest = Endpoint::from(peer.local_addr().unwrap());

        io.enqueue_send(poll.registry(), b"one".to_vec(), dest);
        io.enqueue_send(poll.registry(), b"two".to_vec(), dest);

        let mut buf = [0u8; 16];
        let (n, _) = peer.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"one");
        let (n, _) = peer.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"two");
    }

    #[test]
    fn closed_endpoint_refuses_work() {
        let (poll, mut io) = io_pair();
        io.register(poll.registry()).unwrap();
        io.cancel_and_close(poll.registry());

        io.enqueue_send(
            poll.registry(),
            vec![9],
            Endpoint::new_v4(127, 0, 0, 1, 1000),
        );
        assert!(io.send_queue.is_empty());

        let mut buf = [0u8; 4];
        assert!(io.try_recv(poll.registry(), &mut buf).is_none());
    }
}
