//! Non-blocking UDP socket for the reactor.

use std::io::{self, ErrorKind};
use std::os::fd::AsFd;

use mio::event::Source;
use mio::net::UdpSocket as MioUdpSocket;
use mio::{Interest, Registry, Token};

use super::Endpoint;

/// A non-blocking UDP socket registered with the reactor's poll.
///
/// The `try_*` methods fold `WouldBlock` into `Ok(None)` so the poll-driven
/// drain loops can distinguish "no more data" from a real socket error.
pub struct UdpSocket {
    inner: MioUdpSocket,
}

impl UdpSocket {
    /// Binds a new socket to `listen`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub fn bind(listen: Endpoint) -> io::Result<Self> {
        let inner = MioUdpSocket::bind(listen.into())?;
        Ok(Self { inner })
    }

    /// Returns the address the socket is actually bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the local address cannot be retrieved.
    pub fn local_addr(&self) -> io::Result<Endpoint> {
        self.inner.local_addr().map(Endpoint::from)
    }

    /// Attempts to send one datagram; `Ok(None)` when the socket is not
    /// ready for writing.
    ///
    /// # Errors
    ///
    /// Returns any socket error other than `WouldBlock`.
    pub fn try_send_to(&self, buf: &[u8], dest: Endpoint) -> io::Result<Option<usize>> {
        match self.inner.send_to(buf, dest.into()) {
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Attempts to receive one datagram; `Ok(None)` when no data is queued.
    ///
    /// # Errors
    ///
    /// Returns any socket error other than `WouldBlock`.
    pub fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, Endpoint)>> {
        match self.inner.recv_from(buf) {
            Ok((n, from)) => Ok(Some((n, Endpoint::from(from)))),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Asks the kernel for a larger receive buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket option cannot be set.
    pub fn set_recv_buffer_size(&self, bytes: usize) -> io::Result<()> {
        rustix::net::sockopt::set_socket_recv_buffer_size(self.inner.as_fd(), bytes)?;
        Ok(())
    }

    /// Reads back the kernel receive-buffer size.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket option cannot be read.
    pub fn recv_buffer_size(&self) -> io::Result<usize> {
        Ok(rustix::net::sockopt::socket_recv_buffer_size(
            self.inner.as_fd(),
        )?)
    }
}

impl Source for UdpSocket {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        self.inner.register(registry, token, interests)
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        self.inner.reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        self.inner.deregister(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_send_recv() {
        let a = UdpSocket::bind(Endpoint::localhost(0)).unwrap();
        let b = UdpSocket::bind(Endpoint::localhost(0)).unwrap();

        let sent = a
            .try_send_to(b"kframe", b.local_addr().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(sent, 6);

        // Loopback delivery is fast but not instantaneous.
        let mut buf = [0u8; 32];
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(1);
        loop {
            if let Some((n, from)) = b.try_recv_from(&mut buf).unwrap() {
                assert_eq!(&buf[..n], b"kframe");
                assert_eq!(from, a.local_addr().unwrap());
                break;
            }
            assert!(std::time::Instant::now() < deadline, "datagram never arrived");
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }

    #[test]
    fn recv_on_empty_socket_is_none() {
        let s = UdpSocket::bind(Endpoint::localhost(0)).unwrap();
        let mut buf = [0u8; 16];
        assert!(s.try_recv_from(&mut buf).unwrap().is_none());
    }

    #[test]
    fn recv_buffer_size_can_grow() {
        let s = UdpSocket::bind(Endpoint::localhost(0)).unwrap();
        let before = s.recv_buffer_size().unwrap();
        s.set_recv_buffer_size(1 << 20).unwrap();
        assert!(s.recv_buffer_size().unwrap() >= before);
    }
}
