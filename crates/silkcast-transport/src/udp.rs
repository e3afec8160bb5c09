use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Largest datagram the receive buffer accepts.
pub const MAX_DATAGRAM_SIZE: usize = 65_535;

/// UDP datagram socket with a receive timeout.
///
/// The receive timeout turns a blocking read into a periodic poll so the
/// owning loop can check for cancellation between datagrams.
pub struct DatagramSocket {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl DatagramSocket {
    /// Bind a socket on `addr` (port 0 lets the OS choose).
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;
        let local_addr = socket
            .local_addr()
            .map_err(|source| TransportError::Bind { addr, source })?;

        info!(%local_addr, "listening for datagrams");

        Ok(Self { socket, local_addr })
    }

    /// Set the receive timeout. `None` blocks forever.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.socket.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Receive one datagram into `buf`.
    ///
    /// Returns `Ok(None)` when the receive timeout elapsed with nothing to read.
    pub fn recv(&self, buf: &mut [u8]) -> Result<Option<usize>> {
        loop {
            match self.socket.recv_from(buf) {
                Ok((len, _src)) => return Ok(Some(len)),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
                {
                    return Ok(None)
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    /// Send one datagram to `target`.
    pub fn send_to(&self, datagram: &[u8], target: SocketAddr) -> Result<usize> {
        self.socket.send_to(datagram, target).map_err(Into::into)
    }

    /// Connect the socket so `send` reaches a fixed peer.
    pub fn connect(&self, target: impl ToSocketAddrs) -> Result<()> {
        self.socket.connect(target).map_err(Into::into)
    }

    /// Send one datagram to the connected peer.
    pub fn send(&self, datagram: &[u8]) -> Result<usize> {
        self.socket.send(datagram).map_err(Into::into)
    }

    /// Address the socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "udp"
    }
}

impl std::fmt::Debug for DatagramSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatagramSocket")
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

/// Address of the interface used for outbound traffic.
///
/// Connecting a UDP socket sends nothing; it only asks the OS to pick a
/// route, which fixes the local address. Falls back to loopback when no
/// route exists.
pub fn local_ip() -> IpAddr {
    let probe = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(10, 255, 255, 255), 1))?;
        Ok(socket.local_addr()?.ip())
    };
    match probe() {
        Ok(ip) if !ip.is_unspecified() => ip,
        Ok(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
        Err(err) => {
            debug!(error = %err, "no outbound route; using loopback");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, 0))
    }

    #[test]
    fn send_and_receive_datagram() {
        let receiver = DatagramSocket::bind(loopback()).unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let sender = DatagramSocket::bind(loopback()).unwrap();

        sender.send_to(b"fragment", receiver.local_addr()).unwrap();

        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        let len = receiver.recv(&mut buf).unwrap().unwrap();
        assert_eq!(&buf[..len], b"fragment");
    }

    #[test]
    fn recv_timeout_yields_none() {
        let receiver = DatagramSocket::bind(loopback()).unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();

        let mut buf = [0u8; 64];
        assert!(receiver.recv(&mut buf).unwrap().is_none());
    }

    #[test]
    fn connected_send_reaches_peer() {
        let receiver = DatagramSocket::bind(loopback()).unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let sender = DatagramSocket::bind(loopback()).unwrap();
        sender.connect(receiver.local_addr()).unwrap();

        sender.send(b"abc").unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(receiver.recv(&mut buf).unwrap(), Some(3));
    }

    #[test]
    fn bind_conflict_reports_address() {
        let first = DatagramSocket::bind(loopback()).unwrap();
        let result = DatagramSocket::bind(first.local_addr());
        assert!(matches!(result, Err(TransportError::Bind { addr, .. }) if addr == first.local_addr()));
    }

    #[test]
    fn local_ip_is_never_unspecified() {
        assert!(!local_ip().is_unspecified());
    }
}
