//! Datagram transport seam
//!
//! The ingest loop only needs one primitive: a non-blocking receive. The
//! trait keeps the loop testable (scripted frames) and leaves room for a
//! kernel-bypass implementation with the same semantics. `UdpTransport` is
//! the standard-socket implementation: non-blocking, multicast join, and an
//! enlarged kernel receive buffer to ride out bursts.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

use tracing::{info, warn};

/// Non-blocking datagram source.
///
/// `Ok(Some(n))` = one datagram of `n` bytes copied into `buf`;
/// `Ok(None)` = nothing available right now (normal idle state);
/// `Err(_)` = transport fault, logged and survived by the caller.
pub trait Transport {
    fn poll(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>>;
}

/// Multicast UDP receiver over a standard non-blocking socket.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind to `port`, join `group` on `interface`, and tune the socket for
    /// burst tolerance.
    pub fn multicast(
        group: Ipv4Addr,
        port: u16,
        interface: Ipv4Addr,
        recv_buffer_bytes: usize,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port))?;
        socket.set_nonblocking(true)?;

        if group.is_multicast() {
            socket.join_multicast_v4(&group, &interface)?;
            info!(%group, port, %interface, "joined multicast group");
        }

        if recv_buffer_bytes > 0 {
            if let Err(e) = set_recv_buffer(&socket, recv_buffer_bytes) {
                // Not fatal: the kernel clamp just stays at its default.
                warn!(error = %e, requested = recv_buffer_bytes, "SO_RCVBUF not applied");
            }
        }

        Ok(Self { socket })
    }

    /// Plain non-blocking bind without a multicast join (tests, local feeds).
    pub fn bind(addr: SocketAddrV4) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.socket.local_addr()
    }
}

impl Transport for UdpTransport {
    #[inline]
    fn poll(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.socket.recv(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(unix)]
fn set_recv_buffer(socket: &UdpSocket, bytes: usize) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let value = bytes as libc::c_int;
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            &value as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_recv_buffer(_socket: &UdpSocket, _bytes: usize) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_poll_empty_returns_none() {
        let mut transport =
            UdpTransport::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).unwrap();
        let mut buf = [0u8; 64];
        assert!(matches!(transport.poll(&mut buf), Ok(None)));
    }

    #[test]
    fn test_poll_receives_datagram() {
        let mut transport =
            UdpTransport::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).unwrap();
        let dest = transport.local_addr().unwrap();

        let sender = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).unwrap();
        sender.send_to(b"tick", dest).unwrap();

        let mut buf = [0u8; 64];
        let deadline = Instant::now() + Duration::from_secs(1);
        loop {
            match transport.poll(&mut buf).unwrap() {
                Some(n) => {
                    assert_eq!(&buf[..n], b"tick");
                    break;
                }
                None if Instant::now() < deadline => std::thread::yield_now(),
                None => panic!("datagram never arrived"),
            }
        }
    }
}
