//! UDP broadcast transport.
//!
//! One datagram socket per process, bound to the bus port on all
//! interfaces. Every node on the segment binds the same port, so the
//! socket is created through `libc` to set `SO_REUSEADDR`/`SO_REUSEPORT`
//! (and `SO_BROADCAST`) before bind — std's `UdpSocket::bind` offers no
//! hook for pre-bind options.
//!
//! The receive side polls with a 100 ms read timeout so the thread can
//! observe the shutdown flag between datagrams.

use std::io;
use std::mem;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::os::unix::io::FromRawFd;
use std::time::Duration;

/// Fixed bus port shared by every node.
pub const BUS_PORT: u16 = 12345;

/// Receive buffer large enough for any datagram.
pub const RECV_BUFFER_LEN: usize = 65_535;

/// How long a blocked `recv_from` waits before re-checking shutdown.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

const BROADCAST_TARGET: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::BROADCAST, BUS_PORT);

/// Result of one datagram send. Only `Sent` moved the whole frame.
pub enum SendOutcome {
    Sent,
    ShortWrite { sent: usize, len: usize },
    Failed(io::Error),
}

pub struct Transport {
    socket: UdpSocket,
}

impl Transport {
    /// Create the bus socket: broadcast-capable, address/port reuse,
    /// bound to 0.0.0.0:12345.
    pub fn bind() -> io::Result<Transport> {
        let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        // Broadcast permission is opt-in on every platform.
        if let Err(e) = set_socket_flag(fd, libc::SO_BROADCAST) {
            unsafe { libc::close(fd) };
            return Err(e);
        }

        // Reuse lets a node rebind immediately after restart and lets all
        // nodes on one host share the bus port. Failure here is survivable
        // (single-node setups still work), so log and continue.
        if let Err(e) = set_socket_flag(fd, libc::SO_REUSEADDR) {
            log::warn!("failed to set SO_REUSEADDR on bus socket: {}", e);
        }
        #[cfg(any(target_os = "linux", target_os = "macos", target_os = "freebsd"))]
        if let Err(e) = set_socket_flag(fd, libc::SO_REUSEPORT) {
            log::warn!("failed to set SO_REUSEPORT on bus socket: {}", e);
        }

        let addr = libc::sockaddr_in {
            sin_family: libc::AF_INET as libc::sa_family_t,
            sin_port: BUS_PORT.to_be(),
            sin_addr: libc::in_addr {
                s_addr: u32::from(Ipv4Addr::UNSPECIFIED).to_be(),
            },
            sin_zero: [0; 8],
        };
        let rc = unsafe {
            libc::bind(
                fd,
                &addr as *const libc::sockaddr_in as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }

        let socket = unsafe { UdpSocket::from_raw_fd(fd) };
        socket.set_read_timeout(Some(READ_TIMEOUT))?;

        log::info!("bus transport bound to 0.0.0.0:{}", BUS_PORT);
        Ok(Transport { socket })
    }

    /// Broadcast one frame. Never blocks for long and never panics; the
    /// caller decides how loudly to report non-`Sent` outcomes.
    pub fn send(&self, frame: &[u8]) -> SendOutcome {
        match self.socket.send_to(frame, SocketAddr::V4(BROADCAST_TARGET)) {
            Ok(sent) if sent == frame.len() => SendOutcome::Sent,
            Ok(sent) => SendOutcome::ShortWrite {
                sent,
                len: frame.len(),
            },
            Err(e) => SendOutcome::Failed(e),
        }
    }

    /// Blocking receive with the transport's read timeout. `WouldBlock`
    /// and `TimedOut` are the idle cases, not errors worth reporting.
    pub fn recv(&self, buffer: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buffer)
    }
}

fn set_socket_flag(fd: libc::c_int, option: libc::c_int) -> io::Result<()> {
    let one: libc::c_int = 1;
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            option,
            &one as *const libc::c_int as *const libc::c_void,
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}
