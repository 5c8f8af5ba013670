//! Networking primitives for TCP/UDP communication over io-uring.

mod endpoint;
mod listener;
mod stream;
mod udp;

pub use endpoint::Endpoint;
pub use listener::{Accept, Close, Incoming, TcpListener};
pub use stream::{Connect, TcpStream};
pub use udp::UdpSocket;

use std::io;
use std::mem;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6, ToSocketAddrs};
use std::os::unix::io::RawFd;

/// Create a non-blocking, close-on-exec stream socket bound to no address yet, sized for
/// whichever address family the first resolved candidate of `addr` uses.
pub(crate) fn socket(addr: impl ToSocketAddrs) -> io::Result<(RawFd, SocketAddr)> {
    let addr = addr.to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "could not resolve to any addresses")
    })?;

    let domain = match addr {
        SocketAddr::V4(..) => libc::AF_INET,
        SocketAddr::V6(..) => libc::AF_INET6,
    };

    unsafe {
        let fd = libc::socket(domain, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0);
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok((fd, addr))
    }
}

/// Convert a [`SocketAddr`] into the raw `sockaddr_storage` form the kernel adapter expects.
///
/// This, and [`addr_from_c`] below, are the only places in the crate that touch the textual or
/// binary wire encoding of an endpoint directly; everything above this layer works in terms of
/// `std::net::SocketAddr` (see [`Endpoint`]), which is the Rust-native form of the "external
/// collaborator" boundary spec.md draws around IPv4/IPv6 encoding.
pub(crate) fn addr_to_c(addr: SocketAddr) -> (Box<libc::sockaddr_storage>, libc::socklen_t) {
    unsafe {
        let mut storage: libc::sockaddr_storage = mem::zeroed();
        let len = match addr {
            SocketAddr::V4(addr) => {
                let sockaddr_in = &mut storage as *mut _ as *mut libc::sockaddr_in;
                (*sockaddr_in).sin_family = libc::AF_INET as libc::sa_family_t;
                (*sockaddr_in).sin_port = addr.port().to_be();
                (*sockaddr_in).sin_addr = libc::in_addr {
                    s_addr: u32::from_ne_bytes(addr.ip().octets()),
                };
                mem::size_of::<libc::sockaddr_in>() as libc::socklen_t
            }
            SocketAddr::V6(addr) => {
                let sockaddr_in6 = &mut storage as *mut _ as *mut libc::sockaddr_in6;
                (*sockaddr_in6).sin6_family = libc::AF_INET6 as libc::sa_family_t;
                (*sockaddr_in6).sin6_port = addr.port().to_be();
                (*sockaddr_in6).sin6_addr = libc::in6_addr { s6_addr: addr.ip().octets() };
                (*sockaddr_in6).sin6_flowinfo = addr.flowinfo();
                (*sockaddr_in6).sin6_scope_id = addr.scope_id();
                mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t
            }
        };
        (Box::new(storage), len)
    }
}

/// Recover a [`SocketAddr`] from a kernel-filled `sockaddr_storage`, the inverse of
/// [`addr_to_c`].
///
/// ## Safety
///
/// `storage` must have been filled in by the kernel (or by [`addr_to_c`]) for at least
/// `len` bytes, and `storage.ss_family` must be `AF_INET` or `AF_INET6`.
pub(crate) unsafe fn addr_from_c(
    storage: &libc::sockaddr_storage,
    _len: usize,
) -> io::Result<SocketAddr> {
    match storage.ss_family as libc::c_int {
        libc::AF_INET => {
            let sockaddr_in = &*(storage as *const libc::sockaddr_storage as *const libc::sockaddr_in);
            let ip = Ipv4Addr::from(sockaddr_in.sin_addr.s_addr.to_ne_bytes());
            let port = u16::from_be(sockaddr_in.sin_port);
            Ok(SocketAddr::V4(SocketAddrV4::new(ip, port)))
        }
        libc::AF_INET6 => {
            let sockaddr_in6 = &*(storage as *const libc::sockaddr_storage as *const libc::sockaddr_in6);
            let ip = Ipv6Addr::from(sockaddr_in6.sin6_addr.s6_addr);
            let port = u16::from_be(sockaddr_in6.sin6_port);
            Ok(SocketAddr::V6(SocketAddrV6::new(
                ip,
                port,
                sockaddr_in6.sin6_flowinfo,
                sockaddr_in6.sin6_scope_id,
            )))
        }
        family => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unsupported address family {}", family),
        )),
    }
}

/// Retrieve the peer address of a connected socket via `getpeername(2)`, used after an
/// `accept()` completion where the kernel adapter does not hand back the peer's address
/// directly.
pub(crate) fn peer_addr(fd: RawFd) -> io::Result<SocketAddr> {
    unsafe {
        let mut storage: libc::sockaddr_storage = mem::zeroed();
        let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
        let ret = libc::getpeername(fd, &mut storage as *mut _ as *mut libc::sockaddr, &mut len);
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        addr_from_c(&storage, len as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v4_round_trips_through_c_representation() {
        let addr: SocketAddr = "127.0.0.1:4321".parse().unwrap();
        let (storage, len) = addr_to_c(addr);
        let recovered = unsafe { addr_from_c(&storage, len as usize).unwrap() };
        assert_eq!(addr, recovered);
    }

    #[test]
    fn v6_round_trips_through_c_representation() {
        let addr: SocketAddr = "[2001:db8::1]:443".parse().unwrap();
        let (storage, len) = addr_to_c(addr);
        let recovered = unsafe { addr_from_c(&storage, len as usize).unwrap() };
        assert_eq!(addr, recovered);
    }
}
