//! UDP bindings driven by io-uring `sendmsg`/`recvmsg` completions.

use std::future::Future;
use std::io;
use std::mem;
use std::net::{SocketAddr, ToSocketAddrs};
use std::os::unix::io::{AsRawFd, RawFd};
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::ready;
use iou::sqe::{MsgFlags, SockAddr as IouSockAddr};
use nix::sys::socket::InetAddr;

use crate::drive::demo::DemoDriver;
use crate::event;
use crate::{Drive, Submission};

/// A UDP socket, driven by io-uring completions for `send(to)`/`recv(from)`.
pub struct UdpSocket<D: Drive = DemoDriver> {
    fd: RawFd,
    driver: D,
    recv: Option<Submission<event::RecvFrom<RawFd>, D>>,
    send: Option<Submission<event::SendTo<RawFd>, D>>,
    recv_connected: Option<Submission<event::Recv<RawFd>, D>>,
    send_connected: Option<Submission<event::Send<RawFd>, D>>,
}

impl UdpSocket {
    /// Bind a UDP socket using the default driver.
    ///
    /// Binding with a port number of 0 requests that the OS assign a port; query it back with
    /// [`local_addr`](UdpSocket::local_addr).
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<UdpSocket> {
        UdpSocket::bind_on_driver(addr, DemoDriver::default())
    }
}

impl<D: Drive + Clone> UdpSocket<D> {
    /// Bind a UDP socket, running its completions on `driver`.
    pub fn bind_on_driver<A: ToSocketAddrs>(addr: A, driver: D) -> io::Result<UdpSocket<D>> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "could not resolve to any addresses"))?;

        let domain = match addr {
            SocketAddr::V4(..) => libc::AF_INET,
            SocketAddr::V6(..) => libc::AF_INET6,
        };

        unsafe {
            let fd = libc::socket(domain, libc::SOCK_DGRAM | libc::SOCK_CLOEXEC, 0);
            if fd < 0 {
                return Err(io::Error::last_os_error());
            }

            let (c_addr, addrlen) = super::addr_to_c(addr);
            let c_addr = Box::into_raw(c_addr) as *mut libc::sockaddr;
            let ret = libc::bind(fd, c_addr, addrlen);
            drop(Box::from_raw(c_addr as *mut libc::sockaddr_storage));
            if ret < 0 {
                let err = io::Error::last_os_error();
                libc::close(fd);
                return Err(err);
            }

            Ok(UdpSocket {
                fd,
                driver,
                recv: None,
                send: None,
                recv_connected: None,
                send_connected: None,
            })
        }
    }

    /// The local address this socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        unsafe {
            let mut storage: libc::sockaddr_storage = mem::zeroed();
            let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
            let ret = libc::getsockname(self.fd, &mut storage as *mut _ as *mut libc::sockaddr, &mut len);
            if ret < 0 {
                return Err(io::Error::last_os_error());
            }
            super::addr_from_c(&storage, len as usize)
        }
    }

    /// The address of the peer this socket is connected to, if any.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        super::peer_addr(self.fd)
    }

    /// Connect this socket to a single peer.
    ///
    /// This is a synchronous `connect(2)` on a datagram socket: it only records a default
    /// destination/source filter in the kernel and never blocks on the network, so it does not
    /// need to go through the io-uring completion machinery the way [`TcpStream::connect`] does.
    ///
    /// [`TcpStream::connect`]: super::TcpStream::connect
    pub fn connect(&self, addr: SocketAddr) -> io::Result<()> {
        unsafe {
            let (c_addr, addrlen) = super::addr_to_c(addr);
            let c_addr = Box::into_raw(c_addr) as *mut libc::sockaddr;
            let ret = libc::connect(self.fd, c_addr, addrlen);
            drop(Box::from_raw(c_addr as *mut libc::sockaddr_storage));
            if ret < 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(())
    }

    /// Receive one datagram from the connected peer.
    pub fn recv<'a>(&'a mut self, buf: &'a mut [u8]) -> Recv<'a, D> {
        Recv { socket: self, buf }
    }

    /// Send one datagram to the connected peer.
    pub fn send<'a>(&'a mut self, buf: &'a [u8]) -> Send<'a, D> {
        Send { socket: self, buf }
    }

    fn poll_recv(&mut self, ctx: &mut Context<'_>, out: &mut [u8]) -> Poll<io::Result<usize>> {
        if self.recv_connected.is_none() {
            let buf = vec![0u8; out.len().max(1)].into_boxed_slice();
            let event = event::Recv { fd: self.fd, buf, flags: MsgFlags::empty() };
            self.recv_connected = Some(Submission::new(event, self.driver.clone()));
        }

        let submission = self.recv_connected.as_mut().unwrap();
        let (event, result) = ready!(unsafe { Pin::new_unchecked(submission) }.poll(ctx));
        self.recv_connected = None;
        let n = result?;
        let n = n.min(out.len());
        out[..n].copy_from_slice(&event.buf[..n]);
        Poll::Ready(Ok(n))
    }

    fn poll_send(&mut self, ctx: &mut Context<'_>, data: &[u8]) -> Poll<io::Result<usize>> {
        if self.send_connected.is_none() {
            let buf: Box<[u8]> = data.to_vec().into_boxed_slice();
            let event = event::Send { fd: self.fd, buf, flags: MsgFlags::empty() };
            self.send_connected = Some(Submission::new(event, self.driver.clone()));
        }

        let submission = self.send_connected.as_mut().unwrap();
        let (_, result) = ready!(unsafe { Pin::new_unchecked(submission) }.poll(ctx));
        self.send_connected = None;
        Poll::Ready(result)
    }

    /// Receive one datagram, returning its length and the sender's address.
    pub fn recv_from<'a>(&'a mut self, buf: &'a mut [u8]) -> RecvFrom<'a, D> {
        RecvFrom { socket: self, buf }
    }

    /// Send one datagram to `addr`.
    pub fn send_to<'a>(&'a mut self, buf: &'a [u8], addr: SocketAddr) -> SendTo<'a, D> {
        SendTo { socket: self, buf, addr }
    }

    fn poll_recv_from(&mut self, ctx: &mut Context<'_>, out: &mut [u8]) -> Poll<io::Result<(usize, SocketAddr)>> {
        if self.recv.is_none() {
            let buf = vec![0u8; out.len().max(1)].into_boxed_slice();
            let event = event::RecvFrom::new(self.fd, buf, MsgFlags::empty());
            self.recv = Some(Submission::new(event, self.driver.clone()));
        }

        let submission = self.recv.as_mut().unwrap();
        let (event, result) = ready!(unsafe { Pin::new_unchecked(submission) }.poll(ctx));
        self.recv = None;
        let n = result?;
        let n = n.min(out.len());
        out[..n].copy_from_slice(&event.buf()[..n]);
        let addr = unsafe { super::addr_from_c(event.addr(), mem::size_of::<libc::sockaddr_storage>())? };
        Poll::Ready(Ok((n, addr)))
    }

    fn poll_send_to(&mut self, ctx: &mut Context<'_>, data: &[u8], addr: SocketAddr) -> Poll<io::Result<usize>> {
        if self.send.is_none() {
            let buf: Box<[u8]> = data.to_vec().into_boxed_slice();
            let inet = InetAddr::from_std(&addr);
            let event = event::SendTo::new(self.fd, buf, IouSockAddr::Inet(inet), MsgFlags::empty());
            self.send = Some(Submission::new(event, self.driver.clone()));
        }

        let submission = self.send.as_mut().unwrap();
        let (_, result) = ready!(unsafe { Pin::new_unchecked(submission) }.poll(ctx));
        self.send = None;
        Poll::Ready(result)
    }
}

/// The future returned by [`UdpSocket::recv`].
pub struct Recv<'a, D: Drive> {
    socket: &'a mut UdpSocket<D>,
    buf: &'a mut [u8],
}

impl<'a, D: Drive + Clone> Future for Recv<'a, D> {
    type Output = io::Result<usize>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        this.socket.poll_recv(ctx, this.buf)
    }
}

/// The future returned by [`UdpSocket::send`].
pub struct Send<'a, D: Drive> {
    socket: &'a mut UdpSocket<D>,
    buf: &'a [u8],
}

impl<'a, D: Drive + Clone> Future for Send<'a, D> {
    type Output = io::Result<usize>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        this.socket.poll_send(ctx, this.buf)
    }
}

/// The future returned by [`UdpSocket::recv_from`].
pub struct RecvFrom<'a, D: Drive> {
    socket: &'a mut UdpSocket<D>,
    buf: &'a mut [u8],
}

impl<'a, D: Drive + Clone> Future for RecvFrom<'a, D> {
    type Output = io::Result<(usize, SocketAddr)>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        this.socket.poll_recv_from(ctx, this.buf)
    }
}

/// The future returned by [`UdpSocket::send_to`].
pub struct SendTo<'a, D: Drive> {
    socket: &'a mut UdpSocket<D>,
    buf: &'a [u8],
    addr: SocketAddr,
}

impl<'a, D: Drive + Clone> Future for SendTo<'a, D> {
    type Output = io::Result<usize>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        this.socket.poll_send_to(ctx, this.buf, this.addr)
    }
}

impl<D: Drive> AsRawFd for UdpSocket<D> {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl<D: Drive> Drop for UdpSocket<D> {
    fn drop(&mut self) {
        let idle = self.recv.is_none()
            && self.send.is_none()
            && self.recv_connected.is_none()
            && self.send_connected.is_none();
        if idle {
            unsafe {
                libc::close(self.fd);
            }
        }
    }
}
