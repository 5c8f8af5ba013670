use std::future::Future;
use std::io;
use std::mem;
use std::net::{SocketAddr, ToSocketAddrs};
use std::os::unix::io::{AsRawFd, RawFd};
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::{ready, Stream};
use iou::sqe::SockFlag;

use crate::drive::demo::DemoDriver;
use crate::event;
use crate::{Drive, Submission};

use super::{addr_to_c, peer_addr, socket, TcpStream};

/// A TCP listener bound to a local address, driven by io-uring `accept` completions.
pub struct TcpListener<D: Drive = DemoDriver> {
    fd: RawFd,
    driver: D,
    accept: Option<Submission<event::Accept<RawFd>, D>>,
    close: Option<Submission<event::Close, D>>,
}

impl TcpListener {
    /// Bind a listening socket using the default driver.
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<TcpListener> {
        TcpListener::bind_on_driver(addr, DemoDriver::default())
    }
}

impl<D: Drive + Clone> TcpListener<D> {
    /// Bind a listening socket, running its completions on `driver`.
    pub fn bind_on_driver<A: ToSocketAddrs>(addr: A, driver: D) -> io::Result<TcpListener<D>> {
        let (fd, addr) = socket(addr)?;
        unsafe {
            let val: libc::c_int = 1;
            let len = mem::size_of::<libc::c_int>() as u32;
            if libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_REUSEADDR,
                &val as *const _ as *const libc::c_void,
                len,
            ) < 0
            {
                return Err(io::Error::last_os_error());
            }

            let (addr, addrlen) = addr_to_c(addr);
            let addr = Box::into_raw(addr) as *mut libc::sockaddr;
            let ret = libc::bind(fd, addr, addrlen);
            drop(Box::from_raw(addr as *mut libc::sockaddr_storage));
            if ret < 0 {
                return Err(io::Error::last_os_error());
            }

            if libc::listen(fd, 128) < 0 {
                return Err(io::Error::last_os_error());
            }
        }

        Ok(TcpListener { fd, driver, accept: None, close: None })
    }

    /// The local address this listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        peer_addr_of_self(self.fd)
    }

    /// Accept the next incoming connection.
    pub fn accept(&mut self) -> Accept<'_, D> {
        Accept { listener: self }
    }

    /// A stream of accepted connections.
    pub fn incoming(&mut self) -> Incoming<'_, D> {
        Incoming { listener: self }
    }

    fn poll_accept(
        mut self: Pin<&mut Self>,
        ctx: &mut Context<'_>,
    ) -> Poll<io::Result<(TcpStream<D>, SocketAddr)>> {
        let this = self.as_mut().get_mut();
        if this.accept.is_none() {
            let event = event::Accept { addr: None, fd: this.fd, flags: SockFlag::empty() };
            this.accept = Some(Submission::new(event, this.driver.clone()));
        }

        let submission = this.accept.as_mut().unwrap();
        let (_, result) = ready!(unsafe { Pin::new_unchecked(submission) }.poll(ctx));
        this.accept = None;
        let fd = result? as RawFd;
        let addr = peer_addr(fd)?;
        Poll::Ready(Ok((TcpStream::from_fd(fd, this.driver.clone()), addr)))
    }

    /// Close the listening socket, running the close through the driver rather than just
    /// dropping the raw descriptor.
    pub fn close(&mut self) -> Close<'_, D> {
        Close { listener: self }
    }

    fn poll_close(mut self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.as_mut().get_mut();
        if this.close.is_none() {
            this.close = Some(Submission::new(event::Close::new(this.fd), this.driver.clone()));
        }
        let submission = this.close.as_mut().unwrap();
        let (_, result) = ready!(unsafe { Pin::new_unchecked(submission) }.poll(ctx));
        this.close = None;
        result?;
        Poll::Ready(Ok(()))
    }
}

fn peer_addr_of_self(fd: RawFd) -> io::Result<SocketAddr> {
    unsafe {
        let mut storage: libc::sockaddr_storage = mem::zeroed();
        let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
        let ret = libc::getsockname(fd, &mut storage as *mut _ as *mut libc::sockaddr, &mut len);
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        super::addr_from_c(&storage, len as usize)
    }
}

impl<D: Drive> AsRawFd for TcpListener<D> {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl<D: Drive> Drop for TcpListener<D> {
    fn drop(&mut self) {
        if self.accept.is_none() && self.close.is_none() {
            unsafe {
                libc::close(self.fd);
            }
        }
        // Otherwise an outstanding submission's own `Drop` runs the event's cancellation path.
    }
}

/// The future returned by [`TcpListener::accept`].
pub struct Accept<'a, D: Drive> {
    listener: &'a mut TcpListener<D>,
}

impl<'a, D: Drive + Clone> Future for Accept<'a, D> {
    type Output = io::Result<(TcpStream<D>, SocketAddr)>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = unsafe { self.get_unchecked_mut() };
        unsafe { Pin::new_unchecked(&mut *this.listener) }.poll_accept(ctx)
    }
}

/// A stream of accepted connections, yielded by [`TcpListener::incoming`].
pub struct Incoming<'a, D: Drive> {
    listener: &'a mut TcpListener<D>,
}

impl<'a, D: Drive + Clone> Stream for Incoming<'a, D> {
    type Item = io::Result<(TcpStream<D>, SocketAddr)>;

    fn poll_next(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = unsafe { self.get_unchecked_mut() };
        let next = ready!(unsafe { Pin::new_unchecked(&mut *this.listener) }.poll_accept(ctx));
        Poll::Ready(Some(next))
    }
}

/// The future returned by [`TcpListener::close`].
pub struct Close<'a, D: Drive> {
    listener: &'a mut TcpListener<D>,
}

impl<'a, D: Drive + Clone> Future for Close<'a, D> {
    type Output = io::Result<()>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = unsafe { self.get_unchecked_mut() };
        unsafe { Pin::new_unchecked(&mut *this.listener) }.poll_close(ctx)
    }
}
