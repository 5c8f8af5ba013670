use std::cmp;
use std::future::Future;
use std::io;
use std::mem;
use std::net::{SocketAddr, ToSocketAddrs};
use std::os::unix::io::{AsRawFd, RawFd};
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::ready;
use futures_io::{AsyncRead, AsyncWrite};
use iou::sqe::MsgFlags;

use crate::drive::demo::DemoDriver;
use crate::event;
use crate::{Drive, Submission};

use super::socket;

/// A TCP connection, driven by io-uring `send`/`recv` completions.
///
/// At most one read and one write may be outstanding at a time; each is represented as its own
/// one-shot [`Submission`], created lazily on the first poll and dropped (which cancels it)
/// if the future holding it is dropped before completion.
pub struct TcpStream<D: Drive = DemoDriver> {
    fd: RawFd,
    driver: D,
    read: Option<Submission<event::Recv<RawFd>, D>>,
    write: Option<Submission<event::Send<RawFd>, D>>,
    close: Option<Submission<event::Close, D>>,
}

impl TcpStream {
    /// Connect to `addr` using the default driver.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Connect {
        TcpStream::connect_on_driver(addr, DemoDriver::default())
    }
}

impl<D: Drive + Clone> TcpStream<D> {
    /// Connect to `addr`, running completions on `driver`.
    pub fn connect_on_driver<A: ToSocketAddrs>(addr: A, driver: D) -> Connect<D> {
        let (fd, addr) = match socket(addr) {
            Ok(pair) => pair,
            Err(err) => return Connect(Err(Some(err))),
        };
        Connect(Ok(Submission::new(event::Connect::new(fd, addr), driver)))
    }
}

impl<D: Drive> TcpStream<D> {
    pub(super) fn from_fd(fd: RawFd, driver: D) -> TcpStream<D> {
        TcpStream { fd, driver, read: None, write: None, close: None }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        local_addr(self.fd)
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        super::peer_addr(self.fd)
    }
}

impl<D: Drive + Clone> TcpStream<D> {
    fn poll_recv(&mut self, ctx: &mut Context<'_>, out: &mut [u8]) -> Poll<io::Result<usize>> {
        if self.read.is_none() {
            let buf = vec![0u8; out.len().max(1)].into_boxed_slice();
            let event = event::Recv { fd: self.fd, buf, flags: MsgFlags::empty() };
            self.read = Some(Submission::new(event, self.driver.clone()));
        }

        let submission = self.read.as_mut().unwrap();
        let (event, result) = ready!(unsafe { Pin::new_unchecked(submission) }.poll(ctx));
        self.read = None;
        let n = result?;
        let n = cmp::min(n, out.len());
        out[..n].copy_from_slice(&event.buf[..n]);
        Poll::Ready(Ok(n))
    }

    fn poll_send(&mut self, ctx: &mut Context<'_>, data: &[u8]) -> Poll<io::Result<usize>> {
        if self.write.is_none() {
            let buf: Box<[u8]> = data.to_vec().into_boxed_slice();
            let event = event::Send { fd: self.fd, buf, flags: MsgFlags::empty() };
            self.write = Some(Submission::new(event, self.driver.clone()));
        }

        let submission = self.write.as_mut().unwrap();
        let (_, result) = ready!(unsafe { Pin::new_unchecked(submission) }.poll(ctx));
        self.write = None;
        Poll::Ready(result)
    }
}

fn local_addr(fd: RawFd) -> io::Result<SocketAddr> {
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

/// The future returned by [`TcpStream::connect`].
pub struct Connect<D: Drive = DemoDriver>(Result<Submission<event::Connect, D>, Option<io::Error>>);

impl<D: Drive + Clone> Future for Connect<D> {
    type Output = io::Result<TcpStream<D>>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        unsafe {
            match &mut Pin::get_unchecked_mut(self).0 {
                Ok(submission) => {
                    let mut submission = Pin::new_unchecked(submission);
                    let (connect, result) = ready!(submission.as_mut().poll(ctx));
                    result?;
                    let driver = submission.driver().clone();
                    Poll::Ready(Ok(TcpStream::from_fd(connect.fd, driver)))
                }
                Err(err) => {
                    let err = err.take().expect("polled Connect future after completion");
                    Poll::Ready(Err(err))
                }
            }
        }
    }
}

impl<D: Drive + Clone> AsyncRead for TcpStream<D> {
    fn poll_read(self: Pin<&mut Self>, ctx: &mut Context<'_>, buf: &mut [u8]) -> Poll<io::Result<usize>> {
        self.get_mut().poll_recv(ctx, buf)
    }
}

impl<D: Drive + Clone> AsyncWrite for TcpStream<D> {
    fn poll_write(self: Pin<&mut Self>, ctx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.get_mut().poll_send(ctx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, _ctx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.read = None;
        this.write = None;
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

impl<D: Drive> AsRawFd for TcpStream<D> {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl<D: Drive> Drop for TcpStream<D> {
    fn drop(&mut self) {
        if self.read.is_none() && self.write.is_none() && self.close.is_none() {
            unsafe {
                libc::close(self.fd);
            }
        }
    }
}
