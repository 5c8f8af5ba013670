//! Interact with the file system using io-uring

use std::fs;
use std::future::Future;
use std::io;
use std::mem::ManuallyDrop;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use bitflags::bitflags;
use futures_core::ready;
use futures_io::{AsyncRead, AsyncBufRead, AsyncWrite, AsyncSeek};

use crate::buf::Buffer;
use crate::drive::Drive;
use crate::drive::demo::DemoDriver;
use crate::ring::Ring;
use crate::event::{OpenAt, Cancellation};
use crate::Submission;

bitflags! {
    /// Which concurrent access other processes are permitted while a file is open.
    ///
    /// POSIX has no direct equivalent of Windows' deny-mode file sharing, so these flags are
    /// enforced on a best-effort basis with an advisory `flock(2)`: a share mode that excludes
    /// [`ShareMode::WRITE`] takes an exclusive advisory lock, anything else takes a shared one.
    /// Cooperating processes that also use `flock` will see the restriction; nothing stops a
    /// process that ignores advisory locks.
    pub struct ShareMode: u32 {
        /// Allow other processes to open the file for reading while it is open here.
        const READ = 0b001;
        /// Allow other processes to open the file for writing while it is open here.
        const WRITE = 0b010;
        /// Allow other processes to delete (or rename) the file while it is open here.
        const DELETE = 0b100;
    }
}

bitflags! {
    /// Hints to the OS and kernel about how a file's contents will be accessed.
    pub struct BufferingMode: u32 {
        /// Hint that reads will mostly proceed sequentially (`posix_fadvise(POSIX_FADV_SEQUENTIAL)`).
        const SEQUENTIAL = 0b00001;
        /// Hint that reads will be scattered across the file (`posix_fadvise(POSIX_FADV_RANDOM)`).
        const RANDOM_ACCESS = 0b00010;
        /// Bypass the page cache entirely (`O_DIRECT`). Reads and writes must then be aligned to
        /// the underlying block size.
        const UNBUFFERED = 0b00100;
        /// Wait for writes to reach stable storage before completing (`O_SYNC`).
        const WRITE_THROUGH = 0b01000;
        /// The file has no durable name and is removed once the last descriptor closes
        /// (`O_TMPFILE`); only meaningful when creating a file.
        const TEMPORARY = 0b10000;
    }
}

fn buffering_open_flags(mode: BufferingMode) -> libc::c_int {
    let mut flags = 0;
    if mode.contains(BufferingMode::UNBUFFERED) {
        flags |= libc::O_DIRECT;
    }
    if mode.contains(BufferingMode::WRITE_THROUGH) {
        flags |= libc::O_SYNC;
    }
    if mode.contains(BufferingMode::TEMPORARY) {
        flags |= libc::O_TMPFILE;
    }
    flags
}

fn apply_buffering_advice(fd: RawFd, mode: BufferingMode) {
    unsafe {
        if mode.contains(BufferingMode::SEQUENTIAL) {
            libc::posix_fadvise(fd, 0, 0, libc::POSIX_FADV_SEQUENTIAL);
        }
        if mode.contains(BufferingMode::RANDOM_ACCESS) {
            libc::posix_fadvise(fd, 0, 0, libc::POSIX_FADV_RANDOM);
        }
    }
}

fn apply_share_mode(fd: RawFd, mode: ShareMode) {
    unsafe {
        let operation = if mode.contains(ShareMode::WRITE) { libc::LOCK_SH } else { libc::LOCK_EX };
        libc::flock(fd, operation | libc::LOCK_NB);
    }
}

/// A file handle that runs on io-uring
pub struct File<D: Drive = DemoDriver> {
    ring: Ring<D>,
    fd: RawFd,
    active: Op,
    buf: Buffer,
    pos: usize,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Op {
    Read,
    Write,
    Close,
    Nothing,
}

/// A future representing an opening file.
pub struct Open<D: Drive = DemoDriver> {
    submission: Submission<OpenAt, D>,
    driver: Option<D>,
    share: ShareMode,
    buffering: BufferingMode,
}

impl<D: Drive> Future for Open<D> {
    type Output = io::Result<File<D>>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<io::Result<File<D>>> {
        let this = unsafe { self.get_unchecked_mut() };
        let submission = unsafe { Pin::new_unchecked(&mut this.submission) };
        let (_, result) = ready!(submission.poll(ctx));
        let fd = result? as i32;
        let driver = this.driver.take().expect("Open polled after completion");
        apply_buffering_advice(fd, this.buffering);
        apply_share_mode(fd, this.share);
        Poll::Ready(Ok(File::from_fd(fd, driver)))
    }
}

/// A future representing a file being created.
pub struct Create<D: Drive = DemoDriver> {
    submission: Submission<OpenAt, D>,
    driver: Option<D>,
    share: ShareMode,
    buffering: BufferingMode,
}

impl<D: Drive> Future for Create<D> {
    type Output = io::Result<File<D>>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<io::Result<File<D>>> {
        let this = unsafe { self.get_unchecked_mut() };
        let submission = unsafe { Pin::new_unchecked(&mut this.submission) };
        let (_, result) = ready!(submission.poll(ctx));
        let fd = result? as i32;
        let driver = this.driver.take().expect("Create polled after completion");
        apply_buffering_advice(fd, this.buffering);
        apply_share_mode(fd, this.share);
        Poll::Ready(Ok(File::from_fd(fd, driver)))
    }
}

impl File {
    /// Open a file using the default driver
    pub fn open(path: impl AsRef<Path>) -> Open {
        File::open_on_driver(path, DemoDriver::default())
    }

    /// Create a new file using the default driver
    pub fn create(path: impl AsRef<Path>) -> Create {
        File::create_on_driver(path, DemoDriver::default())
    }
}

impl<D: Drive + Clone> File<D> {
    /// Open a file
    pub fn open_on_driver(path: impl AsRef<Path>, driver: D) -> Open<D> {
        File::open_with_mode_on_driver(path, ShareMode::READ | ShareMode::WRITE, BufferingMode::empty(), driver)
    }

    /// Create a file
    pub fn create_on_driver(path: impl AsRef<Path>, driver: D) -> Create<D> {
        File::create_with_mode_on_driver(path, ShareMode::READ | ShareMode::WRITE, BufferingMode::empty(), driver)
    }

    /// Open a file, applying the given share and buffering modes once the open completes.
    ///
    /// See [`ShareMode`] and [`BufferingMode`] for how these map onto the underlying `open(2)`
    /// flags and advisory locking.
    pub fn open_with_mode_on_driver(
        path: impl AsRef<Path>,
        share: ShareMode,
        buffering: BufferingMode,
        driver: D,
    ) -> Open<D> {
        let flags = libc::O_CLOEXEC | libc::O_RDONLY | buffering_open_flags(buffering);
        let event = OpenAt::without_dir(path, iou::sqe::OFlag::from_bits_truncate(flags), iou::sqe::Mode::from_bits_truncate(0o666));
        Open { submission: Submission::new(event, driver.clone()), driver: Some(driver), share, buffering }
    }

    /// Create a file, applying the given share and buffering modes once the create completes.
    pub fn create_with_mode_on_driver(
        path: impl AsRef<Path>,
        share: ShareMode,
        buffering: BufferingMode,
        driver: D,
    ) -> Create<D> {
        let flags = libc::O_CLOEXEC
            | libc::O_WRONLY
            | libc::O_CREAT
            | libc::O_TRUNC
            | buffering_open_flags(buffering);
        let event = OpenAt::without_dir(path, iou::sqe::OFlag::from_bits_truncate(flags), iou::sqe::Mode::from_bits_truncate(0o666));
        Create { submission: Submission::new(event, driver.clone()), driver: Some(driver), share, buffering }
    }
}

impl<D: Drive> File<D> {
    /// Take an existing file and run its IO on an io-uring driver
    pub fn run_on_driver(file: fs::File, driver: D) -> File<D> {
        let file = ManuallyDrop::new(file);
        File::from_fd(file.as_raw_fd(), driver)
    }

    fn from_fd(fd: RawFd, driver: D) -> File<D> {
        File {
            ring: Ring::new(driver),
            active: Op::Nothing,
            buf: Buffer::new(),
            pos: 0,
            fd,
        }
    }

    /// Access any data that has been read into the buffer, but not consumed
    ///
    /// This is similar to the fill_buf method from AsyncBufRead, but instead of performing IO if
    /// the buffer is empty, it will just return an empty slice. This method can be used to copy
    /// out any left over buffered data before closing or performing a write.
    pub fn read_buffered(&mut self) -> &[u8] {
        if self.active == Op::Read {
            let consumed = self.buf.consumed() as usize;
            let read = self.buf.has_read() as usize;
            &self.buf.data()[consumed..read]
        } else {
            &[]
        }
    }

    fn guard_op(self: Pin<&mut Self>, op: Op) {
        let this = unsafe { Pin::get_unchecked_mut(self) };
        if this.active != Op::Nothing && this.active != op {
            this.cancel();
        }
        this.active = op;
    }

    fn cancel(&mut self) {
        let cancellation = match self.active {
            Op::Read | Op::Write    => self.buf.cancellation(),
            Op::Close               => Cancellation::null(),
            Op::Nothing             => return,
        };
        Pin::new(&mut self.ring).cancel(cancellation);
    }

    #[inline(always)]
    fn split(self: Pin<&mut Self>) -> (Pin<&mut Ring<D>>, &mut Buffer, &mut usize) {
        unsafe {
            let this = Pin::get_unchecked_mut(self);
            (Pin::new_unchecked(&mut this.ring), &mut this.buf, &mut this.pos)
        }
    }

    #[inline(always)]
    fn ring(self: Pin<&mut Self>) -> Pin<&mut Ring<D>> {
        unsafe { Pin::map_unchecked_mut(self, |this| &mut this.ring) }
    }

    #[inline(always)]
    fn pos(self: Pin<&mut Self>) -> Pin<&mut usize> {
        unsafe { Pin::map_unchecked_mut(self, |this| &mut this.pos) }
    }
}

impl<D: Drive> AsyncRead for File<D> {
    fn poll_read(mut self: Pin<&mut Self>, ctx: &mut Context<'_>, buf: &mut [u8])
        -> Poll<io::Result<usize>>
    {
        let mut inner = ready!(self.as_mut().poll_fill_buf(ctx))?;
        let len = io::Read::read(&mut inner, buf)?;
        self.consume(len);
        Poll::Ready(Ok(len))
    }
}

impl<D: Drive> AsyncBufRead for File<D> {
    fn poll_fill_buf(mut self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<io::Result<&[u8]>> {
        self.as_mut().guard_op(Op::Read);

        let fd = self.fd;
        let (ring, buf, pos) = self.split();

        if buf.needs_fill() {
            let read = ready!(ring.poll(ctx, true, 1, |sqs| unsafe {
                let mut sqe = sqs.single().unwrap();
                sqe.prep_read(fd, buf.read_buf(), *pos as u64);
                sqe
            }))? as u32;
            buf.set_read(read);
            *pos += read as usize;
        }

        let consumed = buf.consumed() as usize;
        let read = buf.has_read() as usize;
        Poll::Ready(Ok(&buf.data()[consumed..read]))
    }

    fn consume(self: Pin<&mut Self>, amt: usize) {
        self.buf().consume(amt);
    }
}

impl File {
    #[inline(always)]
    fn buf(self: Pin<&mut Self>) -> Pin<&mut Buffer> {
        unsafe { Pin::map_unchecked_mut(self, |this| &mut this.buf) }
    }
}

impl<D: Drive> AsyncWrite for File<D> {
    fn poll_write(mut self: Pin<&mut Self>, ctx: &mut Context<'_>, slice: &[u8]) -> Poll<io::Result<usize>> {
        self.as_mut().guard_op(Op::Write);

        let fd = self.fd;
        let (ring, buf, pos) = self.split();

        buf.fill_from(slice);

        let result = ready!(ring.poll(ctx, true, 1, |sqs| unsafe {
            let mut sqe = sqs.single().unwrap();
            sqe.prep_write(fd, buf.write_buf(), *pos as u64);
            sqe
        }));

        if let Ok(n) = &result {
            *pos += n;
        }

        buf.clear_written();

        Poll::Ready(result)
    }

    fn poll_flush(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<io::Result<()>> {
        ready!(self.poll_write(ctx, &[]))?;
        Poll::Ready(Ok(()))
    }

    fn poll_close(mut self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.as_mut().guard_op(Op::Close);
        let fd = self.fd;
        ready!(self.ring().poll(ctx, true, 1, |sqs| unsafe {
            let mut sqe = sqs.single().unwrap();
            sqe.prep_close(fd);
            sqe
        }))?;
        Poll::Ready(Ok(()))
    }
}

impl<D: Drive> AsyncSeek for File<D> {
    fn poll_seek(mut self: Pin<&mut Self>, _: &mut Context, pos: io::SeekFrom)
        -> Poll<io::Result<u64>>
    {
        match pos {
            io::SeekFrom::Start(n)      => *self.as_mut().pos() = n as usize,
            io::SeekFrom::Current(n)    => {
                let current = *self.as_mut().pos() as i64;
                match current.checked_add(n).filter(|&p| p >= 0) {
                    Some(new_pos) => *self.as_mut().pos() = new_pos as usize,
                    None => {
                        const MSG: &str = "invalid seek to a negative or overflowing position";
                        return Poll::Ready(Err(io::Error::new(io::ErrorKind::InvalidInput, MSG)))
                    }
                }
            }
            io::SeekFrom::End(_)        => {
                const MSG: &str = "cannot seek to end of io-uring file";
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, MSG)))
            }
        }
        Poll::Ready(Ok(self.pos as u64))
    }
}

impl From<fs::File> for File {
    fn from(file: fs::File) -> File {
        File::run_on_driver(file, DemoDriver::default())
    }
}

impl<D: Drive> From<File<D>> for fs::File {
    fn from(mut file: File<D>) -> fs::File {
        unsafe {
            file.cancel();
            let file = ManuallyDrop::new(file);
            fs::File::from_raw_fd(file.fd)
        }
    }
}

impl<D: Drive> Drop for File<D> {
    fn drop(&mut self) {
        match self.active {
            Op::Nothing => unsafe { libc::close(self.fd); },
            _           => self.cancel(),
        }
    }
}

#[cfg(test)]
mod mode_tests {
    use super::*;

    #[test]
    fn share_mode_composes_with_bitor() {
        let mode = ShareMode::READ | ShareMode::WRITE;
        assert!(mode.contains(ShareMode::READ));
        assert!(mode.contains(ShareMode::WRITE));
        assert!(!mode.contains(ShareMode::DELETE));
    }

    #[test]
    fn buffering_mode_maps_to_expected_open_flags() {
        let mode = BufferingMode::UNBUFFERED | BufferingMode::WRITE_THROUGH;
        let flags = buffering_open_flags(mode);
        assert_eq!(flags & libc::O_DIRECT, libc::O_DIRECT);
        assert_eq!(flags & libc::O_SYNC, libc::O_SYNC);
        assert_eq!(flags & libc::O_TMPFILE, 0);
    }

    #[test]
    fn buffering_mode_default_is_empty() {
        assert!(BufferingMode::empty().is_empty());
    }
}

