use std::mem::ManuallyDrop;
use std::os::unix::io::RawFd;

use iou::registrar::UringFd;
use iou::sqe::MsgFlags;

use super::{Cancellation, Event, SQE, SQEs};

/// A socket `recvfrom` event: like [`super::Recv`], but also captures the sender's address,
/// the way [`super::SendTo`] captures the destination for an unconnected datagram socket.
pub struct RecvFrom<FD: UringFd = RawFd> {
    fd: FD,
    buf: Box<[u8]>,
    flags: MsgFlags,
    addr: Box<libc::sockaddr_storage>,
    mhdr: libc::msghdr,
}

impl<FD: UringFd> RecvFrom<FD> {
    pub fn new(fd: FD, buf: Box<[u8]>, flags: MsgFlags) -> RecvFrom<FD> {
        RecvFrom {
            fd,
            buf,
            flags,
            addr: Box::new(unsafe { std::mem::zeroed() }),
            mhdr: unsafe { std::mem::zeroed() },
        }
    }

    /// The raw `sockaddr_storage` the kernel filled in with the sender's address.
    pub fn addr(&self) -> &libc::sockaddr_storage {
        &self.addr
    }

    /// The buffer the datagram was read into.
    pub fn buf(&self) -> &[u8] {
        &self.buf
    }
}

impl<FD: UringFd + Copy> Event for RecvFrom<FD> {
    fn sqes_needed(&self) -> u32 {
        1
    }

    unsafe fn prepare<'sq>(&mut self, sqs: &mut SQEs<'sq>) -> SQE<'sq> {
        self.mhdr.msg_name = &mut *self.addr as *mut libc::sockaddr_storage as *mut libc::c_void;
        self.mhdr.msg_namelen = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
        self.mhdr.msg_iov = &mut self.buf as *mut _ as *mut libc::iovec;
        self.mhdr.msg_iovlen = 1;

        let mut sqe = sqs.single().unwrap();
        sqe.prep_recvmsg(self.fd, &mut self.mhdr as *mut _, self.flags);
        sqe
    }

    fn cancel(this: ManuallyDrop<Self>) -> Cancellation {
        let this = ManuallyDrop::into_inner(this);
        Cancellation::from(Box::new((this.addr, this.buf)))
    }
}
