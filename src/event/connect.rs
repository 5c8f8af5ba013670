use std::net::SocketAddr;
use std::mem::ManuallyDrop;
use std::os::unix::io::RawFd;

use super::{Cancellation, Event, SQE, SQEs};

pub struct Connect {
    pub fd: RawFd,
    addr: Box<libc::sockaddr_storage>,
    addrlen: libc::socklen_t,
}

impl Connect {
    pub fn new(fd: RawFd, addr: SocketAddr) -> Connect {
        let (addr, addrlen) = crate::net::addr_to_c(addr);
        Connect { fd, addr, addrlen }
    }
}

impl Event for Connect {
    unsafe fn prepare<'sq>(&mut self, sqs: &mut SQEs<'sq>) -> SQE<'sq> {
        let mut sqe = sqs.single().unwrap();
        let addr = &*self.addr as *const libc::sockaddr_storage as *const libc::sockaddr;
        uring_sys::io_uring_prep_connect(sqe.raw_mut(), self.fd, addr as *mut _, self.addrlen);
        sqe
    }

    fn cancel(this: ManuallyDrop<Self>) -> Cancellation {
        Cancellation::from(ManuallyDrop::into_inner(this).addr)
    }
}
