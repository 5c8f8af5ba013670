use std::mem::ManuallyDrop;
use std::os::unix::io::RawFd;

use super::{Cancellation, Event, SQE, SQEs};

pub struct Close {
    fd: RawFd,
}

impl Close {
    pub fn new(fd: RawFd) -> Close {
        Close { fd }
    }
}

impl Event for Close {
    unsafe fn prepare<'sq>(&mut self, sqs: &mut SQEs<'sq>) -> SQE<'sq> {
        let mut sqe = sqs.single().unwrap();
        sqe.prep_close(self.fd);
        sqe
    }

    fn cancel(this: ManuallyDrop<Self>) -> Cancellation {
        drop(ManuallyDrop::into_inner(this));
        Cancellation::null()
    }
}
