//! Events that can be scheduled on io-uring with a [`crate::Submission`].

mod accept;
mod cancellation;
mod close;
mod connect;
mod epoll_ctl;
mod fadvise;
mod fallocate;
mod files_update;
mod fsync;
mod openat;
mod provide_buffers;
mod read;
mod readv;
mod recv;
mod recvfrom;
mod send;
mod sendto;
mod splice;
mod statx;
mod timeout;
mod write;
mod writev;

use std::mem::ManuallyDrop;

use iou::{SQE, SQEs};

pub use accept::Accept;
pub use cancellation::Cancellation;
pub use close::Close;
pub use connect::Connect;
pub use epoll_ctl::EpollCtl;
pub use fadvise::Fadvise;
pub use fallocate::Fallocate;
pub use files_update::FilesUpdate;
pub use fsync::Fsync;
pub use openat::OpenAt;
pub use provide_buffers::{ProvideBuffers, RemoveBuffers};
pub use read::{Read, ReadFixed};
pub use readv::ReadVectored;
pub use recv::Recv;
pub use recvfrom::RecvFrom;
pub use send::Send;
pub use sendto::SendTo;
pub use splice::Splice;
pub use statx::Statx;
pub use timeout::{StaticTimeout, Timeout};
pub use write::{Write, WriteFixed};
pub use writev::WriteVectored;

/// An IO event that can be scheduled on an io-uring driver.
///
/// ## Safety
///
/// Event is a safe trait with two unsafe methods. It's important to understand that when
/// implementing an unsafe method, the code author implementing that method is allowed to assume
/// certain additional invariants will be upheld by all callers. It is the caller's responsibility
/// to ensure those invariants are upheld, not the implementer. However, any unsafe operations
/// performed inside of the method must be safe under those invariants and any other invariants the
/// implementer has upheld. The implementer is not allowed to add any additional invariants that
/// the caller must uphold that are not required by the trait.
pub trait Event {
    /// How many submission queue entries this event needs to be prepared.
    fn sqes_needed(&self) -> u32 {
        1
    }

    /// Prepare an event to be submitted using the SQEs allotted to it by `sqes_needed`.
    ///
    /// ## Safety
    ///
    /// When this method is called, these guarantees will be maintained by the caller:
    ///
    /// The data contained by this event will not be accessed again by this program until one of
    /// two things happen:
    /// - The event being prepared has been completed by the kernel, in which case ownership of
    ///   this event will be passed back to users of this library.
    /// - Interest in the event is cancelled, in which case `Event::cancel` will be called and the
    ///   event's destructor will not run.
    ///
    /// The only method that will be called on this event in the meantime is the `is_eager` method.
    /// Users cannot assume that the is_eager method will not be called.
    ///
    /// In essence, implementing prepare, users can write code as if any heap addresses passed to
    /// the kernel have passed ownership of that data to the kernel for the time the event is
    /// outstanding.
    unsafe fn prepare<'sq>(&mut self, sqs: &mut SQEs<'sq>) -> SQE<'sq>;

    /// Return the cancellation callback for this event.
    ///
    /// If this event is cancelled, this callback will be stored with the completion to be dropped
    /// when the IO event completes. This way, any managed resources passed to the kernel (like
    /// buffers) can be cleaned up once the kernel no longer needs them.
    ///
    /// The default does nothing, which is correct for events that own no resources the kernel
    /// needs to keep alive past cancellation (e.g. `fsync`, `close`).
    fn cancel(this: ManuallyDrop<Self>) -> Cancellation
    where
        Self: Sized,
    {
        drop(ManuallyDrop::into_inner(this));
        Cancellation::null()
    }

    /// Hint if this event is eager, i.e. whether the driver should try to submit it immediately
    /// rather than batching it with other work.
    fn is_eager(&self) -> bool {
        true
    }
}
