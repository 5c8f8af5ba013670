use std::any::Any;
use std::ffi::CString;
use std::mem;
use std::ptr;

use iou::registrar::RegisteredBuf;

/// A cancellation callback to clean up resources when IO gets cancelled.
///
/// When interest in an event is cancelled, the future representing that event gets dropped, but
/// it may share ownership of some data (like buffers) with the kernel, which is still completing
/// the event. The cancellation callback takes ownership of those resources and cleans them up
/// once the kernel is done with them.
pub struct Cancellation {
    data: *mut (),
    metadata: usize,
    callback: unsafe fn(*mut (), usize),
}

/// Types whose ownership can be handed to a [`Cancellation`].
///
/// ## Safety
///
/// `into_raw` and the paired `callback` function must agree on how to reconstruct and drop
/// `Self` from the returned `(data, metadata)` pair.
pub unsafe trait Cancel {
    fn into_raw(self) -> (*mut (), usize);
    unsafe fn callback(data: *mut (), metadata: usize);
}

unsafe impl<T> Cancel for Box<T> {
    fn into_raw(self) -> (*mut (), usize) {
        (Box::into_raw(self) as *mut (), 0)
    }

    unsafe fn callback(data: *mut (), _metadata: usize) {
        drop(Box::from_raw(data as *mut T));
    }
}

unsafe impl<T> Cancel for Box<[T]> {
    fn into_raw(self) -> (*mut (), usize) {
        let len = self.len();
        (Box::into_raw(self) as *mut T as *mut (), len)
    }

    unsafe fn callback(data: *mut (), len: usize) {
        drop(Vec::from_raw_parts(data as *mut T, len, len))
    }
}

#[repr(C)]
struct TraitObject {
    data: *mut (),
    vtable: *mut (),
}

unsafe impl Cancel for Box<dyn Any + Send + Sync> {
    fn into_raw(self) -> (*mut (), usize) {
        let obj = unsafe { mem::transmute::<Self, TraitObject>(self) };
        (obj.data, obj.vtable as usize)
    }

    unsafe fn callback(data: *mut (), metadata: usize) {
        let obj = TraitObject { data, vtable: metadata as *mut () };
        drop(mem::transmute::<TraitObject, Box<dyn Any + Send + Sync>>(obj));
    }
}

unsafe impl Cancel for RegisteredBuf {
    fn into_raw(self) -> (*mut (), usize) {
        self.into_inner().into_raw()
    }

    unsafe fn callback(data: *mut (), metadata: usize) {
        <Box<[u8]> as Cancel>::callback(data, metadata)
    }
}

unsafe impl Cancel for CString {
    fn into_raw(self) -> (*mut (), usize) {
        (self.into_raw() as *mut (), 0)
    }

    unsafe fn callback(data: *mut (), _metadata: usize) {
        drop(CString::from_raw(data as *mut libc::c_char));
    }
}

// Packs a zero-metadata boxed value alongside a CString, for events (like `statx`) that own two
// independently-allocated resources the kernel must finish with before either is freed.
unsafe impl<T> Cancel for (Box<T>, CString) {
    fn into_raw(self) -> (*mut (), usize) {
        let (boxed, cstring) = self;
        let data = Box::into_raw(boxed) as *mut ();
        let metadata = cstring.into_raw() as *mut () as usize;
        (data, metadata)
    }

    unsafe fn callback(data: *mut (), metadata: usize) {
        drop(Box::from_raw(data as *mut T));
        drop(CString::from_raw(metadata as *mut libc::c_char));
    }
}

unsafe impl Cancel for () {
    fn into_raw(self) -> (*mut (), usize) {
        (ptr::null_mut(), 0)
    }

    unsafe fn callback(_data: *mut (), _metadata: usize) {}
}

impl Cancellation {
    /// Construct a new cancellation callback to be run when the event is torn down.
    ///
    /// ## Safety
    ///
    /// `callback` will be called at most once, with exactly the `data`/`metadata` given here,
    /// and only after the kernel has yielded the CQE for the event this cancels.
    pub unsafe fn new(data: *mut (), metadata: usize, callback: unsafe fn(*mut (), usize)) -> Cancellation {
        Cancellation { data, metadata, callback }
    }

    /// A cancellation that does nothing when dropped.
    pub fn null() -> Cancellation {
        unsafe fn callback(_: *mut (), _: usize) {}
        Cancellation { data: ptr::null_mut(), metadata: 0, callback }
    }

    pub(crate) unsafe fn cancel(&mut self) {
        (self.callback)(self.data, self.metadata)
    }

    /// Construct a cancellation that reclaims a raw, heap-allocated byte buffer of `len` bytes.
    ///
    /// ## Safety
    ///
    /// `data` must point to a live allocation made with the global allocator using
    /// `Layout::array::<u8>(len)`, which this cancellation takes ownership of.
    pub(crate) unsafe fn buffer(data: *mut u8, len: usize) -> Cancellation {
        unsafe fn callback(data: *mut (), len: usize) {
            drop(Vec::from_raw_parts(data as *mut u8, len, len))
        }

        Cancellation::new(data as *mut (), len, callback)
    }
}

impl<T: Cancel> From<T> for Cancellation {
    fn from(object: T) -> Cancellation {
        let (data, metadata) = object.into_raw();
        unsafe { Cancellation::new(data, metadata, T::callback) }
    }
}

impl<T> From<Option<T>> for Cancellation
where
    Cancellation: From<T>,
{
    fn from(object: Option<T>) -> Cancellation {
        object.map_or_else(Cancellation::null, Cancellation::from)
    }
}

unsafe impl Send for Cancellation {}
unsafe impl Sync for Cancellation {}

impl Drop for Cancellation {
    fn drop(&mut self) {
        unsafe { self.cancel() }
    }
}
