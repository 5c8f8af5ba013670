//! A lazily-allocated read/write scratch buffer shared by the file and
//! socket handles, each of which multiplexes one buffer between its read
//! and write paths (only one op is ever outstanding on a handle at a time).

use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use std::cmp;
use std::mem;
use std::ptr;
use std::slice;

use crate::event::Cancellation;

pub(crate) struct Buffer {
    data: *mut u8,
    capacity: u32,
    consumed: u32,
    read: u32,
    written: u32,
}

impl Buffer {
    pub(crate) fn new() -> Buffer {
        Buffer {
            data: ptr::null_mut(),
            capacity: 4096 * 2,
            consumed: 0,
            read: 0,
            written: 0,
        }
    }

    pub(crate) fn read_buf(&mut self) -> &mut [u8] {
        &mut self.data_mut()[..]
    }

    pub(crate) fn write_buf(&mut self) -> &mut [u8] {
        let written = self.written as usize;
        &mut self.data_mut()[..written]
    }

    pub(crate) fn has_read(&self) -> u32 {
        self.read
    }

    pub(crate) fn set_read(&mut self, read: u32) {
        self.read = read;
        self.consumed = 0;
    }

    pub(crate) fn consumed(&self) -> u32 {
        self.consumed
    }

    pub(crate) fn needs_fill(&self) -> bool {
        self.consumed >= self.read
    }

    pub(crate) fn fill_from(&mut self, slice: &[u8]) {
        self.written = std::io::Write::write(&mut self.data_mut(), slice).unwrap() as u32;
    }

    pub(crate) fn clear_written(&mut self) {
        self.written = 0;
    }

    pub(crate) fn consume(&mut self, amt: usize) {
        self.consumed = cmp::min(self.consumed + amt as u32, self.read);
    }

    pub(crate) fn data(&mut self) -> &[u8] {
        let data = self.lazy_alloc();
        unsafe { slice::from_raw_parts(data, self.capacity as usize) }
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        let data = self.lazy_alloc();
        unsafe { slice::from_raw_parts_mut(data, self.capacity as usize) }
    }

    pub(crate) fn cancellation(&mut self) -> Cancellation {
        let data = mem::replace(&mut self.data, ptr::null_mut());
        if data == ptr::null_mut() {
            Cancellation::null()
        } else {
            unsafe { Cancellation::buffer(data, self.capacity as usize) }
        }
    }

    #[inline(always)]
    fn lazy_alloc(&mut self) -> *mut u8 {
        if self.data == ptr::null_mut() {
            let layout = Layout::array::<u8>(self.capacity as usize).unwrap();
            let ptr = unsafe { alloc(layout) };
            if ptr == ptr::null_mut() {
                handle_alloc_error(layout);
            }
            self.data = ptr;
        }

        self.data
    }
}

unsafe impl Send for Buffer {}
unsafe impl Sync for Buffer {}

impl Drop for Buffer {
    fn drop(&mut self) {
        if self.data != ptr::null_mut() {
            unsafe {
                dealloc(self.data, Layout::array::<u8>(self.capacity as usize).unwrap());
            }
        }
    }
}
