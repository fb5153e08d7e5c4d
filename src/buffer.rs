//! Device buffer: a fixed-size allocation of `f32` elements.
//!
//! The buffer is only read or written by kernels launched on the device
//! stream and by host transfers; Rust code never holds references into it.
//! That is what allows views to write through a shared borrow of the buffer.

use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::{MatrixError, Result};

/// A device allocation of `len` single-precision elements, freed on drop.
///
/// `DeviceBuffer` is `Send` but not `Sync`: one host thread at a time may
/// issue work against it.
pub struct DeviceBuffer {
    ptr: NonNull<f32>,
    len: usize,
    _not_sync: PhantomData<std::cell::Cell<f32>>,
}

// The allocation is uniquely owned by this value; moving it across threads is fine.
unsafe impl Send for DeviceBuffer {}

impl DeviceBuffer {
    /// Allocate `len` zero-initialized elements.
    pub fn zeros(len: usize) -> Result<Self> {
        let mut data: Vec<f32> = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| MatrixError::Allocation { elements: len })?;
        data.resize(len, 0.0);
        let raw = Box::into_raw(data.into_boxed_slice()) as *mut f32;
        let ptr = NonNull::new(raw).ok_or(MatrixError::Allocation { elements: len })?;
        log::debug!("allocated device buffer of {} elements at {:p}", len, raw);
        Ok(Self {
            ptr,
            len,
            _not_sync: PhantomData,
        })
    }

    /// Number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Device address of element 0.
    #[inline]
    pub fn as_ptr(&self) -> *mut f32 {
        self.ptr.as_ptr()
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        log::debug!("freeing device buffer of {} elements at {:p}", self.len, self.ptr);
        unsafe {
            let slice = std::ptr::slice_from_raw_parts_mut(self.ptr.as_ptr(), self.len);
            drop(Box::from_raw(slice));
        }
    }
}

impl std::fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}
