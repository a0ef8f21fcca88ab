//! # Region adapter (component A)
//!
//! Wraps the external heap-extension primitive (`sbrk(2)`, via `libc`) and
//! tracks the current `[lo, hi)` bounds of the managed address range.
//!
//! This is the only module in the crate that calls into the OS to change
//! the size of the heap; it never interprets block tags — that is
//! [`crate::block`]'s job.

use std::mem;

use libc::{c_void, intptr_t, sbrk};
use log::trace;

use crate::align;
use crate::config::W;
use crate::error::AllocError;

/// Tracks the bounds of the single contiguous region this allocator owns.
///
/// `lo`/`hi` are both `0` before the first successful [`Region::grow`].
pub struct Region {
  lo: usize,
  hi: usize,
}

impl Region {
  pub fn new() -> Self {
    Self { lo: 0, hi: 0 }
  }

  /// Low bound of the managed region. `0` if nothing has been grown yet.
  pub fn lo(&self) -> usize {
    self.lo
  }

  /// High bound (one past the last managed byte).
  pub fn hi(&self) -> usize {
    self.hi
  }

  /// Extends the region by `bytes`, rounded up to a whole number of words.
  ///
  /// Returns the base address of the newly added extension, i.e. the
  /// region's old `hi()`.
  ///
  /// # Safety
  ///
  /// Must not be called concurrently with any other region/heap operation;
  /// `sbrk` mutates process-wide state.
  pub unsafe fn grow(&mut self, bytes: usize) -> Result<usize, AllocError> {
    let bytes = align!(bytes);

    if bytes > isize::MAX as usize {
      return Err(AllocError::OutOfMemory { requested: bytes });
    }

    let old_break = unsafe { sbrk(bytes as intptr_t) };
    if old_break == usize::MAX as *mut c_void {
      return Err(AllocError::OutOfMemory { requested: bytes });
    }

    let base = old_break as usize;
    if self.lo == 0 {
      self.lo = base;
    }
    self.hi = base + bytes;

    trace!("region grew by {bytes} bytes, base = {base:#x}, new hi = {:#x}", self.hi);

    Ok(base)
  }
}

impl Default for Region {
  fn default() -> Self {
    Self::new()
  }
}

const _: () = assert!(mem::size_of::<u32>() as usize == W);
