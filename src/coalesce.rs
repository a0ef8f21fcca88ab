//! # Coalescer / splitter (component D)
//!
//! [`coalesce`] merges a newly-freed block with any adjacent free
//! neighbours and reinserts the result into the segregated index (§4.D,
//! the four-case boundary-tag scheme). [`split`] divides an oversized free
//! block into an allocated piece and a free remainder when the remainder
//! is large enough to be worth keeping.

use log::trace;

use crate::block;
use crate::freelist::FreeIndex;

/// Which side of a split free block receives the allocated piece.
///
/// A single `alt` bit on the policy engine toggles this on every heap
/// extension (§4.D); either side is correct, they only differ in their
/// fragmentation behaviour under adversarial workloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
  Left,
  Right,
}

/// Merges `bp` with any free neighbours and inserts the resulting block
/// into `index`. Returns the payload pointer of the (possibly merged)
/// free block.
///
/// `bp` itself must **not** already be present in `index` — it is the
/// newly-freed or newly-extended block this call is responsible for
/// placing.
///
/// # Safety
///
/// `bp` must be a valid free block with correct boundary tags, bracketed
/// by the prologue/epilogue sentinels so `prev_bp`/`next_bp` never walk
/// outside the region.
pub unsafe fn coalesce(index: &mut FreeIndex, bp: usize) -> usize {
  let size = unsafe { block::size(bp) };
  let prev = unsafe { block::prev_bp(bp) };
  let next = unsafe { block::next_bp(bp) };
  let prev_alloc = unsafe { block::is_alloc(prev) };
  let next_alloc = unsafe { block::is_alloc(next) };

  let merged_bp = match (prev_alloc, next_alloc) {
    (true, true) => {
      trace!("coalesce {bp:#x}: both neighbours allocated, no merge");
      bp
    }
    (true, false) => {
      let next_size = unsafe { block::size(next) };
      unsafe {
        index.unlink(next);
        block::set_tags(bp, size + next_size, false);
      }
      trace!("coalesce {bp:#x}: merged with next {next:#x} -> size {}", size + next_size);
      bp
    }
    (false, true) => {
      let prev_size = unsafe { block::size(prev) };
      unsafe {
        index.unlink(prev);
        block::set_tags(prev, prev_size + size, false);
      }
      trace!("coalesce {bp:#x}: merged with prev {prev:#x} -> size {}", prev_size + size);
      prev
    }
    (false, false) => {
      let prev_size = unsafe { block::size(prev) };
      let next_size = unsafe { block::size(next) };
      unsafe {
        index.unlink(prev);
        index.unlink(next);
        block::set_tags(prev, prev_size + size + next_size, false);
      }
      trace!(
        "coalesce {bp:#x}: merged with prev {prev:#x} and next {next:#x} -> size {}",
        prev_size + size + next_size
      );
      prev
    }
  };

  unsafe { index.insert(merged_bp) };
  merged_bp
}

/// Splits the free block at `bp` (not currently in `index`) to satisfy a
/// request of adjusted size `asize`.
///
/// If the leftover (`size(bp) - asize`) is at least `threshold`, the block
/// is divided: the allocated piece goes on `side`, the free remainder is
/// inserted into `index`. Otherwise the whole block is allocated.
///
/// Returns the payload pointer of the allocated piece.
///
/// # Safety
///
/// `bp` must be a free block of size `>= asize`, not present in `index`.
pub unsafe fn split(index: &mut FreeIndex, bp: usize, asize: usize, side: Side, threshold: usize) -> usize {
  let csize = unsafe { block::size(bp) };
  debug_assert!(csize >= asize);
  let remainder = csize - asize;

  if remainder < threshold {
    unsafe { block::set_tags(bp, csize, true) };
    trace!("split {bp:#x}: consumed whole block of size {csize} (remainder {remainder} < threshold {threshold})");
    return bp;
  }

  match side {
    Side::Left => {
      let free_bp = bp + asize;
      unsafe {
        block::set_tags(bp, asize, true);
        block::set_tags(free_bp, remainder, false);
        index.insert(free_bp);
      }
      trace!("split {bp:#x}: left placement, allocated {asize}, remainder {remainder} at {free_bp:#x}");
      bp
    }
    Side::Right => {
      let alloc_bp = bp + remainder;
      unsafe {
        block::set_tags(bp, remainder, false);
        block::set_tags(alloc_bp, asize, true);
        index.insert(bp);
      }
      trace!("split {bp:#x}: right placement, remainder {remainder}, allocated {asize} at {alloc_bp:#x}");
      alloc_bp
    }
  }
}
