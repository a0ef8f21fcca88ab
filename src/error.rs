//! Error kinds surfaced by the allocator (§7).
//!
//! `AllocError` is used internally by [`crate::region::Region::grow`] and at
//! the public `alloc`/`realloc` boundary is collapsed into a null return, per
//! `spec.md` §6/§7. `init` is the one entry point that returns it directly,
//! since there is no pointer to return null from.
//!
//! `CheckError` is only produced by [`crate::allocator::Allocator::check_heap`];
//! it names which of the §3 invariants failed rather than just reporting
//! failure, so tests and logs can say why.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocError {
  #[error("region extension failed: sbrk refused to grow the heap by {requested} bytes")]
  OutOfMemory { requested: usize },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CheckError {
  #[error("block at {addr:#x}: header tag {header:#x} != footer tag {footer:#x}")]
  TagMismatch { addr: usize, header: u32, footer: u32 },

  #[error("block at {addr:#x} has size {size}, not a multiple of {unit}")]
  Misaligned { addr: usize, size: usize, unit: usize },

  #[error("block at {addr:#x} has size {size}, below the minimum of {min}")]
  TooSmall { addr: usize, size: usize, min: usize },

  #[error("adjacent free blocks at {first:#x} and {second:#x} were not coalesced")]
  UncoalescedNeighbors { first: usize, second: usize },

  #[error(
    "free block at {addr:#x} of size {size} belongs in class {expected} but was found in class {actual}"
  )]
  WrongSizeClass { addr: usize, size: usize, expected: usize, actual: usize },

  #[error("segregated index holds {indexed} free blocks but {actual} free blocks exist in the region")]
  IndexMismatch { indexed: usize, actual: usize },

  #[error("a free block's link pointed outside [lo, hi): {addr:#x}")]
  LinkOutOfBounds { addr: usize },

  #[error("prologue/epilogue sentinel missing or corrupted")]
  MissingSentinel,
}
