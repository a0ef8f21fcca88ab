//! Build-time tunables for the allocator (component F).
//!
//! Every constant here is named in `spec.md` §4/§9 as a policy knob rather
//! than a fixed rule; collecting them in one module is what lets tests
//! exercise alternate policies (see `freelist::class_of` tests) without
//! touching the policy engine itself.

/// Machine word size in bytes. Header and footer tags are one word wide.
pub const W: usize = 4;

/// Double word size in bytes; the unit of payload alignment and of every
/// block's total size.
pub const D: usize = 2 * W;

/// Width of the intrusive next/prev links stored in a free block's payload.
/// The design doc fixes this at 8 bytes ("on a 64-bit target"); it is kept
/// separate from `D` because some targets could in principle differ.
pub const PTR_SIZE: usize = 8;

/// Smallest total size of an allocated block: header + footer + one
/// double-word payload slot.
pub const ALLOC_MIN: usize = 2 * D;

/// Smallest total size of a free block: large enough to also hold the
/// intrusive next/prev links.
pub const FREE_MIN: usize = 2 * D + 2 * PTR_SIZE;

/// Default heap extension granularity, in bytes.
pub const CHUNKSIZE: usize = 4096;

/// Split threshold used by `malloc`: split whenever the leftover is at
/// least one free-minimum block.
pub const SPLIT_THRESHOLD_MALLOC: usize = FREE_MIN;

/// Split threshold used by `realloc`'s in-place cases. Deliberately larger
/// than the malloc threshold so that shrinking/growing in place doesn't
/// carve off slivers that immediately get re-absorbed on the next call.
pub const SPLIT_THRESHOLD_REALLOC: usize = CHUNKSIZE;

/// Multiplier applied to the requested payload size when `realloc` must
/// relocate (§4.E Case E). `1` disables buffering.
pub const REALLOC_BUFFER: usize = 1;

/// Whether the allocator alternates the placement side (left/right) on
/// every heap extension. Disabling this degenerates to always-left
/// placement; correctness does not depend on it (§4.D).
pub const ALT_PLACEMENT_ENABLED: bool = true;

/// Number of fixed-size free blocks to carve out of the very first heap
/// extension (§4.F). `0` disables pre-partitioning, the documented default.
pub const INIT_PREPARTITION_COUNT: usize = 0;

/// Size of each pre-partitioned block when `INIT_PREPARTITION_COUNT > 0`.
pub const INIT_PREPARTITION_SIZE: usize = 64;

/// Bounded best-fit search depth: after a first fit is found in a size
/// class, how many further nodes in that class to examine looking for a
/// tighter fit. `None` means unbounded (true best-fit within the class).
pub const FIT_DEPTH: Option<usize> = None;
