//! # segalloc - A Segregated-Fit Dynamic Storage Allocator
//!
//! This crate implements a segregated-fit `malloc`/`free`/`realloc` over a
//! single contiguous heap region grown on demand with `sbrk(2)`. It follows
//! the classic boundary-tag design: every block (allocated or free) carries
//! a header and footer tag so its neighbours can be found and merged in
//! constant time.
//!
//! ## Overview
//!
//! ```text
//!   Segregated Free Index:
//!
//!   class 0 (<=32)   ──▶ [free]──[free]──[free]
//!   class 1 (<=48)   ──▶ [free]
//!   class 2 (<=64)   ──▶ (empty)
//!   ...
//!   class K-1 (big)  ──▶ [free]──[free]
//!
//!   alloc(n) computes class(adjust(n)), scans that list and the ones
//!   above it for a fit, splits off any oversized leftover, and only
//!   extends the heap when nothing in the index fits.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   segalloc
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── config     - Tunable constants (component F)
//!   ├── error      - AllocError / CheckError (component G)
//!   ├── region     - sbrk-backed region adapter (component A)
//!   ├── block      - Boundary-tag block layout (component B)
//!   ├── freelist   - Segregated free index (component C)
//!   ├── coalesce   - Coalescer / splitter (component D)
//!   └── allocator  - Policy engine: init/alloc/free/realloc (component E)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use segalloc::Allocator;
//!
//! let mut allocator = Allocator::init().expect("heap init failed");
//!
//! unsafe {
//!     let p = allocator.alloc(64) as *mut u64;
//!     *p = 42;
//!     println!("value: {}", *p);
//!     allocator.free(p as *mut u8);
//! }
//! ```
//!
//! ## How It Works
//!
//! Every block is bracketed by a header and footer tag (size | alloc bit),
//! so `free` can find both neighbours in O(1) and merge with whichever of
//! them is itself free:
//!
//! ```text
//!   Single block:
//!   ┌────────┬──────────────────────────────┬────────┐
//!   │ header │           payload            │ footer │
//!   │ (4 B)  │  (>= 8 B, free: next/prev)    │ (4 B)  │
//!   └────────┴──────────────────────────────┴────────┘
//!            ▲
//!            └── pointer returned to the caller (`bp`)
//! ```
//!
//! ## Features
//!
//! - **Segregated fit**: size-classed free lists keep the common case O(1)
//! - **Boundary-tag coalescing**: immediate merge with both neighbours
//! - **Split placement policy**: alternates left/right on heap extension
//! - **In-place realloc**: grows into a freed neighbour before relocating
//!
//! ## Limitations (see `spec.md`'s Non-goals)
//!
//! - **Single-threaded only**: no synchronization; `Allocator` is an owned
//!   value, not a process-wide global
//! - **One region**: never returns memory to the OS, never opens a second
//!   region
//! - **Unix-only**: requires `libc` and `sbrk` (POSIX systems)
//!
//! ## Safety
//!
//! This crate is inherently unsafe as it deals with raw memory management.
//! [`Allocator::alloc`], [`Allocator::free`] and [`Allocator::realloc`] are
//! safe to *call*, but the pointers they hand out must be used the way any
//! `malloc`-family pointer must: within the returned size, and freed at most
//! once.

pub mod align;
mod allocator;
mod block;
mod coalesce;
mod config;
mod error;
mod freelist;
mod region;

pub use allocator::Allocator;
pub use error::{AllocError, CheckError};
