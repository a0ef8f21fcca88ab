//! # Policy engine (component E)
//!
//! Implements the public allocation contract (`init`/`alloc`/`free`/
//! `realloc`, §6) on top of the region adapter, block layout, segregated
//! index and coalescer/splitter. This is the only module that decides
//! *when* to extend the heap, *which* free block to use, and *how* to
//! react to a realloc request; everything else below it is mechanism.

use std::ptr;

use log::{debug, trace, warn};

use crate::block;
use crate::coalesce::{self, Side};
use crate::config::{self, D, W};
use crate::error::{AllocError, CheckError};
use crate::freelist::{self, FreeIndex};
use crate::region::Region;
use crate::{align_to};

/// Owns the single heap region and all allocator state. Created by
/// [`Allocator::init`] and passed by the caller to every other operation,
/// per `spec.md` §5/§9 — there is no process-wide global here, so nothing
/// stops a caller from keeping two `Allocator`s, but `init` itself only
/// ever grows the one real OS heap (`sbrk` is process-wide), so in
/// practice only one should be live at a time (§1 Non-goals: multiple
/// independent heap regions).
pub struct Allocator {
  region: Region,
  index: FreeIndex,
  /// Address of the epilogue header word — always the last tagged word in
  /// the region.
  epilogue: usize,
  /// Flips on every heap extension; selects the placement side for the
  /// next split (§4.D). Per Open Question (ii), `place` itself never
  /// flips this — only extension does.
  alt: bool,
}

impl Allocator {
  /// Brings up a fresh heap: grows the region for the alignment pad,
  /// prologue and epilogue sentinels, then extends once more for the
  /// initial free chunk (§3 Sentinels, §4.E Extension policy).
  pub fn init() -> Result<Self, AllocError> {
    unsafe {
      let mut region = Region::new();
      let base = region.grow(4 * W)?;

      // pad (1 word, left zeroed) | prologue header | prologue footer | epilogue header
      ptr::write(base as *mut u32, 0);
      block::set_tags(base + 2 * W, D, true);
      ptr::write((base + 3 * W) as *mut u32, block::pack(0, true));

      let mut allocator = Self { region, index: FreeIndex::new(), epilogue: base + 3 * W, alt: false };

      let initial_bp = allocator.extend(config::CHUNKSIZE)?;

      if config::INIT_PREPARTITION_COUNT > 0 {
        allocator.prepartition(initial_bp, config::INIT_PREPARTITION_COUNT, config::INIT_PREPARTITION_SIZE);
      }

      debug!("allocator initialized: region [{:#x}, {:#x})", allocator.region.lo(), allocator.region.hi());
      debug_assert!(allocator.check_heap().is_ok(), "invariants must hold immediately after init");

      Ok(allocator)
    }
  }

  /// Rounds a requested payload size `n` up to an eight-byte-aligned total
  /// block size, per §4.E's size-adjustment rule.
  ///
  /// Saturates at `usize::MAX` instead of overflowing (§7: "all size
  /// adjustments saturate at the native word width"), so a caller-supplied
  /// `n` near `usize::MAX` degrades to an oversized `asize` that
  /// `Region::grow`'s own bounds check rejects, rather than panicking (in a
  /// debug build) or wrapping to an undersized block (in a release build).
  fn adjust_size(n: usize) -> usize {
    if n <= D {
      2 * D
    } else {
      D.saturating_mul(n.saturating_add(D).saturating_add(D - 1) / D)
    }
  }

  /// Extends the region by `bytes` (rounded to a double word), tags the
  /// new space as one free block, coalesces it with the preceding block
  /// if that was free, and inserts the result into the index. Flips `alt`
  /// on success.
  ///
  /// Returns the payload pointer of the (possibly merged) free block.
  ///
  /// # Safety
  ///
  /// Must only be called while the region's prologue/epilogue invariants
  /// already hold (i.e. after `init` has run).
  unsafe fn extend(&mut self, bytes: usize) -> Result<usize, AllocError> {
    let bytes = align_to!(bytes, D);

    let base = unsafe { self.region.grow(bytes)? };
    debug_assert_eq!(base, self.epilogue, "the region must grow immediately after the old epilogue");

    let bp = self.epilogue + W;
    unsafe { block::set_tags(bp, bytes, false) };

    let new_epilogue = bp + bytes;
    unsafe { ptr::write(new_epilogue as *mut u32, block::pack(0, true)) };
    self.epilogue = new_epilogue;

    let merged_bp = unsafe { coalesce::coalesce(&mut self.index, bp) };

    if config::ALT_PLACEMENT_ENABLED {
      self.alt = !self.alt;
    }

    trace!("extended heap by {bytes} bytes, new epilogue at {new_epilogue:#x}, alt now {}", self.alt);

    Ok(merged_bp)
  }

  /// Carves the free block at `bp` into up to `count` fixed-`size` free
  /// blocks plus one free remainder, and inserts all of them into the
  /// index (§4.F). `bp` must not currently be in the index. `init` always
  /// calls this with `config::INIT_PREPARTITION_COUNT`/`_SIZE`; the count
  /// and size are parameters (rather than reading `config` directly) so
  /// tests can exercise the carving loop independently of that constant's
  /// default of `0`.
  unsafe fn prepartition(&mut self, bp: usize, count: usize, size: usize) {
    unsafe { self.index.unlink(bp) };

    let mut cursor = bp;
    let mut remaining = unsafe { block::size(cursor) };

    for _ in 0..count {
      if remaining < size + config::FREE_MIN {
        break;
      }
      unsafe {
        block::set_tags(cursor, size, false);
        self.index.insert(cursor);
      }
      cursor = unsafe { block::next_bp(cursor) };
      remaining -= size;
    }

    unsafe {
      block::set_tags(cursor, remaining, false);
      self.index.insert(cursor);
    }
  }

  /// Bounded best-fit search (§4.E): scans size classes from `class(asize)`
  /// upward; within the first class that has any candidate, tracks the
  /// smallest block of size `>= asize`, bounded by [`config::FIT_DEPTH`]
  /// once a first candidate is found, and returns immediately on an exact
  /// match. Blocks in later classes only get examined if the current
  /// class yields nothing, since every block in a later class is already
  /// larger than anything a best-fit scan of the current class would
  /// have preferred.
  fn find_fit(&self, asize: usize) -> Option<usize> {
    let start_class = freelist::class_of(asize);

    for class in start_class..freelist::K {
      let mut best: Option<usize> = None;
      let mut best_size = usize::MAX;
      let mut scanned = 0usize;

      let mut bp = self.index.head(class);
      while bp != 0 {
        let size = unsafe { block::size(bp) };
        if size >= asize {
          if size == asize {
            return Some(bp);
          }
          if size < best_size {
            best = Some(bp);
            best_size = size;
          }
          scanned += 1;
          if let Some(depth) = config::FIT_DEPTH {
            if scanned > depth {
              break;
            }
          }
        }
        bp = unsafe { block::free_next(bp) };
      }

      if best.is_some() {
        return best;
      }
    }

    None
  }

  /// Allocates `n` payload bytes, 8-byte aligned. Returns null on
  /// `n == 0` (no side effects) or on allocation failure.
  pub fn alloc(&mut self, n: usize) -> *mut u8 {
    if n == 0 {
      return ptr::null_mut();
    }

    let asize = Self::adjust_size(n);

    let bp = match self.find_fit(asize) {
      Some(bp) => {
        unsafe { self.index.unlink(bp) };
        bp
      }
      None => {
        let grow_bytes = asize.max(config::CHUNKSIZE);
        let merged_bp = match unsafe { self.extend(grow_bytes) } {
          Ok(bp) => bp,
          Err(err) => {
            warn!("alloc({n}): {err}");
            return ptr::null_mut();
          }
        };
        unsafe { self.index.unlink(merged_bp) };
        merged_bp
      }
    };

    let side = if self.alt { Side::Right } else { Side::Left };
    let alloc_bp = unsafe { coalesce::split(&mut self.index, bp, asize, side, config::SPLIT_THRESHOLD_MALLOC) };

    trace!("alloc({n}) -> {asize} bytes at {alloc_bp:#x}");
    alloc_bp as *mut u8
  }

  /// Frees a block previously returned by `alloc`/`realloc`. `free(null)`
  /// is a no-op; any other invalid pointer is undefined behavior (§7).
  pub fn free(&mut self, p: *mut u8) {
    if p.is_null() {
      return;
    }

    let bp = p as usize;
    let size = unsafe { block::size(bp) };
    unsafe {
      block::set_tags(bp, size, false);
      coalesce::coalesce(&mut self.index, bp);
    }

    trace!("free({bp:#x}) (size {size})");
  }

  /// Resizes the allocation at `p` to `n` payload bytes (§4.E).
  ///
  /// `realloc(null, n)` behaves as `alloc(n)`; `realloc(p, 0)` behaves as
  /// `free(p)` and returns null.
  pub fn realloc(&mut self, p: *mut u8, n: usize) -> *mut u8 {
    if p.is_null() {
      return self.alloc(n);
    }
    if n == 0 {
      self.free(p);
      return ptr::null_mut();
    }

    let bp = p as usize;
    let asize = Self::adjust_size(n);
    let oldsize = unsafe { block::size(bp) };

    // Case A: shrink in place.
    if asize <= oldsize {
      let result = unsafe { coalesce::split(&mut self.index, bp, asize, Side::Left, config::SPLIT_THRESHOLD_REALLOC) };
      trace!("realloc({bp:#x}, {n}): shrink in place -> {result:#x}");
      return result as *mut u8;
    }

    let next = unsafe { block::next_bp(bp) };
    let next_free = !unsafe { block::is_alloc(next) };
    let next_size = unsafe { block::size(next) };

    let prev = unsafe { block::prev_bp(bp) };
    let prev_free = !unsafe { block::is_alloc(prev) };
    let prev_size = unsafe { block::size(prev) };

    // Case B: grow into next.
    if next_free && oldsize + next_size >= asize {
      unsafe {
        self.index.unlink(next);
        block::set_tags(bp, oldsize + next_size, true);
      }
      let result = unsafe { coalesce::split(&mut self.index, bp, asize, Side::Left, config::SPLIT_THRESHOLD_REALLOC) };
      trace!("realloc({bp:#x}, {n}): grew into next -> {result:#x}");
      return result as *mut u8;
    }

    // Case C: grow into previous.
    if prev_free && prev_size + oldsize >= asize {
      let copy_len = (oldsize - D).min(n);
      unsafe {
        self.index.unlink(prev);
        ptr::copy(bp as *const u8, prev as *mut u8, copy_len);
        block::set_tags(prev, prev_size + oldsize, true);
      }
      let result = unsafe { coalesce::split(&mut self.index, prev, asize, Side::Left, config::SPLIT_THRESHOLD_REALLOC) };
      trace!("realloc({bp:#x}, {n}): grew into previous -> {result:#x}");
      return result as *mut u8;
    }

    // Case D: grow into both neighbours.
    if prev_free && next_free && prev_size + oldsize + next_size >= asize {
      let copy_len = (oldsize - D).min(n);
      unsafe {
        self.index.unlink(prev);
        self.index.unlink(next);
        ptr::copy(bp as *const u8, prev as *mut u8, copy_len);
        block::set_tags(prev, prev_size + oldsize + next_size, true);
      }
      let result = unsafe { coalesce::split(&mut self.index, prev, asize, Side::Left, config::SPLIT_THRESHOLD_REALLOC) };
      trace!("realloc({bp:#x}, {n}): grew into both neighbours -> {result:#x}");
      return result as *mut u8;
    }

    // Case E: relocate.
    let buffered_n = n.saturating_mul(config::REALLOC_BUFFER);
    let new_ptr = self.alloc(buffered_n);
    if new_ptr.is_null() {
      warn!("realloc({bp:#x}, {n}): relocation failed, old block left intact");
      return ptr::null_mut();
    }

    let copy_len = (oldsize - D).min(n);
    unsafe { ptr::copy_nonoverlapping(bp as *const u8, new_ptr, copy_len) };
    self.free(p);

    trace!("realloc({bp:#x}, {n}): relocated -> {:#x}", new_ptr as usize);
    new_ptr
  }

  /// Checks every invariant in §3/§8 and reports the first violation
  /// found, or `Ok(())` if the heap is consistent.
  pub fn check_heap(&self) -> Result<(), CheckError> {
    if self.region.lo() == 0 {
      return Err(CheckError::MissingSentinel);
    }

    let prologue_bp = self.region.lo() + 2 * W;
    let prologue_tag = unsafe { block::header(prologue_bp) };
    if block::size_of_tag(prologue_tag) != D || !block::is_alloc_tag(prologue_tag) {
      return Err(CheckError::MissingSentinel);
    }

    let mut bp = unsafe { block::next_bp(prologue_bp) };
    let mut prev_was_free = false;
    let mut free_count = 0usize;

    loop {
      let header = unsafe { block::header(bp) };
      let size = block::size_of_tag(header);

      if size == 0 {
        if !block::is_alloc_tag(header) {
          return Err(CheckError::MissingSentinel);
        }
        break;
      }

      let footer = unsafe { block::footer(bp, size) };
      if header != footer {
        return Err(CheckError::TagMismatch { addr: bp, header, footer });
      }
      if size % 8 != 0 {
        return Err(CheckError::Misaligned { addr: bp, size, unit: 8 });
      }

      let alloc = block::is_alloc_tag(header);
      if alloc {
        if size < config::ALLOC_MIN {
          return Err(CheckError::TooSmall { addr: bp, size, min: config::ALLOC_MIN });
        }
      } else {
        if size < config::FREE_MIN {
          return Err(CheckError::TooSmall { addr: bp, size, min: config::FREE_MIN });
        }
        if prev_was_free {
          return Err(CheckError::UncoalescedNeighbors { first: unsafe { block::prev_bp(bp) }, second: bp });
        }

        free_count += 1;
        let expected_class = freelist::class_of(size);
        let actual_class =
          (0..freelist::K).find(|&class| self.index.iterate_from(class).take_while(|(c, _)| *c == class).any(|(_, b)| b == bp));
        match actual_class {
          Some(actual) if actual == expected_class => {}
          Some(actual) => return Err(CheckError::WrongSizeClass { addr: bp, size, expected: expected_class, actual }),
          None => return Err(CheckError::WrongSizeClass { addr: bp, size, expected: expected_class, actual: freelist::K }),
        }
      }

      prev_was_free = !alloc;
      bp = unsafe { block::next_bp(bp) };
    }

    let indexed_count = self.index.iterate_from(0).count();
    if indexed_count != free_count {
      return Err(CheckError::IndexMismatch { indexed: indexed_count, actual: free_count });
    }

    let (lo, hi) = (self.region.lo(), self.region.hi());
    for (_, bp) in self.index.iterate_from(0) {
      let next = unsafe { block::free_next(bp) };
      if next != 0 && !(lo <= next && next < hi) {
        return Err(CheckError::LinkOutOfBounds { addr: next });
      }
      let prev = unsafe { block::free_prev(bp) };
      if prev != 0 && !(lo <= prev && prev < hi) {
        return Err(CheckError::LinkOutOfBounds { addr: prev });
      }
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::{Mutex, OnceLock};

  /// `sbrk` mutates a single process-wide break; serializing the tests in
  /// this module avoids two `Allocator::init()` calls racing each other
  /// on it. This is a test-only concession to the Non-goal of thread
  /// safety (§1), not something the allocator itself needs to manage.
  fn heap_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
  }

  fn fresh() -> Allocator {
    Allocator::init().expect("init should succeed against a real process heap")
  }

  #[test]
  fn init_produces_a_consistent_heap() {
    let _guard = heap_lock().lock().unwrap();
    let a = fresh();
    assert!(a.check_heap().is_ok());
  }

  #[test]
  fn prepartition_carves_fixed_blocks_and_keeps_invariants() {
    let _guard = heap_lock().lock().unwrap();
    let mut a = fresh();

    // Exercise the loop body directly (INIT_PREPARTITION_COUNT defaults to
    // 0, which would otherwise never take this path -- §4.F still requires
    // every §3 invariant to hold on return when pre-partitioning runs).
    // `init` already extended once, leaving one large free block behind;
    // grab it straight from the index instead of re-deriving its size.
    let free_bp = a.index.iterate_from(0).map(|(_, bp)| bp).next().expect("init leaves one large free block");

    unsafe { a.prepartition(free_bp, 4, 64) };
    assert!(a.check_heap().is_ok());

    let small_class = freelist::class_of(64);
    let carved = a.index.iterate_from(small_class).take_while(|(c, _)| *c == small_class).count();
    assert!(carved >= 4, "expected at least the 4 carved 64-byte blocks in their size class");
  }

  #[test]
  fn alloc_zero_returns_null_without_side_effects() {
    let _guard = heap_lock().lock().unwrap();
    let mut a = fresh();
    let before = a.check_heap();
    let p = a.alloc(0);
    assert!(p.is_null());
    assert_eq!(a.check_heap(), before);
  }

  #[test]
  fn alloc_returns_eight_byte_aligned_pointers() {
    let _guard = heap_lock().lock().unwrap();
    let mut a = fresh();
    for n in [1usize, 7, 8, 9, 24, 100, 4000] {
      let p = a.alloc(n);
      assert!(!p.is_null());
      assert_eq!((p as usize) % 8, 0, "alloc({n}) returned misaligned pointer");
    }
    assert!(a.check_heap().is_ok());
  }

  #[test]
  fn scenario_alternating_alloc_free_same_size_reuses_block() {
    let _guard = heap_lock().lock().unwrap();
    let mut a = fresh();

    let p1 = a.alloc(40);
    assert!(!p1.is_null());
    a.free(p1);
    let p2 = a.alloc(40);

    assert_eq!(p1, p2, "freeing then re-allocating the same size should reuse the block");
    assert!(a.check_heap().is_ok());
  }

  #[test]
  fn scenario_coalesce_three_way_leaves_one_free_block() {
    let _guard = heap_lock().lock().unwrap();
    let mut a = fresh();

    let pa = a.alloc(64);
    let pb = a.alloc(64);
    let pc = a.alloc(64);
    assert!(![pa, pb, pc].iter().any(|p| p.is_null()));

    a.free(pa);
    a.free(pc);
    a.free(pb);

    assert!(a.check_heap().is_ok());

    // After the third free, a, b and c's combined space is one free block.
    let class = freelist::class_of(Allocator::adjust_size(64) * 3);
    let merged_count = a.index.iterate_from(class).take_while(|(c, _)| *c == class).count();
    assert!(merged_count >= 1, "expected the three freed blocks to have coalesced into one");
  }

  #[test]
  fn scenario_realloc_grow_into_next() {
    let _guard = heap_lock().lock().unwrap();
    let mut a = fresh();

    let p = a.alloc(40);
    let q = a.alloc(40);
    assert!(!p.is_null() && !q.is_null());

    unsafe {
      for i in 0..40u8 {
        ptr::write(p.add(i as usize), i);
      }
    }

    a.free(q);
    let p2 = a.realloc(p, 80);

    assert_eq!(p2, p, "growing into a freed next-neighbour should keep the pointer stable");
    unsafe {
      for i in 0..40u8 {
        assert_eq!(ptr::read(p2.add(i as usize)), i, "payload bytes must survive an in-place realloc");
      }
    }
    assert!(a.check_heap().is_ok());
  }

  #[test]
  fn scenario_realloc_relocates_and_preserves_payload() {
    let _guard = heap_lock().lock().unwrap();
    let mut a = fresh();

    let p = a.alloc(40);
    let _q = a.alloc(40); // keeps p's neighbour allocated so in-place growth cannot happen
    assert!(!p.is_null());

    unsafe {
      for i in 0..40u8 {
        ptr::write(p.add(i as usize), i ^ 0xA5);
      }
    }

    let r = a.realloc(p, 4096);
    assert!(!r.is_null());
    assert_ne!(r, p, "growing far beyond the neighbourhood must relocate");

    unsafe {
      for i in 0..40u8 {
        assert_eq!(ptr::read(r.add(i as usize)), i ^ 0xA5);
      }
    }
    assert!(a.check_heap().is_ok());
  }

  #[test]
  fn realloc_null_behaves_as_alloc_and_zero_behaves_as_free() {
    let _guard = heap_lock().lock().unwrap();
    let mut a = fresh();

    let p = a.realloc(ptr::null_mut(), 32);
    assert!(!p.is_null());

    let null = a.realloc(p, 0);
    assert!(null.is_null());
    assert!(a.check_heap().is_ok());
  }

  #[test]
  fn realloc_shrink_keeps_the_same_pointer() {
    let _guard = heap_lock().lock().unwrap();
    let mut a = fresh();

    let p = a.alloc(200);
    assert!(!p.is_null());
    let p2 = a.realloc(p, 16);

    assert_eq!(p, p2, "shrinking in place must return the same pointer");
    assert!(a.check_heap().is_ok());
  }

  #[test]
  fn out_of_memory_on_an_impossible_request_returns_null_and_keeps_consistency() {
    let _guard = heap_lock().lock().unwrap();
    let mut a = fresh();

    // No real process has this much address space available via sbrk.
    let p = a.alloc(usize::MAX / 2);
    assert!(p.is_null());
    assert!(a.check_heap().is_ok());

    // A small allocation must still succeed afterwards.
    let q = a.alloc(32);
    assert!(!q.is_null());
  }

  #[test]
  fn alloc_of_usize_max_saturates_instead_of_panicking() {
    let _guard = heap_lock().lock().unwrap();
    let mut a = fresh();

    // adjust_size(usize::MAX) would overflow with plain `+`/`*` (panics in
    // debug, wraps to an undersized block in release); it must instead
    // saturate and fail through Region::grow's bounds check like any other
    // unsatisfiable request.
    let p = a.alloc(usize::MAX);
    assert!(p.is_null());
    assert!(a.check_heap().is_ok());

    let q = a.alloc(32);
    assert!(!q.is_null());
  }
}
