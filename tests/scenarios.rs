//! End-to-end scenarios exercising `Allocator` through its public API only,
//! matching the six walkthroughs in `spec.md` §8.

use std::ptr;
use std::sync::{Mutex, OnceLock};

use segalloc::Allocator;

/// `sbrk` mutates a single process-wide break. Integration tests in this
/// file run in one process, and by default `cargo test` runs them
/// concurrently on separate threads, so every test that calls
/// `Allocator::init` takes this lock first.
fn heap_lock() -> &'static Mutex<()> {
  static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
  LOCK.get_or_init(|| Mutex::new(()))
}

fn fresh() -> Allocator {
  Allocator::init().expect("init should succeed against a real process heap")
}

#[test]
fn alternating_alloc_free_of_the_same_size_reuses_the_block() {
  let _guard = heap_lock().lock().unwrap();
  let mut a = fresh();

  let mut last = ptr::null_mut();
  for round in 0..5 {
    let p = a.alloc(48);
    assert!(!p.is_null(), "round {round}: allocation failed");
    if round > 0 {
      assert_eq!(p, last, "round {round}: expected the freed block to be reused");
    }
    a.free(p);
    last = p;
  }

  assert!(a.check_heap().is_ok());
}

#[test]
fn first_allocation_splits_the_initial_chunk() {
  let _guard = heap_lock().lock().unwrap();
  let mut a = fresh();

  let p = a.alloc(64);
  assert!(!p.is_null());
  assert!(a.check_heap().is_ok());

  // A second, independent allocation must not overlap the first: if the
  // initial chunk hadn't been split, there would be nothing left to serve
  // this from without extending the heap (still correct, just would not
  // demonstrate a split) -- so we additionally check the two pointers are
  // far enough apart that they can't be the same block.
  let q = a.alloc(64);
  assert!(!q.is_null());
  assert_ne!(p, q);
  assert!((p as usize).abs_diff(q as usize) >= 64);

  assert!(a.check_heap().is_ok());
}

#[test]
fn freeing_three_adjacent_allocations_coalesces_them_into_one_block() {
  let _guard = heap_lock().lock().unwrap();
  let mut a = fresh();

  let p1 = a.alloc(32);
  let p2 = a.alloc(32);
  let p3 = a.alloc(32);
  assert!(![p1, p2, p3].iter().any(|p| p.is_null()));

  // Free in an order that forces all three coalesce cases: free/alloc,
  // alloc/free, then free/free.
  a.free(p2);
  a.free(p1);
  a.free(p3);

  assert!(a.check_heap().is_ok());

  // The combined space must be reusable by one request close to the sum
  // of the three original allocations.
  let merged = a.alloc(32 * 3 - 8);
  assert!(!merged.is_null());
  assert!(a.check_heap().is_ok());
}

#[test]
fn realloc_grows_into_a_freed_next_neighbour_without_moving() {
  let _guard = heap_lock().lock().unwrap();
  let mut a = fresh();

  let p = a.alloc(32);
  let q = a.alloc(32);
  assert!(!p.is_null() && !q.is_null());

  unsafe { ptr::write_bytes(p, 0x7A, 32) };
  a.free(q);

  let grown = a.realloc(p, 72);
  assert_eq!(grown, p, "growing into a freed next-neighbour must not relocate");

  unsafe {
    for i in 0..32 {
      assert_eq!(ptr::read(grown.add(i)), 0x7A);
    }
  }
  assert!(a.check_heap().is_ok());
}

#[test]
fn realloc_relocates_when_neighbours_cannot_satisfy_the_request() {
  let _guard = heap_lock().lock().unwrap();
  let mut a = fresh();

  let p = a.alloc(32);
  let _pin = a.alloc(32); // keeps p's next neighbour allocated
  assert!(!p.is_null());

  unsafe { ptr::write_bytes(p, 0x42, 32) };

  let moved = a.realloc(p, 8192);
  assert!(!moved.is_null());
  assert_ne!(moved, p);

  unsafe {
    for i in 0..32 {
      assert_eq!(ptr::read(moved.add(i)), 0x42);
    }
  }
  assert!(a.check_heap().is_ok());
}

#[test]
fn an_unsatisfiable_request_returns_null_and_leaves_the_heap_usable() {
  let _guard = heap_lock().lock().unwrap();
  let mut a = fresh();

  let p = a.alloc(usize::MAX - 1024);
  assert!(p.is_null());
  assert!(a.check_heap().is_ok());

  let q = a.alloc(64);
  assert!(!q.is_null());
  a.free(q);
  assert!(a.check_heap().is_ok());
}
