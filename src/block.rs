//! # Block layout (component B)
//!
//! Pure address arithmetic over a payload pointer `bp` (§4.B). These are the
//! only functions in the crate permitted to reinterpret raw memory as a tag
//! word or a link; every other component goes through them.
//!
//! A block's **header** is the word at `bp - W`; its **footer** is the word
//! at `bp + size - D`. Both carry the same packed `tag = size | alloc_bit`.
//! A free block additionally stores its intrusive list links as the first
//! two pointer-sized words of its payload (`bp` and `bp + PTR_SIZE`).

use std::ptr;

use crate::config::{D, PTR_SIZE, W};

/// Packs a block size (always a multiple of 8, so its low 3 bits are free)
/// with an allocation bit into one tag word.
pub fn pack(size: usize, alloc: bool) -> u32 {
  debug_assert_eq!(size & 0x7, 0, "block size must be a multiple of 8");
  (size as u32) | (alloc as u32)
}

/// Extracts the size from a tag word.
pub fn size_of_tag(tag: u32) -> usize {
  (tag & !0x7) as usize
}

/// Extracts the allocation bit from a tag word.
pub fn is_alloc_tag(tag: u32) -> bool {
  (tag & 0x1) != 0
}

fn header_addr(bp: usize) -> usize {
  bp - W
}

fn footer_addr(bp: usize, size: usize) -> usize {
  bp + size - D
}

unsafe fn read_tag(addr: usize) -> u32 {
  unsafe { ptr::read(addr as *const u32) }
}

unsafe fn write_tag(addr: usize, tag: u32) {
  unsafe { ptr::write(addr as *mut u32, tag) }
}

/// Reads the header tag at `bp`.
pub unsafe fn header(bp: usize) -> u32 {
  unsafe { read_tag(header_addr(bp)) }
}

/// Reads the block's size from its header.
pub unsafe fn size(bp: usize) -> usize {
  unsafe { size_of_tag(header(bp)) }
}

/// Reads the block's allocation bit from its header.
pub unsafe fn is_alloc(bp: usize) -> bool {
  unsafe { is_alloc_tag(header(bp)) }
}

/// Reads the footer tag of the block whose size is `size`.
pub unsafe fn footer(bp: usize, size: usize) -> u32 {
  unsafe { read_tag(footer_addr(bp, size)) }
}

/// Writes identical header and footer tags for a block of size `size`,
/// preserving invariant 1 (header == footer) by construction.
pub unsafe fn set_tags(bp: usize, size: usize, alloc: bool) {
  let tag = pack(size, alloc);
  unsafe {
    write_tag(header_addr(bp), tag);
    write_tag(footer_addr(bp, size), tag);
  }
}

/// Payload pointer of the block immediately following `bp`.
pub unsafe fn next_bp(bp: usize) -> usize {
  unsafe { bp + size(bp) }
}

/// Payload pointer of the block immediately preceding `bp`, found via the
/// previous block's footer (the boundary tag).
pub unsafe fn prev_bp(bp: usize) -> usize {
  let prev_footer = bp - D;
  let prev_size = unsafe { size_of_tag(read_tag(prev_footer)) };
  bp - prev_size
}

/// Reads the `next` free-list link stored in a free block's payload.
pub unsafe fn free_next(bp: usize) -> usize {
  unsafe { ptr::read(bp as *const usize) }
}

/// Writes the `next` free-list link.
pub unsafe fn set_free_next(bp: usize, next: usize) {
  unsafe { ptr::write(bp as *mut usize, next) }
}

/// Reads the `prev` free-list link stored in a free block's payload.
pub unsafe fn free_prev(bp: usize) -> usize {
  unsafe { ptr::read((bp + PTR_SIZE) as *const usize) }
}

/// Writes the `prev` free-list link.
pub unsafe fn set_free_prev(bp: usize, prev: usize) {
  unsafe { ptr::write((bp + PTR_SIZE) as *mut usize, prev) }
}
