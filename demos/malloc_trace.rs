use std::{io::Read, ptr};

use libc::sbrk;
use segalloc::Allocator;

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`, `htop`,
/// `gdb`, or just visually track how allocations change the program break.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
/// The program break is the upper boundary of the heap managed via brk/sbrk.
unsafe fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

fn main() {
  env_logger::init();

  // A segregated-fit allocator over one sbrk-grown region. Unlike a pure
  // bump allocator it keeps a free-list index, so freed blocks come back.
  let mut allocator = Allocator::init().expect("heap init failed");

  unsafe {
    print_program_break("start");
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 1) Allocate space for a u32.
    // --------------------------------------------------------------------
    let first_block = allocator.alloc(size_of::<u32>());
    println!("\n[1] Allocate u32 -> {first_block:?}");

    let first_ptr = first_block as *mut u32;
    first_ptr.write(0xDEADBEEF);
    println!("[1] Value written to first_block = 0x{:X}", first_ptr.read());

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 2) Allocate 12 bytes (u8[12]).
    //    Shows how the adjust-size rule rounds "odd-sized" requests.
    // --------------------------------------------------------------------
    let second_block = allocator.alloc(12);
    println!("\n[2] Allocate [u8; 12] -> {second_block:?}");

    ptr::write_bytes(second_block, 0xAB, 12);
    println!("[2] Initialized second block with 0xAB");

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 3) Allocate a u64 to observe alignment (every block is 8-byte aligned).
    // --------------------------------------------------------------------
    let third_block = allocator.alloc(size_of::<u64>());
    println!("\n[3] Allocate u64 -> {third_block:?}");

    let third_ptr = third_block as *mut u64;
    third_ptr.write(0x1122334455667788);
    println!("[3] Value written = 0x{:X}", third_ptr.read());
    println!("[3] Address = {:#x}, addr % 8 = {}", third_block as usize, third_block as usize % 8);

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 4) Allocate an array of u16 to force more pointer movement.
    // --------------------------------------------------------------------
    let fourth_block = allocator.alloc(16 * size_of::<u16>());
    println!("\n[4] Allocate [u16; 16] -> {fourth_block:?}");

    let fourth_ptr = fourth_block as *mut u16;
    for i in 0..16 {
      fourth_ptr.add(i).write(i as u16);
    }
    println!("[4] Wrote 0..15 into the u16 array");

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 5) Free the first block.
    // --------------------------------------------------------------------
    allocator.free(first_block);
    println!("\n[5] Freed first_block at {first_block:?}");
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 6) Allocate a small block (2 bytes) to see if the allocator
    //    reuses the freed block.
    // --------------------------------------------------------------------
    let fifth_block = allocator.alloc(2);
    println!("\n[6] Allocate [u8; 2] -> {fifth_block:?} (check reuse of freed block)");
    println!(
      "[6] fifth_block == first_block? {}",
      if fifth_block == first_block { "yes, reused the freed block" } else { "no, allocated elsewhere" }
    );

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 7) Grow the fourth block in place with realloc, then shrink it back.
    // --------------------------------------------------------------------
    let grown = allocator.realloc(fourth_block, 256);
    println!("\n[7] realloc(fourth_block, 256) -> {grown:?}");
    let shrunk = allocator.realloc(grown, 4);
    println!("[7] realloc(.., 4) -> {shrunk:?}");

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 8) Allocate a large block to observe heap growth.
    // --------------------------------------------------------------------
    print_program_break("before large alloc");
    let big_block = allocator.alloc(64 * 1024);
    println!("\n[8] Allocate large 64 KiB block -> {big_block:?}");
    print_program_break("after large alloc");

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 9) Run the consistency check and report the result.
    // --------------------------------------------------------------------
    match allocator.check_heap() {
      Ok(()) => println!("\n[9] check_heap: all invariants hold"),
      Err(err) => println!("\n[9] check_heap FAILED: {err}"),
    }

    println!("\n[10] End of demo. Process will exit and the OS will reclaim all memory.");
  }
}
