//! # tallocator - A Thread-Partitioned Memory Allocator Library
//!
//! This crate provides a **free-list allocator** that replaces the usual
//! `malloc`/`calloc`/`realloc`/`free` quartet for multi-threaded processes.
//! Memory is obtained from the operating system's anonymous page mapping
//! facility, and all bookkeeping is partitioned per thread so the allocation
//! fast path never takes a lock.
//!
//! ## Overview
//!
//! ```text
//!   One registry page, one slot per allocating thread:
//!
//!   ┌───────────────────────────────────────────────────────────────────┐
//!   │                        THREAD REGISTRY                            │
//!   │                                                                   │
//!   │   ┌──────────┬──────────┬──────────┬──────────────┬──────────┐    │
//!   │   │ Slot 0   │ Slot 1   │ Slot 2   │     ...      │ Slot N-1 │    │
//!   │   │ id: T0   │ id: T1   │ id: ──   │              │ id: ──   │    │
//!   │   │ free ──┐ │ free     │          │              │          │    │
//!   │   │ used   │ │ used     │          │              │          │    │
//!   │   └────────┼─┴──────────┴──────────┴──────────────┴──────────┘    │
//!   │            ▼                                                      │
//!   │   ┌─────────────┐    ┌─────────────┐    ┌─────────────┐           │
//!   │   │ Block       │───►│ Block       │───►│ Block       │──► null   │
//!   │   │ next, size  │    │ next, size  │    │ next, size  │           │
//!   │   └─────────────┘    └─────────────┘    └─────────────┘           │
//!   │                                                                   │
//!   └───────────────────────────────────────────────────────────────────┘
//!
//!   Each thread claims a slot once, then allocates and frees against its
//!   own two lists without any synchronization.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   tallocator
//!   ├── align      - Alignment macro (align_to!)
//!   ├── header     - Block header layout (internal)
//!   ├── list       - Free/used block lists (internal)
//!   ├── os         - Page mapping and page-size query (internal)
//!   ├── engine     - First-fit search and block splitting (internal)
//!   └── registry   - Process-wide thread-to-directory table (internal)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tallocator::{alloc, release};
//!
//! fn main() {
//!     let ptr = alloc(100).expect("out of memory");
//!
//!     unsafe {
//!         // Use the memory: 100 bytes, 8-byte aligned.
//!         ptr.as_ptr().write_bytes(0x42, 100);
//!
//!         // Hand it back to the calling thread's free list.
//!         release(Some(ptr));
//!     }
//! }
//! ```
//!
//! ## How It Works
//!
//! Every block carries a two-word header directly in front of the payload:
//!
//! ```text
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │    Header             │         User Data              │
//!   │  ┌─────────────────┐  │                                │
//!   │  │ next: *mut      │  │  ┌──────────────────────────┐  │
//!   │  │ size: usize     │  │  │     size bytes usable    │  │
//!   │  └─────────────────┘  │  └──────────────────────────┘  │
//!   └───────────────────────┴────────────────────────────────┘
//!                           ▲
//!                           └── Pointer returned to user
//! ```
//!
//! An allocation walks the calling thread's free list first-fit. A hit is
//! split so the caller is not handed far more than requested; a miss maps
//! fresh pages and installs them as one big free block before splitting.
//! Freeing moves the block from the `used` list back to the `free` list,
//! where it waits for reuse by the same thread.
//!
//! ## Features
//!
//! - **Lock-free fast path**: the process-wide lock is taken only to create
//!   the registry and to claim a slot
//! - **Per-thread isolation**: no thread ever touches another thread's lists
//! - **First-fit with splitting**: large free blocks are carved to size
//! - **8-byte alignment**: headers and payloads always land on 8 bytes
//!
//! ## Limitations
//!
//! - **No cross-thread free**: a pointer must be released on the thread
//!   that allocated it; anything else is undefined behavior
//! - **No coalescing**: adjacent free blocks are never merged
//! - **Memory is kept**: pages are never returned to the OS
//! - **Fixed thread count**: the registry holds one page worth of slots
//!   ([`thread_capacity`]); threads beyond that fail to allocate
//! - **Unix-only**: requires `libc` (`mmap`, `sysconf`, `pthread_self`)
//!
//! ## Safety
//!
//! Allocation itself is safe; using the returned memory, `resize` and
//! `release` are `unsafe` because they trust the caller to pass pointers
//! obtained from this allocator on the current thread.

pub mod align;
mod engine;
mod header;
mod list;
mod os;
mod registry;

pub use registry::capacity as thread_capacity;

use core::alloc::{GlobalAlloc, Layout};
use core::cmp;
use core::ptr::{self, NonNull};

use crate::header::{BLOCK_ALIGN, Header};
use crate::list::BlockList;

/// Allocates `bytes` bytes for the calling thread.
///
/// The returned pointer is 8-byte aligned and backed by at least `bytes`
/// usable bytes. Returns `None` when the OS refuses to map pages, when the
/// request size overflows, or when the thread registry is full.
pub fn alloc(bytes: usize) -> Option<NonNull<u8>> {
  let slot = registry::claim_slot()?;

  unsafe {
    let dir = slot.dir();

    let block = engine::find_or_create(bytes, dir)?;

    dir.free.unlink(block).ok()?;
    dir.used.append(block);

    NonNull::new(Header::payload(block))
  }
}

/// Allocates `count * unit` bytes and zeroes them.
///
/// Returns `None` on allocation failure or when `count * unit` overflows.
pub fn zero_alloc(
  count: usize,
  unit: usize,
) -> Option<NonNull<u8>> {
  let bytes = count.checked_mul(unit)?;

  let mem = alloc(bytes)?;

  unsafe {
    ptr::write_bytes(mem.as_ptr(), 0, bytes);
  }

  Some(mem)
}

/// Moves an allocation to a new block of `bytes` bytes.
///
/// With `ptr` absent this is equivalent to [`alloc`]. Otherwise a new block
/// is allocated, `min(old size, bytes)` bytes are copied over, and the old
/// block is released. On failure `None` is returned and the original
/// allocation stays valid.
///
/// # Safety
///
/// `ptr`, if present, must have been returned by this allocator on the
/// calling thread and must not have been released already.
pub unsafe fn resize(
  ptr: Option<NonNull<u8>>,
  bytes: usize,
) -> Option<NonNull<u8>> {
  let Some(old) = ptr else {
    return alloc(bytes);
  };

  let new = alloc(bytes)?;

  unsafe {
    let old_size = (*Header::from_payload(old.as_ptr())).size;

    ptr::copy_nonoverlapping(old.as_ptr(), new.as_ptr(), cmp::min(old_size, bytes));

    release(Some(old));
  }

  Some(new)
}

/// Returns an allocation to the calling thread's free list.
///
/// Passing `None` is a no-op, as is releasing on a thread that never
/// allocated or passing a pointer the thread does not own (the lists are
/// left untouched in those cases).
///
/// # Safety
///
/// `ptr`, if present, must have been returned by this allocator on the
/// calling thread and must not have been released already.
pub unsafe fn release(ptr: Option<NonNull<u8>>) {
  let Some(payload) = ptr else {
    return;
  };

  let Some(slot) = registry::find_slot() else {
    return;
  };

  unsafe {
    let dir = slot.dir();
    let block = Header::from_payload(payload.as_ptr());

    // An unknown pointer must not disturb the accounting.
    if dir.used.unlink(block).is_ok() {
      dir.free.append(block);
    }
  }
}

/// Prints every block on the calling thread's free list.
pub fn dump_free() {
  println!("Free:");

  if let Some(slot) = registry::find_slot() {
    unsafe { dump_list(&slot.dir().free) };
  }
}

/// Prints every block on the calling thread's in-use list.
pub fn dump_used() {
  println!("Used:");

  if let Some(slot) = registry::find_slot() {
    unsafe { dump_list(&slot.dir().used) };
  }
}

unsafe fn dump_list(list: &BlockList) {
  unsafe {
    for block in list.iter() {
      println!(
        "\tlocation: {:p}\n\tnext: {:p}\n\tsize: {}\n",
        block,
        (*block).next,
        (*block).size,
      );
    }
  }
}

/// Zero-sized handle exposing the allocator through [`GlobalAlloc`], the
/// customary substitution interface for Rust programs.
///
/// Alignment requests beyond 8 bytes are refused with a null return; this
/// allocator guarantees nothing past 8. The per-thread partitioning carries
/// over: memory must be deallocated on the thread that allocated it.
pub struct Tallocator;

unsafe impl GlobalAlloc for Tallocator {
  unsafe fn alloc(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if layout.align() > BLOCK_ALIGN {
      return ptr::null_mut();
    }

    match crate::alloc(layout.size()) {
      Some(mem) => mem.as_ptr(),
      None => ptr::null_mut(),
    }
  }

  unsafe fn dealloc(
    &self,
    ptr: *mut u8,
    _layout: Layout,
  ) {
    unsafe { release(NonNull::new(ptr)) }
  }

  unsafe fn alloc_zeroed(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if layout.align() > BLOCK_ALIGN {
      return ptr::null_mut();
    }

    match zero_alloc(layout.size(), 1) {
      Some(mem) => mem.as_ptr(),
      None => ptr::null_mut(),
    }
  }

  unsafe fn realloc(
    &self,
    ptr: *mut u8,
    layout: Layout,
    new_size: usize,
  ) -> *mut u8 {
    if layout.align() > BLOCK_ALIGN {
      return ptr::null_mut();
    }

    match unsafe { resize(NonNull::new(ptr), new_size) } {
      Some(mem) => mem.as_ptr(),
      None => ptr::null_mut(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::header::HEADER_SIZE;

  /// Helper: check that a pointer is aligned to `align` bytes.
  fn is_aligned(
    ptr: *mut u8,
    align: usize,
  ) -> bool {
    (ptr as usize) % align == 0
  }

  /// Lengths of the calling thread's (free, used) lists.
  fn lens() -> (usize, usize) {
    let slot = registry::claim_slot().unwrap();

    unsafe {
      let dir = slot.dir();
      (dir.free.len(), dir.used.len())
    }
  }

  /// Total bytes, headers included, the calling thread's directory spans.
  fn mapped_bytes() -> usize {
    let slot = registry::claim_slot().unwrap();

    unsafe {
      let dir = slot.dir();
      dir
        .free
        .iter()
        .chain(dir.used.iter())
        .map(|b| HEADER_SIZE + (*b).size)
        .sum()
    }
  }

  #[test]
  fn alloc_then_release_balances_the_lists() {
    let (free0, used0) = lens();

    let mem = alloc(100).unwrap();
    assert!(is_aligned(mem.as_ptr(), 8));

    let (_, used1) = lens();
    assert_eq!(used1, used0 + 1);

    unsafe {
      release(Some(mem));
    }

    let (free2, used2) = lens();
    assert_eq!(used2, used0);

    // The request may have mapped a page and split it, adding at most two
    // blocks to the free list; it never loses one.
    assert!(free2 >= free0.max(1));
    assert!(free2 <= free0 + 2);
  }

  #[test]
  fn consecutive_allocations_do_not_overlap() {
    let first = alloc(16).unwrap();
    let second = alloc(16).unwrap();

    assert_ne!(first, second);

    unsafe {
      let b1 = Header::from_payload(first.as_ptr());
      let b2 = Header::from_payload(second.as_ptr());

      let span1 = b1 as usize..first.as_ptr() as usize + (*b1).size;
      let span2 = b2 as usize..second.as_ptr() as usize + (*b2).size;

      assert!(span1.end <= span2.start || span2.end <= span1.start);
      assert!((*b1).size >= 16 && (*b2).size >= 16);

      release(Some(first));
      release(Some(second));
    }
  }

  #[test]
  fn released_memory_is_reused_without_new_mappings() {
    let first = alloc(64).unwrap();

    unsafe {
      release(Some(first));
    }

    let before = mapped_bytes();

    let second = alloc(64).unwrap();
    assert_eq!(mapped_bytes(), before);

    unsafe {
      release(Some(second));
    }
  }

  #[test]
  fn zero_alloc_zeroes_count_times_unit_bytes() {
    let mem = zero_alloc(16, 4).unwrap();

    unsafe {
      let size = (*Header::from_payload(mem.as_ptr())).size;
      assert!(size >= 64);

      for i in 0..64 {
        assert_eq!(*mem.as_ptr().add(i), 0);
      }

      // Dirty the payload so a later reuse would expose missing re-zeroing.
      ptr::write_bytes(mem.as_ptr(), 0xA5, 64);
      release(Some(mem));
    }

    let again = zero_alloc(64, 1).unwrap();

    unsafe {
      for i in 0..64 {
        assert_eq!(*again.as_ptr().add(i), 0);
      }

      release(Some(again));
    }
  }

  #[test]
  fn zero_alloc_rejects_overflowing_requests() {
    assert!(zero_alloc(usize::MAX, 2).is_none());
    assert!(zero_alloc(2, usize::MAX).is_none());
  }

  #[test]
  fn resize_of_absent_behaves_like_alloc() {
    let mem = unsafe { resize(None, 32) }.unwrap();
    assert!(is_aligned(mem.as_ptr(), 8));

    unsafe {
      release(Some(mem));
    }
  }

  #[test]
  fn resize_copies_the_payload_when_growing() {
    let old = alloc(100).unwrap();

    unsafe {
      for i in 0..100 {
        *old.as_ptr().add(i) = i as u8;
      }

      let new = resize(Some(old), 200).unwrap();
      assert_ne!(new, old);

      for i in 0..100 {
        assert_eq!(*new.as_ptr().add(i), i as u8);
      }

      // The tail is writable even though its contents are unspecified.
      ptr::write_bytes(new.as_ptr().add(100), 0x5A, 100);

      release(Some(new));
    }
  }

  #[test]
  fn resize_truncates_the_payload_when_shrinking() {
    let old = alloc(100).unwrap();

    unsafe {
      for i in 0..100 {
        *old.as_ptr().add(i) = !(i as u8);
      }

      let new = resize(Some(old), 40).unwrap();

      for i in 0..40 {
        assert_eq!(*new.as_ptr().add(i), !(i as u8));
      }

      release(Some(new));
    }
  }

  #[test]
  fn release_of_absent_or_foreign_pointers_is_a_no_op() {
    let held = alloc(32).unwrap();
    let (free0, used0) = lens();

    unsafe {
      release(None);
      assert_eq!(lens(), (free0, used0));

      // A pointer that never came from the allocator: shaped like a
      // payload, but on no list.
      let mut fake = [0u64; 6];
      let fake_payload = (fake.as_mut_ptr() as *mut u8).add(HEADER_SIZE);
      release(NonNull::new(fake_payload));
      assert_eq!(lens(), (free0, used0));

      release(Some(held));
    }
  }

  #[test]
  fn global_alloc_adapter_enforces_the_alignment_limit() {
    let allocator = Tallocator;

    unsafe {
      let narrow = Layout::from_size_align(64, 8).unwrap();
      let mem = GlobalAlloc::alloc(&allocator, narrow);
      assert!(!mem.is_null());
      assert!(is_aligned(mem, 8));
      GlobalAlloc::dealloc(&allocator, mem, narrow);

      let wide = Layout::from_size_align(64, 32).unwrap();
      assert!(GlobalAlloc::alloc(&allocator, wide).is_null());
    }
  }

  #[test]
  fn dumps_cover_both_lists() {
    let mem = alloc(48).unwrap();

    dump_free();
    dump_used();

    unsafe {
      release(Some(mem));
    }
  }
}
