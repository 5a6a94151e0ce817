//! The block engine: stateless operations that satisfy byte requests out of
//! a thread's directory.
//!
//! A block is a contiguous span beginning with a [`Header`] and followed by
//! the user payload:
//!
//! ```text
//!   ┌──────────────────┬─────────────────────────┐
//!   │   Header         │      payload            │
//!   │ next: *mut       │   [ size bytes ]        │
//!   │ size: usize      │                         │
//!   └──────────────────┴─────────────────────────┘
//!   ▲                  ▲
//!   │                  └── pointer returned to the caller
//!   └── header address (8-byte aligned)
//! ```
//!
//! Requests are served first-fit from the free list. When nothing fits, a
//! fresh run of pages is mapped and installed as one big free block. Either
//! way the chosen block is subjected to [`split`], which carves off the tail
//! into a second free block unless the leftover would be all header and no
//! payload:
//!
//! ```text
//!   before                             after split(block, bytes)
//!   ┌────┬───────────────────────┐     ┌────┬─────────┬────┬──────────┐
//!   │ H  │ ............size..... │ --> │ H  │ bytes.. │ H' │ rest     │
//!   └────┴───────────────────────┘     └────┴─────────┴────┴──────────┘
//!                                           ▲ rounded up so H' stays
//!                                             8-byte aligned
//! ```
//!
//! Blocks are never coalesced and their pages are never returned to the OS.

use core::ptr;

use crate::align_to;
use crate::header::{BLOCK_ALIGN, HEADER_SIZE, Header};
use crate::list::Directory;
use crate::os;

/// Finds a free block with `size >= bytes`, mapping new pages if the free
/// list has nothing suitable. The returned block resides in `dir.free`.
///
/// Returns `None` when the OS refuses the mapping or the request size
/// overflows the page round-up.
///
/// # Safety
///
/// The caller must own `dir` (it must be the calling thread's directory).
pub unsafe fn find_or_create(
  bytes: usize,
  dir: &mut Directory,
) -> Option<*mut Header> {
  unsafe {
    // First fit: the block may still be far larger than bytes, so it is
    // split before being handed back.
    let mut current = dir.free.head();
    while !current.is_null() {
      if (*current).size >= bytes {
        return Some(split(current, bytes, dir));
      }

      current = (*current).next;
    }

    // Suitable block not found... create one.
    let need = bytes.checked_add(HEADER_SIZE)?;
    let len = os::page_len(need)?;

    let mem = os::map_anonymous(len);
    if mem.is_null() {
      return None;
    }

    let block = mem as *mut Header;
    (*block).next = ptr::null_mut();
    (*block).size = len - HEADER_SIZE;

    dir.free.append(block);

    Some(split(block, bytes, dir))
  }
}

/// Carves `block` in two so the caller is not handed far more memory than
/// requested. Returns the first block, still on `dir.free`, with
/// `size >= bytes`.
///
/// The cut point is rounded up so the second header stays 8-byte aligned;
/// the rounding slack is absorbed into the first block's size. If the
/// leftover tail could not hold any payload the block is returned whole.
///
/// # Safety
///
/// `block` must reside in `dir.free` with `size >= bytes`, and the caller
/// must own `dir`.
pub unsafe fn split(
  block: *mut Header,
  bytes: usize,
  dir: &mut Directory,
) -> *mut Header {
  unsafe {
    let block_end = Header::end(block);

    let mut candidate = block as usize + HEADER_SIZE + bytes;
    candidate = align_to!(candidate, BLOCK_ALIGN);

    // Payload sizes are kept multiples of 8, so the aligned cut point never
    // passes the end of the block.
    debug_assert!(candidate <= block_end);

    let remainder = block_end - candidate;

    // A carve this small would be all header and no space. The caller gets
    // more memory than requested instead.
    if remainder <= HEADER_SIZE {
      return block;
    }

    let unlinked = dir.free.unlink(block);
    debug_assert!(unlinked.is_ok());

    (*block).size = (candidate - block as usize) - HEADER_SIZE;

    let second = candidate as *mut Header;
    (*second).next = ptr::null_mut();
    (*second).size = remainder - HEADER_SIZE;

    dir.free.append(block);
    dir.free.append(second);

    block
  }
}
