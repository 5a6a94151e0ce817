//! Thin layer over the operating system's memory facilities: page-size query
//! and anonymous read/write mappings. All failures are reported as null or
//! `None`; details go to the `log` facade.

use core::ptr;

use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE};
use log::warn;

use crate::align_to;

/// OS page size in bytes.
pub fn page_size() -> usize {
  unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

/// Rounds `bytes` up to a whole number of pages. `None` if the round-up
/// would overflow.
pub fn page_len(bytes: usize) -> Option<usize> {
  let page = page_size();

  if bytes >= usize::MAX - page {
    return None;
  }

  Some(align_to!(bytes, page))
}

/// Maps `len` bytes of zeroed, private, read/write anonymous memory.
/// Returns null on failure.
pub fn map_anonymous(len: usize) -> *mut u8 {
  let p = unsafe {
    libc::mmap(
      ptr::null_mut(),
      len,
      PROT_READ | PROT_WRITE,
      MAP_PRIVATE | MAP_ANONYMOUS,
      -1,
      0,
    )
  };

  if p == MAP_FAILED {
    warn!("mmap failed: {}, len {}", errno::errno(), len);
    return ptr::null_mut();
  }

  p as *mut u8
}
