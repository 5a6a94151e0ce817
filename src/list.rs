//! Per-thread block directory: two intrusive singly linked lists, `free` and
//! `used`.
//!
//! Every block the allocator has ever obtained for a thread lives on exactly
//! one of the two lists. Links are the `next` fields embedded in the block
//! headers themselves, so these lists own no storage of their own. The heads
//! are always passed by mutable reference; updates to the head therefore
//! propagate to the owning directory.

use core::ptr;

use crate::header::Header;

/// Signalled by [`BlockList::unlink`] when the block is not on the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlinkError {
  NotFound,
}

/// A singly linked list of block headers, terminated by null.
///
/// Order within the list is insertion order at the tail; there is no ordering
/// contract by address or size.
pub struct BlockList {
  head: *mut Header,
}

impl BlockList {
  pub const fn new() -> Self {
    Self { head: ptr::null_mut() }
  }

  pub fn is_empty(&self) -> bool {
    self.head.is_null()
  }

  /// Head of the chain, null when the list is empty.
  pub fn head(&self) -> *mut Header {
    self.head
  }

  /// Appends `block` at the tail, clearing its successor first.
  ///
  /// # Safety
  ///
  /// `block` must point at the header of a live block that is not currently
  /// on any list, and the caller must own the list (no concurrent access).
  pub unsafe fn append(
    &mut self,
    block: *mut Header,
  ) {
    unsafe {
      (*block).next = ptr::null_mut();

      // List is empty, block will be first element.
      if self.head.is_null() {
        self.head = block;
        return;
      }

      // Place block at end of list.
      let mut current = self.head;
      while !(*current).next.is_null() {
        current = (*current).next;
      }

      (*current).next = block;
    }
  }

  /// Splices `block` out of the list. The list is untouched on error.
  ///
  /// # Safety
  ///
  /// Same ownership rules as [`BlockList::append`]. `block` itself is only
  /// compared by address, never dereferenced, unless it is found on the list.
  pub unsafe fn unlink(
    &mut self,
    block: *mut Header,
  ) -> Result<(), UnlinkError> {
    unsafe {
      if self.head.is_null() || block.is_null() {
        return Err(UnlinkError::NotFound);
      }

      // Removing head of list.
      if self.head == block {
        self.head = (*block).next;
        return Ok(());
      }

      // Walk pairwise and splice out the match.
      let mut current = self.head;
      while (*current).next != block {
        if (*current).next.is_null() {
          return Err(UnlinkError::NotFound);
        }

        current = (*current).next;
      }

      (*current).next = (*block).next;

      Ok(())
    }
  }

  /// Iterator over the chain, front to back.
  ///
  /// # Safety
  ///
  /// The caller must own the list and must not mutate it while the iterator
  /// is live.
  pub unsafe fn iter(&self) -> Blocks {
    Blocks { current: self.head }
  }

  /// Number of blocks on the list.
  ///
  /// # Safety
  ///
  /// Same rules as [`BlockList::iter`].
  pub unsafe fn len(&self) -> usize {
    unsafe { self.iter().count() }
  }
}

/// Iterator over a block chain. See [`BlockList::iter`].
pub struct Blocks {
  current: *mut Header,
}

impl Iterator for Blocks {
  type Item = *mut Header;

  fn next(&mut self) -> Option<*mut Header> {
    if self.current.is_null() {
      return None;
    }

    let block = self.current;
    self.current = unsafe { (*block).next };
    Some(block)
  }
}

/// A thread's two block lists. Every block belonging to the thread is on
/// exactly one of them.
pub struct Directory {
  pub free: BlockList,
  pub used: BlockList,
}

impl Directory {
  pub const fn new() -> Self {
    Self {
      free: BlockList::new(),
      used: BlockList::new(),
    }
  }
}
