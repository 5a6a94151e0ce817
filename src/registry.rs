//! Process-wide thread registry: a fixed-capacity table binding a thread
//! identity to its block directory.
//!
//! The table occupies exactly one anonymous page and is created lazily by
//! the first thread that allocates. Claiming a slot takes the process-wide
//! lock once; after that every operation on the slot's directory is
//! lock-free, because the directory is touched by its owning thread only.
//!
//! A slot's `id` transitions exactly once, from [`ThreadToken::UNASSIGNED`]
//! to the owner's token, and then never changes for the life of the process.

use core::cell::UnsafeCell;
use core::mem;
use core::sync::atomic::{AtomicU64, Ordering};

use spin::{Mutex, Once};

use crate::list::Directory;
use crate::os;

/// Thread identity token, comparable for equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadToken(u64);

impl ThreadToken {
  /// Marks a slot nobody owns. The platform is assumed never to hand this
  /// value out as a real thread id.
  pub const UNASSIGNED: ThreadToken = ThreadToken(u64::MAX);

  /// Identity of the calling thread.
  pub fn current() -> ThreadToken {
    ThreadToken(unsafe { libc::pthread_self() as u64 })
  }

  pub fn is_unassigned(self) -> bool {
    self == Self::UNASSIGNED
  }

  fn raw(self) -> u64 {
    self.0
  }
}

/// One row of the registry: a thread identity and that thread's directory.
pub struct Slot {
  id: AtomicU64,
  dir: UnsafeCell<Directory>,
}

impl Slot {
  /// The slot's directory.
  ///
  /// # Safety
  ///
  /// Only the thread whose token is stored in the slot may call this; the
  /// returned reference must not outlive the current operation.
  #[allow(clippy::mut_from_ref)]
  pub unsafe fn dir(&self) -> &mut Directory {
    unsafe { &mut *self.dir.get() }
  }
}

struct Registry {
  slots: *mut Slot,
  capacity: usize,
}

// The slot array is only reached through the accessors below: `id` fields
// are atomics, and a slot's directory is mutated by its owning thread only.
unsafe impl Send for Registry {}
unsafe impl Sync for Registry {}

static REGISTRY: Once<Registry> = Once::new();
static CLAIM: Mutex<()> = Mutex::new(());

/// Registry-page mapping failed.
struct MapFailed;

impl Registry {
  /// Maps the one-page slot table. Every slot starts unassigned except
  /// slot 0, which the bootstrapping thread takes for itself.
  fn create() -> Result<Registry, MapFailed> {
    let page = os::page_size();

    let mem = os::map_anonymous(page);
    if mem.is_null() {
      return Err(MapFailed);
    }

    let slots = mem as *mut Slot;
    let capacity = page / mem::size_of::<Slot>();

    unsafe {
      for i in 0..capacity {
        slots.add(i).write(Slot {
          id: AtomicU64::new(ThreadToken::UNASSIGNED.raw()),
          dir: UnsafeCell::new(Directory::new()),
        });
      }

      (*slots).id.store(ThreadToken::current().raw(), Ordering::Release);
    }

    Ok(Registry { slots, capacity })
  }

  fn slot(
    &self,
    index: usize,
  ) -> &Slot {
    debug_assert!(index < self.capacity);
    unsafe { &*self.slots.add(index) }
  }
}

/// Number of slots the one-page table holds; the process can serve at most
/// this many allocating threads.
pub fn capacity() -> usize {
  os::page_size() / mem::size_of::<Slot>()
}

/// Returns the calling thread's slot, creating the registry and claiming an
/// unassigned slot as needed. `None` when the registry page cannot be
/// mapped or every slot is taken.
pub(crate) fn claim_slot() -> Option<&'static Slot> {
  let registry = REGISTRY.try_call_once(Registry::create).ok()?;
  let me = ThreadToken::current();

  'scan: loop {
    for i in 0..registry.capacity {
      let slot = registry.slot(i);
      let id = slot.id.load(Ordering::Acquire);

      if id == me.raw() {
        return Some(slot);
      }

      if id == ThreadToken::UNASSIGNED.raw() {
        let _guard = CLAIM.lock();

        // The slot may have been claimed while we waited on the lock; if
        // so, rescan from the start.
        if slot.id.load(Ordering::Acquire) == ThreadToken::UNASSIGNED.raw() {
          slot.id.store(me.raw(), Ordering::Release);
          return Some(slot);
        }

        continue 'scan;
      }
    }

    // No slot matches and none is unassigned.
    return None;
  }
}

/// Returns the calling thread's slot if it has ever claimed one. Never
/// creates the registry, never claims, never locks.
pub(crate) fn find_slot() -> Option<&'static Slot> {
  let registry = REGISTRY.get()?;
  let me = ThreadToken::current();

  for i in 0..registry.capacity {
    let slot = registry.slot(i);

    if slot.id.load(Ordering::Acquire) == me.raw() {
      return Some(slot);
    }
  }

  None
}
