use std::thread;

use tallocator::{alloc, release, resize};

const THREADS: usize = 10;
const ROUNDS: usize = 100;
const MAX_BYTES: usize = 64 * 1024;

/// Deterministic xorshift so failures are reproducible.
fn next_random(state: &mut u64) -> u64 {
  let mut x = *state;
  x ^= x << 13;
  x ^= x >> 7;
  x ^= x << 17;
  *state = x;
  x
}

#[test]
fn threads_never_see_each_others_blocks() {
  let handles: Vec<_> = (0..THREADS)
    .map(|t| {
      thread::spawn(move || {
        let mut state = 0x9E37_79B9_7F4A_7C15u64.wrapping_mul(t as u64 + 1) | 1;
        let mut spans: Vec<(usize, usize)> = Vec::new();

        for round in 0..ROUNDS {
          let bytes = (next_random(&mut state) as usize % MAX_BYTES) + 1;

          let mem = alloc(bytes).expect("allocation failed");
          assert_eq!(mem.as_ptr() as usize % 8, 0);

          let fill = (t as u8) ^ (round as u8);

          unsafe {
            std::ptr::write_bytes(mem.as_ptr(), fill, bytes);
          }

          spans.push((mem.as_ptr() as usize, bytes));

          let grown = unsafe { resize(Some(mem), bytes + 1000) }.expect("resize failed");
          assert_eq!(grown.as_ptr() as usize % 8, 0);

          unsafe {
            // The old payload must have been carried over.
            for i in (0..bytes).step_by(997) {
              assert_eq!(*grown.as_ptr().add(i), fill);
            }

            spans.push((grown.as_ptr() as usize, bytes + 1000));

            release(Some(grown));
          }
        }

        spans
      })
    })
    .collect();

  let per_thread: Vec<Vec<(usize, usize)>> =
    handles.into_iter().map(|h| h.join().unwrap()).collect();

  // Memory handed to one thread is never handed to another, not even after
  // a release: blocks stay with their owning thread for good.
  for (i, ours) in per_thread.iter().enumerate() {
    for theirs in per_thread.iter().skip(i + 1) {
      for &(a, size_a) in ours {
        for &(b, size_b) in theirs {
          assert!(a + size_a <= b || b + size_b <= a);
        }
      }
    }
  }
}
