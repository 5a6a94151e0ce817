//! Multi-thread stress driver for the allocator.
//!
//! Ten workers each perform a random series of allocate → grow → touch →
//! release rounds against their own thread-local free lists; failed requests
//! are counted instead of aborting, and the elapsed wall time is printed at
//! the end. Run with:
//!
//! ```text
//! cargo run --release --example stress
//! ```

use std::thread;
use std::time::Instant;

use tallocator::{alloc, release, resize};

const NUM_THREADS: usize = 10;
const MAX_ROUNDS: usize = 10_000;
// Scaled down from gigabyte-range requests so a laptop survives the run.
const MAX_BYTES: usize = 1024 * 1024;

/// Deterministic xorshift; each worker gets its own stream.
fn next_random(state: &mut u64) -> u64 {
  let mut x = *state;
  x ^= x << 13;
  x ^= x >> 7;
  x ^= x << 17;
  *state = x;
  x
}

/// One worker: a random number of alloc/resize/touch/release rounds.
/// Returns how many requests the allocator refused.
fn bench(seed: u64) -> u32 {
  let mut state = seed | 1;
  let mut bad = 0u32;

  let rounds = (next_random(&mut state) as usize % MAX_ROUNDS) + 1;

  for _ in 0..rounds {
    let bytes = (next_random(&mut state) as usize % MAX_BYTES) + 1;

    let Some(mem) = alloc(bytes) else {
      bad += 1;
      continue;
    };

    let Some(mem) = (unsafe { resize(Some(mem), bytes + 1000) }) else {
      bad += 1;
      continue;
    };

    unsafe {
      // Touch every byte so the pages really get faulted in.
      for i in 0..bytes {
        *mem.as_ptr().add(i) = i as u8;
      }

      release(Some(mem));
    }
  }

  bad
}

fn main() {
  let start = Instant::now();

  let handles: Vec<_> = (0..NUM_THREADS)
    .map(|i| thread::spawn(move || bench(0x5DEE_CE66 ^ ((i as u64) << 16))))
    .collect();

  let bad: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();

  println!("{} threads, {} failed requests", NUM_THREADS, bad);
  println!("{:.3} seconds", start.elapsed().as_secs_f64());
}
