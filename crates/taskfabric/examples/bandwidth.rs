//! # Async Mmap Bandwidth Example
//!
//! Streams every vector of four memory banks through an async mmap:
//! a worker per bank issues pipelined read requests, bumps each lane,
//! and writes the vectors back, tracking batched write acknowledgements.
//!
//! ## Run this example:
//! ```bash
//! cargo run -p taskfabric --example bandwidth
//! ```
//!
//! ## What this demonstrates:
//!
//! - Adapting plain memory views to `AsyncMmap` at invoke time
//! - An `MmapArray` scattering one bank per replicated worker
//! - Windowed request pipelining with non-blocking stream operations
//! - The `count - 1` write acknowledgement encoding

use taskfabric::prelude::*;

const BANKS: usize = 4;
const LANES: usize = 8;

/// Reads back-to-back vectors, increments every lane, writes them back,
/// and waits for all stores to be acknowledged.
async fn rewrite_bank(mem: AsyncMmap<Vector<u32, 8>>, n: u64) {
    let mut issued = 0u64;
    let mut rewritten = 0u64;
    let mut acked = 0u64;

    while acked < n {
        // Keep up to 50 read requests in flight.
        if issued < n && issued < rewritten + 50 && mem.read_addr.try_write(issued) {
            issued += 1;
        }

        if let Some(v) = mem.read_data.try_read() {
            let mut w = v;
            for j in 0..LANES {
                w.set(j, v.get(j) + 1);
            }
            mem.write_addr.write(rewritten).await;
            mem.write_data.write(w).await;
            rewritten += 1;
        }

        while let Some(r) = mem.write_resp.try_read() {
            acked += u64::from(r) + 1;
        }

        yield_now("bandwidth: request pass").await;
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    println!("=== taskfabric Async Mmap Bandwidth Example ===\n");

    let n = 256u64;
    let mut banks: Vec<Vec<u32>> = (0..BANKS)
        .map(|bank| {
            (0..n as usize * LANES)
                .map(|j| (bank ^ j) as u32)
                .collect()
        })
        .collect();

    println!(
        "Rewriting {} vectors of {LANES} lanes across {BANKS} banks\n",
        n as usize * BANKS
    );

    {
        let mut iter = banks.iter_mut();
        let chan = MmapArray::<u32, BANKS>::new(std::array::from_fn(|_| {
            Mmap::from_slice(iter.next().expect("one view per bank"))
        }))
        .vectorized::<8>();

        task().invoke_n(BANKS, rewrite_bank, (&chan, n)).join();
    }

    let mut errors = 0u64;
    for (bank, data) in banks.iter().enumerate() {
        for (j, &v) in data.iter().enumerate() {
            if v != (bank ^ j) as u32 + 1 {
                errors += 1;
            }
        }
    }

    if errors == 0 {
        println!("PASS: every lane was incremented exactly once");
    } else {
        println!("FAIL: {errors} mismatched lanes");
        std::process::exit(1);
    }
}
