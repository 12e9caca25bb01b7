//! # Vector Add Example
//!
//! The canonical four-task pipeline: two loaders stream a pair of input
//! arrays, an adder combines them element-wise, and a store task writes
//! the sums back to memory.
//!
//! ## Run this example:
//! ```bash
//! cargo run -p taskfabric --example vector_add
//! ```
//!
//! ## What this demonstrates:
//!
//! - Declaring streams and wiring tasks with chained `invoke`
//! - Blocking stream reads/writes inside plain `async fn` tasks
//! - Passing memory views by value and streams by reference
//! - EOT-terminated consumption with `not_eot`

use taskfabric::prelude::*;

async fn mmap_to_stream(src: Mmap<f32>, n: u64, out: WriteEnd<f32>) {
    for i in 0..n as usize {
        out.write(src.get(i)).await;
    }
    out.close().await;
}

async fn add(a: ReadEnd<f32>, b: ReadEnd<f32>, c: WriteEnd<f32>) {
    while neither_eot(&a, &b).await {
        c.write(a.read_or(0.0) + b.read_or(0.0)).await;
    }
    c.close().await;
}

async fn stream_to_mmap(stream: ReadEnd<f32>, dst: Mmap<f32>) {
    let mut i = 0;
    while not_eot(&stream).await {
        dst.set(i, stream.read_or(0.0));
        i += 1;
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    println!("=== taskfabric Vector Add Example ===\n");

    let n = 1024u64;
    let mut a: Vec<f32> = (0..n).map(|i| i as f32).collect();
    let mut b: Vec<f32> = (0..n).map(|i| (2 * i) as f32).collect();
    let mut c = vec![0.0f32; n as usize];

    println!("Adding {n} elements through capacity-2 streams\n");

    let a_q = Stream::<f32, 2>::new("a");
    let b_q = Stream::<f32, 2>::new("b");
    let c_q = Stream::<f32, 2>::new("c");

    task()
        .invoke(mmap_to_stream, (Mmap::from_slice(&mut a), n, &a_q))
        .invoke(mmap_to_stream, (Mmap::from_slice(&mut b), n, &b_q))
        .invoke(add, (&a_q, &b_q, &c_q))
        .invoke(stream_to_mmap, (&c_q, Mmap::from_slice(&mut c)))
        .join();

    let errors = c
        .iter()
        .enumerate()
        .filter(|&(i, &v)| v != (3 * i as u64) as f32)
        .count();

    if errors == 0 {
        println!("PASS: all {n} sums correct");
    } else {
        println!("FAIL: {errors} mismatches");
        std::process::exit(1);
    }
}
