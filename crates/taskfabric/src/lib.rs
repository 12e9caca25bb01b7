//! # taskfabric
//!
//! A task-level dataflow runtime for expressing pipelined, parallel
//! computations as static graphs of long-running tasks connected by
//! bounded FIFO streams.
//!
//! Authors declare plain `async fn` tasks; each task reads from input
//! streams, computes, and writes to output streams, or performs
//! random-access reads and writes against memory views. The runtime
//! schedules tasks cooperatively on a single thread, passes typed values
//! across streams with end-of-transmission markers, and joins or detaches
//! children to their enclosing scope.
//!
//! ## Quick start
//!
//! ```
//! use taskfabric::prelude::*;
//!
//! async fn mmap_to_stream(src: Mmap<f32>, n: u64, out: WriteEnd<f32>) {
//!     for i in 0..n as usize {
//!         out.write(src.get(i)).await;
//!     }
//! }
//!
//! async fn add(a: ReadEnd<f32>, b: ReadEnd<f32>, c: WriteEnd<f32>, n: u64) {
//!     for _ in 0..n as usize {
//!         c.write(a.read().await + b.read().await).await;
//!     }
//! }
//!
//! async fn stream_to_mmap(src: ReadEnd<f32>, dst: Mmap<f32>, n: u64) {
//!     for i in 0..n as usize {
//!         dst.set(i, src.read().await);
//!     }
//! }
//!
//! let mut a = vec![1.0f32, 2.0, 3.0];
//! let mut b = vec![10.0f32, 20.0, 30.0];
//! let mut c = vec![0.0f32; 3];
//! let n = 3u64;
//!
//! let a_q = Stream::<f32, 2>::new("a");
//! let b_q = Stream::<f32, 2>::new("b");
//! let c_q = Stream::<f32, 2>::new("c");
//!
//! task()
//!     .invoke(mmap_to_stream, (Mmap::from_slice(&mut a), n, &a_q))
//!     .invoke(mmap_to_stream, (Mmap::from_slice(&mut b), n, &b_q))
//!     .invoke(add, (&a_q, &b_q, &c_q, n))
//!     .invoke(stream_to_mmap, (&c_q, Mmap::from_slice(&mut c), n))
//!     .join();
//!
//! assert_eq!(c, vec![11.0, 22.0, 33.0]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-export core types
pub use taskfabric_core::*;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use taskfabric_core::prelude::*;
}
