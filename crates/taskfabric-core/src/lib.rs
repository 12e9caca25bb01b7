//! # taskfabric-core
//!
//! Core types for the taskfabric task-level dataflow runtime.
//!
//! taskfabric expresses pipelined, parallel computations as a static graph
//! of long-running tasks connected by bounded FIFO streams, in the style of
//! spatial-accelerator designs (systolic arrays, stencil pipelines,
//! switching networks) executed on general-purpose hardware for simulation
//! and functional verification.
//!
//! ## Core abstractions
//!
//! - [`Stream`] — bounded single-producer/single-consumer FIFO with an
//!   end-of-transmission marker, operated through [`ReadEnd`]/[`WriteEnd`]
//! - [`StreamBundle`] — compile-time-sized array of independent streams
//! - [`Mmap`] / [`MmapArray`] — borrowed memory views with pointer-like
//!   element access and zero-copy reinterpretation
//! - [`AsyncMmap`] — memory exposed through five streams and a resident
//!   service task
//! - [`task`] / [`parallel`] — chainable scopes that invoke children and
//!   join them on exit, scheduled cooperatively on a single thread
//!
//! ## Example
//!
//! ```ignore
//! use taskfabric_core::prelude::*;
//!
//! async fn add(a: ReadEnd<f32>, b: ReadEnd<f32>, c: WriteEnd<f32>, n: u64) {
//!     for _ in 0..n {
//!         c.write(a.read().await + b.read().await).await;
//!     }
//! }
//!
//! let a = Stream::<f32, 2>::new("a");
//! let b = Stream::<f32, 2>::new("b");
//! let c = Stream::<f32, 2>::new("c");
//! task()
//!     .invoke(producer, (&a, n))
//!     .invoke(producer, (&b, n))
//!     .invoke(add, (&a, &b, &c, n))
//!     .invoke(consumer, (&c, n));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod async_mmap;
pub mod bundle;
pub mod error;
pub mod mmap;
pub mod scheduler;
pub mod scope;
pub mod stream;
pub mod util;
pub mod vector;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::async_mmap::AsyncMmap;
    pub use crate::bundle::{ReadEnds, StreamBundle, WriteEnds};
    pub use crate::error::{Error, Result};
    pub use crate::mmap::{Mmap, MmapArray};
    pub use crate::scheduler::{yield_now, Config, Mode, TaskState};
    pub use crate::scope::{parallel, task, Runtime, Scope, Seq};
    pub use crate::stream::{ReadEnd, Stream, WriteEnd};
    pub use crate::util::{neither_eot, none_eot, not_eot, Packet};
    pub use crate::vector::Vector;
}

// Re-exports for convenience
pub use async_mmap::AsyncMmap;
pub use bundle::{ReadEnds, StreamBundle, WriteEnds};
pub use error::{Error, Result};
pub use mmap::{Mmap, MmapArray};
pub use scheduler::{yield_now, Config, Mode, TaskState};
pub use scope::{parallel, task, ArgInto, InvokeCx, Runtime, Scope, ScopeJoin, Seq, TaskFactory};
pub use stream::{ReadEnd, Stream, WriteEnd};
pub use util::{neither_eot, none_eot, not_eot, round_up, round_up_div, Packet};
pub use vector::Vector;
