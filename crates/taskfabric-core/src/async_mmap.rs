//! Stream-backed random access memory.
//!
//! An [`AsyncMmap<T>`] exposes a memory view through five streams so that
//! random access plugs into the same cooperative fabric as task-to-task
//! FIFOs: addresses go out on `read_addr`, data comes back on `read_data`;
//! writes travel as `write_addr`/`write_data` pairs and are acknowledged
//! in batches on `write_resp`. A detached service task owns the actual
//! loads and stores and performs one pass over the channels per
//! scheduling quantum.
//!
//! Async mmaps are produced only by the scope adapter (pass an [`Mmap`]
//! argument where the task parameter is `AsyncMmap`); the handle offers no
//! direct element access.

use bytemuck::Pod;

use crate::error::{fatal, Error};
use crate::mmap::{Mmap, MmapArray};
use crate::scheduler::yield_now;
use crate::scope::{ArgInto, InvokeCx};
use crate::stream::{Channel, ReadEnd, WriteEnd};

/// Capacity of each of the five internal channels.
const CHANNEL_DEPTH: usize = 64;

/// Ceiling on in-flight writes per acknowledgement batch.
const WRITE_BURST: u16 = 256;

/// Handle to a memory view accessed through streams.
///
/// A `write_resp` value `r` acknowledges `r + 1` completed writes, so one
/// response covers between 1 and 256 stores.
pub struct AsyncMmap<T> {
    /// Read request channel: each address written here triggers one load.
    pub read_addr: WriteEnd<u64>,
    /// Loaded values, in request order.
    pub read_data: ReadEnd<T>,
    /// Write request channel, paired element-wise with `write_data`.
    pub write_addr: WriteEnd<u64>,
    /// Values for the paired write requests.
    pub write_data: WriteEnd<T>,
    /// Batched write acknowledgements (`count − 1` encoding).
    pub write_resp: ReadEnd<u8>,
    _priv: (),
}

impl<T: Pod + 'static> AsyncMmap<T> {
    /// Wraps `mem` in channels and spawns the detached service task.
    pub(crate) fn spawn_service(mem: Mmap<T>, cx: &mut InvokeCx<'_>) -> Self {
        let read_addr = Channel::new("read_addr".to_string(), CHANNEL_DEPTH);
        let read_data = Channel::new("read_data".to_string(), CHANNEL_DEPTH);
        let write_addr = Channel::new("write_addr".to_string(), CHANNEL_DEPTH);
        let write_data = Channel::new("write_data".to_string(), CHANNEL_DEPTH);
        let write_resp = Channel::new("write_resp".to_string(), CHANNEL_DEPTH);

        let handle = Self {
            read_addr: WriteEnd::attach(read_addr.clone()),
            read_data: ReadEnd::attach(read_data.clone()),
            write_addr: WriteEnd::attach(write_addr.clone()),
            write_data: WriteEnd::attach(write_data.clone()),
            write_resp: ReadEnd::attach(write_resp.clone()),
            _priv: (),
        };

        cx.spawn_detached(
            "async_mmap".to_string(),
            Box::pin(service(
                mem,
                ReadEnd::attach(read_addr),
                WriteEnd::attach(read_data),
                ReadEnd::attach(write_addr),
                ReadEnd::attach(write_data),
                WriteEnd::attach(write_resp),
            )),
        );
        handle
    }
}

/// Validates an element address against the view size.
///
/// Address 0 is accepted unconditionally; every other address must lie in
/// `[0, size)`.
fn check_bounds(addr: u64, size: usize) -> usize {
    if addr != 0 && addr as usize >= size {
        fatal(Error::OutOfRange { addr, size });
    }
    addr as usize
}

/// The resident service loop: one pass over all channels per quantum.
async fn service<T: Pod>(
    mem: Mmap<T>,
    read_addr: ReadEnd<u64>,
    read_data: WriteEnd<T>,
    write_addr: ReadEnd<u64>,
    write_data: ReadEnd<T>,
    write_resp: WriteEnd<u8>,
) {
    let mut write_count: u16 = 0;
    loop {
        if !read_addr.empty() && !read_data.full() {
            if let Some(addr) = read_addr.try_read() {
                let _pushed = read_data.try_write(mem.get(check_bounds(addr, mem.len())));
                debug_assert!(_pushed, "read_data had space");
            }
        }

        if write_count != WRITE_BURST && !write_addr.empty() && !write_data.empty() {
            if let (Some(addr), Some(v)) = (write_addr.try_read(), write_data.try_read()) {
                mem.set(check_bounds(addr, mem.len()), v);
                write_count += 1;
            }
        } else if write_count > 0 && write_resp.try_write((write_count - 1) as u8) {
            write_count = 0;
        }

        yield_now("async mmap service: end of pass").await;
    }
}

impl<T: Pod + 'static> ArgInto<AsyncMmap<T>> for Mmap<T> {
    fn resolve(&self, cx: &mut InvokeCx<'_>) -> AsyncMmap<T> {
        AsyncMmap::spawn_service(*self, cx)
    }
}

impl<T: Pod + 'static, const S: usize> ArgInto<AsyncMmap<T>> for &MmapArray<T, S> {
    fn resolve(&self, cx: &mut InvokeCx<'_>) -> AsyncMmap<T> {
        AsyncMmap::spawn_service(self.take_slot(), cx)
    }
}
