//! Bundles of streams sharing element type and capacity.
//!
//! A [`StreamBundle<T, C, N>`] declares `N` independent streams at once;
//! lane `i` carries the debug name `"<name>[i]"`. Bundles are wiring
//! sugar: passed to an `invoke`, they peel off endpoints positionally, so
//! a row of replicated workers can each grab their own lane (or a narrower
//! sub-bundle) from a single argument. The peel cursor is shared across
//! every use of the same bundle within an invoke sequence and wraps with a
//! warning, like the mmap array's positional accessor.

use std::cell::Cell;
use std::ops::Index;

use bytemuck::Pod;
use tracing::warn;

use crate::scope::{ArgInto, InvokeCx};
use crate::stream::{ReadEnd, Stream, WriteEnd};
use crate::vector::Vector;

/// `N` independent streams of `T` with capacity `C`, indexable as `0..N`.
pub struct StreamBundle<T, const C: usize, const N: usize> {
    lanes: [Stream<T, C>; N],
    // Consumer-side and producer-side peeling advance independently, so
    // one bundle can feed a row of readers and a row of writers.
    read_cursor: Cell<usize>,
    write_cursor: Cell<usize>,
}

impl<T: 'static, const C: usize, const N: usize> StreamBundle<T, C, N> {
    /// Creates the bundle; lane `i` is named `"<name>[i]"`.
    pub fn new(name: &str) -> Self {
        Self {
            lanes: std::array::from_fn(|i| Stream::new(&format!("{name}[{i}]"))),
            read_cursor: Cell::new(0),
            write_cursor: Cell::new(0),
        }
    }

    /// Number of lanes.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        N
    }

    fn take_lane(&self, cursor: &Cell<usize>) -> usize {
        let pos = cursor.get();
        if pos >= N {
            warn!(
                lane = pos % N,
                "positional access wrapped around a {N}-lane stream bundle"
            );
        }
        cursor.set(pos + 1);
        pos % N
    }
}

impl<T, const C: usize, const N: usize> Index<usize> for StreamBundle<T, C, N> {
    type Output = Stream<T, C>;

    fn index(&self, i: usize) -> &Stream<T, C> {
        &self.lanes[i]
    }
}

/// Consumer endpoints of `S` bundle lanes, indexable as `0..S`.
pub struct ReadEnds<T, const S: usize> {
    lanes: [ReadEnd<T>; S],
    cursor: Cell<usize>,
}

impl<T, const S: usize> ReadEnds<T, S> {
    fn new(lanes: [ReadEnd<T>; S]) -> Self {
        Self {
            lanes,
            cursor: Cell::new(0),
        }
    }

    /// Number of lanes.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        S
    }

    fn take_lane(&self) -> usize {
        let pos = self.cursor.get();
        if pos >= S {
            warn!(
                lane = pos % S,
                "positional access wrapped around a {S}-lane endpoint bundle"
            );
        }
        self.cursor.set(pos + 1);
        pos % S
    }
}

impl<T: Pod + 'static, const S: usize> ReadEnds<T, S> {
    /// Reads one value from every lane, gathering them into a vector.
    pub async fn read_vec(&self) -> Vector<T, S> {
        let mut v: Vector<T, S> = bytemuck::Zeroable::zeroed();
        for i in 0..S {
            v.set(i, self.lanes[i].read().await);
        }
        v
    }
}

impl<T, const S: usize> Index<usize> for ReadEnds<T, S> {
    type Output = ReadEnd<T>;

    fn index(&self, i: usize) -> &ReadEnd<T> {
        &self.lanes[i]
    }
}

/// Producer endpoints of `S` bundle lanes, indexable as `0..S`.
pub struct WriteEnds<T, const S: usize> {
    lanes: [WriteEnd<T>; S],
    cursor: Cell<usize>,
}

impl<T, const S: usize> WriteEnds<T, S> {
    fn new(lanes: [WriteEnd<T>; S]) -> Self {
        Self {
            lanes,
            cursor: Cell::new(0),
        }
    }

    /// Number of lanes.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        S
    }

    fn take_lane(&self) -> usize {
        let pos = self.cursor.get();
        if pos >= S {
            warn!(
                lane = pos % S,
                "positional access wrapped around a {S}-lane endpoint bundle"
            );
        }
        self.cursor.set(pos + 1);
        pos % S
    }

    /// Closes every lane.
    pub async fn close(&self) {
        for lane in &self.lanes {
            lane.close().await;
        }
    }
}

impl<T: Pod + 'static, const S: usize> WriteEnds<T, S> {
    /// Scatters the lanes of `v`, writing lane `i` to stream `i`.
    pub async fn write_vec(&self, v: Vector<T, S>) {
        for i in 0..S {
            self.lanes[i].write(v.get(i)).await;
        }
    }
}

impl<T, const S: usize> Index<usize> for WriteEnds<T, S> {
    type Output = WriteEnd<T>;

    fn index(&self, i: usize) -> &WriteEnd<T> {
        &self.lanes[i]
    }
}

// Positional-slot adapters: a bundle argument peels one lane (or a
// narrower sub-bundle) per resolution, in declaration order.

impl<T: 'static, const C: usize, const N: usize> ArgInto<ReadEnd<T>> for &StreamBundle<T, C, N> {
    fn resolve(&self, _cx: &mut InvokeCx<'_>) -> ReadEnd<T> {
        self.lanes[self.take_lane(&self.read_cursor)].read_end()
    }
}

impl<T: 'static, const C: usize, const N: usize> ArgInto<WriteEnd<T>> for &StreamBundle<T, C, N> {
    fn resolve(&self, _cx: &mut InvokeCx<'_>) -> WriteEnd<T> {
        self.lanes[self.take_lane(&self.write_cursor)].write_end()
    }
}

impl<T: 'static, const C: usize, const N: usize, const S: usize> ArgInto<ReadEnds<T, S>>
    for &StreamBundle<T, C, N>
{
    fn resolve(&self, _cx: &mut InvokeCx<'_>) -> ReadEnds<T, S> {
        ReadEnds::new(std::array::from_fn(|_| {
            self.lanes[self.take_lane(&self.read_cursor)].read_end()
        }))
    }
}

impl<T: 'static, const C: usize, const N: usize, const S: usize> ArgInto<WriteEnds<T, S>>
    for &StreamBundle<T, C, N>
{
    fn resolve(&self, _cx: &mut InvokeCx<'_>) -> WriteEnds<T, S> {
        WriteEnds::new(std::array::from_fn(|_| {
            self.lanes[self.take_lane(&self.write_cursor)].write_end()
        }))
    }
}

impl<T: 'static, const S: usize> ArgInto<ReadEnd<T>> for &ReadEnds<T, S> {
    fn resolve(&self, _cx: &mut InvokeCx<'_>) -> ReadEnd<T> {
        self.lanes[self.take_lane()].reattach()
    }
}

impl<T: 'static, const S: usize, const P: usize> ArgInto<ReadEnds<T, P>> for &ReadEnds<T, S> {
    fn resolve(&self, _cx: &mut InvokeCx<'_>) -> ReadEnds<T, P> {
        ReadEnds::new(std::array::from_fn(|_| {
            self.lanes[self.take_lane()].reattach()
        }))
    }
}

impl<T: 'static, const S: usize> ArgInto<WriteEnd<T>> for &WriteEnds<T, S> {
    fn resolve(&self, _cx: &mut InvokeCx<'_>) -> WriteEnd<T> {
        self.lanes[self.take_lane()].reattach()
    }
}

impl<T: 'static, const S: usize, const P: usize> ArgInto<WriteEnds<T, P>> for &WriteEnds<T, S> {
    fn resolve(&self, _cx: &mut InvokeCx<'_>) -> WriteEnds<T, P> {
        WriteEnds::new(std::array::from_fn(|_| {
            self.lanes[self.take_lane()].reattach()
        }))
    }
}
