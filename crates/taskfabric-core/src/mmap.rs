//! Memory views with pointer-like element access.
//!
//! An [`Mmap<T>`] is a borrowed view of contiguous elements: a base pointer
//! and an element count. It does not own memory; the viewed region must
//! outlive the task graph, which holds structurally because the root scope
//! joins its children before control returns to the code that owns the
//! region. Multiple tasks may hold overlapping views; element access is by
//! raw-pointer load/store, and partitioning writes between tasks is the
//! application's contract.
//!
//! [`MmapArray<T, S>`] groups `S` views and adds the positional accessor
//! used to scatter one view per invocation across replicated workers.

use std::cell::Cell;
use std::marker::PhantomData;
use std::mem::{align_of, size_of};
use std::ptr::NonNull;

use bytemuck::Pod;
use tracing::warn;

use crate::error::{fatal, Error, Result};
use crate::scope::{ArgInto, InvokeCx};
use crate::vector::Vector;

/// A view of consecutive memory with synchronous random access.
pub struct Mmap<T> {
    ptr: NonNull<T>,
    len: usize,
    _marker: PhantomData<*mut T>,
}

impl<T> Clone for Mmap<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Mmap<T> {}

impl<T> Mmap<T> {
    /// Creates a view over `slice`.
    ///
    /// The region must stay allocated for the lifetime of the task graph
    /// that uses the view.
    pub fn from_slice(slice: &mut [T]) -> Self {
        Self {
            ptr: NonNull::new(slice.as_mut_ptr()).unwrap_or(NonNull::dangling()),
            len: slice.len(),
            _marker: PhantomData,
        }
    }

    /// Element count of the view.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Moves the base of the view forward by `n` elements. The element
    /// count is unchanged, matching pointer-increment semantics.
    pub fn advance(&mut self, n: usize) {
        // SAFETY: staying within the viewed allocation is the caller's
        // contract, as with any pointer arithmetic on the region.
        self.ptr = unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(n)) };
    }

    /// Moves the base of the view back by `n` elements.
    pub fn rewind(&mut self, n: usize) {
        // SAFETY: see `advance`.
        self.ptr = unsafe { NonNull::new_unchecked(self.ptr.as_ptr().sub(n)) };
    }
}

impl<T: Copy> Mmap<T> {
    /// Loads element `i`.
    pub fn get(&self, i: usize) -> T {
        debug_assert!(i < self.len, "index {i} outside mmap view of {} elements", self.len);
        // SAFETY: the element lies within the viewed allocation; access
        // goes through the raw pointer so overlapping views stay valid.
        unsafe { self.ptr.as_ptr().add(i).read() }
    }

    /// Stores `v` to element `i`.
    pub fn set(&self, i: usize, v: T) {
        debug_assert!(i < self.len, "index {i} outside mmap view of {} elements", self.len);
        // SAFETY: see `get`.
        unsafe {
            self.ptr.as_ptr().add(i).write(v);
        }
    }
}

impl<T: Pod> Mmap<T> {
    /// Reinterprets the view as vectors of `N` lanes without copying.
    ///
    /// The element count must be a multiple of `N`; violation is fatal.
    pub fn vectorized<const N: usize>(&self) -> Mmap<Vector<T, N>> {
        match self.try_vectorized() {
            Ok(m) => m,
            Err(e) => fatal(e),
        }
    }

    /// Fallible form of [`Mmap::vectorized`].
    pub fn try_vectorized<const N: usize>(&self) -> Result<Mmap<Vector<T, N>>> {
        if N == 0 {
            return Err(Error::InvalidReinterpret("lane count must be positive".into()));
        }
        if self.len % N != 0 {
            return Err(Error::InvalidReinterpret(format!(
                "length {} is not a multiple of {N}",
                self.len
            )));
        }
        Ok(Mmap {
            ptr: self.ptr.cast(),
            len: self.len / N,
            _marker: PhantomData,
        })
    }

    /// Reinterprets the element type as `U` without copying.
    ///
    /// The view's byte length must divide evenly into `U` elements and the
    /// base pointer must satisfy `U`'s alignment; violations are fatal.
    pub fn reinterpret<U: Pod>(&self) -> Mmap<U> {
        match self.try_reinterpret() {
            Ok(m) => m,
            Err(e) => fatal(e),
        }
    }

    /// Fallible form of [`Mmap::reinterpret`].
    pub fn try_reinterpret<U: Pod>(&self) -> Result<Mmap<U>> {
        if size_of::<U>() == 0 {
            return Err(Error::InvalidReinterpret(
                "target element type is zero-sized".into(),
            ));
        }
        let bytes = self.len * size_of::<T>();
        if bytes % size_of::<U>() != 0 {
            return Err(Error::InvalidReinterpret(format!(
                "{bytes} bytes do not divide into {}-byte elements",
                size_of::<U>()
            )));
        }
        if (self.ptr.as_ptr() as usize) % align_of::<U>() != 0 {
            return Err(Error::InvalidReinterpret(format!(
                "base pointer is not {}-byte aligned",
                align_of::<U>()
            )));
        }
        Ok(Mmap {
            ptr: self.ptr.cast(),
            len: bytes / size_of::<U>(),
            _marker: PhantomData,
        })
    }
}

/// An array of `S` memory views with a positional access cursor.
pub struct MmapArray<T, const S: usize> {
    views: [Mmap<T>; S],
    pos: Cell<usize>,
}

impl<T, const S: usize> MmapArray<T, S> {
    /// Groups `S` views into an array.
    pub fn new(views: [Mmap<T>; S]) -> Self {
        Self {
            views,
            pos: Cell::new(0),
        }
    }

    /// The `i`-th view.
    pub fn get(&self, i: usize) -> Mmap<T> {
        self.views[i]
    }

    /// Number of views.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        S
    }

    /// Returns the next view in positional order, wrapping modulo `S`
    /// with a warning once the array is over-subscribed.
    pub(crate) fn take_slot(&self) -> Mmap<T> {
        let pos = self.pos.get();
        if pos >= S {
            warn!(
                invocation = pos,
                slot = pos % S,
                "positional access wrapped around a {S}-entry mmap array"
            );
        }
        self.pos.set(pos + 1);
        self.views[pos % S]
    }

    /// A sub-array of `LEN` views starting at `OFFSET`.
    pub fn slice<const OFFSET: usize, const LEN: usize>(&self) -> MmapArray<T, LEN> {
        assert!(OFFSET + LEN <= S, "slice outside mmap array bounds");
        MmapArray::new(std::array::from_fn(|i| self.views[OFFSET + i]))
    }
}

impl<T: Pod, const S: usize> MmapArray<T, S> {
    /// Applies [`Mmap::vectorized`] to every view.
    pub fn vectorized<const N: usize>(&self) -> MmapArray<Vector<T, N>, S> {
        MmapArray::new(std::array::from_fn(|i| self.views[i].vectorized::<N>()))
    }

    /// Applies [`Mmap::reinterpret`] to every view.
    pub fn reinterpret<U: Pod>(&self) -> MmapArray<U, S> {
        MmapArray::new(std::array::from_fn(|i| self.views[i].reinterpret::<U>()))
    }
}

impl<T: 'static, const S: usize> ArgInto<Mmap<T>> for &MmapArray<T, S> {
    fn resolve(&self, _cx: &mut InvokeCx<'_>) -> Mmap<T> {
        self.take_slot()
    }
}
