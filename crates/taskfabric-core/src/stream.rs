//! Bounded single-producer/single-consumer streams with end-of-transmission.
//!
//! A [`Stream<T, C>`] is a typed FIFO of capacity `C` delivering value
//! tokens in order, terminated by an optional EOT token enqueued with
//! [`WriteEnd::close`]. Tasks never share a buffer directly: the producer
//! side holds a [`WriteEnd`], the consumer side a [`ReadEnd`], and at most
//! one live endpoint per side may operate on the stream at a time.
//!
//! Blocking operations cooperate with the scheduler by yielding with a
//! descriptive message on every unsuccessful poll; the message surfaces in
//! deadlock reports.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use crate::error::{fatal, Error};
use crate::scheduler::{self, yield_once};
use crate::scope::{ArgInto, InvokeCx};

/// One slot of the FIFO: either a payload or the terminal marker.
pub(crate) enum Token<T> {
    /// A value written by the producer.
    Value(T),
    /// End-of-transmission; never overtakes values.
    Eot,
}

thread_local! {
    static NEXT_ENDPOINT: Cell<u64> = const { Cell::new(1) };
}

fn next_endpoint_id() -> u64 {
    NEXT_ENDPOINT.with(|c| {
        let id = c.get();
        c.set(id + 1);
        id
    })
}

/// Shared FIFO state behind both endpoints.
pub(crate) struct Channel<T> {
    name: String,
    capacity: usize,
    fifo: RefCell<VecDeque<Token<T>>>,
    /// EOT has been enqueued; sticky for the rest of this stream's life.
    closed: Cell<bool>,
    producer: Cell<Option<u64>>,
    consumer: Cell<Option<u64>>,
}

impl<T> Channel<T> {
    pub(crate) fn new(name: String, capacity: usize) -> Rc<Self> {
        assert!(capacity >= 1, "stream capacity must be positive");
        Rc::new(Self {
            name,
            capacity,
            fifo: RefCell::new(VecDeque::with_capacity(capacity)),
            closed: Cell::new(false),
            producer: Cell::new(None),
            consumer: Cell::new(None),
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> usize {
        self.fifo.borrow().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    /// Moves the value out of `slot` into the FIFO if space is available.
    /// Leaves `slot` untouched and returns `false` when full.
    fn offer_from(&self, slot: &mut Option<T>) -> bool {
        if self.closed.get() {
            fatal(Error::ContractViolation {
                stream: self.name.clone(),
                detail: "write after close".to_string(),
            });
        }
        let mut fifo = self.fifo.borrow_mut();
        if fifo.len() == self.capacity {
            return false;
        }
        if let Some(v) = slot.take() {
            fifo.push_back(Token::Value(v));
            scheduler::note_progress();
        }
        true
    }

    /// Enqueues the EOT token if space is available.
    fn offer_close(&self) -> bool {
        if self.closed.get() {
            fatal(Error::ContractViolation {
                stream: self.name.clone(),
                detail: "stream closed twice".to_string(),
            });
        }
        let mut fifo = self.fifo.borrow_mut();
        if fifo.len() == self.capacity {
            return false;
        }
        fifo.push_back(Token::Eot);
        self.closed.set(true);
        scheduler::note_progress();
        true
    }

    /// Removes the head if it is a value token.
    fn try_pop(&self) -> Option<T> {
        let mut fifo = self.fifo.borrow_mut();
        match fifo.front() {
            Some(Token::Value(_)) => match fifo.pop_front() {
                Some(Token::Value(v)) => {
                    scheduler::note_progress();
                    Some(v)
                }
                _ => None,
            },
            _ => None,
        }
    }

    /// `Some(true)` if the head is EOT, `Some(false)` if it is a value,
    /// `None` if the head is not determinable yet.
    fn head_is_eot(&self) -> Option<bool> {
        match self.fifo.borrow().front() {
            Some(Token::Eot) => Some(true),
            Some(Token::Value(_)) => Some(false),
            None => None,
        }
    }

    fn claim(&self, seat: &Cell<Option<u64>>, id: u64, side: &str) {
        match seat.get() {
            None => seat.set(Some(id)),
            Some(owner) if owner == id => {}
            Some(_) => fatal(Error::ContractViolation {
                stream: self.name.clone(),
                detail: format!("a second {side} endpoint is active"),
            }),
        }
    }

    fn release(&self, seat: &Cell<Option<u64>>, id: u64) {
        if seat.get() == Some(id) {
            seat.set(None);
        }
    }
}

impl<T: Clone> Channel<T> {
    fn peek(&self) -> Option<T> {
        match self.fifo.borrow().front() {
            Some(Token::Value(v)) => Some(v.clone()),
            _ => None,
        }
    }
}

/// A bounded FIFO stream of `T` with compile-time capacity `C`.
///
/// The stream owns the buffer; tasks operate through [`ReadEnd`] and
/// [`WriteEnd`] handles, typically obtained implicitly by passing
/// `&stream` to an `invoke`. The debug name appears in every diagnostic
/// involving this stream.
pub struct Stream<T, const C: usize> {
    chan: Rc<Channel<T>>,
}

impl<T: 'static, const C: usize> Stream<T, C> {
    /// Creates an empty stream with the given debug name.
    pub fn new(name: &str) -> Self {
        Self {
            chan: Channel::new(name.to_string(), C),
        }
    }

    /// Debug name of this stream.
    pub fn name(&self) -> &str {
        self.chan.name()
    }

    /// Acquires the consumer-side handle.
    pub fn read_end(&self) -> ReadEnd<T> {
        ReadEnd::attach(self.chan.clone())
    }

    /// Acquires the producer-side handle.
    pub fn write_end(&self) -> WriteEnd<T> {
        WriteEnd::attach(self.chan.clone())
    }
}

/// Consumer-side handle of a stream.
///
/// The handle takes the stream's single consumer seat on its first
/// operation and holds it until dropped; a second handle operating while
/// the seat is taken is a contract violation.
pub struct ReadEnd<T> {
    chan: Rc<Channel<T>>,
    id: u64,
}

impl<T> ReadEnd<T> {
    pub(crate) fn attach(chan: Rc<Channel<T>>) -> Self {
        Self {
            chan,
            id: next_endpoint_id(),
        }
    }

    /// New handle on the same channel; the consumer seat still admits only
    /// one of them at a time.
    pub(crate) fn reattach(&self) -> Self {
        Self::attach(self.chan.clone())
    }

    fn claim(&self) {
        self.chan.claim(&self.chan.consumer, self.id, "consumer");
    }

    /// Debug name of the underlying stream.
    pub fn name(&self) -> &str {
        self.chan.name()
    }

    /// Whether the stream currently holds no tokens at all.
    pub fn empty(&self) -> bool {
        self.chan.is_empty()
    }

    /// Whether the stream holds `C` tokens.
    pub fn full(&self) -> bool {
        self.chan.is_full()
    }

    /// Removes and returns the head if it is a value token. Never blocks
    /// and never consumes an EOT token.
    pub fn try_read(&self) -> Option<T> {
        self.claim();
        self.chan.try_pop()
    }

    /// Reads the next value, cooperatively yielding until one arrives.
    ///
    /// Reading a stream that is at EOT is a contract violation: the
    /// transmission has ended and no further value can arrive.
    pub async fn read(&self) -> T {
        self.claim();
        loop {
            if let Some(v) = self.chan.try_pop() {
                return v;
            }
            if self.chan.head_is_eot() == Some(true) {
                fatal(Error::ContractViolation {
                    stream: self.chan.name().to_string(),
                    detail: "read past end-of-transmission".to_string(),
                });
            }
            yield_once(format!("stream `{}`: read blocked (empty)", self.chan.name())).await;
        }
    }

    /// Reads the next value if the head is a value token, otherwise
    /// returns `default` immediately. Never blocks.
    pub fn read_or(&self, default: T) -> T {
        self.claim();
        self.chan.try_pop().unwrap_or(default)
    }

    /// `Some(true)` if the head is the EOT token, `Some(false)` if it is a
    /// value, `None` if the head cannot be determined yet. Never blocks.
    pub fn try_eot(&self) -> Option<bool> {
        self.claim();
        self.chan.head_is_eot()
    }

    /// Cooperatively yields until the head is determinable, then reports
    /// whether it is the EOT token.
    pub async fn eot(&self) -> bool {
        self.claim();
        loop {
            if let Some(is_eot) = self.chan.head_is_eot() {
                return is_eot;
            }
            yield_once(format!("stream `{}`: eot blocked (empty)", self.chan.name())).await;
        }
    }
}

impl<T: Clone> ReadEnd<T> {
    /// Returns the head value without consuming it, or `None` if the head
    /// is not a value token. Never blocks.
    pub fn peek(&self) -> Option<T> {
        self.claim();
        self.chan.peek()
    }
}

impl<T> Drop for ReadEnd<T> {
    fn drop(&mut self) {
        self.chan.release(&self.chan.consumer, self.id);
    }
}

/// Producer-side handle of a stream.
///
/// Takes the single producer seat on first use, exactly like [`ReadEnd`]
/// takes the consumer seat.
pub struct WriteEnd<T> {
    chan: Rc<Channel<T>>,
    id: u64,
}

impl<T> WriteEnd<T> {
    pub(crate) fn attach(chan: Rc<Channel<T>>) -> Self {
        Self {
            chan,
            id: next_endpoint_id(),
        }
    }

    /// New handle on the same channel; see [`ReadEnd::reattach`].
    pub(crate) fn reattach(&self) -> Self {
        Self::attach(self.chan.clone())
    }

    fn claim(&self) {
        self.chan.claim(&self.chan.producer, self.id, "producer");
    }

    /// Debug name of the underlying stream.
    pub fn name(&self) -> &str {
        self.chan.name()
    }

    /// Whether the stream holds `C` tokens (the EOT token counts).
    pub fn full(&self) -> bool {
        self.chan.is_full()
    }

    /// Whether the stream currently holds no tokens at all.
    pub fn empty(&self) -> bool {
        self.chan.is_empty()
    }

    /// Appends a value token if space is available; the value is dropped
    /// when the stream is full. Never blocks. Writing after `close` is a
    /// contract violation.
    pub fn try_write(&self, v: T) -> bool {
        self.claim();
        self.chan.offer_from(&mut Some(v))
    }

    /// Appends a value token, cooperatively yielding while the stream is
    /// full. Writing after `close` is a contract violation.
    pub async fn write(&self, v: T) {
        self.claim();
        let mut pending = Some(v);
        loop {
            if self.chan.offer_from(&mut pending) {
                return;
            }
            yield_once(format!("stream `{}`: write blocked (full)", self.chan.name())).await;
        }
    }

    /// Enqueues the EOT token, cooperatively yielding while the stream is
    /// full. A stream may be closed exactly once.
    pub async fn close(&self) {
        self.claim();
        loop {
            if self.chan.offer_close() {
                return;
            }
            yield_once(format!("stream `{}`: close blocked (full)", self.chan.name())).await;
        }
    }
}

impl<T> Drop for WriteEnd<T> {
    fn drop(&mut self) {
        self.chan.release(&self.chan.producer, self.id);
    }
}

impl<T: 'static, const C: usize> ArgInto<ReadEnd<T>> for &Stream<T, C> {
    fn resolve(&self, _cx: &mut InvokeCx<'_>) -> ReadEnd<T> {
        self.read_end()
    }
}

impl<T: 'static, const C: usize> ArgInto<WriteEnd<T>> for &Stream<T, C> {
    fn resolve(&self, _cx: &mut InvokeCx<'_>) -> WriteEnd<T> {
        self.write_end()
    }
}

// Pass-through for nested invokes: a task that owns an endpoint hands its
// children fresh handles on the same channel. The single-seat rule still
// applies at operation time.
impl<T: 'static> ArgInto<ReadEnd<T>> for &ReadEnd<T> {
    fn resolve(&self, _cx: &mut InvokeCx<'_>) -> ReadEnd<T> {
        self.reattach()
    }
}

impl<T: 'static> ArgInto<WriteEnd<T>> for &WriteEnd<T> {
    fn resolve(&self, _cx: &mut InvokeCx<'_>) -> WriteEnd<T> {
        self.reattach()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::pin;
    use std::task::{Context, Poll};

    /// Polls a future once with a no-op waker.
    fn poll_once<F: Future>(fut: &mut std::pin::Pin<&mut F>) -> Poll<F::Output> {
        let waker = futures::task::noop_waker_ref();
        let mut cx = Context::from_waker(waker);
        fut.as_mut().poll(&mut cx)
    }

    #[test]
    fn test_fifo_order_within_capacity() {
        let s = Stream::<u32, 4>::new("fifo");
        let tx = s.write_end();
        let rx = s.read_end();

        for v in [10, 20, 30, 40] {
            assert!(tx.try_write(v));
        }
        for v in [10, 20, 30, 40] {
            assert_eq!(rx.try_read(), Some(v));
        }
        assert_eq!(rx.try_read(), None);
    }

    #[test]
    fn test_try_write_false_iff_full() {
        let s = Stream::<u8, 2>::new("cap");
        let tx = s.write_end();

        assert!(tx.try_write(1));
        assert!(!tx.full());
        assert!(tx.try_write(2));
        assert!(tx.full());
        assert!(!tx.try_write(3));

        let rx = s.read_end();
        assert_eq!(rx.try_read(), Some(1));
        assert!(tx.try_write(3));
    }

    #[test]
    fn test_eot_token_occupies_a_slot() {
        let s = Stream::<u8, 2>::new("eot_slot");
        let tx = s.write_end();

        assert!(tx.try_write(7));
        let mut close = pin!(tx.close());
        assert!(poll_once(&mut close).is_ready());
        assert!(tx.full());

        let rx = s.read_end();
        assert_eq!(rx.try_eot(), Some(false));
        assert_eq!(rx.try_read(), Some(7));
        assert_eq!(rx.try_eot(), Some(true));
        // EOT is never consumed by try_read.
        assert_eq!(rx.try_read(), None);
        assert_eq!(rx.try_eot(), Some(true));
    }

    #[test]
    fn test_peek_is_idempotent() {
        let s = Stream::<u32, 2>::new("peek");
        let tx = s.write_end();
        let rx = s.read_end();

        assert_eq!(rx.peek(), None);
        assert!(tx.try_write(5));
        assert_eq!(rx.peek(), Some(5));
        assert_eq!(rx.peek(), Some(5));
        assert_eq!(rx.try_read(), Some(5));
        assert_eq!(rx.peek(), None);
    }

    #[test]
    fn test_read_or_default() {
        let s = Stream::<f32, 2>::new("dflt");
        let rx = s.read_end();
        assert_eq!(rx.read_or(-1.0), -1.0);

        let tx = s.write_end();
        assert!(tx.try_write(2.5));
        assert_eq!(rx.read_or(-1.0), 2.5);
    }

    #[test]
    fn test_try_eot_indeterminable_when_empty() {
        let s = Stream::<u8, 1>::new("ind");
        let rx = s.read_end();
        assert_eq!(rx.try_eot(), None);
    }

    #[test]
    #[should_panic(expected = "write after close")]
    fn test_write_after_close_panics() {
        let s = Stream::<u8, 4>::new("wac");
        let tx = s.write_end();
        let mut close = pin!(tx.close());
        assert!(poll_once(&mut close).is_ready());
        tx.try_write(1);
    }

    #[test]
    #[should_panic(expected = "closed twice")]
    fn test_double_close_panics() {
        let s = Stream::<u8, 4>::new("dc");
        let tx = s.write_end();
        {
            let mut close = pin!(tx.close());
            assert!(poll_once(&mut close).is_ready());
        }
        let mut close = pin!(tx.close());
        let _ = poll_once(&mut close);
    }

    #[test]
    #[should_panic(expected = "second consumer")]
    fn test_two_live_consumers_panic() {
        let s = Stream::<u8, 4>::new("spsc");
        let rx1 = s.read_end();
        let rx2 = s.read_end();
        let _ = rx1.try_read();
        let _ = rx2.try_read();
    }

    #[test]
    fn test_consumer_seat_released_on_drop() {
        let s = Stream::<u8, 4>::new("seat");
        {
            let rx1 = s.read_end();
            let _ = rx1.try_read();
        }
        let rx2 = s.read_end();
        assert_eq!(rx2.try_read(), None);
    }

    #[test]
    #[should_panic(expected = "read past end-of-transmission")]
    fn test_read_past_eot_panics() {
        let s = Stream::<u8, 4>::new("rpe");
        let tx = s.write_end();
        {
            let mut close = pin!(tx.close());
            assert!(poll_once(&mut close).is_ready());
        }
        let rx = s.read_end();
        let mut read = pin!(rx.read());
        let _ = poll_once(&mut read);
    }

    #[test]
    fn test_blocking_write_resumes_after_drain() {
        let s = Stream::<u8, 1>::new("bw");
        let tx = s.write_end();
        let rx = s.read_end();

        assert!(tx.try_write(1));
        let mut write = pin!(tx.write(2));
        assert!(poll_once(&mut write).is_pending());
        assert_eq!(rx.try_read(), Some(1));
        assert!(poll_once(&mut write).is_ready());
        assert_eq!(rx.try_read(), Some(2));
    }

    #[test]
    fn test_blocking_read_resumes_after_write() {
        let s = Stream::<u8, 1>::new("br");
        let tx = s.write_end();
        let rx = s.read_end();

        let mut read = pin!(rx.read());
        assert!(poll_once(&mut read).is_pending());
        assert!(tx.try_write(9));
        assert_eq!(poll_once(&mut read), Poll::Ready(9));
    }
}
