//! Loop helpers for EOT-terminated pipelines, plus small numeric and
//! packet utilities shared by switching-network style workloads.

use std::fmt;

use crate::scheduler::yield_once;
use crate::stream::ReadEnd;

/// Suspends until the head of `a` is determinable, then reports whether
/// the transmission is still live.
///
/// Returns `false` at EOT and `true` when a value token is at the head,
/// so a `while not_eot(&a).await` body can read without blocking.
pub async fn not_eot<T>(a: &ReadEnd<T>) -> bool {
    loop {
        match a.try_eot() {
            Some(true) => return false,
            Some(false) => return true,
            None => {
                yield_once(format!("stream `{}`: waiting for head", a.name())).await;
            }
        }
    }
}

/// Two-stream form of [`not_eot`]: `false` as soon as either stream is at
/// EOT, `true` only when both heads are value tokens.
pub async fn neither_eot<A, B>(a: &ReadEnd<A>, b: &ReadEnd<B>) -> bool {
    loop {
        let ea = a.try_eot();
        let eb = b.try_eot();
        if ea == Some(true) || eb == Some(true) {
            return false;
        }
        if ea == Some(false) && eb == Some(false) {
            return true;
        }
        yield_once(format!(
            "streams `{}`, `{}`: waiting for heads",
            a.name(),
            b.name()
        ))
        .await;
    }
}

/// Three-stream form of [`not_eot`].
pub async fn none_eot<A, B, C>(a: &ReadEnd<A>, b: &ReadEnd<B>, c: &ReadEnd<C>) -> bool {
    loop {
        let heads = [a.try_eot(), b.try_eot(), c.try_eot()];
        if heads.contains(&Some(true)) {
            return false;
        }
        if heads.iter().all(|h| *h == Some(false)) {
            return true;
        }
        yield_once(format!(
            "streams `{}`, `{}`, `{}`: waiting for heads",
            a.name(),
            b.name(),
            c.name()
        ))
        .await;
    }
}

/// `i / N`, rounded up.
pub const fn round_up_div<const N: u64>(i: u64) -> u64 {
    (i + N - 1) / N
}

/// `i` rounded up to the next multiple of `N`.
pub const fn round_up<const N: u64>(i: u64) -> u64 {
    round_up_div::<N>(i) * N
}

/// An addressed payload, as routed through switching fabrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet<A, P> {
    /// Routing address.
    pub addr: A,
    /// Carried value.
    pub payload: P,
}

impl<A: fmt::Display, P: fmt::Display> fmt::Display for Packet<A, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{addr: {}, payload: {}}}", self.addr, self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Stream;
    use std::future::Future;
    use std::pin::pin;
    use std::task::{Context, Poll};

    fn poll_once<F: Future>(fut: &mut std::pin::Pin<&mut F>) -> Poll<F::Output> {
        let waker = futures::task::noop_waker_ref();
        let mut cx = Context::from_waker(waker);
        fut.as_mut().poll(&mut cx)
    }

    #[test]
    fn test_not_eot_tracks_head() {
        let s = Stream::<u8, 2>::new("h");
        let tx = s.write_end();
        let rx = s.read_end();

        // Indeterminable head suspends.
        {
            let mut f = pin!(not_eot(&rx));
            assert!(poll_once(&mut f).is_pending());
        }

        assert!(tx.try_write(1));
        {
            let mut f = pin!(not_eot(&rx));
            assert_eq!(poll_once(&mut f), Poll::Ready(true));
        }

        assert_eq!(rx.try_read(), Some(1));
        {
            let mut close = pin!(tx.close());
            assert!(poll_once(&mut close).is_ready());
        }
        let mut f = pin!(not_eot(&rx));
        assert_eq!(poll_once(&mut f), Poll::Ready(false));
    }

    #[test]
    fn test_neither_eot_requires_both_heads() {
        let a = Stream::<u8, 2>::new("a");
        let b = Stream::<u8, 2>::new("b");
        let (atx, arx) = (a.write_end(), a.read_end());
        let (btx, brx) = (b.write_end(), b.read_end());

        assert!(atx.try_write(1));
        {
            // `b` is still indeterminable.
            let mut f = pin!(neither_eot(&arx, &brx));
            assert!(poll_once(&mut f).is_pending());
        }

        assert!(btx.try_write(2));
        let mut f = pin!(neither_eot(&arx, &brx));
        assert_eq!(poll_once(&mut f), Poll::Ready(true));
    }

    #[test]
    fn test_rounding_helpers() {
        assert_eq!(round_up_div::<8>(0), 0);
        assert_eq!(round_up_div::<8>(1), 1);
        assert_eq!(round_up_div::<8>(8), 1);
        assert_eq!(round_up_div::<8>(9), 2);
        assert_eq!(round_up::<8>(9), 16);
        assert_eq!(round_up::<256>(300), 512);
    }

    #[test]
    fn test_packet_display() {
        let p = Packet {
            addr: 3u32,
            payload: 99u64,
        };
        assert_eq!(p.to_string(), "{addr: 3, payload: 99}");
    }
}
