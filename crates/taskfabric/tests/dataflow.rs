//! End-to-end dataflow pipelines: vector add, stencil EOT propagation,
//! a 2x2 switching element, and positional wiring of replicated workers.

use taskfabric::prelude::*;

async fn produce(values: Vec<f32>, out: WriteEnd<f32>) {
    for v in values {
        out.write(v).await;
    }
    out.close().await;
}

async fn add(a: ReadEnd<f32>, b: ReadEnd<f32>, c: WriteEnd<f32>) {
    while neither_eot(&a, &b).await {
        let x = a.read_or(0.0);
        let y = b.read_or(0.0);
        c.write(x + y).await;
    }
    c.close().await;
}

async fn consume3(c: ReadEnd<f32>, out: Mmap<f32>, eot_seen: Mmap<u32>) {
    for i in 0..3 {
        out.set(i, c.read().await);
    }
    if c.eot().await {
        eot_seen.set(0, eot_seen.get(0) + 1);
    }
}

/// Vector add through capacity-2 streams; the reader observes EOT exactly
/// once after draining all three sums.
#[test]
fn test_vector_add_pipeline() {
    let mut out = vec![0.0f32; 3];
    let mut eot_seen = vec![0u32; 1];

    let a_q = Stream::<f32, 2>::new("a");
    let b_q = Stream::<f32, 2>::new("b");
    let c_q = Stream::<f32, 2>::new("c");

    task()
        .invoke(produce, (vec![1.0f32, 2.0, 3.0], &a_q))
        .invoke(produce, (vec![10.0f32, 20.0, 30.0], &b_q))
        .invoke(add, (&a_q, &b_q, &c_q))
        .invoke(
            consume3,
            (&c_q, Mmap::from_slice(&mut out), Mmap::from_slice(&mut eot_seen)),
        )
        .join();

    assert_eq!(out, vec![11.0, 22.0, 33.0]);
    assert_eq!(eot_seen[0], 1);
}

async fn feed(out: WriteEnd<i32>) {
    for v in 1..=5 {
        out.write(v).await;
    }
    out.close().await;
}

async fn delay_sum(input: ReadEnd<i32>, out: WriteEnd<i32>) {
    // One-stage delay line: the first value passes through without a
    // prior addend.
    let mut prev = 0;
    while not_eot(&input).await {
        let v = input.read_or(0);
        out.write(v + prev).await;
        prev = v;
    }
    out.close().await;
}

async fn collect(input: ReadEnd<i32>, dst: Mmap<i32>, count: Mmap<u32>) {
    let mut i = 0;
    while not_eot(&input).await {
        dst.set(i, input.read_or(0));
        i += 1;
    }
    count.set(0, i as u32);
}

/// EOT propagates through a two-stage pipeline; the delayed sums appear
/// before the terminal marker.
#[test]
fn test_stencil_eot_propagation() {
    let mut out = vec![i32::MIN; 5];
    let mut count = vec![0u32; 1];

    let p_q = Stream::<i32, 2>::new("p");
    let q_q = Stream::<i32, 2>::new("q");

    task()
        .invoke(feed, (&p_q,))
        .invoke(delay_sum, (&p_q, &q_q))
        .invoke(
            collect,
            (&q_q, Mmap::from_slice(&mut out), Mmap::from_slice(&mut count)),
        )
        .join();

    assert_eq!(out, vec![1, 3, 5, 7, 9]);
    assert_eq!(count[0], 5);
}

async fn feed_packets(values: Vec<u64>, out: WriteEnd<u64>) {
    for v in values {
        out.write(v).await;
    }
}

async fn switch2x2(b: u32, in0: ReadEnd<u64>, in1: ReadEnd<u64>, out: WriteEnds<u64, 2>) {
    let dest = |p: u64| ((p >> b) & 1) as usize;
    let mut prioritize_1 = false;
    loop {
        let pkt0 = in0.peek();
        let pkt1 = in1.peek();

        let fwd_0_0 = matches!(pkt0, Some(p) if dest(p) == 0);
        let fwd_0_1 = matches!(pkt0, Some(p) if dest(p) == 1);
        let fwd_1_0 = matches!(pkt1, Some(p) if dest(p) == 0);
        let fwd_1_1 = matches!(pkt1, Some(p) if dest(p) == 1);

        let conflict =
            pkt0.is_some() && pkt1.is_some() && fwd_0_0 == fwd_1_0 && fwd_0_1 == fwd_1_1;

        let read_0 = !((!fwd_0_0 && !fwd_0_1) || (prioritize_1 && conflict));
        let read_1 = !((!fwd_1_0 && !fwd_1_1) || (!prioritize_1 && conflict));
        let write_0 = fwd_0_0 || fwd_1_0;
        let write_1 = fwd_1_1 || fwd_0_1;
        let write_0_0 = fwd_0_0 && (!fwd_1_0 || !prioritize_1);
        let write_1_1 = fwd_1_1 && (!fwd_0_1 || prioritize_1);

        let written_0 = write_0
            && out[0].try_write(if write_0_0 {
                pkt0.unwrap_or(0)
            } else {
                pkt1.unwrap_or(0)
            });
        let written_1 = write_1
            && out[1].try_write(if write_1_1 {
                pkt1.unwrap_or(0)
            } else {
                pkt0.unwrap_or(0)
            });

        if read_0 && (if write_0_0 { written_0 } else { written_1 }) {
            let _ = in0.try_read();
        }
        if read_1 && (if write_1_1 { written_1 } else { written_0 }) {
            let _ = in1.try_read();
        }

        if conflict {
            prioritize_1 = !prioritize_1;
        }
        yield_now("switch: arbitration pass").await;
    }
}

async fn take2(port: ReadEnd<u64>, dst: Mmap<u64>) {
    dst.set(0, port.read().await);
    dst.set(1, port.read().await);
}

/// Packets tagged by bit 0 land on the matching output port; order among
/// contenders is unspecified but both must appear.
#[test]
fn test_switch_routes_by_tag_bit() {
    let mut port0 = vec![u64::MAX; 2];
    let mut port1 = vec![u64::MAX; 2];

    let i0 = Stream::<u64, 4>::new("i0");
    let i1 = Stream::<u64, 4>::new("i1");
    let ports = StreamBundle::<u64, 4, 2>::new("port");

    task()
        .invoke(feed_packets, (vec![0b00u64, 0b01], &i0))
        .invoke(feed_packets, (vec![0b10u64, 0b11], &i1))
        .invoke_detached(switch2x2, (0u32, &i0, &i1, &ports))
        .invoke(take2, (&ports, Mmap::from_slice(&mut port0)))
        .invoke(take2, (&ports, Mmap::from_slice(&mut port1)))
        .join();

    port0.sort_unstable();
    port1.sort_unstable();
    assert_eq!(port0, vec![0b00, 0b10]);
    assert_eq!(port1, vec![0b01, 0b11]);
}

async fn mark(slot: Mmap<u32>, ordinal: u64) {
    slot.set(0, 100 + ordinal as u32);
}

/// `invoke_n` scatters one mmap per invocation and hands each worker its
/// ordinal identity.
#[test]
fn test_positional_scatter_with_ordinals() {
    let mut bufs: Vec<Vec<u32>> = (0..4).map(|_| vec![0u32; 1]).collect();
    let mut iter = bufs.iter_mut();
    let arr = MmapArray::<u32, 4>::new(std::array::from_fn(|_| {
        Mmap::from_slice(iter.next().expect("four buffers"))
    }));

    task().invoke_n(4, mark, (&arr, Seq::new())).join();

    for (i, buf) in bufs.iter().enumerate() {
        assert_eq!(buf[0], 100 + i as u32);
    }
}

async fn scatter_lanes(values: Vec<u64>, out: WriteEnds<u64, 4>) {
    for (i, v) in values.into_iter().enumerate() {
        out[i % 4].write(v).await;
    }
    out.close().await;
}

async fn drain_lane(lane: ReadEnd<u64>, dst: Mmap<u64>) {
    let mut i = 0;
    while not_eot(&lane).await {
        dst.set(i, lane.read_or(0));
        i += 1;
    }
}

/// A bundle argument peels a full-width endpoint bundle for one task and
/// single lanes for a row of replicated drainers.
#[test]
fn test_bundle_peels_lanes_per_invocation() {
    let mut sinks: Vec<Vec<u64>> = (0..4).map(|_| vec![0u64; 2]).collect();
    let mut iter = sinks.iter_mut();
    let arr = MmapArray::<u64, 4>::new(std::array::from_fn(|_| {
        Mmap::from_slice(iter.next().expect("four sinks"))
    }));

    let lanes = StreamBundle::<u64, 2, 4>::new("lane");
    task()
        .invoke(scatter_lanes, (vec![0u64, 1, 2, 3, 10, 11, 12, 13], &lanes))
        .invoke_n(4, drain_lane, (&lanes, &arr))
        .join();

    for (i, sink) in sinks.iter().enumerate() {
        assert_eq!(sink, &vec![i as u64, 10 + i as u64]);
    }
}

async fn add_blocking(n: u64, a: ReadEnd<f32>, b: ReadEnd<f32>, c: WriteEnd<f32>) {
    for _ in 0..n {
        let x = a.read().await;
        let y = b.read().await;
        c.write(x + y).await;
    }
    c.close().await;
}

async fn compute(n: u64, a: ReadEnd<f32>, b: ReadEnd<f32>, c: WriteEnd<f32>) {
    // A nested scope suspends the enclosing task until the child returns.
    parallel().invoke(add_blocking, (n, &a, &b, &c)).await;
}

async fn store(stream: ReadEnd<f32>, dst: Mmap<f32>, n: u64) {
    for i in 0..n as usize {
        dst.set(i, stream.read().await);
    }
}

/// Scopes nest: a task may wire its own children and await them.
#[test]
fn test_nested_scope_joins_inside_task() {
    let mut out = vec![0.0f32; 4];

    let a_q = Stream::<f32, 8>::new("a");
    let b_q = Stream::<f32, 8>::new("b");
    let c_q = Stream::<f32, 8>::new("c");

    task()
        .invoke(produce, (vec![1.0f32, 2.0, 3.0, 4.0], &a_q))
        .invoke(produce, (vec![4.0f32, 3.0, 2.0, 1.0], &b_q))
        .invoke(compute, (4u64, &a_q, &b_q, &c_q))
        .invoke(store, (&c_q, Mmap::from_slice(&mut out), 4u64))
        .join();

    assert_eq!(out, vec![5.0; 4]);
}
