//! # 8x8 Switching Network Example
//!
//! A three-stage banyan network of 2x2 switches. Packets carry their
//! destination port in the low three bits; each stage routes on one bit,
//! arbitrating conflicts round-robin. The switches run as detached
//! infinite loops and are torn down when the root scope exits.
//!
//! ## Run this example:
//! ```bash
//! cargo run -p taskfabric --example network
//! ```
//!
//! ## What this demonstrates:
//!
//! - Stream bundles peeled positionally across replicated switches
//! - Nested scopes spawning detached children
//! - Non-blocking `peek`/`try_write`/`try_read` arbitration loops
//! - Vectorized memory views feeding one stream lane per vector lane

use taskfabric::prelude::*;

const PORTS: usize = 8;

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

async fn inner_stage(b: u32, in0: ReadEnds<u64, 4>, in1: ReadEnds<u64, 4>, out: WriteEnds<u64, 8>) {
    parallel()
        .invoke_n_detached(PORTS / 2, switch2x2, (b, &in0, &in1, &out))
        .await;
}

async fn stage(b: u32, in_q: ReadEnds<u64, 8>, out: WriteEnds<u64, 8>) {
    // The input bundle is passed twice; the shared peel cursor hands the
    // lower four lanes to `in0` and the upper four to `in1`.
    parallel()
        .invoke_detached(inner_stage, (b, &in_q, &in_q, &out))
        .await;
}

async fn produce(src: Mmap<Vector<u64, 8>>, n: u64, out: WriteEnds<u64, 8>) {
    for i in 0..n as usize {
        out.write_vec(src.get(i)).await;
    }
}

async fn consume(dst: Mmap<Vector<u64, 8>>, n: u64, in_q: ReadEnds<u64, 8>) {
    for i in 0..n as usize {
        let v = in_q.read_vec().await;
        for j in 0..PORTS {
            assert_eq!(
                v.get(j) as usize % PORTS,
                j,
                "packet routed to the wrong port"
            );
        }
        dst.set(i, v);
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    println!("=== taskfabric 8x8 Network Example ===\n");

    let n = 64u64;

    // Wave i carries one packet per destination: lane j addresses port
    // (i + j) % 8, with the wave number in the upper bits.
    let mut input = vec![0u64; n as usize * PORTS];
    for i in 0..n as usize {
        for j in 0..PORTS {
            input[i * PORTS + j] = (((i + j) % PORTS) as u64) | ((i as u64) << 3);
        }
    }
    let mut output = vec![0u64; n as usize * PORTS];

    println!("Routing {} packets through three switch stages\n", n as usize * PORTS);

    let q0 = StreamBundle::<u64, 4096, 8>::new("q0");
    let q1 = StreamBundle::<u64, 4096, 8>::new("q1");
    let q2 = StreamBundle::<u64, 4096, 8>::new("q2");
    let q3 = StreamBundle::<u64, 4096, 8>::new("q3");

    let mmap_in = Mmap::from_slice(&mut input).vectorized::<8>();
    let mmap_out = Mmap::from_slice(&mut output).vectorized::<8>();

    parallel()
        .invoke(produce, (mmap_in, n, &q0))
        .invoke_named("stage#2", stage, (2u32, &q0, &q1))
        .invoke_named("stage#1", stage, (1u32, &q1, &q2))
        .invoke_named("stage#0", stage, (0u32, &q2, &q3))
        .invoke(consume, (mmap_out, n, &q3))
        .join();

    // Every port saw n packets, each addressed to it.
    let mut per_port = [0u64; PORTS];
    for i in 0..n as usize {
        for j in 0..PORTS {
            assert_eq!(output[i * PORTS + j] as usize % PORTS, j);
            per_port[j] += 1;
        }
    }
    assert!(per_port.iter().all(|&c| c == n));

    println!("PASS: all packets delivered to their tagged ports");
}
