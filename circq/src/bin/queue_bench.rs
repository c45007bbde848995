//! Queue throughput and latency benchmark.
//!
//! Usage:
//!     cargo run --release --bin queue_bench
//!
//! Environment variables:
//!     PRODUCER_CPU=0  Pin producer to CPU 0 (default: 0)
//!     CONSUMER_CPU=2  Pin consumer to CPU 2 (default: 2)

use std::env;
use std::hint;
use std::thread;
use std::time::Instant;

use circq::{CircularQueue, MpQueue};

const QUEUE_SIZE: usize = 1 << 16;
const ITERATIONS: usize = 1 << 24;
const PRODUCERS: usize = 4;

type Payload = u64;

fn cpu_from_env(var: &str, default: usize) -> Option<usize> {
    env::var(var).ok().and_then(|s| s.parse().ok()).or(Some(default))
}

fn pin_to_cpu(cpu: Option<usize>) {
    if let Some(id) = cpu {
        core_affinity::set_for_current(core_affinity::CoreId { id });
    }
}

fn report(label: &str, ops: usize, elapsed: std::time::Duration) {
    let ops_per_ms = ops as u128 * 1_000_000 / elapsed.as_nanos().max(1);
    println!("  {label}: {ops_per_ms} ops/ms");
}

fn bench_spsc_throughput(producer_cpu: Option<usize>, consumer_cpu: Option<usize>) {
    let mut queue = CircularQueue::<Payload>::with_capacity(QUEUE_SIZE);
    let (producer, consumer) = queue.split();

    let start = Instant::now();
    thread::scope(|s| {
        s.spawn(move || {
            pin_to_cpu(consumer_cpu);
            for expected in 0..ITERATIONS as Payload {
                loop {
                    if let Some(value) = consumer.pop() {
                        assert_eq!(value, expected, "data corruption");
                        break;
                    }
                    hint::spin_loop();
                }
            }
        });

        pin_to_cpu(producer_cpu);
        for i in 0..ITERATIONS as Payload {
            while producer.push(i).is_err() {
                hint::spin_loop();
            }
        }
    });
    report("spsc push/pop", ITERATIONS, start.elapsed());
}

fn bench_spsc_bulk(producer_cpu: Option<usize>, consumer_cpu: Option<usize>) {
    const BATCH: usize = 256;
    let mut queue = CircularQueue::<Payload>::with_capacity(QUEUE_SIZE);
    let (producer, consumer) = queue.split();

    let start = Instant::now();
    thread::scope(|s| {
        s.spawn(move || {
            pin_to_cpu(consumer_cpu);
            let mut buf = [0 as Payload; BATCH];
            let mut received = 0usize;
            while received < ITERATIONS {
                let n = consumer.pop_n(&mut buf);
                if n == 0 {
                    hint::spin_loop();
                }
                received += n;
            }
        });

        pin_to_cpu(producer_cpu);
        let batch: Vec<Payload> = (0..BATCH as Payload).collect();
        let mut sent = 0usize;
        while sent < ITERATIONS {
            let want = BATCH.min(ITERATIONS - sent);
            let n = producer.push_n(&batch[..want]);
            if n == 0 {
                hint::spin_loop();
            }
            sent += n;
        }
    });
    report("spsc push_n/pop_n", ITERATIONS, start.elapsed());
}

fn bench_spsc_rtt(producer_cpu: Option<usize>, consumer_cpu: Option<usize>) {
    const ROUND_TRIPS: usize = 1 << 20;
    let mut ping = CircularQueue::<Payload>::with_capacity(1);
    let mut pong = CircularQueue::<Payload>::with_capacity(1);
    let (ping_tx, ping_rx) = ping.split();
    let (pong_tx, pong_rx) = pong.split();

    let start = Instant::now();
    thread::scope(|s| {
        s.spawn(move || {
            pin_to_cpu(consumer_cpu);
            for _ in 0..ROUND_TRIPS {
                let value = loop {
                    if let Some(value) = ping_rx.pop() {
                        break value;
                    }
                    hint::spin_loop();
                };
                while pong_tx.push(value).is_err() {
                    hint::spin_loop();
                }
            }
        });

        pin_to_cpu(producer_cpu);
        for i in 0..ROUND_TRIPS as Payload {
            while ping_tx.push(i).is_err() {
                hint::spin_loop();
            }
            while pong_rx.pop().is_none() {
                hint::spin_loop();
            }
        }
    });

    let rtt_ns = start.elapsed().as_nanos() / ROUND_TRIPS as u128;
    println!("  spsc rtt: {rtt_ns} ns");
}

fn bench_mpsc_throughput(consumer_cpu: Option<usize>) {
    let queue = MpQueue::<Payload>::with_capacity(QUEUE_SIZE);
    let per_producer = ITERATIONS / PRODUCERS;

    let start = Instant::now();
    thread::scope(|s| {
        for _ in 0..PRODUCERS {
            s.spawn(|| {
                for i in 0..per_producer as Payload {
                    while queue.push(i).is_err() {
                        hint::spin_loop();
                    }
                }
            });
        }

        pin_to_cpu(consumer_cpu);
        let Ok(consumer) = queue.consumer() else {
            return;
        };
        let mut received = 0usize;
        while received < per_producer * PRODUCERS {
            if consumer.pop().is_some() {
                received += 1;
            } else {
                hint::spin_loop();
            }
        }
    });
    report("mpsc push/pop", per_producer * PRODUCERS, start.elapsed());
}

fn main() {
    let producer_cpu = cpu_from_env("PRODUCER_CPU", 0);
    let consumer_cpu = cpu_from_env("CONSUMER_CPU", 2);

    println!("circq (capacity={QUEUE_SIZE}, iters={ITERATIONS}):");
    bench_spsc_throughput(producer_cpu, consumer_cpu);
    bench_spsc_bulk(producer_cpu, consumer_cpu);
    bench_spsc_rtt(producer_cpu, consumer_cpu);
    bench_mpsc_throughput(consumer_cpu);
}
