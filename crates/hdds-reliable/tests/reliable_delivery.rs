// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic
#![allow(clippy::cast_possible_truncation)] // Test parameters

//! End-to-end repair over a lossy in-process link.

mod common;

use std::thread;
use std::time::{Duration, Instant};

use common::{drop_first_data, fast_config, lossy_link, Pair};
use hdds_reliable::{QosProfile, RuntimeConfig};
use parking_lot::Mutex;

#[test]
fn test_lost_two_and_four_repaired_by_single_nack() {
    let pair = Pair::new(RuntimeConfig::default());
    let link = drop_first_data(&pair.net, &[2, 4]);

    let writer = pair
        .publisher
        .create_writer(QosProfile::reliable().keep_all())
        .expect("writer");
    let reader = pair
        .subscriber
        .create_reader(QosProfile::reliable().keep_all())
        .expect("reader");
    pair.connect(&writer, &reader);

    for i in 1..=5u8 {
        assert_eq!(writer.write(b"sensor", &[i]).expect("write"), u64::from(i));
    }
    pair.pump();
    assert_eq!(*link.dropped.lock(), vec![2, 4]);
    // 3 and 5 wait behind the hole
    assert_eq!(reader.available(), 1);

    // HEARTBEAT(1..5) -> ACKNACK{2,4} -> DATA 2, 4
    pair.publisher.tick(Instant::now());
    pair.pump();

    assert_eq!(*link.nacks.lock(), vec![vec![2, 4]]);
    assert_eq!(reader.metrics().nacks_sent, 1);
    assert_eq!(writer.metrics().retransmit_sent, 2);

    let taken: Vec<(u64, Vec<u8>)> = reader
        .take()
        .map(|s| (s.seq, s.payload.to_vec()))
        .collect();
    assert_eq!(
        taken,
        (1..=5u8).map(|i| (u64::from(i), vec![i])).collect::<Vec<_>>()
    );
    assert_eq!(reader.status().sample_lost.total_count, 0);
}

#[test]
fn test_random_loss_delivers_everything_in_order() {
    const TOTAL: u64 = 200;

    let pair = Pair::new(fast_config());
    let rng = Mutex::new(fastrand::Rng::with_seed(0x5eed));
    let link = lossy_link(&pair.net, move |_| rng.lock().f64() < 0.25);

    let writer = pair
        .publisher
        .create_writer(QosProfile::reliable().keep_all())
        .expect("writer");
    let reader = pair
        .subscriber
        .create_reader(QosProfile::reliable().keep_all())
        .expect("reader");
    pair.connect(&writer, &reader);

    for i in 0..TOTAL {
        writer.write(b"k", &i.to_le_bytes()).expect("write");
    }
    pair.pump();

    let mut taken = Vec::new();
    for _ in 0..5_000 {
        taken.extend(reader.take().map(|s| s.seq));
        if taken.len() as u64 == TOTAL && writer.is_acknowledged() {
            break;
        }
        pair.round();
        thread::sleep(Duration::from_millis(1));
    }

    assert!(!link.dropped.lock().is_empty());
    assert_eq!(taken, (1..=TOTAL).collect::<Vec<u64>>());
    assert!(writer.is_acknowledged());
    // KEEP_ALL retains only what is not yet acknowledged
    assert_eq!(writer.retained(), 0);
    assert_eq!(reader.status().sample_lost.total_count, 0);
    assert!(reader.metrics().retransmit_received > 0);
}

#[test]
fn test_burst_of_consecutive_drops_recovered() {
    let pair = Pair::new(fast_config());
    let burst: Vec<u64> = (10..=14).collect();
    let link = drop_first_data(&pair.net, &burst);

    let writer = pair
        .publisher
        .create_writer(QosProfile::reliable().keep_all())
        .expect("writer");
    let reader = pair
        .subscriber
        .create_reader(QosProfile::reliable().keep_all())
        .expect("reader");
    pair.connect(&writer, &reader);

    for i in 0..20u8 {
        writer.write(b"k", &[i]).expect("write");
    }

    let mut taken = Vec::new();
    for _ in 0..1_000 {
        pair.round();
        taken.extend(reader.take().map(|s| s.seq));
        if taken.len() == 20 {
            break;
        }
        thread::sleep(Duration::from_millis(1));
    }

    assert_eq!(*link.dropped.lock(), burst);
    assert_eq!(taken, (1..=20).collect::<Vec<u64>>());
}

#[test]
fn test_best_effort_never_repairs() {
    const TOTAL: u64 = 50;

    let pair = Pair::new(RuntimeConfig::default());
    let link = lossy_link(&pair.net, |seq| seq % 5 == 0);

    let writer = pair
        .publisher
        .create_writer(QosProfile::best_effort())
        .expect("writer");
    let reader = pair
        .subscriber
        .create_reader(QosProfile::best_effort().keep_last(100))
        .expect("reader");
    pair.connect(&writer, &reader);

    for i in 0..TOTAL {
        writer.write(b"k", &i.to_le_bytes()).expect("write");
    }
    pair.pump();
    for _ in 0..3 {
        pair.round();
    }

    let taken: Vec<u64> = reader.take().map(|s| s.seq).collect();
    let expected: Vec<u64> = (1..=TOTAL).filter(|seq| seq % 5 != 0).collect();
    assert_eq!(taken, expected);
    assert_eq!(link.dropped.lock().len(), 10);
    assert!(link.nacks.lock().is_empty());
    assert_eq!(reader.metrics().nacks_sent, 0);
    assert_eq!(writer.metrics().heartbeats_sent, 0);
}

#[test]
fn test_reliable_writer_serves_best_effort_reader() {
    let pair = Pair::new(RuntimeConfig::default());
    let link = drop_first_data(&pair.net, &[2]);

    let writer = pair
        .publisher
        .create_writer(QosProfile::reliable().keep_all())
        .expect("writer");
    let reader = pair
        .subscriber
        .create_reader(QosProfile::best_effort().keep_last(10))
        .expect("reader");
    pair.connect(&writer, &reader);

    for i in 1..=3u8 {
        writer.write(b"k", &[i]).expect("write");
    }
    pair.pump();
    pair.round();

    assert_eq!(*link.dropped.lock(), vec![2]);
    assert_eq!(reader.take().map(|s| s.seq).collect::<Vec<_>>(), vec![1, 3]);
    assert!(link.nacks.lock().is_empty());
}

#[test]
fn test_late_joiner_starts_at_current_sequence() {
    let pair = Pair::new(RuntimeConfig::default());
    let writer = pair
        .publisher
        .create_writer(QosProfile::reliable().keep_all())
        .expect("writer");
    for i in 1..=3u8 {
        writer.write(b"k", &[i]).expect("write");
    }

    let reader = pair
        .subscriber
        .create_reader(QosProfile::reliable().keep_all())
        .expect("reader");
    pair.connect(&writer, &reader);
    writer.write(b"k", &[4]).expect("write");
    pair.pump();
    pair.round();

    assert_eq!(reader.take().map(|s| s.seq).collect::<Vec<_>>(), vec![4]);
    assert_eq!(reader.status().sample_lost.total_count, 0);
    assert!(writer.is_acknowledged());
}
