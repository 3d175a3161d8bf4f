// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Two participants over one in-process network.

#![allow(dead_code)] // Each test binary uses a subset

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use hdds_reliable::reliability::{RtpsMessage, Submessage};
use hdds_reliable::{
    DataReader, DataWriter, Guid, IntraNetwork, IntraProcessTransport, LocatorSet, Participant,
    Reliability, RuntimeConfig, StaticDiscovery, Transport,
};
use parking_lot::Mutex;

pub const PUB_PREFIX: [u8; 12] = [0x01; 12];
pub const SUB_PREFIX: [u8; 12] = [0x02; 12];

pub struct Pair {
    pub net: Arc<IntraNetwork>,
    pub discovery: Arc<StaticDiscovery>,
    pub pub_transport: Arc<IntraProcessTransport>,
    pub sub_transport: Arc<IntraProcessTransport>,
    pub publisher: Arc<Participant>,
    pub subscriber: Arc<Participant>,
}

/// Timings short enough for tests that drive time with `Instant::now()`.
pub fn fast_config() -> RuntimeConfig {
    RuntimeConfig {
        heartbeat_period: Duration::from_millis(1),
        nack_response_delay: Duration::from_millis(1),
        nack_backoff_initial: Duration::from_millis(1),
        nack_backoff_max: Duration::from_millis(4),
        acknack_rate_limit: Duration::ZERO,
        liveliness_lease: Duration::from_secs(3600),
        ..RuntimeConfig::default()
    }
}

impl Pair {
    pub fn new(config: RuntimeConfig) -> Self {
        let net = IntraNetwork::new();
        let discovery = Arc::new(StaticDiscovery::new());
        let pub_transport = Arc::new(net.attach(true));
        let sub_transport = Arc::new(net.attach(true));

        let publisher = Participant::builder("publisher")
            .with_transport(Arc::clone(&pub_transport) as Arc<dyn Transport>)
            .with_discovery(discovery.clone())
            .config(config.clone())
            .guid_prefix(PUB_PREFIX)
            .build()
            .expect("publisher");
        let subscriber = Participant::builder("subscriber")
            .with_transport(Arc::clone(&sub_transport) as Arc<dyn Transport>)
            .with_discovery(discovery.clone())
            .config(config)
            .guid_prefix(SUB_PREFIX)
            .build()
            .expect("subscriber");

        discovery.announce(
            Guid::participant(PUB_PREFIX),
            LocatorSet::new(vec![pub_transport.locator()]),
        );
        discovery.announce(
            Guid::participant(SUB_PREFIX),
            LocatorSet::new(vec![sub_transport.locator()]),
        );

        Self {
            net,
            discovery,
            pub_transport,
            sub_transport,
            publisher,
            subscriber,
        }
    }

    /// Match both ends with their own reliability.
    pub fn connect(&self, writer: &DataWriter, reader: &DataReader) {
        self.publisher
            .match_remote_reader(writer, reader.guid(), reader.qos().reliability)
            .expect("match reader");
        self.subscriber
            .match_remote_writer(reader, writer.guid(), writer.qos().reliability)
            .expect("match writer");
    }

    /// Deliver queued datagrams until both inboxes stay empty.
    pub fn pump(&self) -> usize {
        let mut total = 0;
        for _ in 0..64 {
            let moved = self.sub_transport.drain_into(&*self.subscriber)
                + self.pub_transport.drain_into(&*self.publisher);
            if moved == 0 {
                break;
            }
            total += moved;
        }
        total
    }

    /// Publisher tick, deliver, subscriber tick, deliver.
    pub fn round(&self) {
        self.publisher.tick(std::time::Instant::now());
        self.pump();
        self.subscriber.tick(std::time::Instant::now());
        self.pump();
    }
}

pub fn reliability_of(reliable: bool) -> Reliability {
    if reliable {
        Reliability::Reliable
    } else {
        Reliability::BestEffort
    }
}

/// What a lossy link did.
#[derive(Default)]
pub struct LinkLog {
    /// Sequence numbers of DATA discarded.
    pub dropped: Mutex<Vec<u64>>,
    /// Requested sequences of every ACKNACK that asked for data.
    pub nacks: Mutex<Vec<Vec<u64>>>,
}

/// Drop DATA submessages for which `should_drop(seq)` holds and log NACKs.
pub fn lossy_link<F>(net: &IntraNetwork, should_drop: F) -> Arc<LinkLog>
where
    F: Fn(u64) -> bool + Send + Sync + 'static,
{
    let log = Arc::new(LinkLog::default());
    let seen = Arc::clone(&log);
    net.set_drop_filter(move |_, datagram| {
        let Ok(msg) = RtpsMessage::decode(datagram) else {
            return false;
        };
        let mut drop = false;
        for sub in &msg.submessages {
            match sub {
                Submessage::Data(data) if should_drop(data.seq) => {
                    seen.dropped.lock().push(data.seq);
                    drop = true;
                }
                Submessage::AckNack(acknack) => {
                    let missing: Vec<u64> = acknack.missing().collect();
                    if !missing.is_empty() {
                        seen.nacks.lock().push(missing);
                    }
                }
                _ => {}
            }
        }
        drop
    });
    log
}

/// Drop only the first transmission of each of `seqs`.
pub fn drop_first_data(net: &IntraNetwork, seqs: &[u64]) -> Arc<LinkLog> {
    let pending: Mutex<HashSet<u64>> = Mutex::new(seqs.iter().copied().collect());
    lossy_link(net, move |seq| pending.lock().remove(&seq))
}
