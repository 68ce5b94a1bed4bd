// tests/performance.rs

//! Delivery smoke test: a realistic burst of fragment-sized messages over an
//! in-process network connection, one sender thread and one receiver. Every
//! message must arrive, whole and in order.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::panic_in_result_fn
)]

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use iomux::{Bytes, ConnectionId, IoManager, Receiver, Sender, ServiceType, BLOCK};

const MESSAGE_COUNT: u32 = 10_000;
const PAYLOAD_SIZE: usize = 55_680;

// Bytes serializes as one binary blob, like a real fragment payload would.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Fragment {
    seq: u32,
    payload: Bytes,
}
iomux::serializable_message!(Fragment);

#[test]
fn inproc_burst_delivers_every_message() {
    let iom = IoManager::get();
    iom.reset();
    iom.configure(vec![
        ConnectionId::new("burst_out", ServiceType::NetSender, "inproc://burst"),
        ConnectionId::new("burst_in", ServiceType::NetReceiver, "inproc://burst"),
    ])
    .unwrap();

    // Create the receiver before the burst starts so no frame can be
    // published into a channel nobody drains.
    let receiver = iom.get_receiver::<Fragment>(&"burst_in".into()).unwrap();
    let sender = iom.get_sender::<Fragment>(&"burst_out".into()).unwrap();

    let producer = thread::spawn(move || {
        for seq in 0..MESSAGE_COUNT {
            let fragment = Fragment {
                seq,
                payload: Bytes::from(vec![(seq % 251) as u8; PAYLOAD_SIZE]),
            };
            sender.send(fragment, BLOCK).unwrap();
        }
    });

    for expected in 0..MESSAGE_COUNT {
        let fragment = receiver.receive(Duration::from_secs(10)).unwrap();
        assert_eq!(fragment.seq, expected);
        assert_eq!(fragment.payload.len(), PAYLOAD_SIZE);
        assert_eq!(fragment.payload[0], (expected % 251) as u8);
    }

    producer.join().unwrap();

    // Nothing left behind.
    assert!(receiver.receive(Duration::from_millis(10)).is_err());
    iom.reset();
}
