use crate::error::TransportError;
use crate::payload::PingpongPayload;
use crate::transport::{PacketRx, PacketTx, Poll};
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::hint::spin_loop;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

const EMPTY: u64 = 0;
const FULL: u64 = 1;

struct Slot {
    seq: AtomicU64,
    data: UnsafeCell<PingpongPayload>,
}

struct Shared {
    slots: Box<[CachePadded<Slot>]>,
    producer_closed: AtomicBool,
    consumer_closed: AtomicBool,
}

// Slot hand-off is mediated by the per-slot seq word: the producer only
// writes a slot it observed EMPTY, the consumer only reads one it observed
// FULL, each side clearing/setting the word after its copy.
unsafe impl Send for Shared {}
unsafe impl Sync for Shared {}

/// The "last N payloads" buffer between a transport receive path and the
/// poll loop. Single producer, single consumer; both sides walk the slots
/// round-robin with a monotonically advancing private index, and a slot is
/// zeroed at the moment it is consumed so it can never be re-consumed stale.
pub fn ring(capacity: usize) -> (RingProducer, RingConsumer) {
    assert!(capacity > 0, "capacity must be greater than 0");
    let slots = (0..capacity)
        .map(|_| {
            CachePadded::new(Slot {
                seq: AtomicU64::new(EMPTY),
                data: UnsafeCell::new(PingpongPayload::empty()),
            })
        })
        .collect();
    let shared = Arc::new(Shared {
        slots,
        producer_closed: AtomicBool::new(false),
        consumer_closed: AtomicBool::new(false),
    });

    (
        RingProducer {
            shared: shared.clone(),
            next: 0,
        },
        RingConsumer { shared, next: 0 },
    )
}

pub struct RingProducer {
    shared: Arc<Shared>,
    next: usize,
}

impl RingProducer {
    /// Writes `payload` into the next slot. Returns false without touching
    /// the ring when the consumer has not yet drained that slot.
    pub fn publish(&mut self, payload: &PingpongPayload) -> bool {
        let slot = &self.shared.slots[self.next];
        if slot.seq.load(Ordering::Acquire) != EMPTY {
            return false;
        }
        unsafe {
            *slot.data.get() = *payload;
        }
        slot.seq.store(FULL, Ordering::Release);
        self.next = (self.next + 1) % self.shared.slots.len();
        true
    }

    pub fn consumer_gone(&self) -> bool {
        self.shared.consumer_closed.load(Ordering::Relaxed)
    }
}

impl Drop for RingProducer {
    fn drop(&mut self) {
        self.shared.producer_closed.store(true, Ordering::Release);
    }
}

// As a transmit half the producer is lossless: it waits for the consumer to
// free the slot instead of overwriting, so an in-process echo path behaves
// like a reliable link.
impl PacketTx for RingProducer {
    fn send(&mut self, payload: &PingpongPayload) -> Result<(), TransportError> {
        while !self.publish(payload) {
            if self.consumer_gone() {
                return Err(TransportError::Closed);
            }
            spin_loop();
        }
        Ok(())
    }
}

pub struct RingConsumer {
    shared: Arc<Shared>,
    next: usize,
}

impl RingConsumer {
    /// Read-then-clear consumption of the next slot, if it has been written.
    pub fn try_pop(&mut self) -> Option<PingpongPayload> {
        let slot = &self.shared.slots[self.next];
        if slot.seq.load(Ordering::Acquire) != FULL {
            return None;
        }
        let payload = unsafe { *slot.data.get() };
        unsafe {
            *slot.data.get() = PingpongPayload::empty();
        }
        slot.seq.store(EMPTY, Ordering::Release);
        self.next = (self.next + 1) % self.shared.slots.len();
        Some(payload)
    }

    fn producer_gone(&self) -> bool {
        self.shared.producer_closed.load(Ordering::Acquire)
    }
}

impl Drop for RingConsumer {
    fn drop(&mut self) {
        self.shared.consumer_closed.store(true, Ordering::Release);
    }
}

impl PacketRx for RingConsumer {
    fn poll(&mut self) -> Result<Poll, TransportError> {
        match self.try_pop() {
            Some(payload) => Ok(Poll::Ready(payload)),
            // Drain any slots written before the producer went away.
            None if self.producer_gone() => Ok(Poll::Closed),
            None => Ok(Poll::NotReady),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn payload_with_ts(id: u32, fill: u64) -> PingpongPayload {
        let mut p = PingpongPayload::new(id);
        p.ts = [fill; 4];
        p
    }

    #[test]
    fn test_publish_and_pop() {
        let (mut tx, mut rx) = ring(4);
        assert!(rx.try_pop().is_none());

        assert!(tx.publish(&payload_with_ts(1, 10)));
        let got = rx.try_pop().unwrap();
        assert_eq!(got.id, 1);
        assert_eq!(got.ts, [10; 4]);

        // The slot was cleared on consumption.
        assert!(rx.try_pop().is_none());
    }

    #[test]
    fn test_full_ring_rejects_publish() {
        let (mut tx, mut rx) = ring(2);
        assert!(tx.publish(&payload_with_ts(1, 1)));
        assert!(tx.publish(&payload_with_ts(2, 2)));
        assert!(!tx.publish(&payload_with_ts(3, 3)));

        assert_eq!(rx.try_pop().unwrap().id, 1);
        assert!(tx.publish(&payload_with_ts(3, 3)));
        assert_eq!(rx.try_pop().unwrap().id, 2);
        assert_eq!(rx.try_pop().unwrap().id, 3);
    }

    #[test]
    fn test_closed_after_producer_drop() {
        let (mut tx, mut rx) = ring(4);
        assert!(tx.publish(&payload_with_ts(1, 1)));
        drop(tx);

        // Pending slots drain before the close is reported.
        assert_eq!(rx.poll().unwrap(), Poll::Ready(payload_with_ts(1, 1)));
        assert_eq!(rx.poll().unwrap(), Poll::Closed);
    }

    #[test]
    fn test_threaded_consistency() {
        const COUNT: u32 = 100_000;
        let (mut tx, mut rx) = ring(64);

        let producer = thread::spawn(move || {
            for i in 1..=COUNT {
                while !tx.publish(&payload_with_ts(i, i as u64)) {
                    std::hint::spin_loop();
                }
            }
        });

        let consumer = thread::spawn(move || {
            let mut expected = 1u32;
            while expected <= COUNT {
                if let Some(p) = rx.try_pop() {
                    assert_eq!(p.id, expected, "out-of-order consumption");
                    assert_eq!(p.ts, [p.id as u64; 4], "torn payload read");
                    expected += 1;
                } else {
                    std::hint::spin_loop();
                }
            }
        });

        producer.join().unwrap();
        consumer.join().unwrap();
    }
}
