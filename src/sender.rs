//! Sender-side mirror state: turns received adamap descriptors into an
//! ordered queue of missing sequence numbers to retransmit.

use std::collections::VecDeque;

use crate::adamap::Adamap;
use crate::telemetry::{EngineEvent, EngineObserver};

/// One sequence number this peer believes is missing, tagged with the
/// retransmission context it was discovered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LossEntry {
    pub adamap_id: u64,
    pub loss_seq: u64,
    pub tier: u16,
    pub table_index: i64,
}

/// Per-flow sender state: the adamaps received so far and the FIFO of
/// derived loss entries awaiting retransmission.
#[derive(Debug, Default)]
pub struct SenderAdamap {
    flow_id: u32,
    bitmap_size: usize,
    received: Vec<Adamap>,
    retransmit_queue: VecDeque<LossEntry>,
}

impl SenderAdamap {
    pub fn new(flow_id: u32, bitmap_size: usize) -> Self {
        Self {
            flow_id,
            bitmap_size,
            received: Vec::new(),
            retransmit_queue: VecDeque::new(),
        }
    }

    /// Append `adamap` and derive a loss entry, in order, for every seq in
    /// `(startSeq, startSeq+reprLength]` not marked received.
    pub fn enqueue(
        &mut self,
        adamap: Adamap,
        tier: u16,
        table_index: i64,
        observer: &mut dyn EngineObserver,
    ) {
        observer.on_engine_event(self.flow_id, EngineEvent::SenderGetAdamap);
        for i in 1..=adamap.repr_length {
            let received = i <= self.bitmap_size as u64 && adamap.bitmap[(i - 1) as usize];
            if !received {
                self.retransmit_queue.push_back(LossEntry {
                    adamap_id: adamap.id,
                    loss_seq: adamap.start_seq + i,
                    tier,
                    table_index,
                });
            }
        }
        self.received.push(adamap);
    }

    /// Returns (and optionally pops) the front of the retransmit FIFO.
    pub fn dequeue_loss(&mut self, pop: bool) -> Option<LossEntry> {
        if pop {
            self.retransmit_queue.pop_front()
        } else {
            self.retransmit_queue.front().copied()
        }
    }

    pub fn queue_size(&self) -> usize {
        self.retransmit_queue.len()
    }

    pub fn head_adamap(&self) -> Option<&Adamap> {
        self.received.first()
    }

    pub fn adamap_at(&self, index: usize) -> Option<&Adamap> {
        self.received.get(index)
    }

    pub fn num_retransmittable_packets(&self) -> usize {
        self.retransmit_queue.len()
    }
}
