//! Single-server DMA queue model: every metadata read/write the receiver
//! store performs against "host" memory is serialized here behind a
//! bounded-bandwidth link with a fixed additional per-op latency, so the
//! engine can charge callers the resulting completion delay.
//!
//! A single in-flight "next available" timestamp plus a small completion
//! queue is enough to model one bounded-bandwidth server: each op's start
//! time is `max(now, next_available)`, its service time is
//! `bytes / bandwidth + fixed_latency`, and queue delay falls out as the
//! difference between start and arrival.

use std::collections::VecDeque;

/// The five DMA operation kinds the adamap engine ever submits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DmaOpKind {
    /// Finalizing the current bitmap as a new linked-list head.
    LlAppendWrite,
    /// Promoting a linked-list entry (or a peeled slice of one) into the
    /// lookup table.
    LlToTableWrite,
    /// Reading the `first_n`-deep NIC-resident prefix of the linked list.
    LlPrefetchRead,
    /// Reading a linked-list node past the NIC-resident prefix.
    LlMissRead,
    /// Reading a lookup-table entry not currently held by the LRU.
    TableMissRead,
}

impl DmaOpKind {
    pub fn is_write(self) -> bool {
        matches!(self, Self::LlAppendWrite | Self::LlToTableWrite)
    }
}

/// Running counters for a single flow's DMA traffic.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct DmaStats {
    pub submitted_ops: u64,
    pub completed_ops: u64,
    pub submitted_read_ops: u64,
    pub submitted_write_ops: u64,
    pub submitted_bytes: u64,
    pub completed_bytes: u64,
    pub submitted_read_bytes: u64,
    pub submitted_write_bytes: u64,
    pub total_queue_delay_ns: u64,
    pub total_service_time_ns: u64,
    pub max_queue_delay_ns: u64,
    pub max_queue_depth: u64,
}

/// One outstanding op's completion time, kept so inflight counts and
/// completed-byte totals can be queried/retired lazily.
#[derive(Debug, Clone, Copy)]
struct Inflight {
    completion_ns: u64,
    bytes: u64,
}

/// Result of a single [`DmaScheduler::submit`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaSubmission {
    pub completion_ns: u64,
    pub queue_delay_ns: u64,
    pub service_ns: u64,
}

pub struct DmaScheduler {
    bandwidth_bytes_per_sec: f64,
    fixed_latency_ns: u64,
    enabled: bool,
    next_available_ns: u64,
    inflight: VecDeque<Inflight>,
    stats: DmaStats,
}

impl DmaScheduler {
    pub fn new(bandwidth_bytes_per_sec: f64, fixed_latency_ns: u64, enabled: bool) -> Self {
        Self {
            bandwidth_bytes_per_sec,
            fixed_latency_ns,
            enabled,
            next_available_ns: 0,
            inflight: VecDeque::new(),
            stats: DmaStats::default(),
        }
    }

    pub fn from_config(config: &crate::config::EngineConfig) -> Self {
        Self::new(
            config.dma_bandwidth_bytes_per_sec,
            config.dma_fixed_latency_ns,
            config.dma_enabled,
        )
    }

    /// Submit one op of `bytes` size at logical time `now_ns`. Returns the
    /// completion time and the delay components charged.
    pub fn submit(&mut self, now_ns: u64, op: DmaOpKind, bytes: u64) -> DmaSubmission {
        self.retire_completed(now_ns);

        if !self.enabled {
            return DmaSubmission {
                completion_ns: now_ns,
                queue_delay_ns: 0,
                service_ns: 0,
            };
        }

        let start = now_ns.max(self.next_available_ns);
        let service_ns = ((bytes as f64 / self.bandwidth_bytes_per_sec) * 1e9) as u64
            + self.fixed_latency_ns;
        let completion = start + service_ns;
        let queue_delay = start - now_ns;

        self.next_available_ns = completion;
        self.inflight.push_back(Inflight {
            completion_ns: completion,
            bytes,
        });

        self.stats.submitted_ops += 1;
        self.stats.submitted_bytes += bytes;
        if op.is_write() {
            self.stats.submitted_write_ops += 1;
            self.stats.submitted_write_bytes += bytes;
        } else {
            self.stats.submitted_read_ops += 1;
            self.stats.submitted_read_bytes += bytes;
        }
        self.stats.total_queue_delay_ns += queue_delay;
        self.stats.total_service_time_ns += service_ns;
        self.stats.max_queue_delay_ns = self.stats.max_queue_delay_ns.max(queue_delay);
        self.stats.max_queue_depth = self.stats.max_queue_depth.max(self.inflight.len() as u64);

        log::debug!(
            "dma submit op={op:?} bytes={bytes} start={start} service_ns={service_ns} \
             queue_delay_ns={queue_delay} completion={completion}"
        );

        DmaSubmission {
            completion_ns: completion,
            queue_delay_ns: queue_delay,
            service_ns,
        }
    }

    fn retire_completed(&mut self, now_ns: u64) {
        while let Some(front) = self.inflight.front() {
            if front.completion_ns > now_ns {
                break;
            }
            let done = self.inflight.pop_front().unwrap();
            self.stats.completed_ops += 1;
            self.stats.completed_bytes += done.bytes;
        }
    }

    pub fn inflight_ops(&self) -> usize {
        self.inflight.len()
    }

    pub fn backlog_ns(&self, now_ns: u64) -> u64 {
        self.next_available_ns.saturating_sub(now_ns)
    }

    pub fn stats(&self) -> DmaStats {
        self.stats
    }
}
