//! Per-flow receiver-side bookkeeping: the currently-open bitmap, the
//! linked list of finished head adamaps, and the LRU-governed lookup table
//! of adamaps parked for multi-retry.

use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;

use lru::LruCache;

use crate::adamap::{estimate_adamap_dma_bytes, Adamap, AdamapWithIndex, SplitStep};
use crate::config::EngineConfig;
use crate::dma::{DmaOpKind, DmaScheduler};
use crate::error::EngineError;
use crate::status::StatusCode;
use crate::telemetry::{DmaTraceEvent, EngineEvent, EngineObserver};

/// Out-parameters and status returned by [`ReceiverAdamap::record`].
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub status: StatusCode,
    /// Set whenever this call produced an adamap the NACK emitter should
    /// transmit.
    pub adamap_for_nack: Option<Adamap>,
    /// Set whenever this call mutated an adamap worth surfacing for
    /// diagnostics, whether or not it's NACK-worthy.
    pub adamap_for_print: Option<Adamap>,
    pub new_table_entries: u32,
    pub delay_ns: u64,
}

impl RecordOutcome {
    fn simple(status: StatusCode) -> Self {
        Self {
            status,
            adamap_for_nack: None,
            adamap_for_print: None,
            new_table_entries: 0,
            delay_ns: 0,
        }
    }
}

/// Cache-hit/access counters for the linked list and lookup table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub linked_list_access_count: u64,
    pub linked_list_cache_hit_count: u64,
    pub lookup_table_access_count: u64,
    pub lookup_table_cache_hit_count: u64,
}

/// Per-flow receiver state: the open bitmap, the linked list of finished
/// heads, and the lookup table of multi-retry entries.
pub struct ReceiverAdamap {
    config: EngineConfig,
    flow_id: u32,

    current_bitmap: Vec<bool>,
    start_seq: u64,
    adamap_id_counter: u64,

    linked_list: VecDeque<AdamapWithIndex>,
    lookup_table: HashMap<i64, AdamapWithIndex>,
    lookup_table_lru: LruCache<i64, ()>,
    current_table_index: i64,

    avg_omni_rtt_ns: f64,
    omni_scale_rto_ns: u64,
    omni_rtt_cnt: u64,

    cache_stats: CacheStats,
    got_last_packet: bool,
}

impl ReceiverAdamap {
    pub fn new(flow_id: u32, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let lru_cap = NonZeroUsize::new(config.lookup_table_lru_size.max(1))
            .expect("max(1) guarantees nonzero");
        let bitmap_size = config.bitmap_size;
        Ok(Self {
            current_bitmap: vec![false; bitmap_size],
            start_seq: 0,
            adamap_id_counter: 0,
            linked_list: VecDeque::new(),
            lookup_table: HashMap::new(),
            lookup_table_lru: LruCache::new(lru_cap),
            current_table_index: 0,
            avg_omni_rtt_ns: 0.0,
            omni_scale_rto_ns: 0,
            omni_rtt_cnt: 0,
            cache_stats: CacheStats::default(),
            got_last_packet: false,
            config,
            flow_id,
        })
    }

    pub fn flow_id(&self) -> u32 {
        self.flow_id
    }

    pub fn start_seq(&self) -> u64 {
        self.start_seq
    }

    pub fn current_bitmap(&self) -> &[bool] {
        &self.current_bitmap
    }

    pub fn linked_list_len(&self) -> usize {
        self.linked_list.len()
    }

    pub fn lookup_table_len(&self) -> usize {
        self.lookup_table.len()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache_stats
    }

    pub fn avg_omni_rtt_ns(&self) -> f64 {
        self.avg_omni_rtt_ns
    }

    pub fn omni_scale_rto_ns(&self) -> u64 {
        self.omni_scale_rto_ns
    }

    /// Initial timer before the adaptive RTO has a sample to work from.
    pub fn effective_table_timeout_ns(&self) -> u64 {
        if self.omni_rtt_cnt == 0 {
            self.config.table_timeout_ns
        } else {
            self.omni_scale_rto_ns
        }
    }

    pub fn mark_got_last_packet(&mut self) {
        self.got_last_packet = true;
    }

    /// Greatest seq such that all lower seqs are received.
    pub fn cumulative_ack_seq(&self) -> u64 {
        let mut ack = self.start_seq;
        if let Some(front) = self.linked_list.front() {
            ack = ack.min(front.adamap.start_seq);
        }
        if let Some(min_table_start) = self.lookup_table.values().map(|e| e.adamap.start_seq).min()
        {
            ack = ack.min(min_table_start);
        }
        ack
    }

    pub fn is_finish_condition_satisfied(&self) -> bool {
        self.got_last_packet
            && self.linked_list.is_empty()
            && self.lookup_table.values().all(|e| e.is_finished)
    }

    pub fn peek_head(&self) -> Option<&AdamapWithIndex> {
        self.linked_list.front()
    }

    pub fn peek_head_mut(&mut self) -> Option<&mut AdamapWithIndex> {
        self.linked_list.front_mut()
    }

    pub fn table_entry(&self, table_index: i64) -> Option<&AdamapWithIndex> {
        self.lookup_table.get(&table_index)
    }

    /// All lookup-table entries not yet finished, for timeout-driven rescans.
    pub fn table_entries_mut(&mut self) -> impl Iterator<Item = &mut AdamapWithIndex> {
        self.lookup_table.values_mut().filter(|e| !e.is_finished)
    }

    /// Record one packet's arrival. `table_index` is only consulted for
    /// `retrans_tier >= 2`.
    ///
    /// Returns `Err` only for the invariant violations spec'd out in the
    /// error handling design: an already-set bit, or an adamap carrying
    /// range extension about to be admitted to the lookup table. Benign,
    /// expected conditions (stale/out-of-date packets) are reported through
    /// `RecordOutcome::status`, not through this `Result`.
    pub fn record(
        &mut self,
        now_ns: u64,
        seq: u64,
        retrans_tier: u16,
        table_index: Option<i64>,
        dma: &mut DmaScheduler,
        observer: &mut dyn EngineObserver,
    ) -> Result<RecordOutcome, EngineError> {
        let outcome = match retrans_tier {
            0 => Ok(self.record_tier0(now_ns, seq, dma, observer)),
            1 => self.record_tier1(now_ns, seq, dma, observer),
            tier => self.record_tier2(now_ns, seq, tier, table_index, dma, observer),
        }?;
        if outcome.adamap_for_nack.is_some() {
            observer.on_engine_event(self.flow_id, EngineEvent::GenAndUpload);
        }
        Ok(outcome)
    }

    /// Admits `entry` to the lookup table, rejecting the range-extension
    /// invariant violation rather than silently corrupting the table.
    fn insert_table_entry(&mut self, entry: AdamapWithIndex) -> Result<(), EngineError> {
        let bitmap_size = self.config.bitmap_size as u64;
        if entry.adamap.repr_length > bitmap_size {
            return Err(EngineError::ReprLengthExceedsBitmap {
                repr_length: entry.adamap.repr_length,
                bitmap_size: self.config.bitmap_size,
            });
        }
        self.lookup_table.insert(entry.table_index, entry);
        Ok(())
    }

    fn feed_rto_sample(&mut self, sample_ns: f64) {
        let n = self.omni_rtt_cnt as f64;
        self.avg_omni_rtt_ns = (self.avg_omni_rtt_ns * n + sample_ns) / (n + 1.0);
        self.omni_rtt_cnt += 1;
        self.omni_scale_rto_ns = (self.avg_omni_rtt_ns * self.config.rtt_scale_factor) as u64;
        log::debug!(
            "flow {}: rto sample={sample_ns} avg_rtt={} scaled_rto={}",
            self.flow_id,
            self.avg_omni_rtt_ns,
            self.omni_scale_rto_ns
        );
    }

    fn charge(
        &self,
        dma: &mut DmaScheduler,
        observer: &mut dyn EngineObserver,
        now_ns: u64,
        op: DmaOpKind,
        bytes: u64,
    ) -> u64 {
        let sub = dma.submit(now_ns, op, bytes);
        observer.on_dma_event(DmaTraceEvent {
            flow_id: self.flow_id,
            op,
            bytes,
            queue_delay_ns: sub.queue_delay_ns,
            service_ns: sub.service_ns,
            backlog_ns: dma.backlog_ns(now_ns),
            queue_depth: dma.inflight_ops() as u64,
        });
        sub.completion_ns.saturating_sub(now_ns)
    }

    // ---- tier 0: first receipt -----------------------------------------

    fn record_tier0(
        &mut self,
        now_ns: u64,
        seq: u64,
        dma: &mut DmaScheduler,
        observer: &mut dyn EngineObserver,
    ) -> RecordOutcome {
        let bitmap_empty = self.current_bitmap.iter().all(|&b| !b);
        if bitmap_empty && (seq == self.start_seq + 1 || seq == 0) {
            self.start_seq = seq;
            return RecordOutcome::simple(StatusCode::ContiguousAdvance);
        }

        let offset = match seq.checked_sub(self.start_seq + 1) {
            Some(o) => o,
            None => return RecordOutcome::simple(StatusCode::ContiguousAdvance),
        };
        let b = self.config.bitmap_size as u64;

        if offset < b {
            self.current_bitmap[offset as usize] = true;
            return RecordOutcome::simple(StatusCode::HoleFilled);
        }

        let finished_bitmap =
            std::mem::replace(&mut self.current_bitmap, vec![false; self.config.bitmap_size]);
        let finished = Adamap {
            id: self.adamap_id_counter,
            start_seq: self.start_seq,
            repr_length: offset,
            bitmap: finished_bitmap,
        };

        let bytes = estimate_adamap_dma_bytes(self.config.bitmap_size);
        let delay_ns = self.charge(dma, observer, now_ns, DmaOpKind::LlAppendWrite, bytes);
        observer.on_engine_event(self.flow_id, EngineEvent::GenAndCache);

        self.linked_list
            .push_back(AdamapWithIndex::new_head(finished.clone(), now_ns));
        self.start_seq = seq;
        self.adamap_id_counter += 1;

        let mut outcome = RecordOutcome::simple(StatusCode::NewHeadCreated);
        outcome.adamap_for_nack = Some(finished.clone());
        outcome.adamap_for_print = Some(finished);
        outcome.delay_ns = delay_ns;
        outcome
    }

    // ---- tier 1: first retransmission -----------------------------------

    fn record_tier1(
        &mut self,
        now_ns: u64,
        seq: u64,
        dma: &mut DmaScheduler,
        observer: &mut dyn EngineObserver,
    ) -> Result<RecordOutcome, EngineError> {
        if seq > self.start_seq {
            return Ok(RecordOutcome::simple(StatusCode::Tier1StaleAlreadyAcked));
        }
        if self.linked_list.is_empty() {
            return Ok(RecordOutcome::simple(StatusCode::Tier1StaleBeyondFinished));
        }

        // The list is non-empty: charge the prefetch and count the access
        // before staleness is known, unconditionally, matching a lookup
        // attempt against the NIC-resident prefix regardless of outcome.
        self.cache_stats.linked_list_access_count += 1;
        let first_n = self.config.first_n.max(1);
        let prefetch_bytes: u64 = self
            .linked_list
            .iter()
            .take(first_n.min(self.linked_list.len()))
            .map(|n| estimate_adamap_dma_bytes(n.adamap.bitmap_size()))
            .sum();
        let mut delay_ns =
            self.charge(dma, observer, now_ns, DmaOpKind::LlPrefetchRead, prefetch_bytes);

        if self.linked_list.front().unwrap().adamap.start_seq >= seq {
            let mut outcome = RecordOutcome::simple(StatusCode::Tier1StaleStartTooSmall);
            outcome.delay_ns = delay_ns;
            return Ok(outcome);
        }

        let target_idx = self.linked_list.iter().position(|node| {
            matches!(node.adamap.offset_of(seq), Some(off) if off < node.adamap.repr_length)
        });
        let idx = match target_idx {
            Some(i) => i,
            None => {
                let mut outcome = RecordOutcome::simple(StatusCode::Tier1StaleBeyondFinished);
                outcome.delay_ns = delay_ns;
                return Ok(outcome);
            }
        };

        let within_cache = idx < first_n;
        if within_cache {
            self.cache_stats.linked_list_cache_hit_count += 1;
        } else {
            let miss_bytes = estimate_adamap_dma_bytes(self.linked_list[idx].adamap.bitmap_size());
            delay_ns += self.charge(dma, observer, now_ns, DmaOpKind::LlMissRead, miss_bytes);
        }
        observer.on_engine_event(self.flow_id, EngineEvent::FetchLl);
        observer.on_engine_event(self.flow_id, EngineEvent::FirstRetransProcess);

        let mut new_table_entries = 0u32;
        for _ in 0..idx {
            let node = self
                .linked_list
                .pop_front()
                .expect("idx is bounded by linked_list length");
            let (count, promote_delay) = self.promote_to_table(node, now_ns, dma, observer)?;
            new_table_entries += count;
            delay_ns += promote_delay;
        }

        let mut head = self
            .linked_list
            .pop_front()
            .expect("target node sits at the front after promotions");
        let prior_last_call = head.last_call_time;
        let b = self.config.bitmap_size as u64;
        let mut offset = seq - head.adamap.start_seq - 1;

        if offset >= b {
            while offset >= b {
                match head.adamap.split_step(self.config.bitmap_size, false) {
                    SplitStep::Done => break,
                    SplitStep::Skipped => {}
                    SplitStep::Peeled(slice) => {
                        new_table_entries += 1;
                        let bytes = estimate_adamap_dma_bytes(slice.bitmap_size());
                        delay_ns +=
                            self.charge(dma, observer, now_ns, DmaOpKind::LlToTableWrite, bytes);
                        let table_index = self.new_table_index();
                        let mut entry = AdamapWithIndex::new_head(slice, now_ns);
                        entry.table_index = table_index;
                        entry.in_nic_cache = false;
                        self.insert_table_entry(entry)?;
                        observer.on_engine_event(self.flow_id, EngineEvent::EnterTable);
                    }
                }
                offset = offset.saturating_sub(b);
            }
            if (offset as usize) < head.adamap.bitmap_size() {
                head.adamap.bitmap[offset as usize] = true;
            }
            head.last_call_time = now_ns;
            if head.max_retrans_tier == 0 {
                self.feed_rto_sample(now_ns.saturating_sub(prior_last_call) as f64);
            }
            head.max_retrans_tier = head.max_retrans_tier.max(1);
            let adamap_for_print = head.adamap.clone();
            self.linked_list.push_front(head);

            let mut outcome = RecordOutcome::simple(StatusCode::Tier1BeyondBitmap);
            outcome.new_table_entries = new_table_entries;
            outcome.delay_ns = delay_ns;
            outcome.adamap_for_print = Some(adamap_for_print);
            return Ok(outcome);
        }

        let offset = offset as usize;
        if head.adamap.bitmap[offset] {
            log::error!(
                "flow {}: tier-1 flip of an already-set bit at seq {seq} (start_seq={})",
                self.flow_id,
                head.adamap.start_seq
            );
            self.linked_list.push_front(head);
            return Err(EngineError::BitAlreadySet {
                seq,
                table_index: None,
            });
        }
        head.adamap.bitmap[offset] = true;
        head.last_call_time = now_ns;
        if head.max_retrans_tier == 0 {
            self.feed_rto_sample(now_ns.saturating_sub(prior_last_call) as f64);
        }
        head.max_retrans_tier = head.max_retrans_tier.max(1);

        let last_hole = head.adamap.is_last_hole(offset);
        let full = head.adamap.is_bitmap_full();
        let adamap_for_print = head.adamap.clone();
        let mut adamap_for_nack = None;

        let status = if last_hole && !full {
            let table_bitmap_size = self.config.bitmap_size;
            let table_repr = head.adamap.repr_length.min(table_bitmap_size as u64);
            let remaining = head.adamap.repr_length - table_repr;

            let table_adamap = Adamap {
                id: head.adamap.id,
                start_seq: head.adamap.start_seq,
                repr_length: table_repr,
                bitmap: head.adamap.bitmap.clone(),
            };
            let bytes = estimate_adamap_dma_bytes(table_adamap.bitmap_size());
            delay_ns += self.charge(dma, observer, now_ns, DmaOpKind::LlToTableWrite, bytes);
            observer.on_engine_event(self.flow_id, EngineEvent::EnterTable);

            let table_index = self.new_table_index();
            let mut entry = AdamapWithIndex::new_head(table_adamap, now_ns);
            entry.table_index = table_index;
            entry.max_retrans_tier = head.max_retrans_tier;
            entry.in_nic_cache = false;
            adamap_for_nack = Some(entry.adamap.clone());
            self.insert_table_entry(entry)?;
            new_table_entries += 1;

            if remaining > 0 {
                head.adamap.start_seq += table_repr;
                head.adamap.repr_length = remaining;
                head.adamap.bitmap = vec![false; table_bitmap_size];
                self.linked_list.push_front(head);
            } else {
                observer.on_engine_event(self.flow_id, EngineEvent::ConsumeLl);
            }
            StatusCode::Tier1FlipNewTableEntry
        } else if full {
            if head.adamap.repr_length <= b {
                observer.on_engine_event(self.flow_id, EngineEvent::ConsumeLl);
                StatusCode::Tier1FlipHeadErased
            } else {
                head.adamap.start_seq += b;
                head.adamap.repr_length -= b;
                head.adamap.bitmap = vec![false; self.config.bitmap_size];
                self.linked_list.push_front(head);
                StatusCode::Tier1FlipSlide
            }
        } else {
            self.linked_list.push_front(head);
            StatusCode::Tier1BitFlip
        };

        let mut outcome = RecordOutcome::simple(status);
        outcome.new_table_entries = new_table_entries;
        outcome.delay_ns = delay_ns;
        outcome.adamap_for_print = Some(adamap_for_print);
        outcome.adamap_for_nack = adamap_for_nack;
        Ok(outcome)
    }

    fn new_table_index(&mut self) -> i64 {
        let idx = self.current_table_index;
        self.current_table_index += 1;
        idx
    }

    /// `putLinkedListHeadToTable`: split `node` into `B`-sized slices,
    /// skipping all-ones slices, admitting every remaining slice (including
    /// the residual node itself) to the lookup table. The node is always
    /// erased from the linked list by construction (caller already popped
    /// it).
    fn promote_to_table(
        &mut self,
        mut node: AdamapWithIndex,
        now_ns: u64,
        dma: &mut DmaScheduler,
        observer: &mut dyn EngineObserver,
    ) -> Result<(u32, u64), EngineError> {
        let mut count = 0u32;
        let mut delay = 0u64;
        loop {
            match node.adamap.split_step(self.config.bitmap_size, true) {
                SplitStep::Done => break,
                SplitStep::Skipped => continue,
                SplitStep::Peeled(slice) => {
                    let bytes = estimate_adamap_dma_bytes(slice.bitmap_size());
                    delay += self.charge(dma, observer, now_ns, DmaOpKind::LlToTableWrite, bytes);
                    let table_index = self.new_table_index();
                    let mut entry = AdamapWithIndex::new_head(slice, now_ns);
                    entry.table_index = table_index;
                    entry.in_nic_cache = false;
                    self.insert_table_entry(entry)?;
                    count += 1;
                    observer.on_engine_event(self.flow_id, EngineEvent::EnterTable);
                }
            }
        }

        if !node.adamap.is_bitmap_full() {
            let bytes = estimate_adamap_dma_bytes(node.adamap.bitmap_size());
            delay += self.charge(dma, observer, now_ns, DmaOpKind::LlToTableWrite, bytes);
            let table_index = self.new_table_index();
            node.table_index = table_index;
            node.in_nic_cache = false;
            self.insert_table_entry(node)?;
            count += 1;
            observer.on_engine_event(self.flow_id, EngineEvent::EnterTable);
        }
        observer.on_engine_event(self.flow_id, EngineEvent::ConsumeLl);

        Ok((count, delay))
    }

    // ---- tier >= 2: multi-retry ------------------------------------------

    fn record_tier2(
        &mut self,
        now_ns: u64,
        seq: u64,
        tier: u16,
        table_index: Option<i64>,
        dma: &mut DmaScheduler,
        observer: &mut dyn EngineObserver,
    ) -> Result<RecordOutcome, EngineError> {
        let idx = match table_index {
            Some(i) => i,
            None => return Ok(RecordOutcome::simple(StatusCode::Tier2TableIndexNotFound)),
        };

        self.cache_stats.lookup_table_access_count += 1;
        let hit = self.lookup_table_lru.contains(&idx);
        self.lookup_table_lru.put(idx, ());

        if hit {
            self.cache_stats.lookup_table_cache_hit_count += 1;
        } else {
            let bytes = self
                .lookup_table
                .get(&idx)
                .map(|e| estimate_adamap_dma_bytes(e.adamap.bitmap_size()))
                .unwrap_or_else(|| estimate_adamap_dma_bytes(self.config.bitmap_size));
            self.charge(dma, observer, now_ns, DmaOpKind::TableMissRead, bytes);
        }
        observer.on_engine_event(self.flow_id, EngineEvent::FetchTable);
        observer.on_engine_event(self.flow_id, EngineEvent::MultiRetransProcess);

        let entry = match self.lookup_table.get_mut(&idx) {
            Some(e) => e,
            None => return Ok(RecordOutcome::simple(StatusCode::Tier2TableIndexNotFound)),
        };

        let offset = match entry.adamap.offset_of(seq) {
            Some(o) if (o as usize) < entry.adamap.bitmap_size() => o as usize,
            _ => {
                log::error!(
                    "flow {}: tier-{tier} seq {seq} outside table entry {idx}'s range",
                    self.flow_id
                );
                return Ok(RecordOutcome::simple(StatusCode::Tier2TableIndexNotFound));
            }
        };

        let triggers_resend = tier > entry.max_retrans_tier;
        let rto_sample = triggers_resend.then(|| now_ns.saturating_sub(entry.last_call_time) as f64);
        if let Some(sample) = rto_sample {
            self.feed_rto_sample(sample);
        }

        let entry = self.lookup_table.get_mut(&idx).expect("checked above");
        if entry.adamap.bitmap[offset] {
            log::error!(
                "flow {}: tier-{tier} flip of an already-set bit at table index {idx}, seq {seq}",
                self.flow_id
            );
            return Err(EngineError::BitAlreadySet {
                seq,
                table_index: Some(idx),
            });
        }
        entry.adamap.bitmap[offset] = true;
        entry.last_call_time = now_ns;
        entry.max_retrans_tier = entry.max_retrans_tier.max(tier);

        let finished = entry.adamap.is_bitmap_full();
        let adamap_for_print = entry.adamap.clone();
        if finished {
            entry.is_finished = true;
            self.lookup_table_lru.pop(&idx);
            observer.on_engine_event(self.flow_id, EngineEvent::ConsumeTable);
        }

        let status = if triggers_resend {
            StatusCode::Tier2UpdateTriggersResend
        } else {
            StatusCode::Tier2Update
        };
        let mut outcome = RecordOutcome::simple(status);
        outcome.adamap_for_print = Some(adamap_for_print);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::NullObserver;

    fn store(bitmap_size: usize) -> (ReceiverAdamap, DmaScheduler, NullObserver) {
        let config = EngineConfig::default().with_bitmap_size(bitmap_size);
        let store = ReceiverAdamap::new(0, config.clone()).unwrap();
        let dma = DmaScheduler::from_config(&config);
        (store, dma, NullObserver)
    }

    #[test]
    fn scenario1_contiguous_stream_needs_no_adamap() {
        let (mut s, mut dma, mut obs) = store(4);
        for seq in 1..=5u64 {
            let outcome = s.record(0, seq, 0, None, &mut dma, &mut obs).unwrap();
            assert_eq!(outcome.status, StatusCode::ContiguousAdvance);
        }
        assert_eq!(s.start_seq(), 5);
        assert_eq!(s.linked_list_len(), 0);
    }

    #[test]
    fn scenario2_out_of_order_within_bitmap_collapses_on_fill() {
        // start_seq ends at 2 after the first two contiguous-advance hits, so
        // bit i represents seq = start_seq + i + 1: seq 4 -> bit 1, seq 5 ->
        // bit 2, seq 3 -> bit 0. Filling a hole never retroactively collapses
        // a bitmap that already has bits set; only an empty bitmap advances.
        let (mut s, mut dma, mut obs) = store(4);
        s.record(0, 1, 0, None, &mut dma, &mut obs).unwrap();
        s.record(0, 2, 0, None, &mut dma, &mut obs).unwrap();
        let outcome = s.record(0, 4, 0, None, &mut dma, &mut obs).unwrap();
        assert_eq!(outcome.status, StatusCode::HoleFilled);
        assert_eq!(s.current_bitmap(), &[false, true, false, false]);
        s.record(0, 5, 0, None, &mut dma, &mut obs).unwrap();
        assert_eq!(s.current_bitmap(), &[false, true, true, false]);
        let outcome = s.record(0, 3, 0, None, &mut dma, &mut obs).unwrap();
        assert_eq!(outcome.status, StatusCode::HoleFilled);
        assert_eq!(s.current_bitmap(), &[true, true, true, false]);
        assert_eq!(s.start_seq(), 2);
    }

    #[test]
    fn scenario3_overflow_creates_head_then_tier1_fills_erase_it() {
        let (mut s, mut dma, mut obs) = store(4);
        s.record(0, 1, 0, None, &mut dma, &mut obs).unwrap();
        s.record(0, 2, 0, None, &mut dma, &mut obs).unwrap();
        let outcome = s.record(0, 7, 0, None, &mut dma, &mut obs).unwrap();
        assert_eq!(outcome.status, StatusCode::NewHeadCreated);
        assert_eq!(s.linked_list_len(), 1);
        assert_eq!(s.start_seq(), 7);

        for seq in [3u64, 4, 5] {
            let outcome = s.record(0, seq, 1, None, &mut dma, &mut obs).unwrap();
            assert_eq!(outcome.status, StatusCode::Tier1BitFlip, "seq {seq}");
        }
        let outcome = s.record(0, 6, 1, None, &mut dma, &mut obs).unwrap();
        assert_eq!(outcome.status, StatusCode::Tier1FlipHeadErased);
        assert_eq!(s.linked_list_len(), 0);
    }

    #[test]
    fn scenario4_big_gap_then_tier1_peels_into_table() {
        let (mut s, mut dma, mut obs) = store(4);
        s.record(0, 1, 0, None, &mut dma, &mut obs).unwrap();
        s.record(0, 2, 0, None, &mut dma, &mut obs).unwrap();
        let outcome = s.record(0, 20, 0, None, &mut dma, &mut obs).unwrap();
        assert_eq!(outcome.status, StatusCode::NewHeadCreated);
        let head = outcome.adamap_for_nack.unwrap();
        assert_eq!(head.start_seq, 2);
        assert_eq!(head.repr_length, 17);

        // seq=10 is 7 positions past startSeq=2 (offset = seq - startSeq - 1),
        // which exceeds one B=4 window: the head slides once (startSeq -> 6,
        // reprLength -> 13) and the peeled window is promoted to the table,
        // then the bit at the remaining offset (3) is set in place.
        let outcome = s.record(0, 10, 1, None, &mut dma, &mut obs).unwrap();
        assert_eq!(outcome.status, StatusCode::Tier1BeyondBitmap);
        assert_eq!(outcome.new_table_entries, 1);
        let head = s.peek_head().unwrap();
        assert_eq!(head.adamap.start_seq, 6);
        assert_eq!(head.adamap.repr_length, 13);
        assert!(head.adamap.bitmap[3]);
    }

    #[test]
    fn scenario6_two_back_to_back_tier1_promotes_first_head() {
        let (mut s, mut dma, mut obs) = store(4);
        s.record(0, 1, 0, None, &mut dma, &mut obs).unwrap();
        s.record(0, 2, 0, None, &mut dma, &mut obs).unwrap();
        s.record(0, 7, 0, None, &mut dma, &mut obs).unwrap(); // head #0: start=2 len=4
        s.record(0, 8, 0, None, &mut dma, &mut obs).unwrap();
        s.record(0, 9, 0, None, &mut dma, &mut obs).unwrap();
        s.record(0, 14, 0, None, &mut dma, &mut obs).unwrap(); // head #1: start=9 len=4
        assert_eq!(s.linked_list_len(), 2);

        let before_table = s.lookup_table_len();
        // tier-1 for head #1's window promotes head #0 ahead of it.
        let outcome = s.record(0, 13, 1, None, &mut dma, &mut obs).unwrap();
        assert!(matches!(
            outcome.status,
            StatusCode::Tier1BitFlip
                | StatusCode::Tier1FlipNewTableEntry
                | StatusCode::Tier1FlipSlide
                | StatusCode::Tier1FlipHeadErased
        ));
        assert!(s.lookup_table_len() > before_table);
        // head #0 was promoted ahead of the target, and the target itself
        // (seq 13 fills its last hole without filling the whole bitmap) is
        // promoted too, leaving the linked list empty.
        assert_eq!(s.linked_list_len(), 0);
    }

    #[test]
    fn tier2_unknown_table_index_reports_not_found() {
        let (mut s, mut dma, mut obs) = store(4);
        let outcome = s.record(0, 1, 2, Some(999), &mut dma, &mut obs).unwrap();
        assert_eq!(outcome.status, StatusCode::Tier2TableIndexNotFound);
    }

    #[test]
    fn tier2_no_table_index_reports_not_found() {
        let (mut s, mut dma, mut obs) = store(4);
        let outcome = s.record(0, 1, 2, None, &mut dma, &mut obs).unwrap();
        assert_eq!(outcome.status, StatusCode::Tier2TableIndexNotFound);
    }

    #[test]
    fn wire_bytes_estimate_matches_formula() {
        assert_eq!(estimate_adamap_dma_bytes(4), 33);
        assert_eq!(estimate_adamap_dma_bytes(64), 40);
        assert_eq!(estimate_adamap_dma_bytes(256), 64);
    }

    #[test]
    fn tier1_flip_of_already_set_bit_is_a_propagated_error() {
        let (mut s, mut dma, mut obs) = store(4);
        s.record(0, 1, 0, None, &mut dma, &mut obs).unwrap();
        s.record(0, 2, 0, None, &mut dma, &mut obs).unwrap();
        s.record(0, 7, 0, None, &mut dma, &mut obs).unwrap();
        s.record(0, 3, 1, None, &mut dma, &mut obs).unwrap();

        let err = s.record(0, 3, 1, None, &mut dma, &mut obs).unwrap_err();
        assert_eq!(
            err,
            EngineError::BitAlreadySet {
                seq: 3,
                table_index: None
            }
        );
        // the head is left intact in the linked list, not dropped.
        assert_eq!(s.linked_list_len(), 1);
    }

    #[test]
    fn tier2_flip_of_already_set_bit_is_a_propagated_error() {
        let (mut s, mut dma, mut obs) = store(4);
        s.record(0, 1, 0, None, &mut dma, &mut obs).unwrap();
        s.record(0, 2, 0, None, &mut dma, &mut obs).unwrap();
        s.record(0, 20, 0, None, &mut dma, &mut obs).unwrap();
        s.record(0, 10, 1, None, &mut dma, &mut obs).unwrap();
        assert_eq!(s.lookup_table_len(), 1);
        let entry = s.table_entries_mut().next().unwrap();
        let table_index = entry.table_index;
        let seq = entry.adamap.start_seq + 1;

        s.record(0, seq, 2, Some(table_index), &mut dma, &mut obs)
            .unwrap();
        let err = s
            .record(0, seq, 2, Some(table_index), &mut dma, &mut obs)
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::BitAlreadySet {
                seq,
                table_index: Some(table_index)
            }
        );
    }
}
