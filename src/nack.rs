//! NACK message shape and the two independent per-flow timers (list, table)
//! that drive retransmission requests.
//!
//! List timeout and table timeout are tracked as two independently
//! cancellable deadlines rather than one shared window, since the head's
//! fixed list timeout and a table entry's adaptive RTO-derived timeout can
//! fire at different times for the same flow.

use crate::adamap::{Adamap, MAX_BITMAP_BITS};
use crate::receiver::ReceiverAdamap;

/// Wire-shaped NACK payload: what actually goes out on the reverse path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NackMessage {
    pub adamap_id: u64,
    pub start_seq: u64,
    pub repr_length: u64,
    pub bitmap_words: [u64; 4],
    pub table_index: i64,
    pub cum_ack_seq: u64,
    pub tier: u16,
}

impl NackMessage {
    pub fn from_adamap(adamap: &Adamap, table_index: i64, cum_ack_seq: u64, tier: u16) -> Self {
        assert!(
            adamap.bitmap_size() <= MAX_BITMAP_BITS,
            "adamap bitmap exceeds the 256-bit wire form"
        );
        Self {
            adamap_id: adamap.id,
            start_seq: adamap.start_seq,
            repr_length: adamap.repr_length,
            bitmap_words: adamap.bitmap_to_wire_words(),
            table_index,
            cum_ack_seq,
            tier,
        }
    }
}

/// A single cancellable deadline. Rescheduling is idempotent: setting a new
/// deadline simply overwrites the old one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    deadline_ns: Option<u64>,
}

impl Timer {
    pub fn new() -> Self {
        Self { deadline_ns: None }
    }

    pub fn schedule(&mut self, deadline_ns: u64) {
        self.deadline_ns = Some(deadline_ns);
    }

    pub fn cancel(&mut self) {
        self.deadline_ns = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline_ns.is_some()
    }

    /// If the timer is pending and `now_ns` has reached its deadline,
    /// consume the firing (cancel it) and return `true`.
    pub fn poll(&mut self, now_ns: u64) -> bool {
        match self.deadline_ns {
            Some(deadline) if now_ns >= deadline => {
                self.deadline_ns = None;
                true
            }
            _ => false,
        }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives the two per-flow timeouts: list timeout (fixed delay after the
/// head was last touched) and table timeout (adaptive RTO-derived delay
/// after a table entry's last call time).
///
/// Only timer state lives here, not the store: the caller owns the
/// [`crate::receiver::ReceiverAdamap`] and re-derives "is there still
/// something to resend" at fire time, since the adamap may have completed
/// between scheduling and dispatch.
#[derive(Debug, Clone, Copy, Default)]
pub struct NackTimeoutDriver {
    list_timer: Timer,
    /// One timer per in-flight table entry would be ideal; instead a single
    /// timer fires at the soonest known deadline and the caller rescans
    /// which entries actually exceeded their timeout.
    table_timer: Timer,
}

impl NackTimeoutDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reschedule_list_timer(&mut self, now_ns: u64, list_timeout_ns: u64) {
        self.list_timer.schedule(now_ns + list_timeout_ns);
    }

    pub fn cancel_list_timer(&mut self) {
        self.list_timer.cancel();
    }

    pub fn reschedule_table_timer(&mut self, now_ns: u64, table_timeout_ns: u64) {
        self.table_timer.schedule(now_ns + table_timeout_ns);
    }

    pub fn cancel_table_timer(&mut self) {
        self.table_timer.cancel();
    }

    /// Returns `true` once, the first time `now_ns` reaches the scheduled
    /// list-timeout deadline. The caller is responsible for checking the
    /// head still exists and for rescheduling afterward.
    pub fn poll_list_timeout(&mut self, now_ns: u64) -> bool {
        self.list_timer.poll(now_ns)
    }

    /// Same contract as [`Self::poll_list_timeout`] for the table timeout.
    pub fn poll_table_timeout(&mut self, now_ns: u64) -> bool {
        self.table_timer.poll(now_ns)
    }

    /// Poll the list timer; if it has fired, resend the front head as a
    /// tier-1 NACK, refresh its `lastCallTime`, and reschedule. Returns
    /// `None` if the timer has not fired or there is no head to resend.
    pub fn drive_list_timeout(
        &mut self,
        now_ns: u64,
        list_timeout_ns: u64,
        receiver: &mut ReceiverAdamap,
    ) -> Option<NackMessage> {
        if !self.poll_list_timeout(now_ns) {
            return None;
        }
        let cum_ack_seq = receiver.cumulative_ack_seq();
        let msg = receiver.peek_head_mut().map(|head| {
            head.last_call_time = now_ns;
            head.max_retrans_tier = head.max_retrans_tier.max(1);
            NackMessage::from_adamap(&head.adamap, -1, cum_ack_seq, 1)
        });
        if msg.is_some() {
            self.reschedule_list_timer(now_ns, list_timeout_ns);
        }
        msg
    }

    /// Poll the table timer; if it has fired, resend every table entry whose
    /// elapsed time since `lastCallTime` exceeds the current adaptive
    /// timeout, at `maxRetransTier + 1` capped by `tier_ceiling`, refreshing
    /// `lastCallTime` on each. Returns the (possibly empty) set of resends.
    pub fn drive_table_timeout(
        &mut self,
        now_ns: u64,
        tier_ceiling: u16,
        receiver: &mut ReceiverAdamap,
    ) -> Vec<NackMessage> {
        if !self.poll_table_timeout(now_ns) {
            return Vec::new();
        }
        let timeout_ns = receiver.effective_table_timeout_ns();
        let cum_ack_seq = receiver.cumulative_ack_seq();
        let mut messages = Vec::new();
        for entry in receiver.table_entries_mut() {
            let elapsed = now_ns.saturating_sub(entry.last_call_time);
            if elapsed <= timeout_ns {
                continue;
            }
            let tier = (entry.max_retrans_tier + 1).min(tier_ceiling);
            entry.last_call_time = now_ns;
            entry.max_retrans_tier = entry.max_retrans_tier.max(tier);
            messages.push(NackMessage::from_adamap(
                &entry.adamap,
                entry.table_index,
                cum_ack_seq,
                tier,
            ));
        }
        if !messages.is_empty() {
            self.reschedule_table_timer(now_ns, timeout_ns);
        }
        messages
    }
}
