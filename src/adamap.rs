//! The adamap descriptor: a fixed-length bitmap over a contiguous run of
//! sequence numbers, optionally extended by a range-only tail beyond the
//! bitmap's reach.

/// Wire form carries at most 256 bits as four 64-bit words.
pub const MAX_BITMAP_BITS: usize = 256;
pub const WIRE_WORD_BITS: usize = 64;
pub const WIRE_WORDS: usize = MAX_BITMAP_BITS / WIRE_WORD_BITS;

/// Bytes charged for one adamap's metadata when it crosses the DMA
/// scheduler: a fixed 32-byte header plus the bitmap packed to bytes.
pub fn estimate_adamap_dma_bytes(bitmap_size: usize) -> u64 {
    32 + ((bitmap_size + 7) / 8) as u64
}

/// An immutable-after-finalization summary of which sequence numbers in
/// `(startSeq, startSeq + reprLength]` have arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adamap {
    pub id: u64,
    pub start_seq: u64,
    pub repr_length: u64,
    pub bitmap: Vec<bool>,
}

impl Adamap {
    pub fn new(id: u64, start_seq: u64, repr_length: u64, bitmap_size: usize) -> Self {
        Self {
            id,
            start_seq,
            repr_length,
            bitmap: vec![false; bitmap_size],
        }
    }

    pub fn bitmap_size(&self) -> usize {
        self.bitmap.len()
    }

    /// Number of bits in this adamap's bitmap that fall within its
    /// representable range.
    fn visible_len(&self) -> usize {
        (self.repr_length as usize).min(self.bitmap.len())
    }

    pub fn is_bitmap_full(&self) -> bool {
        let n = self.visible_len();
        self.bitmap[..n].iter().all(|&b| b)
    }

    /// True iff every bit after `i` within the representable range is set —
    /// i.e. flipping bit `i` could be the last visible hole.
    pub fn is_last_hole(&self, i: usize) -> bool {
        let n = self.visible_len();
        if i >= n {
            return true;
        }
        self.bitmap[i + 1..n].iter().all(|&b| b)
    }

    /// Offset of `seq` within this adamap's bitmap, or `None` if `seq` is not
    /// after `start_seq`.
    pub fn offset_of(&self, seq: u64) -> Option<u64> {
        if seq <= self.start_seq {
            None
        } else {
            Some(seq - self.start_seq - 1)
        }
    }

    pub fn bitmap_to_wire_words(&self) -> [u64; WIRE_WORDS] {
        let mut words = [0u64; WIRE_WORDS];
        for (i, &bit) in self.bitmap.iter().enumerate().take(MAX_BITMAP_BITS) {
            if bit {
                words[i / WIRE_WORD_BITS] |= 1u64 << (i % WIRE_WORD_BITS);
            }
        }
        words
    }

    pub fn wire_words_to_bitmap(words: [u64; WIRE_WORDS], size: usize) -> Vec<bool> {
        let size = size.min(MAX_BITMAP_BITS);
        (0..size)
            .map(|i| (words[i / WIRE_WORD_BITS] >> (i % WIRE_WORD_BITS)) & 1 == 1)
            .collect()
    }

    /// Result of one peel step in the splitting process.
    pub fn split_step(&mut self, bitmap_size: usize, skip_all_ones: bool) -> SplitStep {
        if self.repr_length <= bitmap_size as u64 {
            return SplitStep::Done;
        }

        let slice_bitmap: Vec<bool> = self.bitmap.iter().copied().take(bitmap_size).collect();
        let slice_all_ones = !slice_bitmap.is_empty() && slice_bitmap.iter().all(|&b| b);

        let peeled = Adamap {
            id: self.id,
            start_seq: self.start_seq,
            repr_length: bitmap_size as u64,
            bitmap: slice_bitmap,
        };

        self.bitmap = vec![false; bitmap_size];
        self.start_seq += bitmap_size as u64;
        self.repr_length -= bitmap_size as u64;

        if skip_all_ones && slice_all_ones {
            SplitStep::Skipped
        } else {
            SplitStep::Peeled(peeled)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitStep {
    /// `reprLength` already fits within the bitmap; nothing left to peel.
    Done,
    /// A slice was peeled off but discarded (`skipAllOnes` and it was full).
    Skipped,
    /// A slice was peeled off and should be admitted somewhere (e.g. the
    /// lookup table).
    Peeled(Adamap),
}

/// A server-side envelope around an [`Adamap`]: bookkeeping the engine
/// attaches while the adamap is parked in the linked list or lookup table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdamapWithIndex {
    pub adamap: Adamap,
    /// `-1` if not in the lookup table.
    pub table_index: i64,
    pub is_finished: bool,
    pub last_call_time: u64,
    pub max_retrans_tier: u16,
    pub in_nic_cache: bool,
}

impl AdamapWithIndex {
    pub fn new_head(adamap: Adamap, now: u64) -> Self {
        Self {
            adamap,
            table_index: -1,
            is_finished: false,
            last_call_time: now,
            max_retrans_tier: 0,
            in_nic_cache: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_round_trip_for_all_sizes_up_to_256() {
        for size in [1, 7, 8, 63, 64, 128, 200, 256] {
            let mut adamap = Adamap::new(0, 0, size as u64, size);
            for i in (0..size).step_by(3) {
                adamap.bitmap[i] = true;
            }
            let words = adamap.bitmap_to_wire_words();
            let round_tripped = Adamap::wire_words_to_bitmap(words, size);
            assert_eq!(round_tripped, adamap.bitmap);
        }
    }

    #[test]
    fn is_bitmap_full_respects_repr_length() {
        let mut a = Adamap::new(0, 0, 2, 4);
        a.bitmap[0] = true;
        a.bitmap[1] = true;
        // repr_length 2 means only first two bits are "visible"
        assert!(a.is_bitmap_full());
        a.repr_length = 4;
        assert!(!a.is_bitmap_full());
    }

    #[test]
    fn is_last_hole_checks_trailing_bits_only() {
        let mut a = Adamap::new(0, 0, 4, 4);
        a.bitmap = vec![false, false, true, true];
        assert!(a.is_last_hole(1));
        assert!(!a.is_last_hole(0));
    }

    #[test]
    fn split_step_peels_b_sized_windows() {
        let mut a = Adamap::new(0, 2, 17, 4);
        match a.split_step(4, false) {
            SplitStep::Peeled(p) => {
                assert_eq!(p.start_seq, 2);
                assert_eq!(p.repr_length, 4);
            }
            other => panic!("expected Peeled, got {other:?}"),
        }
        assert_eq!(a.start_seq, 6);
        assert_eq!(a.repr_length, 13);
        assert!(a.bitmap.iter().all(|&b| !b));
    }

    #[test]
    fn split_step_done_when_within_bitmap() {
        let mut a = Adamap::new(0, 0, 3, 4);
        assert_eq!(a.split_step(4, false), SplitStep::Done);
    }

    #[test]
    fn split_step_skips_all_ones_slice() {
        let mut a = Adamap::new(0, 0, 8, 4);
        a.bitmap = vec![true, true, true, true];
        assert_eq!(a.split_step(4, true), SplitStep::Skipped);
        assert_eq!(a.start_seq, 4);
    }
}
