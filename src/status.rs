//! Stable status code dictionary returned by [`crate::receiver::ReceiverAdamap::record`].
//!
//! Modeled as a tagged enum with a fixed mapping to the integer codes the
//! wider transport already expects on the wire path, so callers match on
//! variants while the wire form stays byte-stable.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// Tier-0 contiguous advance; no adamap mutation.
    ContiguousAdvance,
    /// Tier-0 hole filled within the current bitmap.
    HoleFilled,
    /// Tier-0 overflow finalized the current bitmap as a new head.
    NewHeadCreated,
    /// Tier-1 packet ignored: front head's `startSeq >= seq`.
    Tier1StaleStartTooSmall,
    /// Tier-1 packet ignored: `seq` is already past the current window
    /// (no linked-list entries remain, or seq exceeds current `startSeq`).
    Tier1StaleAlreadyAcked,
    /// Tier-1 packet ignored: `seq` not owned by any linked-list node.
    Tier1StaleBeyondFinished,
    /// Tier-1 bit flip, no further state transition.
    Tier1BitFlip,
    /// Tier-1 flip that filled the last hole and promoted the adamap to the
    /// lookup table.
    Tier1FlipNewTableEntry,
    /// Tier-1 flip that filled the last hole and the bitmap is now fully
    /// received; head erased.
    Tier1FlipHeadErased,
    /// Tier-1 flip that filled the last hole of a fully-received window but
    /// the adamap still carries range extension; head slides forward.
    Tier1FlipSlide,
    /// Tier-1 packet landed beyond the head's current bitmap window; the
    /// head was peeled/slid until the bit could be set.
    Tier1BeyondBitmap,
    /// Tier-≥2 update to an existing lookup-table entry.
    Tier2Update,
    /// Tier-≥2 update that exceeded the entry's prior max tier and therefore
    /// fed the RTO estimator / triggers resend bookkeeping.
    Tier2UpdateTriggersResend,
    /// Tier-≥2 packet named a `tableIndex` absent from the lookup table.
    Tier2TableIndexNotFound,
}

impl StatusCode {
    pub fn code(self) -> i32 {
        match self {
            Self::ContiguousAdvance => -1,
            Self::HoleFilled => -5,
            Self::NewHeadCreated => -6,
            Self::Tier1StaleStartTooSmall => -10,
            Self::Tier1StaleAlreadyAcked => -11,
            Self::Tier1StaleBeyondFinished => -12,
            Self::Tier1BitFlip => -14,
            Self::Tier1FlipNewTableEntry => -15,
            Self::Tier1FlipHeadErased => -16,
            Self::Tier1FlipSlide => -17,
            Self::Tier1BeyondBitmap => -18,
            Self::Tier2Update => -20,
            Self::Tier2UpdateTriggersResend => -21,
            Self::Tier2TableIndexNotFound => -100,
        }
    }

    /// True for the "benign out-of-date packet" family: no NACK, silently
    /// dropped.
    pub fn is_stale(self) -> bool {
        matches!(
            self,
            Self::Tier1StaleStartTooSmall
                | Self::Tier1StaleAlreadyAcked
                | Self::Tier1StaleBeyondFinished
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_the_documented_dictionary() {
        assert_eq!(StatusCode::ContiguousAdvance.code(), -1);
        assert_eq!(StatusCode::HoleFilled.code(), -5);
        assert_eq!(StatusCode::NewHeadCreated.code(), -6);
        assert_eq!(StatusCode::Tier1StaleStartTooSmall.code(), -10);
        assert_eq!(StatusCode::Tier1StaleAlreadyAcked.code(), -11);
        assert_eq!(StatusCode::Tier1StaleBeyondFinished.code(), -12);
        assert_eq!(StatusCode::Tier1BitFlip.code(), -14);
        assert_eq!(StatusCode::Tier1FlipNewTableEntry.code(), -15);
        assert_eq!(StatusCode::Tier1FlipHeadErased.code(), -16);
        assert_eq!(StatusCode::Tier1FlipSlide.code(), -17);
        assert_eq!(StatusCode::Tier1BeyondBitmap.code(), -18);
        assert_eq!(StatusCode::Tier2Update.code(), -20);
        assert_eq!(StatusCode::Tier2UpdateTriggersResend.code(), -21);
        assert_eq!(StatusCode::Tier2TableIndexNotFound.code(), -100);
    }
}
