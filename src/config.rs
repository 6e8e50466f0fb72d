//! Plain configuration structure owned by the engine instance.
//!
//! Tunables live as fields on a plain struct with `with_*` builder methods
//! rather than behind a generic attribute system, so invalid combinations are
//! caught once at construction via [`EngineConfig::validate`].

use crate::error::EngineError;

/// Tunables for a single flow's [`crate::receiver::ReceiverAdamap`] plus the
/// shared DMA scheduler it drives.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Per-flow bitmap length `B`. Must satisfy `1 <= B <= 256`.
    pub bitmap_size: usize,
    /// Capacity `L` of the lookup-table LRU. Default 1.
    pub lookup_table_lru_size: usize,
    /// Linked-list head cache size. Default 2.
    pub first_n: usize,
    /// RTO multiplier applied to the measured average retransmission RTT.
    pub rtt_scale_factor: f64,
    /// Initial table timeout, before the adaptive RTO takes over.
    pub table_timeout_ns: u64,
    /// Initial list timeout.
    pub list_timeout_ns: u64,
    /// DMA scheduler service rate, bytes/sec.
    pub dma_bandwidth_bytes_per_sec: f64,
    /// DMA scheduler fixed per-op latency, in nanoseconds.
    pub dma_fixed_latency_ns: u64,
    /// Whether the DMA cost model is active; disabling makes every op free.
    pub dma_enabled: bool,
    /// Ceiling on the retransmission tier a table-timeout resend can escalate
    /// to (`maxRetransTier + 1`, capped here).
    pub tier_ceiling: u16,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bitmap_size: 64,
            lookup_table_lru_size: 1,
            first_n: 2,
            rtt_scale_factor: 1.5,
            table_timeout_ns: 100_000,
            list_timeout_ns: 100_000,
            dma_bandwidth_bytes_per_sec: 12_500_000_000.0,
            dma_fixed_latency_ns: 500,
            dma_enabled: true,
            tier_ceiling: 8,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.bitmap_size == 0 || self.bitmap_size > 256 {
            return Err(EngineError::BitmapSizeOutOfRange(self.bitmap_size));
        }
        Ok(())
    }

    pub fn with_bitmap_size(mut self, bitmap_size: usize) -> Self {
        self.bitmap_size = bitmap_size;
        self
    }

    pub fn with_lookup_table_lru_size(mut self, size: usize) -> Self {
        self.lookup_table_lru_size = size;
        self
    }

    pub fn with_first_n(mut self, first_n: usize) -> Self {
        self.first_n = first_n;
        self
    }

    pub fn with_rtt_scale_factor(mut self, factor: f64) -> Self {
        self.rtt_scale_factor = factor;
        self
    }

    pub fn with_tier_ceiling(mut self, tier_ceiling: u16) -> Self {
        self.tier_ceiling = tier_ceiling;
        self
    }

    pub fn with_table_timeout_ns(mut self, table_timeout_ns: u64) -> Self {
        self.table_timeout_ns = table_timeout_ns;
        self
    }

    pub fn with_list_timeout_ns(mut self, list_timeout_ns: u64) -> Self {
        self.list_timeout_ns = list_timeout_ns;
        self
    }
}
