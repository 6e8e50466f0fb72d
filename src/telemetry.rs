//! Observability hooks.
//!
//! The engine never owns a metrics sink: it takes `&mut dyn EngineObserver`
//! at call sites and lets the caller decide what to do with each event
//! (counters, tracing, nothing).

use crate::dma::DmaOpKind;

/// One of the named per-adamap lifecycle events the engine can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineEvent {
    GenAndCache,
    GenAndUpload,
    FetchLl,
    ConsumeLl,
    EnterTable,
    FetchTable,
    ConsumeTable,
    SenderGetAdamap,
    FirstRetransProcess,
    MultiRetransProcess,
}

/// One DMA op's cost, reported at the point it was charged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DmaTraceEvent {
    pub flow_id: u32,
    pub op: DmaOpKind,
    pub bytes: u64,
    pub queue_delay_ns: u64,
    pub service_ns: u64,
    pub backlog_ns: u64,
    pub queue_depth: u64,
}

/// Sink for engine telemetry. Default methods are no-ops so callers only
/// implement what they care about.
pub trait EngineObserver {
    fn on_dma_event(&mut self, _event: DmaTraceEvent) {}
    fn on_engine_event(&mut self, _flow_id: u32, _event: EngineEvent) {}
}

/// An observer that discards everything; the default when a caller has no
/// use for telemetry.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl EngineObserver for NullObserver {}

/// An observer that just counts engine events by kind, useful in tests.
#[derive(Debug, Default)]
pub struct CountingObserver {
    pub dma_events: u64,
    pub engine_events: Vec<EngineEvent>,
}

impl EngineObserver for CountingObserver {
    fn on_dma_event(&mut self, _event: DmaTraceEvent) {
        self.dma_events += 1;
    }

    fn on_engine_event(&mut self, _flow_id: u32, event: EngineEvent) {
        self.engine_events.push(event);
    }
}
