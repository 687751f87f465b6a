//! Trace pipeline: correlation-ID handling and asynchronous event emission.
//!
//! `begin` opens a hop: it adopts a valid upstream correlation ID (internal
//! hop, `service.*` events) or mints a fresh one (edge hop, `request.*`
//! events) and emits the start event. The returned [`TraceContext`] must be
//! closed exactly once; its `Drop` impl guarantees the paired end event on
//! abandoned paths (caller disconnect, deadline expiry) with a cancellation
//! marker, so no exit path can leak an unclosed hop.
//!
//! Emission is fire-and-forget: events are queued on a bounded channel and
//! shipped to a [`TraceSink`] by a background task. A full queue drops the
//! event and counts the drop -- request latency is never traded for trace
//! completeness.

pub mod sink;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::warn;

use meshgate_core::{
    epoch_ms, CorrelationId, RequestSnapshot, TraceEvent, TraceEventKind,
};

use crate::config::GatewayConfig;

pub use sink::{LogSink, MemorySink, TraceSink};

// ---------------------------------------------------------------------------
// HopKind
// ---------------------------------------------------------------------------

/// Whether this hop originated the correlation ID or is propagating one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopKind {
    /// No valid upstream ID: this hop is client-facing and minted the ID.
    Edge,
    /// A valid upstream ID was supplied: service-to-service hop.
    Internal,
}

impl HopKind {
    fn start_event(self) -> TraceEventKind {
        match self {
            Self::Edge => TraceEventKind::RequestStart,
            Self::Internal => TraceEventKind::ServiceStart,
        }
    }

    fn end_event(self) -> TraceEventKind {
        match self {
            Self::Edge => TraceEventKind::RequestEnd,
            Self::Internal => TraceEventKind::ServiceEnd,
        }
    }
}

// ---------------------------------------------------------------------------
// HopIdentity
// ---------------------------------------------------------------------------

/// Fields stamped onto every event this process emits.
#[derive(Debug)]
struct HopIdentity {
    project_name: String,
    service_name: String,
    instance_id: String,
}

// ---------------------------------------------------------------------------
// TracePipeline
// ---------------------------------------------------------------------------

/// Cheaply-cloneable handle to the emission queue.
#[derive(Clone)]
pub struct TracePipeline {
    tx: mpsc::Sender<TraceEvent>,
    dropped: Arc<AtomicU64>,
    identity: Arc<HopIdentity>,
}

impl TracePipeline {
    /// Spawns the emission task and returns the pipeline handle.
    ///
    /// The task drains the queue into `sink` and exits when the pipeline
    /// handle and every outstanding `TraceContext` have been dropped.
    #[must_use]
    pub fn spawn(config: &GatewayConfig, sink: Arc<dyn TraceSink>) -> Self {
        let (tx, mut rx) = mpsc::channel::<TraceEvent>(config.trace_queue_capacity);

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(error) = sink.emit(event).await {
                    // Sink unavailability is local-log-only; the request
                    // that produced this event has long since completed.
                    warn!(%error, "trace sink emission failed");
                }
            }
        });

        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
            identity: Arc::new(HopIdentity {
                project_name: config.project_name.clone(),
                service_name: config.service_name.clone(),
                instance_id: config.instance_id.clone(),
            }),
        }
    }

    /// Opens a trace hop and emits its start event.
    ///
    /// `incoming` is the raw `X-Request-Id` header value, if any. A valid
    /// ID is propagated unchanged (internal hop); anything else mints a
    /// fresh ID and marks this hop as the edge.
    #[must_use]
    pub fn begin(&self, incoming: Option<&str>, snapshot: RequestSnapshot) -> TraceContext {
        let (correlation_id, kind) = match incoming.and_then(CorrelationId::parse) {
            Some(id) => (id, HopKind::Internal),
            None => (CorrelationId::mint(), HopKind::Edge),
        };

        let context = TraceContext {
            correlation_id,
            kind,
            started_at: Instant::now(),
            tx: self.tx.clone(),
            dropped: Arc::clone(&self.dropped),
            identity: Arc::clone(&self.identity),
            ended: false,
        };
        context.enqueue(context.start_event(snapshot));
        context
    }

    /// Number of events dropped because the queue was full.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// TraceContext
// ---------------------------------------------------------------------------

/// One open hop. Close it with [`TraceContext::end`]; dropping it unclosed
/// emits the end event with a cancellation marker instead.
pub struct TraceContext {
    correlation_id: CorrelationId,
    kind: HopKind,
    started_at: Instant,
    tx: mpsc::Sender<TraceEvent>,
    dropped: Arc<AtomicU64>,
    identity: Arc<HopIdentity>,
    ended: bool,
}

impl TraceContext {
    #[must_use]
    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    #[must_use]
    pub fn hop_kind(&self) -> HopKind {
        self.kind
    }

    /// Closes the hop normally, emitting the paired end event with timing.
    pub fn end(mut self) {
        self.ended = true;
        self.enqueue(self.end_event(false));
    }

    fn start_event(&self, snapshot: RequestSnapshot) -> TraceEvent {
        TraceEvent {
            project_name: self.identity.project_name.clone(),
            service_name: self.identity.service_name.clone(),
            service_instance_id: self.identity.instance_id.clone(),
            correlation_id: self.correlation_id.clone(),
            event: self.kind.start_event(),
            timestamp_ms: epoch_ms(),
            request: Some(snapshot),
            timing_ms: None,
            cancelled: false,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn end_event(&self, cancelled: bool) -> TraceEvent {
        TraceEvent {
            project_name: self.identity.project_name.clone(),
            service_name: self.identity.service_name.clone(),
            service_instance_id: self.identity.instance_id.clone(),
            correlation_id: self.correlation_id.clone(),
            event: self.kind.end_event(),
            timestamp_ms: epoch_ms(),
            request: None,
            timing_ms: Some(self.started_at.elapsed().as_millis() as u64),
            cancelled,
        }
    }

    fn enqueue(&self, event: TraceEvent) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.tx.try_send(event) {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(dropped_total = total, "trace queue full, event dropped");
        }
    }
}

impl Drop for TraceContext {
    fn drop(&mut self) {
        if !self.ended {
            // Abandoned hop: the request task was cancelled before it could
            // close the context. Keep the paired-event invariant.
            self.enqueue(self.end_event(true));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
