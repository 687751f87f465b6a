//! Trace event sinks.
//!
//! The original deployment ships events to a message broker; that wire
//! client stays outside this crate, behind the [`TraceSink`] trait. The
//! shipped [`LogSink`] writes events to the local structured log, which is
//! enough for single-box debugging; [`MemorySink`] collects events for
//! tests and diagnostics.

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use meshgate_core::TraceEvent;

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Destination for emitted trace events.
///
/// Emission failures are the sink's problem to report; the pipeline logs
/// them and moves on -- a broken sink never fails a request.
#[async_trait]
pub trait TraceSink: Send + Sync {
    /// Ship one event.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink could not accept the event.
    async fn emit(&self, event: TraceEvent) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// LogSink
// ---------------------------------------------------------------------------

/// Writes trace events to the local structured log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl TraceSink for LogSink {
    async fn emit(&self, event: TraceEvent) -> anyhow::Result<()> {
        let payload = serde_json::to_string(&event)?;
        info!(
            target: "meshgate::trace",
            correlation_id = %event.correlation_id,
            event = event.event.as_str(),
            payload,
            "trace event"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemorySink
// ---------------------------------------------------------------------------

/// Collects events in memory. For tests and diagnostics.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<TraceEvent>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of everything emitted so far, in emission order.
    #[must_use]
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[async_trait]
impl TraceSink for MemorySink {
    async fn emit(&self, event: TraceEvent) -> anyhow::Result<()> {
        self.events.lock().push(event);
        Ok(())
    }
}
