use std::io::Write;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::app::ports::ConsumerProbe;
use crate::error::Result;
use crate::types::EnrichedRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPayload {
    pub total_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPayload {
    pub records: Vec<EnrichedRecord>,
    pub processed_count: usize,
    pub total_count: usize,
    pub is_complete: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletePayload {
    pub processed_count: usize,
    pub total_count: usize,
}

/// Lifecycle events of one pipeline run, in emission order:
/// one `Start`, any number of `Batch`, then exactly one of `Error` or `Complete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ProgressEvent {
    Start(StartPayload),
    Batch(BatchPayload),
    Error(ErrorPayload),
    Complete(CompletePayload),
}

impl ProgressEvent {
    /// Event name on the wire (the SSE `event:` field).
    pub fn name(&self) -> &'static str {
        match self {
            ProgressEvent::Start(_) => "start",
            ProgressEvent::Batch(_) => "batch",
            ProgressEvent::Error(_) => "error",
            ProgressEvent::Complete(_) => "complete",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Error(_) | ProgressEvent::Complete(_))
    }

    /// JSON of the payload alone (the SSE `data:` field).
    pub fn data_json(&self) -> serde_json::Result<String> {
        match self {
            ProgressEvent::Start(p) => serde_json::to_string(p),
            ProgressEvent::Batch(p) => serde_json::to_string(p),
            ProgressEvent::Error(p) => serde_json::to_string(p),
            ProgressEvent::Complete(p) => serde_json::to_string(p),
        }
    }
}

/// Sending half of a run's event channel.
///
/// The terminal methods take `self`, so the channel is closed exactly once and
/// nothing can be sent after a terminal event. Dropping the stream without a
/// terminal event closes it quietly (used when the consumer has gone).
pub struct ProgressStream {
    tx: mpsc::Sender<ProgressEvent>,
}

/// Create a run's event channel with room for `capacity` undelivered events.
pub fn channel(capacity: usize) -> (ProgressStream, mpsc::Receiver<ProgressEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ProgressStream { tx }, rx)
}

impl ProgressStream {
    /// Returns `false` when the consumer is gone.
    pub async fn start(&self, total_count: usize) -> bool {
        self.emit(ProgressEvent::Start(StartPayload { total_count })).await
    }

    /// Returns `false` when the consumer is gone.
    pub async fn batch(&self, payload: BatchPayload) -> bool {
        self.emit(ProgressEvent::Batch(payload)).await
    }

    /// Returns `false` when the consumer was gone before the event could be delivered.
    pub async fn complete(self, processed_count: usize, total_count: usize) -> bool {
        self.emit(ProgressEvent::Complete(CompletePayload {
            processed_count,
            total_count,
        }))
        .await
    }

    /// Returns `false` when the consumer was gone before the event could be delivered.
    pub async fn fail(self, message: impl Into<String>) -> bool {
        self.emit(ProgressEvent::Error(ErrorPayload {
            message: message.into(),
        }))
        .await
    }

    async fn emit(&self, event: ProgressEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }
}

/// Drain `rx` into `out`, one tagged JSON object per line, flushing after each
/// event. Returns the number of events written.
pub async fn write_json_lines<W: Write>(rx: &mut mpsc::Receiver<ProgressEvent>, out: &mut W) -> Result<usize> {
    let mut written = 0;
    while let Some(event) = rx.recv().await {
        serde_json::to_writer(&mut *out, &event)?;
        out.write_all(b"\n")?;
        out.flush()?;
        written += 1;
    }
    Ok(written)
}

impl ConsumerProbe for ProgressStream {
    fn is_disconnected(&self) -> bool {
        self.tx.is_closed()
    }
}
