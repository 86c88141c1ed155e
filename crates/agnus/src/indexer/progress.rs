// crates/agnus/src/indexer/progress.rs
// Best-effort progress events for full and incremental indexing

use serde::Serialize;
use tokio::sync::broadcast;

/// Progress event emitted while indexing.
///
/// Serialized shape matches the streaming contract:
/// `{step: "parsing", file, progress, total}` etc.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "step", rename_all = "lowercase")]
pub enum IndexProgress {
    Parsing {
        file: String,
        progress: usize,
        total: usize,
    },
    Embedding {
        #[serde(rename = "symbolCount")]
        symbol_count: usize,
        progress: usize,
        total: usize,
    },
    Done {
        #[serde(rename = "symbolCount")]
        symbol_count: usize,
        #[serde(rename = "edgeCount")]
        edge_count: usize,
        #[serde(rename = "durationMs")]
        duration_ms: u64,
    },
    Error {
        message: String,
    },
}

/// Best-effort progress sink backed by a broadcast channel.
///
/// Events are dropped when no subscriber is connected; subscribers joining
/// mid-index see only subsequent events. Never buffers unboundedly.
#[derive(Clone)]
pub struct ProgressSender {
    tx: Option<broadcast::Sender<IndexProgress>>,
}

impl ProgressSender {
    /// Sink that discards every event
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Sink with an attached subscriber channel
    pub fn channel(capacity: usize) -> (Self, broadcast::Receiver<IndexProgress>) {
        let (tx, rx) = broadcast::channel(capacity);
        (Self { tx: Some(tx) }, rx)
    }

    /// Subscribe to future events (no-op receiver hands back nothing)
    pub fn subscribe(&self) -> Option<broadcast::Receiver<IndexProgress>> {
        self.tx.as_ref().map(|tx| tx.subscribe())
    }

    /// Emit an event; send failures (no subscriber) are ignored
    pub fn emit(&self, event: IndexProgress) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
