//! Per-operation progress updates emitted while a run is in flight.

use std::sync::Arc;

use crate::model::ResultStatus;

/// One update, sent after a result record has been stored.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub done: usize,
    pub total: usize,
    pub group: String,
    pub operation: String,
    pub status: ResultStatus,
}

/// Receives progress events. With parallel groups, events arrive in completion order.
pub type ProgressSink = Arc<dyn Fn(ProgressEvent) + Send + Sync>;
