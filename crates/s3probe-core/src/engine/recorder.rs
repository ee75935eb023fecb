use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::model::{GroupOutcome, GroupStatus, ResultRecord, ResultStatus};
use crate::progress::{ProgressEvent, ProgressSink};

/// Concurrency-safe append target for result records, shared by all group tasks.
pub(crate) struct Recorder {
    records: Mutex<Vec<ResultRecord>>,
    done: AtomicUsize,
    total: usize,
    progress: Option<ProgressSink>,
}

impl Recorder {
    pub(crate) fn new(total: usize, progress: Option<ProgressSink>) -> Self {
        Self {
            records: Mutex::new(Vec::with_capacity(total)),
            done: AtomicUsize::new(0),
            total,
            progress,
        }
    }

    pub(crate) fn record(&self, record: ResultRecord) -> ResultStatus {
        let status = record.status();
        let event = self.progress.as_ref().map(|_| ProgressEvent {
            done: 0,
            total: self.total,
            group: record.group().to_string(),
            operation: record.operation().to_string(),
            status,
        });

        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;

        if let (Some(sink), Some(mut event)) = (&self.progress, event) {
            event.done = done;
            sink(event);
        }
        status
    }

    pub(crate) fn take(&self) -> Vec<ResultRecord> {
        std::mem::take(&mut *self.records.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Run-scoped group status table. Each slot is written once, by whoever
/// collects that group's outcome; the plan itself is never touched.
pub(crate) struct StatusTable {
    slots: Vec<GroupOutcome>,
}

impl StatusTable {
    pub(crate) fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            slots: names
                .into_iter()
                .map(|name| GroupOutcome {
                    name: name.to_string(),
                    status: GroupStatus::Pending,
                    duration: None,
                    fault: None,
                })
                .collect(),
        }
    }

    pub(crate) fn set(&mut self, index: usize, outcome: GroupOutcome) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = outcome;
        }
    }

    pub(crate) fn into_outcomes(self) -> Vec<GroupOutcome> {
        self.slots
    }
}
