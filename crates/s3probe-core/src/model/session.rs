//! Session-level results: one ResultRecord per executed operation, group outcomes and the summary.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::errors::EngineError;
use crate::evaluator::{Evaluation, Verdict};
use crate::model::plan::{ExpectedOutcome, Phase};
use crate::operation::{OutcomeRecord, ResponsePayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Pending,
    Pass,
    Fail,
    Error,
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResultStatus::Pending => "pending",
            ResultStatus::Pass => "pass",
            ResultStatus::Fail => "fail",
            ResultStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Lifecycle of one group within a run. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Pending,
    RunningSetup,
    RunningRun,
    RunningTeardown,
    Completed,
    Failed,
}

impl GroupStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// True if moving from `self` to `next` respects the forward-only ordering.
    /// Phases may be skipped; terminal states never change.
    pub fn can_transition_to(&self, next: GroupStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            GroupStatus::Pending => false,
            GroupStatus::Completed | GroupStatus::Failed => true,
            _ => next > *self,
        }
    }
}

/// The evaluated, stored outcome of one operation.
///
/// Created as `Pending` before the call and resolved exactly once afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct ResultRecord {
    operation: String,
    group: String,
    status: ResultStatus,
    #[serde(with = "crate::model::duration_ms")]
    duration: Duration,
    expected: ExpectedOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<ResponsePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    phase: Phase,
    phase_index: usize,
    phase_total: usize,
    timestamp: DateTime<Utc>,
}

impl ResultRecord {
    /// `phase_index` is 1-based.
    pub fn pending(
        operation: impl Into<String>,
        group: impl Into<String>,
        expected: ExpectedOutcome,
        phase: Phase,
        phase_index: usize,
        phase_total: usize,
    ) -> Self {
        Self {
            operation: operation.into(),
            group: group.into(),
            status: ResultStatus::Pending,
            duration: Duration::ZERO,
            expected,
            response: None,
            error_code: None,
            error_message: None,
            phase,
            phase_index,
            phase_total,
            timestamp: Utc::now(),
        }
    }

    /// Applies the evaluator's verdict. System faults are reported as `Error`
    /// whatever the verdict says. Already resolved records are returned unchanged.
    pub fn resolve(mut self, evaluation: &Evaluation, observed: OutcomeRecord) -> Self {
        if self.status != ResultStatus::Pending {
            return self;
        }
        self.status = if observed.is_system_fault() {
            ResultStatus::Error
        } else {
            match evaluation.verdict {
                Verdict::Pass => ResultStatus::Pass,
                Verdict::Fail => ResultStatus::Fail,
            }
        };
        self.duration = observed.duration;
        self.error_code = observed.error_code;
        self.error_message = match self.status {
            ResultStatus::Pass => observed.error_message,
            _ => evaluation.message.clone().or(observed.error_message),
        };
        self.response = observed.response;
        self
    }

    /// Resolves the record as `Error` without an observed outcome
    /// (unknown operation, unresolvable credential, cancellation).
    pub fn resolve_error(mut self, message: impl Into<String>) -> Self {
        if self.status != ResultStatus::Pending {
            return self;
        }
        self.status = ResultStatus::Error;
        self.error_message = Some(message.into());
        self
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, ResultStatus::Fail | ResultStatus::Error)
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn status(&self) -> ResultStatus {
        self.status
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn expected(&self) -> &ExpectedOutcome {
        &self.expected
    }

    pub fn response(&self) -> Option<&ResponsePayload> {
        self.response.as_ref()
    }

    pub fn error_code(&self) -> Option<&str> {
        self.error_code.as_deref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn phase_index(&self) -> usize {
        self.phase_index
    }

    pub fn phase_total(&self) -> usize {
        self.phase_total
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub success_rate: f64,
}

impl Summary {
    /// Recomputed from the final record list; pending records are not counted.
    pub fn from_results(results: &[ResultRecord]) -> Self {
        Self::from_records(results)
    }

    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ResultRecord>) -> Self {
        let mut summary = Summary::default();
        for record in records {
            match record.status {
                ResultStatus::Pass => summary.passed += 1,
                ResultStatus::Fail => summary.failed += 1,
                ResultStatus::Error => summary.errors += 1,
                ResultStatus::Pending => {}
            }
        }
        let total = summary.total();
        summary.success_rate = if total == 0 {
            0.0
        } else {
            summary.passed as f64 / total as f64
        };
        summary
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.errors
    }
}

/// Duration distribution over resolved records.
///
/// Percentiles use the nearest-rank index `floor(count * p)` over the sorted durations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DurationStats {
    pub count: usize,
    #[serde(serialize_with = "crate::model::duration_ms::serialize")]
    pub total: Duration,
    #[serde(serialize_with = "crate::model::duration_ms::serialize")]
    pub min: Duration,
    #[serde(serialize_with = "crate::model::duration_ms::serialize")]
    pub max: Duration,
    #[serde(serialize_with = "crate::model::duration_ms::serialize")]
    pub mean: Duration,
    #[serde(serialize_with = "crate::model::duration_ms::serialize")]
    pub p50: Duration,
    #[serde(serialize_with = "crate::model::duration_ms::serialize")]
    pub p90: Duration,
    #[serde(serialize_with = "crate::model::duration_ms::serialize")]
    pub p95: Duration,
}

impl DurationStats {
    /// `None` when no resolved record is given.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ResultRecord>) -> Option<Self> {
        let mut durations: Vec<Duration> = records
            .into_iter()
            .filter(|r| r.status != ResultStatus::Pending)
            .map(|r| r.duration)
            .collect();
        if durations.is_empty() {
            return None;
        }
        durations.sort_unstable();

        let count = durations.len();
        let total: Duration = durations.iter().sum();
        let rank = |percent: usize| durations[(count * percent / 100).min(count - 1)];
        Some(Self {
            count,
            total,
            min: durations[0],
            max: durations[count - 1],
            mean: total / u32::try_from(count).unwrap_or(u32::MAX),
            p50: rank(50),
            p90: rank(90),
            p95: rank(95),
        })
    }

    /// Resolved operations per second of summed operation time.
    pub fn throughput(&self) -> f64 {
        let secs = self.total.as_secs_f64();
        if secs > 0.0 {
            self.count as f64 / secs
        } else {
            0.0
        }
    }
}

fn serialize_fault<S>(fault: &Option<EngineError>, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match fault {
        Some(err) => s.serialize_some(&err.to_string()),
        None => s.serialize_none(),
    }
}

/// Final state of one selected group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupOutcome {
    pub name: String,
    pub status: GroupStatus,
    #[serde(
        serialize_with = "crate::model::duration_ms::option::serialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<Duration>,
    #[serde(
        serialize_with = "serialize_fault",
        skip_serializing_if = "Option::is_none"
    )]
    pub fault: Option<EngineError>,
}

/// One full run of a test plan.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    id: Uuid,
    plan_source: String,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    results: Vec<ResultRecord>,
    summary: Option<Summary>,
    groups: Vec<GroupOutcome>,
}

impl Session {
    pub fn start(plan_source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            plan_source: plan_source.into(),
            started_at: Utc::now(),
            ended_at: None,
            results: Vec::new(),
            summary: None,
            groups: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, record: ResultRecord) {
        if self.summary.is_none() {
            self.results.push(record);
        }
    }

    pub(crate) fn set_groups(&mut self, groups: Vec<GroupOutcome>) {
        if self.summary.is_none() {
            self.groups = groups;
        }
    }

    /// Stamps the end time and computes the summary. Later calls leave the session unchanged.
    pub(crate) fn finalize(&mut self) -> Summary {
        if let Some(summary) = self.summary {
            return summary;
        }
        let summary = Summary::from_results(&self.results);
        self.ended_at = Some(Utc::now());
        self.summary = Some(summary);
        summary
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn plan_source(&self) -> &str {
        &self.plan_source
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn results(&self) -> &[ResultRecord] {
        &self.results
    }

    pub fn summary(&self) -> Option<&Summary> {
        self.summary.as_ref()
    }

    pub fn groups(&self) -> &[GroupOutcome] {
        &self.groups
    }

    pub fn group_outcome(&self, name: &str) -> Option<&GroupOutcome> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Records of one group, in phase-then-index order.
    pub fn results_for_group<'a>(
        &'a self,
        group: &'a str,
    ) -> impl Iterator<Item = &'a ResultRecord> + 'a {
        self.results.iter().filter(move |r| r.group == group)
    }

    /// Per-group counts, keyed by group name.
    pub fn group_summaries(&self) -> BTreeMap<&str, Summary> {
        let mut names: Vec<&str> = self.results.iter().map(|r| r.group.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names
            .into_iter()
            .map(|name| (name, Summary::from_records(self.results_for_group(name))))
            .collect()
    }

    /// Records that failed their expectation or hit a system error, in record order.
    pub fn failed_results(&self) -> impl Iterator<Item = &ResultRecord> + '_ {
        self.results.iter().filter(|r| r.is_failure())
    }

    pub fn duration_stats(&self) -> Option<DurationStats> {
        DurationStats::from_records(&self.results)
    }

    pub fn group_duration_stats(&self, group: &str) -> Option<DurationStats> {
        DurationStats::from_records(self.results_for_group(group))
    }

    pub fn is_finalized(&self) -> bool {
        self.summary.is_some()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.ended_at
            .and_then(|end| (end - self.started_at).to_std().ok())
    }
}
