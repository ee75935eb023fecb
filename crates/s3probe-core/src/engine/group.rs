//! One group's lifecycle: setup, run and teardown, strictly in order.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::catalog::OperationCatalog;
use crate::client::{ClientHandle, ClientProvider};
use crate::engine::recorder::Recorder;
use crate::engine::CancelHandle;
use crate::errors::{EngineError, OperationFault};
use crate::evaluator::evaluate;
use crate::model::{
    GlobalConfig, GroupOutcome, GroupStatus, Phase, PlanOperation, ResultRecord, ResultStatus,
    TestGroup,
};
use crate::operation::{Invocation, OperationContext, OutcomeRecord};
use crate::retry::RetryPolicy;
use crate::settings::SetupFailurePolicy;

/// Everything a group task needs, shared read-only across groups.
pub(crate) struct RunContext {
    pub(crate) global: GlobalConfig,
    pub(crate) catalog: Arc<OperationCatalog>,
    pub(crate) clients: Arc<ClientProvider>,
    pub(crate) retry: Option<RetryPolicy>,
    pub(crate) setup_failure: SetupFailurePolicy,
    pub(crate) dry_run: bool,
    pub(crate) recorder: Recorder,
    pub(crate) cancel: CancelHandle,
}

/// Forward-only status for the group being executed. Owned by the executing task.
struct GroupTracker {
    name: String,
    status: GroupStatus,
    started: Option<Instant>,
}

impl GroupTracker {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: GroupStatus::Pending,
            started: None,
        }
    }

    fn advance(&mut self, next: GroupStatus) {
        if !self.status.can_transition_to(next) {
            debug!(group = %self.name, from = ?self.status, to = ?next, "ignoring backward transition");
            return;
        }
        if next == GroupStatus::RunningSetup {
            self.started = Some(Instant::now());
        }
        debug!(group = %self.name, from = ?self.status, to = ?next, "group transition");
        self.status = next;
    }

    fn finish(mut self, status: GroupStatus, fault: Option<EngineError>) -> GroupOutcome {
        self.advance(status);
        GroupOutcome {
            duration: self.started.map(|s| s.elapsed()),
            name: self.name,
            status: self.status,
            fault,
        }
    }
}

/// How a phase ended.
struct PhaseReport {
    passed: usize,
    stopped_early: bool,
    cancelled: bool,
}

pub(crate) async fn run_group(ctx: Arc<RunContext>, group: TestGroup) -> GroupOutcome {
    let mut tracker = GroupTracker::new(&group.name);

    let primary = match resolve_primary(&ctx, &group) {
        Ok(client) => client,
        Err(fault) => {
            error!(group = %group.name, error = %fault, "group aborted");
            return tracker.finish(GroupStatus::Failed, Some(fault));
        }
    };

    info!(
        group = %group.name,
        credential = %group.credential,
        operations = group.operation_count(),
        "group started"
    );

    tracker.advance(GroupStatus::RunningSetup);
    let setup = run_phase(&ctx, &group, &primary, Phase::Setup, true).await;
    let setup_failed = setup.stopped_early;
    if setup_failed {
        warn!(
            group = %group.name,
            passed = setup.passed,
            policy = ?ctx.setup_failure,
            "setup phase did not pass"
        );
    }

    let mut cancelled = setup.cancelled;
    let skip_run = cancelled || (setup_failed && ctx.setup_failure == SetupFailurePolicy::Abort);
    if !skip_run {
        tracker.advance(GroupStatus::RunningRun);
        let run = run_phase(&ctx, &group, &primary, Phase::Run, false).await;
        cancelled = run.cancelled;
    }

    if !group.teardown.is_empty() {
        tracker.advance(GroupStatus::RunningTeardown);
        run_phase(&ctx, &group, &primary, Phase::Teardown, false).await;
    }

    let (status, fault) = if cancelled {
        (GroupStatus::Failed, Some(EngineError::Cancelled))
    } else if setup_failed && ctx.setup_failure == SetupFailurePolicy::Abort {
        (GroupStatus::Failed, None)
    } else if !group.setup.is_empty() && setup.passed == 0 {
        (GroupStatus::Failed, None)
    } else {
        (GroupStatus::Completed, None)
    };

    let outcome = tracker.finish(status, fault);
    info!(
        group = %outcome.name,
        status = ?outcome.status,
        duration_ms = outcome.duration.map(|d| d.as_millis() as u64).unwrap_or(0),
        "group finished"
    );
    outcome
}

fn resolve_primary(ctx: &RunContext, group: &TestGroup) -> Result<Arc<ClientHandle>, EngineError> {
    let credential = ctx
        .global
        .credential(&group.credential)
        .ok_or_else(|| EngineError::CredentialNotFound {
            name: group.credential.clone(),
        })?;
    ctx.clients.get(credential, &ctx.global)
}

/// Executes one phase in order. With `fail_fast`, stops at the first non-passing record.
/// Teardown ignores cancellation so cleanup always runs.
async fn run_phase(
    ctx: &RunContext,
    group: &TestGroup,
    primary: &Arc<ClientHandle>,
    phase: Phase,
    fail_fast: bool,
) -> PhaseReport {
    let operations = group.phase(phase);
    let total = operations.len();
    let mut report = PhaseReport {
        passed: 0,
        stopped_early: false,
        cancelled: false,
    };

    for (index, op) in operations.iter().enumerate() {
        if phase != Phase::Teardown && ctx.cancel.is_cancelled() {
            info!(group = %group.name, phase = %phase, "cancellation observed");
            report.cancelled = true;
            break;
        }

        let status = run_operation(ctx, group, primary, phase, index + 1, total, op).await;
        if status == ResultStatus::Pass {
            report.passed += 1;
        } else if fail_fast {
            report.stopped_early = true;
            break;
        }
    }
    report
}

async fn run_operation(
    ctx: &RunContext,
    group: &TestGroup,
    primary: &Arc<ClientHandle>,
    phase: Phase,
    index: usize,
    total: usize,
    op: &PlanOperation,
) -> ResultStatus {
    let pending = ResultRecord::pending(
        op.operation.clone(),
        group.name.clone(),
        op.expected.clone(),
        phase,
        index,
        total,
    );

    let client = match client_for(ctx, group, primary, op) {
        Ok(client) => client,
        Err(e) => return finish(ctx, pending.resolve_error(e.to_string())),
    };

    let implementation = match ctx.catalog.resolve(&op.operation) {
        Ok(implementation) => implementation,
        Err(e) => return finish(ctx, pending.resolve_error(e.to_string())),
    };

    let permit = match client.acquire().await {
        Ok(permit) => permit,
        Err(fault) => return finish(ctx, pending.resolve_error(fault.to_string())),
    };

    let op_ctx = OperationContext {
        client,
        group: group.name.clone(),
        phase,
    };
    let started = Instant::now();
    let invocation = implementation.invoke(
        &op_ctx,
        &op.parameters,
        Invocation {
            retry: ctx.retry.as_ref(),
            dry_run: ctx.dry_run,
        },
    );
    // A panicking implementation is contained to its own record.
    let observed = match AssertUnwindSafe(invocation).catch_unwind().await {
        Ok(observed) => observed,
        Err(payload) => {
            let fault = OperationFault::local(format!(
                "operation panicked: {}",
                panic_message(&*payload)
            ));
            error!(group = %group.name, operation = %op.operation, error = %fault, "operation panicked");
            OutcomeRecord::from_fault(&fault).with_duration(started.elapsed())
        }
    };
    drop(permit);

    let evaluation = evaluate(&op.expected, &observed);
    if let Some(message) = &evaluation.message {
        debug!(group = %group.name, operation = %op.operation, diagnostic = %message, "evaluation");
    }
    finish(ctx, pending.resolve(&evaluation, observed))
}

fn client_for(
    ctx: &RunContext,
    group: &TestGroup,
    primary: &Arc<ClientHandle>,
    op: &PlanOperation,
) -> Result<Arc<ClientHandle>, EngineError> {
    match op.credential.as_deref() {
        Some(name) if name != group.credential => {
            let credential =
                ctx.global
                    .credential(name)
                    .ok_or_else(|| EngineError::CredentialNotFound {
                        name: name.to_string(),
                    })?;
            ctx.clients.get(credential, &ctx.global)
        }
        _ => Ok(Arc::clone(primary)),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}

fn finish(ctx: &RunContext, record: ResultRecord) -> ResultStatus {
    info!(
        group = %record.group(),
        operation = %record.operation(),
        phase = %record.phase(),
        index = record.phase_index(),
        of = record.phase_total(),
        status = %record.status(),
        duration_ms = record.duration().as_millis() as u64,
        "operation finished"
    );
    ctx.recorder.record(record)
}
