//! Test execution engine: group scheduling, phase sequencing and session assembly.
//!
//! Groups run sequentially by default, or in parallel on a bounded task pool.
//! Inside a group, operations always execute one after another.

mod group;
mod recorder;

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, Instrument};

use crate::catalog::OperationCatalog;
use crate::client::ClientProvider;
use crate::errors::{EngineError, EngineResult};
use crate::model::{GroupOutcome, GroupStatus, Session, TestGroup, TestPlan};
use crate::progress::ProgressSink;
use crate::retry::RetryPolicy;
use crate::settings::EngineSettings;

use group::{run_group, RunContext};
use recorder::{Recorder, StatusTable};

/// Run-level cancellation flag. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops scheduling new groups; running groups stop after their current operation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Per-invocation options for [`Engine::run_plan`].
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Groups to run, by name. `None` runs every group.
    pub groups: Option<Vec<String>>,
    /// Overrides the plan's parallelism default.
    pub parallel: Option<bool>,
    pub progress: Option<ProgressSink>,
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("groups", &self.groups)
            .field("parallel", &self.parallel)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl RunOptions {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_groups<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = Some(parallel);
        self
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }
}

pub struct Engine {
    catalog: Arc<OperationCatalog>,
    clients: Arc<ClientProvider>,
    retry: Option<RetryPolicy>,
    settings: EngineSettings,
    cancel: CancelHandle,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("catalog", &self.catalog)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(catalog: OperationCatalog, settings: EngineSettings) -> Self {
        let catalog = if settings.lenient_operations {
            catalog.lenient(true)
        } else {
            catalog
        };
        Self {
            catalog: Arc::new(catalog),
            clients: Arc::new(ClientProvider::new(settings.client.clone())),
            retry: settings.retry.clone().map(RetryPolicy::new),
            settings,
            cancel: CancelHandle::new(),
        }
    }

    /// Shares a client cache with other engines or callers.
    pub fn with_client_provider(mut self, clients: Arc<ClientProvider>) -> Self {
        self.clients = clients;
        self
    }

    /// Replaces the retry policy built from the settings (e.g. to inject a sleeper).
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Uses an externally created cancellation flag.
    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn catalog(&self) -> &OperationCatalog {
        &self.catalog
    }

    pub fn clients(&self) -> &Arc<ClientProvider> {
        &self.clients
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Runs the selected groups of `plan` and returns the finalized session.
    ///
    /// Only an unknown group name in the filter fails the call; group-level faults
    /// are reported in [`Session::groups`].
    pub async fn run_plan(&self, plan: &TestPlan, options: RunOptions) -> EngineResult<Session> {
        let selected = select_groups(plan, options.groups.as_deref())?;
        let parallel = options
            .parallel
            .or(plan.parallel)
            .unwrap_or(self.settings.parallel);
        let total: usize = selected.iter().map(|g| g.operation_count()).sum();

        let mut session = Session::start(plan.source.clone());
        let span = tracing::info_span!("session", id = %session.id());
        info!(
            parent: &span,
            source = %plan.source,
            groups = selected.len(),
            operations = total,
            parallel,
            dry_run = self.settings.dry_run,
            "session started"
        );

        let ctx = Arc::new(RunContext {
            global: plan.config.clone(),
            catalog: Arc::clone(&self.catalog),
            clients: Arc::clone(&self.clients),
            retry: self.retry.clone(),
            setup_failure: self.settings.setup_failure,
            dry_run: self.settings.dry_run,
            recorder: Recorder::new(total, options.progress.clone()),
            cancel: self.cancel.clone(),
        });

        let mut table = StatusTable::new(selected.iter().map(|g| g.name.as_str()));
        if parallel {
            self.run_parallel(&ctx, &selected, &mut table)
                .instrument(span.clone())
                .await;
        } else {
            run_sequential(&ctx, &selected, &mut table)
                .instrument(span.clone())
                .await;
        }

        for record in ctx.recorder.take() {
            session.push(record);
        }
        session.set_groups(table.into_outcomes());
        let summary = session.finalize();

        info!(
            parent: &span,
            passed = summary.passed,
            failed = summary.failed,
            errors = summary.errors,
            success_rate = summary.success_rate,
            "session finished"
        );
        Ok(session)
    }

    async fn run_parallel(
        &self,
        ctx: &Arc<RunContext>,
        groups: &[&TestGroup],
        table: &mut StatusTable,
    ) {
        let sem = Arc::new(Semaphore::new(self.settings.max_parallel_groups.max(1)));
        let mut join_set = JoinSet::new();

        for (index, group) in groups.iter().enumerate() {
            let ctx = Arc::clone(ctx);
            let sem = Arc::clone(&sem);
            let group = (*group).clone();
            join_set.spawn(
                async move {
                    let _permit = sem.acquire_owned().await.ok();
                    if ctx.cancel.is_cancelled() {
                        return (index, None);
                    }
                    (index, Some(run_group(ctx, group).await))
                }
                .in_current_span(),
            );
        }

        let mut reported = vec![false; groups.len()];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    reported[index] = true;
                    if let Some(outcome) = outcome {
                        table.set(index, outcome);
                    }
                }
                Err(e) => error!(error = %e, "group task failed"),
            }
        }

        // Tasks skipped by cancellation still report; a panicked task never does.
        for (index, group) in groups.iter().enumerate() {
            if !reported[index] {
                table.set(
                    index,
                    GroupOutcome {
                        name: group.name.clone(),
                        status: GroupStatus::Failed,
                        duration: None,
                        fault: Some(EngineError::GroupTask {
                            group: group.name.clone(),
                            message: "task ended without reporting an outcome".into(),
                        }),
                    },
                );
            }
        }
    }
}

async fn run_sequential(ctx: &Arc<RunContext>, groups: &[&TestGroup], table: &mut StatusTable) {
    for (index, group) in groups.iter().enumerate() {
        if ctx.cancel.is_cancelled() {
            info!(remaining = groups.len() - index, "run cancelled, skipping remaining groups");
            break;
        }
        let outcome = run_group(Arc::clone(ctx), (*group).clone()).await;
        table.set(index, outcome);
    }
}

/// Resolves the group filter against the plan, keeping plan order.
fn select_groups<'a>(plan: &'a TestPlan, filter: Option<&[String]>) -> EngineResult<Vec<&'a TestGroup>> {
    let Some(names) = filter else {
        return Ok(plan.groups.iter().collect());
    };
    if let Some(missing) = names.iter().find(|name| plan.group(name).is_none()) {
        return Err(EngineError::GroupNotFound {
            name: missing.clone(),
        });
    }
    let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();
    Ok(plan
        .groups
        .iter()
        .filter(|g| wanted.contains(g.name.as_str()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CredentialSet, GlobalConfig, PlanOperation};

    fn plan() -> TestPlan {
        TestPlan::new(
            "unit",
            GlobalConfig::new("http://localhost:9000", vec![CredentialSet::new("c", "AK", "SK")]),
        )
        .with_group(TestGroup::new("a", "c").with_run(PlanOperation::new("Noop")))
        .with_group(TestGroup::new("b", "c").with_run(PlanOperation::new("Noop")))
    }

    #[test]
    fn filter_keeps_plan_order() {
        let plan = plan();
        let names = vec!["b".to_string(), "a".to_string()];
        let selected = select_groups(&plan, Some(names.as_slice())).unwrap();
        let order: Vec<_> = selected.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn unknown_filter_name_is_run_level_error() {
        let plan = plan();
        let names = vec!["zzz".to_string()];
        assert_eq!(
            select_groups(&plan, Some(names.as_slice())).unwrap_err(),
            EngineError::GroupNotFound { name: "zzz".into() }
        );
    }

    #[test]
    fn cancel_handle_is_shared() {
        let handle = CancelHandle::new();
        let clone = handle.clone();
        clone.cancel();
        assert!(handle.is_cancelled());
        handle.reset();
        assert!(!clone.is_cancelled());
    }
}
