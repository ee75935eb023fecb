//! Execution engine for S3 compatibility test plans.
//!
//! A test plan declares groups of storage operations, each with the credential to
//! use and the outcome to expect. The engine runs them against an S3-compatible
//! endpoint and records a pass/fail/error verdict per operation:
//!
//! - Groups run sequentially or in parallel; operations within a group never overlap
//! - Each group goes through setup, run and teardown phases
//! - A declared, expected API error counts as a pass
//! - Operations are dispatched by name through an explicitly built [`OperationCatalog`]
//!
//! # Quick Start
//!
//! ```no_run
//! use s3probe_core::{Engine, EngineSettings, OperationCatalog, RunOptions, TestPlan};
//!
//! # async fn example(catalog: OperationCatalog, yaml: &str) -> anyhow::Result<()> {
//! let plan = TestPlan::from_yaml_str(yaml, "plan.yaml")?;
//! let engine = Engine::new(catalog, EngineSettings::from_env());
//! let session = engine.run_plan(&plan, RunOptions::all()).await?;
//! if let Some(summary) = session.summary() {
//!     println!("{} passed, {} failed, {} errors", summary.passed, summary.failed, summary.errors);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `S3PROBE_MAX_ATTEMPTS` | Retry attempts per operation; setting any retry variable enables retries (default: 3) |
//! | `S3PROBE_BASE_DELAY_MS` | First backoff delay (default: 1000) |
//! | `S3PROBE_MAX_DELAY_MS` | Backoff cap (default: 60000) |
//! | `S3PROBE_EXPONENTIAL_FACTOR` | Backoff growth factor (default: 2.0) |
//! | `S3PROBE_RETRY_JITTER` | Scale delays by a random factor in [0.5, 1.0) (default: true) |
//! | `S3PROBE_CONNECT_TIMEOUT_SECS` | Connect timeout (default: 30) |
//! | `S3PROBE_READ_TIMEOUT_SECS` | Read timeout (default: 300) |
//! | `S3PROBE_PARALLEL` | Run groups in parallel by default |
//! | `S3PROBE_DRY_RUN` | Validate operations without calling the endpoint |
//! | `S3PROBE_LOG` | Log filter used by [`logging::init`] |

pub mod catalog;
pub mod client;
pub mod engine;
pub mod errors;
pub mod evaluator;
pub mod logging;
pub mod model;
pub mod operation;
pub mod progress;
pub mod retry;
pub mod settings;
pub mod validate;

pub use catalog::OperationCatalog;
pub use client::{ClientHandle, ClientProvider, ClientSettings};
pub use engine::{CancelHandle, Engine, RunOptions};
pub use errors::{
    EngineError, EngineResult, OperationFault, ParameterError, PlanError, PlanResult,
};
pub use evaluator::{evaluate, Evaluation, Verdict};
pub use model::{
    CredentialSet, DurationStats, ExpectedOutcome, GlobalConfig, GroupOutcome, GroupStatus,
    ParamValue, Params, Phase, PlanOperation, ResponseAssertions, ResultRecord, ResultStatus,
    Session, Summary, TestGroup, TestPlan,
};
pub use operation::{
    DynOperation, FaultOrigin, Invocation, NoopOperation, Operation, OperationContext,
    OutcomeRecord, ParamReader, ResponsePayload,
};
pub use progress::{ProgressEvent, ProgressSink};
pub use retry::{classify, ErrorClass, RetryConfig, RetryPolicy, Sleeper, TokioSleeper};
pub use settings::{EngineSettings, SetupFailurePolicy};
pub use validate::{validate_plan, Severity, ValidationIssue, ValidationReport};
