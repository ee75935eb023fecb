//! The uniform contract every remote call implements.
//!
//! An [`Operation`] turns the plan's loosely typed parameter map into its own
//! typed parameters (`validate`) and then performs the call (`perform`).
//! Structured service errors are returned inside the [`OutcomeRecord`];
//! only transport or local faults come back as `Err`.
//!
//! The engine only sees [`DynOperation`], which every `Operation` gets for free.

pub mod outcome;
mod params;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::client::ClientHandle;
use crate::errors::{OperationFault, ParameterError};
use crate::model::{Params, Phase};
use crate::retry::RetryPolicy;

pub use outcome::{FaultOrigin, OutcomeRecord, ResponsePayload};
pub use params::ParamReader;

/// What an operation gets to work with for one call.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub client: Arc<ClientHandle>,
    pub group: String,
    pub phase: Phase,
}

impl OperationContext {
    pub fn s3(&self) -> &aws_sdk_s3::Client {
        self.client.s3()
    }
}

#[async_trait]
pub trait Operation: Send + Sync + 'static {
    type Params: Send + Sync;

    fn name(&self) -> &str;

    fn validate(&self, raw: &Params) -> Result<Self::Params, ParameterError>;

    async fn perform(
        &self,
        ctx: &OperationContext,
        params: &Self::Params,
    ) -> Result<OutcomeRecord, OperationFault>;
}

/// How a single invocation should be carried out.
#[derive(Debug, Clone, Copy, Default)]
pub struct Invocation<'a> {
    pub retry: Option<&'a RetryPolicy>,
    pub dry_run: bool,
}

/// Object-safe view of an [`Operation`] used for catalog dispatch.
#[async_trait]
pub trait DynOperation: Send + Sync {
    fn name(&self) -> &str;

    /// Validates, then performs the call. Never fails: parameter errors and
    /// faults are folded into the returned record, which carries the call duration.
    async fn invoke(
        &self,
        ctx: &OperationContext,
        raw: &Params,
        how: Invocation<'_>,
    ) -> OutcomeRecord;
}

#[async_trait]
impl<T> DynOperation for T
where
    T: Operation,
{
    fn name(&self) -> &str {
        Operation::name(self)
    }

    async fn invoke(
        &self,
        ctx: &OperationContext,
        raw: &Params,
        how: Invocation<'_>,
    ) -> OutcomeRecord {
        let params = match self.validate(raw) {
            Ok(params) => params,
            Err(e) => return OutcomeRecord::from_parameter_error(&e),
        };

        if how.dry_run {
            return OutcomeRecord::success(
                ResponsePayload::new().with_data(serde_json::json!({ "dry_run": true })),
            );
        }

        let started = Instant::now();
        let params = &params;
        let result = match how.retry {
            Some(policy) => {
                policy
                    .run(Operation::name(self), move || self.perform(ctx, params))
                    .await
            }
            None => self.perform(ctx, params).await,
        };
        let elapsed = started.elapsed();

        match result {
            Ok(outcome) => outcome.with_duration(elapsed),
            Err(fault) => OutcomeRecord::from_fault(&fault).with_duration(elapsed),
        }
    }
}

/// Explicit stand-in for operation names the catalog does not know.
/// Only used when lenient mode is switched on.
#[derive(Debug, Clone)]
pub struct NoopOperation {
    name: String,
}

impl NoopOperation {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Operation for NoopOperation {
    type Params = ();

    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, _raw: &Params) -> Result<Self::Params, ParameterError> {
        Ok(())
    }

    async fn perform(
        &self,
        _ctx: &OperationContext,
        _params: &Self::Params,
    ) -> Result<OutcomeRecord, OperationFault> {
        Ok(OutcomeRecord::success(
            ResponsePayload::new().with_data(serde_json::json!({ "noop": true })),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientProvider;
    use crate::model::{CredentialSet, GlobalConfig, ParamValue};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Operation for Echo {
        type Params = String;

        fn name(&self) -> &str {
            "Echo"
        }

        fn validate(&self, raw: &Params) -> Result<String, ParameterError> {
            ParamReader::new("Echo", raw).require_str("text")
        }

        async fn perform(
            &self,
            _ctx: &OperationContext,
            params: &String,
        ) -> Result<OutcomeRecord, OperationFault> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(OutcomeRecord::success(
                ResponsePayload::new().with_body_bytes(params.as_bytes()),
            ))
        }
    }

    fn ctx() -> OperationContext {
        let global = GlobalConfig::new(
            "http://localhost:9000",
            vec![CredentialSet::new("c", "AKIATEST", "secret")],
        );
        let client = ClientProvider::default()
            .get(&global.credentials[0], &global)
            .unwrap();
        OperationContext {
            client,
            group: "g".into(),
            phase: Phase::Run,
        }
    }

    #[tokio::test]
    async fn parameter_error_skips_perform() {
        let op = Echo {
            calls: AtomicUsize::new(0),
        };
        let outcome = op.invoke(&ctx(), &Params::new(), Invocation::default()).await;
        assert!(!outcome.success);
        assert!(matches!(outcome.fault, Some(FaultOrigin::Parameter { .. })));
        assert_eq!(op.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dry_run_validates_without_calling() {
        let op = Echo {
            calls: AtomicUsize::new(0),
        };
        let mut raw = Params::new();
        raw.insert("text".into(), ParamValue::from("hi"));
        let outcome = op
            .invoke(
                &ctx(),
                &raw,
                Invocation {
                    retry: None,
                    dry_run: true,
                },
            )
            .await;
        assert!(outcome.success);
        assert_eq!(
            outcome.response.unwrap().data,
            serde_json::json!({ "dry_run": true })
        );
        assert_eq!(op.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invoke_performs_once() {
        let op = Echo {
            calls: AtomicUsize::new(0),
        };
        let mut raw = Params::new();
        raw.insert("text".into(), ParamValue::from("hi"));
        let outcome = op.invoke(&ctx(), &raw, Invocation::default()).await;
        assert_eq!(outcome.response.unwrap().body.as_deref(), Some("hi"));
        assert_eq!(op.calls.load(Ordering::SeqCst), 1);
    }
}
