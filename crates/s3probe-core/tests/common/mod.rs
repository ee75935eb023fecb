//! Shared fixtures: an in-memory bucket store and operations backed by it.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use s3probe_core::{
    CancelHandle, CredentialSet, GlobalConfig, Operation, OperationCatalog, OperationContext,
    OperationFault, OutcomeRecord, ParamReader, ParameterError, Params, ResponsePayload, Sleeper,
};

#[derive(Default)]
pub struct MemoryStore {
    buckets: Mutex<BTreeMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().unwrap().len()
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.buckets
            .lock()
            .unwrap()
            .get(bucket)
            .and_then(|b| b.get(key).cloned())
    }
}

pub struct BucketParams {
    bucket: String,
}

pub struct ObjectParams {
    bucket: String,
    key: String,
    body: Option<Vec<u8>>,
}

fn bucket_params(op: &str, raw: &Params) -> Result<BucketParams, ParameterError> {
    Ok(BucketParams {
        bucket: ParamReader::new(op, raw).require_str("bucket")?,
    })
}

fn object_params(op: &str, raw: &Params) -> Result<ObjectParams, ParameterError> {
    let reader = ParamReader::new(op, raw);
    Ok(ObjectParams {
        bucket: reader.require_str("bucket")?,
        key: reader.require_str("key")?,
        body: reader.opt_bytes("body")?,
    })
}

fn no_such_bucket(bucket: &str) -> OutcomeRecord {
    OutcomeRecord::api_error(
        "NoSuchBucket",
        format!("The specified bucket does not exist: {bucket}"),
        Some(ResponsePayload::new().with_status(404)),
    )
}

pub struct CreateBucket(pub Arc<MemoryStore>);
pub struct DeleteBucket(pub Arc<MemoryStore>);
pub struct PutObject(pub Arc<MemoryStore>);
pub struct GetObject(pub Arc<MemoryStore>);
pub struct DeleteObject(pub Arc<MemoryStore>);

#[async_trait]
impl Operation for CreateBucket {
    type Params = BucketParams;

    fn name(&self) -> &str {
        "CreateBucket"
    }

    fn validate(&self, raw: &Params) -> Result<BucketParams, ParameterError> {
        bucket_params("CreateBucket", raw)
    }

    async fn perform(
        &self,
        _ctx: &OperationContext,
        p: &BucketParams,
    ) -> Result<OutcomeRecord, OperationFault> {
        let mut buckets = self.0.buckets.lock().unwrap();
        if buckets.contains_key(&p.bucket) {
            return Ok(OutcomeRecord::api_error(
                "BucketAlreadyOwnedByYou",
                "bucket exists",
                Some(ResponsePayload::new().with_status(409)),
            ));
        }
        buckets.insert(p.bucket.clone(), BTreeMap::new());
        Ok(OutcomeRecord::success(
            ResponsePayload::new()
                .with_status(200)
                .with_header("Location", format!("/{}", p.bucket)),
        ))
    }
}

#[async_trait]
impl Operation for DeleteBucket {
    type Params = BucketParams;

    fn name(&self) -> &str {
        "DeleteBucket"
    }

    fn validate(&self, raw: &Params) -> Result<BucketParams, ParameterError> {
        bucket_params("DeleteBucket", raw)
    }

    async fn perform(
        &self,
        _ctx: &OperationContext,
        p: &BucketParams,
    ) -> Result<OutcomeRecord, OperationFault> {
        let mut buckets = self.0.buckets.lock().unwrap();
        match buckets.get(&p.bucket).map(BTreeMap::is_empty) {
            None => Ok(no_such_bucket(&p.bucket)),
            Some(false) => Ok(OutcomeRecord::api_error(
                "BucketNotEmpty",
                "The bucket you tried to delete is not empty",
                Some(ResponsePayload::new().with_status(409)),
            )),
            Some(true) => {
                buckets.remove(&p.bucket);
                Ok(OutcomeRecord::success(ResponsePayload::new().with_status(204)))
            }
        }
    }
}

#[async_trait]
impl Operation for PutObject {
    type Params = ObjectParams;

    fn name(&self) -> &str {
        "PutObject"
    }

    fn validate(&self, raw: &Params) -> Result<ObjectParams, ParameterError> {
        object_params("PutObject", raw)
    }

    async fn perform(
        &self,
        _ctx: &OperationContext,
        p: &ObjectParams,
    ) -> Result<OutcomeRecord, OperationFault> {
        let mut buckets = self.0.buckets.lock().unwrap();
        let Some(objects) = buckets.get_mut(&p.bucket) else {
            return Ok(no_such_bucket(&p.bucket));
        };
        let body = p.body.clone().unwrap_or_default();
        let etag = format!("\"{:x}\"", body.len());
        objects.insert(p.key.clone(), body);
        Ok(OutcomeRecord::success(
            ResponsePayload::new().with_status(200).with_header("ETag", etag),
        ))
    }
}

#[async_trait]
impl Operation for GetObject {
    type Params = ObjectParams;

    fn name(&self) -> &str {
        "GetObject"
    }

    fn validate(&self, raw: &Params) -> Result<ObjectParams, ParameterError> {
        object_params("GetObject", raw)
    }

    async fn perform(
        &self,
        _ctx: &OperationContext,
        p: &ObjectParams,
    ) -> Result<OutcomeRecord, OperationFault> {
        let buckets = self.0.buckets.lock().unwrap();
        let Some(objects) = buckets.get(&p.bucket) else {
            return Ok(no_such_bucket(&p.bucket));
        };
        match objects.get(&p.key) {
            None => Ok(OutcomeRecord::api_error(
                "NoSuchKey",
                "The specified key does not exist.",
                Some(ResponsePayload::new().with_status(404)),
            )),
            Some(body) => Ok(OutcomeRecord::success(
                ResponsePayload::new()
                    .with_status(200)
                    .with_header("Content-Length", body.len().to_string())
                    .with_header("Content-Type", "text/plain")
                    .with_body_bytes(body),
            )),
        }
    }
}

#[async_trait]
impl Operation for DeleteObject {
    type Params = ObjectParams;

    fn name(&self) -> &str {
        "DeleteObject"
    }

    fn validate(&self, raw: &Params) -> Result<ObjectParams, ParameterError> {
        object_params("DeleteObject", raw)
    }

    async fn perform(
        &self,
        _ctx: &OperationContext,
        p: &ObjectParams,
    ) -> Result<OutcomeRecord, OperationFault> {
        let mut buckets = self.0.buckets.lock().unwrap();
        let Some(objects) = buckets.get_mut(&p.bucket) else {
            return Ok(no_such_bucket(&p.bucket));
        };
        objects.remove(&p.key);
        Ok(OutcomeRecord::success(ResponsePayload::new().with_status(204)))
    }
}

/// Replays a fixed script of results, then keeps returning success.
pub struct Scripted {
    pub name: &'static str,
    pub steps: Mutex<VecDeque<Result<OutcomeRecord, OperationFault>>>,
    pub calls: AtomicUsize,
}

impl Scripted {
    pub fn new(name: &'static str, steps: Vec<Result<OutcomeRecord, OperationFault>>) -> Self {
        Self {
            name,
            steps: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
        }
    }
}

pub struct ScriptedOp(pub Arc<Scripted>);

#[async_trait]
impl Operation for ScriptedOp {
    type Params = ();

    fn name(&self) -> &str {
        self.0.name
    }

    fn validate(&self, _raw: &Params) -> Result<(), ParameterError> {
        Ok(())
    }

    async fn perform(&self, _ctx: &OperationContext, _p: &()) -> Result<OutcomeRecord, OperationFault> {
        self.0.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.0.steps.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(OutcomeRecord::success(ResponsePayload::new())))
    }
}

/// Sleeps for a while and tracks how many calls overlap, overall and per group.
#[derive(Default)]
pub struct Gauge {
    pub in_flight: AtomicUsize,
    pub peak: AtomicUsize,
    per_group: Mutex<BTreeMap<String, usize>>,
    pub per_group_peak: AtomicUsize,
}

pub struct Slow(pub Arc<Gauge>);

#[async_trait]
impl Operation for Slow {
    type Params = ();

    fn name(&self) -> &str {
        "Slow"
    }

    fn validate(&self, _raw: &Params) -> Result<(), ParameterError> {
        Ok(())
    }

    async fn perform(&self, ctx: &OperationContext, _p: &()) -> Result<OutcomeRecord, OperationFault> {
        let gauge = &self.0;
        let now = gauge.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        gauge.peak.fetch_max(now, Ordering::SeqCst);
        {
            let mut per_group = gauge.per_group.lock().unwrap();
            let count = per_group.entry(ctx.group.clone()).or_insert(0);
            *count += 1;
            gauge.per_group_peak.fetch_max(*count, Ordering::SeqCst);
        }

        tokio::time::sleep(Duration::from_millis(20)).await;

        if let Some(count) = gauge.per_group.lock().unwrap().get_mut(&ctx.group) {
            *count -= 1;
        }
        gauge.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(OutcomeRecord::success(ResponsePayload::new()))
    }
}

/// Cancels the run as a side effect of being executed.
pub struct CancelRun(pub CancelHandle);

#[async_trait]
impl Operation for CancelRun {
    type Params = ();

    fn name(&self) -> &str {
        "CancelRun"
    }

    fn validate(&self, _raw: &Params) -> Result<(), ParameterError> {
        Ok(())
    }

    async fn perform(&self, _ctx: &OperationContext, _p: &()) -> Result<OutcomeRecord, OperationFault> {
        self.0.cancel();
        Ok(OutcomeRecord::success(ResponsePayload::new()))
    }
}

/// Panics on every call, like an implementation indexing past the end of a buffer.
pub struct Panicking;

#[async_trait]
impl Operation for Panicking {
    type Params = ();

    fn name(&self) -> &str {
        "Panicking"
    }

    fn validate(&self, _raw: &Params) -> Result<(), ParameterError> {
        Ok(())
    }

    async fn perform(&self, _ctx: &OperationContext, _p: &()) -> Result<OutcomeRecord, OperationFault> {
        let parts: Vec<&str> = Vec::new();
        Ok(OutcomeRecord::success(
            ResponsePayload::new().with_header("x-first-part", parts[0]),
        ))
    }
}

#[derive(Default)]
pub struct RecordingSleeper {
    pub slept: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

pub fn memory_catalog(store: &Arc<MemoryStore>) -> OperationCatalog {
    OperationCatalog::new()
        .with(CreateBucket(store.clone()))
        .with(DeleteBucket(store.clone()))
        .with(PutObject(store.clone()))
        .with(GetObject(store.clone()))
        .with(DeleteObject(store.clone()))
}

pub fn global() -> GlobalConfig {
    GlobalConfig::new(
        "http://localhost:9000",
        vec![
            CredentialSet::new("c1", "AKIAPRIMARY0001", "secret-1"),
            CredentialSet::new("c2", "AKIASECOND0002", "secret-2"),
        ],
    )
    .with_path_style(true)
}
