//! Bucket sub-resources: versioning, tagging and policy.

use std::collections::BTreeMap;

use async_trait::async_trait;
use aws_sdk_s3::types::{BucketVersioningStatus, VersioningConfiguration};
use s3probe_core::{
    Operation, OperationContext, ParamReader, ParamValue, ParameterError, Params, ResponsePayload,
};
use serde_json::json;

use crate::bucket::{bucket_params, BucketParams};
use crate::names;
use crate::sdk::{capture, ok, tagging, tags_json, OpResult};

#[derive(Debug, Default, Clone, Copy)]
pub struct GetBucketVersioning;

#[async_trait]
impl Operation for GetBucketVersioning {
    type Params = BucketParams;

    fn name(&self) -> &str {
        "GetBucketVersioning"
    }

    fn validate(&self, raw: &Params) -> Result<BucketParams, ParameterError> {
        bucket_params("GetBucketVersioning", raw)
    }

    async fn perform(&self, ctx: &OperationContext, p: &BucketParams) -> OpResult {
        match ctx.s3().get_bucket_versioning().bucket(p.bucket()).send().await {
            Ok(out) => ok(ResponsePayload::new().with_status(200).with_data(json!({
                "status": out.status().map(BucketVersioningStatus::as_str),
                "mfa_delete": out.mfa_delete().map(|m| m.as_str()),
            }))),
            Err(err) => capture(err),
        }
    }
}

#[derive(Debug)]
pub struct VersioningParams {
    bucket: String,
    status: BucketVersioningStatus,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PutBucketVersioning;

#[async_trait]
impl Operation for PutBucketVersioning {
    type Params = VersioningParams;

    fn name(&self) -> &str {
        "PutBucketVersioning"
    }

    fn validate(&self, raw: &Params) -> Result<VersioningParams, ParameterError> {
        let reader = ParamReader::new("PutBucketVersioning", raw);
        let status = match reader.require_str("status")?.as_str() {
            "Enabled" => BucketVersioningStatus::Enabled,
            "Suspended" => BucketVersioningStatus::Suspended,
            other => {
                return Err(reader.error(
                    "status",
                    format!("expected 'Enabled' or 'Suspended', got '{other}'"),
                ))
            }
        };
        Ok(VersioningParams {
            bucket: names::bucket(&reader, "bucket")?,
            status,
        })
    }

    async fn perform(&self, ctx: &OperationContext, p: &VersioningParams) -> OpResult {
        let config = VersioningConfiguration::builder()
            .status(p.status.clone())
            .build();
        let result = ctx
            .s3()
            .put_bucket_versioning()
            .bucket(&p.bucket)
            .versioning_configuration(config)
            .send()
            .await;
        match result {
            Ok(_) => ok(ResponsePayload::new().with_status(200)),
            Err(err) => capture(err),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GetBucketTagging;

#[async_trait]
impl Operation for GetBucketTagging {
    type Params = BucketParams;

    fn name(&self) -> &str {
        "GetBucketTagging"
    }

    fn validate(&self, raw: &Params) -> Result<BucketParams, ParameterError> {
        bucket_params("GetBucketTagging", raw)
    }

    async fn perform(&self, ctx: &OperationContext, p: &BucketParams) -> OpResult {
        match ctx.s3().get_bucket_tagging().bucket(p.bucket()).send().await {
            Ok(out) => ok(ResponsePayload::new()
                .with_status(200)
                .with_data(tags_json(out.tag_set()))),
            Err(err) => capture(err),
        }
    }
}

#[derive(Debug)]
pub struct BucketTaggingParams {
    bucket: String,
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PutBucketTagging;

#[async_trait]
impl Operation for PutBucketTagging {
    type Params = BucketTaggingParams;

    fn name(&self) -> &str {
        "PutBucketTagging"
    }

    fn validate(&self, raw: &Params) -> Result<BucketTaggingParams, ParameterError> {
        let reader = ParamReader::new("PutBucketTagging", raw);
        let tags = reader
            .opt_string_map("tags")?
            .ok_or_else(|| ParameterError::missing("PutBucketTagging", "tags"))?;
        Ok(BucketTaggingParams {
            bucket: names::bucket(&reader, "bucket")?,
            tags,
        })
    }

    async fn perform(&self, ctx: &OperationContext, p: &BucketTaggingParams) -> OpResult {
        let result = ctx
            .s3()
            .put_bucket_tagging()
            .bucket(&p.bucket)
            .tagging(tagging(&p.tags)?)
            .send()
            .await;
        match result {
            Ok(_) => ok(ResponsePayload::new().with_status(204)),
            Err(err) => capture(err),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DeleteBucketTagging;

#[async_trait]
impl Operation for DeleteBucketTagging {
    type Params = BucketParams;

    fn name(&self) -> &str {
        "DeleteBucketTagging"
    }

    fn validate(&self, raw: &Params) -> Result<BucketParams, ParameterError> {
        bucket_params("DeleteBucketTagging", raw)
    }

    async fn perform(&self, ctx: &OperationContext, p: &BucketParams) -> OpResult {
        match ctx.s3().delete_bucket_tagging().bucket(p.bucket()).send().await {
            Ok(_) => ok(ResponsePayload::new().with_status(204)),
            Err(err) => capture(err),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GetBucketPolicy;

#[async_trait]
impl Operation for GetBucketPolicy {
    type Params = BucketParams;

    fn name(&self) -> &str {
        "GetBucketPolicy"
    }

    fn validate(&self, raw: &Params) -> Result<BucketParams, ParameterError> {
        bucket_params("GetBucketPolicy", raw)
    }

    async fn perform(&self, ctx: &OperationContext, p: &BucketParams) -> OpResult {
        match ctx.s3().get_bucket_policy().bucket(p.bucket()).send().await {
            Ok(out) => {
                let mut payload = ResponsePayload::new().with_status(200);
                if let Some(policy) = out.policy() {
                    payload = payload.with_body_bytes(policy.as_bytes());
                }
                ok(payload)
            }
            Err(err) => capture(err),
        }
    }
}

pub struct PolicyParams {
    bucket: String,
    policy: String,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PutBucketPolicy;

#[async_trait]
impl Operation for PutBucketPolicy {
    type Params = PolicyParams;

    fn name(&self) -> &str {
        "PutBucketPolicy"
    }

    /// The policy may be given as a JSON string or as a YAML mapping.
    fn validate(&self, raw: &Params) -> Result<PolicyParams, ParameterError> {
        let reader = ParamReader::new("PutBucketPolicy", raw);
        let policy = match reader.get("policy") {
            Some(value @ ParamValue::Map(_)) => serde_json::to_string(value)
                .map_err(|e| reader.error("policy", e.to_string()))?,
            Some(_) => reader.require_str("policy")?,
            None => return Err(ParameterError::missing("PutBucketPolicy", "policy")),
        };
        Ok(PolicyParams {
            bucket: names::bucket(&reader, "bucket")?,
            policy,
        })
    }

    async fn perform(&self, ctx: &OperationContext, p: &PolicyParams) -> OpResult {
        let result = ctx
            .s3()
            .put_bucket_policy()
            .bucket(&p.bucket)
            .policy(&p.policy)
            .send()
            .await;
        match result {
            Ok(_) => ok(ResponsePayload::new().with_status(204)),
            Err(err) => capture(err),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DeleteBucketPolicy;

#[async_trait]
impl Operation for DeleteBucketPolicy {
    type Params = BucketParams;

    fn name(&self) -> &str {
        "DeleteBucketPolicy"
    }

    fn validate(&self, raw: &Params) -> Result<BucketParams, ParameterError> {
        bucket_params("DeleteBucketPolicy", raw)
    }

    async fn perform(&self, ctx: &OperationContext, p: &BucketParams) -> OpResult {
        match ctx.s3().delete_bucket_policy().bucket(p.bucket()).send().await {
            Ok(_) => ok(ResponsePayload::new().with_status(204)),
            Err(err) => capture(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: Vec<(&str, ParamValue)>) -> Params {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn versioning_status_must_be_known() {
        let raw = params(vec![("bucket", "abc".into()), ("status", "enabled".into())]);
        assert_eq!(PutBucketVersioning.validate(&raw).unwrap_err().field, "status");

        let raw = params(vec![("bucket", "abc".into()), ("status", "Suspended".into())]);
        let p = PutBucketVersioning.validate(&raw).unwrap();
        assert_eq!(p.status, BucketVersioningStatus::Suspended);
    }

    #[test]
    fn bucket_tagging_requires_tags() {
        let raw = params(vec![("bucket", "abc".into())]);
        let err = PutBucketTagging.validate(&raw).unwrap_err();
        assert_eq!(err.field, "tags");
    }

    #[test]
    fn policy_mapping_is_serialized_to_json() {
        let statement = BTreeMap::from([("Version".to_string(), ParamValue::from("2012-10-17"))]);
        let raw = params(vec![
            ("bucket", "abc".into()),
            ("policy", ParamValue::Map(statement)),
        ]);
        let p = PutBucketPolicy.validate(&raw).unwrap();
        assert_eq!(p.policy, r#"{"Version":"2012-10-17"}"#);
    }
}
