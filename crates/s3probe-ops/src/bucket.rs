//! Bucket lifecycle and listing operations.

use async_trait::async_trait;
use aws_sdk_s3::types::{BucketCannedAcl, BucketLocationConstraint, CreateBucketConfiguration};
use s3probe_core::{
    Operation, OperationContext, ParamReader, ParameterError, Params, ResponsePayload,
};
use serde_json::json;

use crate::names;
use crate::sdk::{capture, ok, OpResult};

const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug)]
pub struct BucketParams {
    bucket: String,
}

impl BucketParams {
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

pub(crate) fn bucket_params(op: &str, raw: &Params) -> Result<BucketParams, ParameterError> {
    let reader = ParamReader::new(op, raw);
    Ok(BucketParams {
        bucket: names::bucket(&reader, "bucket")?,
    })
}

#[derive(Debug)]
pub struct CreateBucketParams {
    bucket: String,
    region: Option<String>,
    acl: Option<BucketCannedAcl>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CreateBucket;

#[async_trait]
impl Operation for CreateBucket {
    type Params = CreateBucketParams;

    fn name(&self) -> &str {
        "CreateBucket"
    }

    fn validate(&self, raw: &Params) -> Result<CreateBucketParams, ParameterError> {
        let reader = ParamReader::new("CreateBucket", raw);
        let acl = match reader.opt_str("acl")? {
            Some(acl) if BucketCannedAcl::values().contains(&acl.as_str()) => {
                Some(BucketCannedAcl::from(acl.as_str()))
            }
            Some(acl) => return Err(reader.error("acl", format!("unsupported canned ACL '{acl}'"))),
            None => None,
        };
        Ok(CreateBucketParams {
            bucket: names::bucket(&reader, "bucket")?,
            region: reader.opt_str("region")?,
            acl,
        })
    }

    async fn perform(&self, ctx: &OperationContext, p: &CreateBucketParams) -> OpResult {
        let region = p
            .region
            .clone()
            .or_else(|| ctx.s3().config().region().map(|r| r.to_string()));

        let mut request = ctx.s3().create_bucket().bucket(&p.bucket);
        // us-east-1 rejects an explicit location constraint.
        if let Some(region) = region.filter(|r| r != DEFAULT_REGION) {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region.as_str()))
                    .build(),
            );
        }
        if let Some(acl) = &p.acl {
            request = request.acl(acl.clone());
        }

        match request.send().await {
            Ok(out) => ok(ResponsePayload::new()
                .with_status(200)
                .with_opt_header("Location", out.location())),
            Err(err) => capture(err),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DeleteBucket;

#[async_trait]
impl Operation for DeleteBucket {
    type Params = BucketParams;

    fn name(&self) -> &str {
        "DeleteBucket"
    }

    fn validate(&self, raw: &Params) -> Result<BucketParams, ParameterError> {
        bucket_params("DeleteBucket", raw)
    }

    async fn perform(&self, ctx: &OperationContext, p: &BucketParams) -> OpResult {
        match ctx.s3().delete_bucket().bucket(&p.bucket).send().await {
            Ok(_) => ok(ResponsePayload::new().with_status(204)),
            Err(err) => capture(err),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HeadBucket;

#[async_trait]
impl Operation for HeadBucket {
    type Params = BucketParams;

    fn name(&self) -> &str {
        "HeadBucket"
    }

    fn validate(&self, raw: &Params) -> Result<BucketParams, ParameterError> {
        bucket_params("HeadBucket", raw)
    }

    async fn perform(&self, ctx: &OperationContext, p: &BucketParams) -> OpResult {
        match ctx.s3().head_bucket().bucket(&p.bucket).send().await {
            Ok(out) => ok(ResponsePayload::new()
                .with_status(200)
                .with_opt_header("x-amz-bucket-region", out.bucket_region())),
            Err(err) => capture(err),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ListBuckets;

#[async_trait]
impl Operation for ListBuckets {
    type Params = ();

    fn name(&self) -> &str {
        "ListBuckets"
    }

    fn validate(&self, _raw: &Params) -> Result<(), ParameterError> {
        Ok(())
    }

    async fn perform(&self, ctx: &OperationContext, _p: &()) -> OpResult {
        match ctx.s3().list_buckets().send().await {
            Ok(out) => {
                let names: Vec<&str> = out.buckets().iter().filter_map(|b| b.name()).collect();
                ok(ResponsePayload::new()
                    .with_status(200)
                    .with_data(json!({ "buckets": names })))
            }
            Err(err) => capture(err),
        }
    }
}

/// A non-negative page size that fits the SDK's `i32`.
pub(crate) fn opt_count(reader: &ParamReader<'_>, field: &str) -> Result<Option<i32>, ParameterError> {
    reader
        .opt_i64(field)?
        .map(|n| {
            i32::try_from(n)
                .ok()
                .filter(|n| *n >= 0)
                .ok_or_else(|| reader.error(field, "must be between 0 and 2147483647"))
        })
        .transpose()
}

pub struct ListObjectsParams {
    bucket: String,
    prefix: Option<String>,
    max_keys: Option<i32>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ListObjectsV2;

#[async_trait]
impl Operation for ListObjectsV2 {
    type Params = ListObjectsParams;

    fn name(&self) -> &str {
        "ListObjectsV2"
    }

    fn validate(&self, raw: &Params) -> Result<ListObjectsParams, ParameterError> {
        let reader = ParamReader::new("ListObjectsV2", raw);
        Ok(ListObjectsParams {
            bucket: names::bucket(&reader, "bucket")?,
            prefix: reader.opt_str("prefix")?,
            max_keys: opt_count(&reader, "max_keys")?,
        })
    }

    async fn perform(&self, ctx: &OperationContext, p: &ListObjectsParams) -> OpResult {
        let result = ctx
            .s3()
            .list_objects_v2()
            .bucket(&p.bucket)
            .set_prefix(p.prefix.clone())
            .set_max_keys(p.max_keys)
            .send()
            .await;

        match result {
            Ok(out) => {
                let objects: Vec<_> = out
                    .contents()
                    .iter()
                    .map(|o| json!({ "key": o.key(), "size": o.size(), "etag": o.e_tag() }))
                    .collect();
                ok(ResponsePayload::new().with_status(200).with_data(json!({
                    "objects": objects,
                    "key_count": out.key_count(),
                    "is_truncated": out.is_truncated().unwrap_or(false),
                })))
            }
            Err(err) => capture(err),
        }
    }
}

#[derive(Debug)]
pub struct ListVersionsParams {
    bucket: String,
    prefix: Option<String>,
    delimiter: Option<String>,
    max_keys: Option<i32>,
    key_marker: Option<String>,
    version_id_marker: Option<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ListObjectVersions;

#[async_trait]
impl Operation for ListObjectVersions {
    type Params = ListVersionsParams;

    fn name(&self) -> &str {
        "ListObjectVersions"
    }

    fn validate(&self, raw: &Params) -> Result<ListVersionsParams, ParameterError> {
        let reader = ParamReader::new("ListObjectVersions", raw);
        let version_id_marker = reader.opt_str("version_id_marker")?;
        let key_marker = reader.opt_str("key_marker")?;
        if version_id_marker.is_some() && key_marker.is_none() {
            return Err(reader.error("version_id_marker", "requires 'key_marker'"));
        }
        Ok(ListVersionsParams {
            bucket: names::bucket(&reader, "bucket")?,
            prefix: reader.opt_str("prefix")?,
            delimiter: reader.opt_str("delimiter")?,
            max_keys: opt_count(&reader, "max_keys")?,
            key_marker,
            version_id_marker,
        })
    }

    async fn perform(&self, ctx: &OperationContext, p: &ListVersionsParams) -> OpResult {
        let result = ctx
            .s3()
            .list_object_versions()
            .bucket(&p.bucket)
            .set_prefix(p.prefix.clone())
            .set_delimiter(p.delimiter.clone())
            .set_max_keys(p.max_keys)
            .set_key_marker(p.key_marker.clone())
            .set_version_id_marker(p.version_id_marker.clone())
            .send()
            .await;

        match result {
            Ok(out) => {
                let versions: Vec<_> = out
                    .versions()
                    .iter()
                    .map(|v| {
                        json!({
                            "key": v.key(),
                            "version_id": v.version_id(),
                            "is_latest": v.is_latest().unwrap_or(false),
                            "size": v.size(),
                            "etag": v.e_tag(),
                        })
                    })
                    .collect();
                let delete_markers: Vec<_> = out
                    .delete_markers()
                    .iter()
                    .map(|m| {
                        json!({
                            "key": m.key(),
                            "version_id": m.version_id(),
                            "is_latest": m.is_latest().unwrap_or(false),
                        })
                    })
                    .collect();
                ok(ResponsePayload::new().with_status(200).with_data(json!({
                    "versions": versions,
                    "delete_markers": delete_markers,
                    "is_truncated": out.is_truncated().unwrap_or(false),
                    "next_key_marker": out.next_key_marker(),
                    "next_version_id_marker": out.next_version_id_marker(),
                })))
            }
            Err(err) => capture(err),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GetBucketLocation;

#[async_trait]
impl Operation for GetBucketLocation {
    type Params = BucketParams;

    fn name(&self) -> &str {
        "GetBucketLocation"
    }

    fn validate(&self, raw: &Params) -> Result<BucketParams, ParameterError> {
        bucket_params("GetBucketLocation", raw)
    }

    /// An empty constraint is reported as `us-east-1`.
    async fn perform(&self, ctx: &OperationContext, p: &BucketParams) -> OpResult {
        match ctx.s3().get_bucket_location().bucket(&p.bucket).send().await {
            Ok(out) => {
                let region = out
                    .location_constraint()
                    .map(BucketLocationConstraint::as_str)
                    .filter(|r| !r.is_empty())
                    .unwrap_or(DEFAULT_REGION);
                ok(ResponsePayload::new()
                    .with_status(200)
                    .with_data(json!({ "location_constraint": region })))
            }
            Err(err) => capture(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use s3probe_core::ParamValue;

    fn params(pairs: &[(&str, ParamValue)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn create_bucket_rejects_unknown_acl() {
        let raw = params(&[("bucket", "abc".into()), ("acl", "wide-open".into())]);
        let err = CreateBucket.validate(&raw).unwrap_err();
        assert_eq!(err.field, "acl");

        let raw = params(&[("bucket", "abc".into()), ("acl", "private".into())]);
        assert!(CreateBucket.validate(&raw).is_ok());
    }

    #[test]
    fn bucket_name_is_validated() {
        let raw = params(&[("bucket", "Not_Valid".into())]);
        let err = DeleteBucket.validate(&raw).unwrap_err();
        assert_eq!(err.operation, "DeleteBucket");
        assert_eq!(err.field, "bucket");
    }

    #[test]
    fn list_objects_bounds_max_keys() {
        let raw = params(&[("bucket", "abc".into()), ("max_keys", ParamValue::Int(-1))]);
        assert!(ListObjectsV2.validate(&raw).is_err());

        let raw = params(&[("bucket", "abc".into()), ("max_keys", ParamValue::Int(10))]);
        let p = ListObjectsV2.validate(&raw).unwrap();
        assert_eq!(p.max_keys, Some(10));
    }

    #[test]
    fn version_marker_needs_key_marker() {
        let raw = params(&[("bucket", "abc".into()), ("version_id_marker", "v1".into())]);
        let err = ListObjectVersions.validate(&raw).unwrap_err();
        assert_eq!(err.field, "version_id_marker");

        let raw = params(&[
            ("bucket", "abc".into()),
            ("key_marker", "a.txt".into()),
            ("version_id_marker", "v1".into()),
            ("max_keys", ParamValue::Int(5)),
        ]);
        let p = ListObjectVersions.validate(&raw).unwrap();
        assert_eq!(p.max_keys, Some(5));
        assert_eq!(p.key_marker.as_deref(), Some("a.txt"));
    }

    #[test]
    fn bucket_location_needs_a_valid_bucket() {
        let raw = params(&[]);
        assert_eq!(GetBucketLocation.validate(&raw).unwrap_err().field, "bucket");
        let raw = params(&[("bucket", "logs.example".into())]);
        assert_eq!(GetBucketLocation.validate(&raw).unwrap().bucket(), "logs.example");
    }
}
