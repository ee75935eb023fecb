//! Object operations: data, metadata, copy and tagging.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use s3probe_core::{
    Operation, OperationContext, OperationFault, ParamReader, ParameterError, Params,
    ResponsePayload,
};
use serde_json::json;

use crate::names;
use crate::sdk::{capture, metadata_map, ok, tagging, tags_json, OpResult};

/// Bucket, key and an optional version, shared by most object calls.
#[derive(Debug)]
pub struct ObjectParams {
    bucket: String,
    key: String,
    version_id: Option<String>,
}

impl ObjectParams {
    fn read(reader: &ParamReader<'_>) -> Result<Self, ParameterError> {
        Ok(Self {
            bucket: names::bucket(reader, "bucket")?,
            key: names::key(reader, "key")?,
            version_id: reader.opt_str("version_id")?,
        })
    }
}

pub struct PutObjectParams {
    target: ObjectParams,
    body: Vec<u8>,
    content_type: Option<String>,
    metadata: Option<BTreeMap<String, String>>,
    tagging: Option<String>,
}

/// `x-amz-tagging` header value: a URL-encoded query string.
pub(crate) fn tagging_header(tags: &BTreeMap<String, String>) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(tags)
        .finish()
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PutObject;

#[async_trait]
impl Operation for PutObject {
    type Params = PutObjectParams;

    fn name(&self) -> &str {
        "PutObject"
    }

    fn validate(&self, raw: &Params) -> Result<PutObjectParams, ParameterError> {
        let reader = ParamReader::new("PutObject", raw);
        Ok(PutObjectParams {
            target: ObjectParams::read(&reader)?,
            body: reader.opt_bytes("body")?.unwrap_or_default(),
            content_type: reader.opt_str("content_type")?,
            metadata: reader.opt_string_map("metadata")?,
            tagging: reader.opt_string_map("tags")?.as_ref().map(tagging_header),
        })
    }

    async fn perform(&self, ctx: &OperationContext, p: &PutObjectParams) -> OpResult {
        let metadata = p
            .metadata
            .as_ref()
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<HashMap<_, _>>());

        let result = ctx
            .s3()
            .put_object()
            .bucket(&p.target.bucket)
            .key(&p.target.key)
            .body(ByteStream::from(p.body.clone()))
            .set_content_type(p.content_type.clone())
            .set_metadata(metadata)
            .set_tagging(p.tagging.clone())
            .send()
            .await;

        match result {
            Ok(out) => ok(ResponsePayload::new()
                .with_status(200)
                .with_opt_header("ETag", out.e_tag())
                .with_opt_header("x-amz-version-id", out.version_id())),
            Err(err) => capture(err),
        }
    }
}

#[derive(Debug)]
pub struct GetObjectParams {
    target: ObjectParams,
    range: Option<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GetObject;

#[async_trait]
impl Operation for GetObject {
    type Params = GetObjectParams;

    fn name(&self) -> &str {
        "GetObject"
    }

    fn validate(&self, raw: &Params) -> Result<GetObjectParams, ParameterError> {
        let reader = ParamReader::new("GetObject", raw);
        let range = reader.opt_str("range")?;
        if let Some(range) = &range {
            if !range.starts_with("bytes=") {
                return Err(reader.error("range", "expected the form 'bytes=start-end'"));
            }
        }
        Ok(GetObjectParams {
            target: ObjectParams::read(&reader)?,
            range,
        })
    }

    async fn perform(&self, ctx: &OperationContext, p: &GetObjectParams) -> OpResult {
        let result = ctx
            .s3()
            .get_object()
            .bucket(&p.target.bucket)
            .key(&p.target.key)
            .set_version_id(p.target.version_id.clone())
            .set_range(p.range.clone())
            .send()
            .await;

        let out = match result {
            Ok(out) => out,
            Err(err) => return capture(err),
        };

        let status = if out.content_range().is_some() { 206 } else { 200 };
        let payload = ResponsePayload::new()
            .with_status(status)
            .with_opt_header("Content-Type", out.content_type())
            .with_opt_header("Content-Length", out.content_length().map(|n| n.to_string()))
            .with_opt_header("Content-Range", out.content_range())
            .with_opt_header("ETag", out.e_tag())
            .with_opt_header("x-amz-version-id", out.version_id())
            .with_metadata(metadata_map(out.metadata()));

        let body = out
            .body
            .collect()
            .await
            .map_err(|e| OperationFault::transport(format!("reading object body: {e}")))?
            .into_bytes();
        ok(payload.with_body_bytes(&body))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HeadObject;

#[async_trait]
impl Operation for HeadObject {
    type Params = ObjectParams;

    fn name(&self) -> &str {
        "HeadObject"
    }

    fn validate(&self, raw: &Params) -> Result<ObjectParams, ParameterError> {
        ObjectParams::read(&ParamReader::new("HeadObject", raw))
    }

    async fn perform(&self, ctx: &OperationContext, p: &ObjectParams) -> OpResult {
        let result = ctx
            .s3()
            .head_object()
            .bucket(&p.bucket)
            .key(&p.key)
            .set_version_id(p.version_id.clone())
            .send()
            .await;

        match result {
            Ok(out) => ok(ResponsePayload::new()
                .with_status(200)
                .with_opt_header("Content-Type", out.content_type())
                .with_opt_header("Content-Length", out.content_length().map(|n| n.to_string()))
                .with_opt_header("ETag", out.e_tag())
                .with_opt_header("x-amz-version-id", out.version_id())
                .with_metadata(metadata_map(out.metadata()))),
            Err(err) => capture(err),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DeleteObject;

#[async_trait]
impl Operation for DeleteObject {
    type Params = ObjectParams;

    fn name(&self) -> &str {
        "DeleteObject"
    }

    fn validate(&self, raw: &Params) -> Result<ObjectParams, ParameterError> {
        ObjectParams::read(&ParamReader::new("DeleteObject", raw))
    }

    async fn perform(&self, ctx: &OperationContext, p: &ObjectParams) -> OpResult {
        let result = ctx
            .s3()
            .delete_object()
            .bucket(&p.bucket)
            .key(&p.key)
            .set_version_id(p.version_id.clone())
            .send()
            .await;

        match result {
            Ok(out) => ok(ResponsePayload::new()
                .with_status(204)
                .with_opt_header(
                    "x-amz-delete-marker",
                    out.delete_marker().map(|m| m.to_string()),
                )
                .with_opt_header("x-amz-version-id", out.version_id())),
            Err(err) => capture(err),
        }
    }
}

#[derive(Debug)]
pub struct CopyObjectParams {
    target: ObjectParams,
    copy_source: String,
}

/// RFC 3986 unreserved characters stay as-is; everything else in a key segment is encoded.
const KEY_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// `source_bucket/source_key`, encoded one key segment at a time.
/// Dot segments are escaped so nothing on the way can collapse them.
fn copy_source(bucket: &str, key: &str) -> String {
    let segments: Vec<String> = key
        .split('/')
        .map(|segment| match segment {
            "." => "%2E".to_string(),
            ".." => "%2E%2E".to_string(),
            other => utf8_percent_encode(other, KEY_SEGMENT).to_string(),
        })
        .collect();
    format!("{bucket}/{}", segments.join("/"))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CopyObject;

#[async_trait]
impl Operation for CopyObject {
    type Params = CopyObjectParams;

    fn name(&self) -> &str {
        "CopyObject"
    }

    fn validate(&self, raw: &Params) -> Result<CopyObjectParams, ParameterError> {
        let reader = ParamReader::new("CopyObject", raw);
        let source_bucket = names::bucket(&reader, "source_bucket")?;
        let source_key = names::key(&reader, "source_key")?;
        let copy_source = copy_source(&source_bucket, &source_key);
        Ok(CopyObjectParams {
            target: ObjectParams::read(&reader)?,
            copy_source,
        })
    }

    async fn perform(&self, ctx: &OperationContext, p: &CopyObjectParams) -> OpResult {
        let result = ctx
            .s3()
            .copy_object()
            .bucket(&p.target.bucket)
            .key(&p.target.key)
            .copy_source(&p.copy_source)
            .send()
            .await;

        match result {
            Ok(out) => ok(ResponsePayload::new()
                .with_status(200)
                .with_opt_header("x-amz-version-id", out.version_id())
                .with_opt_header(
                    "x-amz-copy-source-version-id",
                    out.copy_source_version_id(),
                )
                .with_data(json!({
                    "etag": out.copy_object_result().and_then(|r| r.e_tag()),
                }))),
            Err(err) => capture(err),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GetObjectTagging;

#[async_trait]
impl Operation for GetObjectTagging {
    type Params = ObjectParams;

    fn name(&self) -> &str {
        "GetObjectTagging"
    }

    fn validate(&self, raw: &Params) -> Result<ObjectParams, ParameterError> {
        ObjectParams::read(&ParamReader::new("GetObjectTagging", raw))
    }

    async fn perform(&self, ctx: &OperationContext, p: &ObjectParams) -> OpResult {
        let result = ctx
            .s3()
            .get_object_tagging()
            .bucket(&p.bucket)
            .key(&p.key)
            .set_version_id(p.version_id.clone())
            .send()
            .await;

        match result {
            Ok(out) => ok(ResponsePayload::new()
                .with_status(200)
                .with_opt_header("x-amz-version-id", out.version_id())
                .with_data(tags_json(out.tag_set()))),
            Err(err) => capture(err),
        }
    }
}

pub struct ObjectTaggingParams {
    target: ObjectParams,
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PutObjectTagging;

#[async_trait]
impl Operation for PutObjectTagging {
    type Params = ObjectTaggingParams;

    fn name(&self) -> &str {
        "PutObjectTagging"
    }

    fn validate(&self, raw: &Params) -> Result<ObjectTaggingParams, ParameterError> {
        let reader = ParamReader::new("PutObjectTagging", raw);
        let tags = reader
            .opt_string_map("tags")?
            .ok_or_else(|| ParameterError::missing("PutObjectTagging", "tags"))?;
        Ok(ObjectTaggingParams {
            target: ObjectParams::read(&reader)?,
            tags,
        })
    }

    async fn perform(&self, ctx: &OperationContext, p: &ObjectTaggingParams) -> OpResult {
        let result = ctx
            .s3()
            .put_object_tagging()
            .bucket(&p.target.bucket)
            .key(&p.target.key)
            .set_version_id(p.target.version_id.clone())
            .tagging(tagging(&p.tags)?)
            .send()
            .await;

        match result {
            Ok(out) => ok(ResponsePayload::new()
                .with_status(200)
                .with_opt_header("x-amz-version-id", out.version_id())),
            Err(err) => capture(err),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DeleteObjectTagging;

#[async_trait]
impl Operation for DeleteObjectTagging {
    type Params = ObjectParams;

    fn name(&self) -> &str {
        "DeleteObjectTagging"
    }

    fn validate(&self, raw: &Params) -> Result<ObjectParams, ParameterError> {
        ObjectParams::read(&ParamReader::new("DeleteObjectTagging", raw))
    }

    async fn perform(&self, ctx: &OperationContext, p: &ObjectParams) -> OpResult {
        let result = ctx
            .s3()
            .delete_object_tagging()
            .bucket(&p.bucket)
            .key(&p.key)
            .set_version_id(p.version_id.clone())
            .send()
            .await;

        match result {
            Ok(out) => ok(ResponsePayload::new()
                .with_status(204)
                .with_opt_header("x-amz-version-id", out.version_id())),
            Err(err) => capture(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use s3probe_core::ParamValue;

    fn params(pairs: Vec<(&str, ParamValue)>) -> Params {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn tags_are_form_encoded() {
        let tags = BTreeMap::from([
            ("env".to_string(), "dev test".to_string()),
            ("team".to_string(), "a&b".to_string()),
        ]);
        assert_eq!(tagging_header(&tags), "env=dev+test&team=a%26b");
    }

    #[test]
    fn copy_source_encodes_key_segments() {
        assert_eq!(copy_source("src", "dir/my file.txt"), "src/dir/my%20file.txt");
        assert_eq!(copy_source("src", "a+b=c"), "src/a%2Bb%3Dc");
    }

    #[test]
    fn copy_source_keeps_dot_segments() {
        assert_eq!(copy_source("src", "a/./b"), "src/a/%2E/b");
        assert_eq!(copy_source("src", "a/../b"), "src/a/%2E%2E/b");
        assert_eq!(copy_source("src", "a/..b/c.txt"), "src/a/..b/c.txt");
    }

    #[test]
    fn put_object_reads_optional_fields() {
        let raw = params(vec![
            ("bucket", "abc".into()),
            ("key", "k".into()),
            ("body", "hello".into()),
            (
                "metadata",
                ParamValue::Map(BTreeMap::from([("owner".to_string(), "qa".into())])),
            ),
        ]);
        let p = PutObject.validate(&raw).unwrap();
        assert_eq!(p.body, b"hello");
        assert_eq!(p.metadata.unwrap()["owner"], "qa");
        assert!(p.tagging.is_none());
    }

    #[test]
    fn get_object_checks_range_form() {
        let raw = params(vec![
            ("bucket", "abc".into()),
            ("key", "k".into()),
            ("range", "0-10".into()),
        ]);
        assert_eq!(GetObject.validate(&raw).unwrap_err().field, "range");
    }

    #[test]
    fn copy_object_requires_source() {
        let raw = params(vec![("bucket", "abc".into()), ("key", "k".into())]);
        let err = CopyObject.validate(&raw).unwrap_err();
        assert_eq!(err.field, "source_bucket");
    }

    #[test]
    fn oversized_key_is_rejected() {
        let raw = params(vec![("bucket", "abc".into()), ("key", "k".repeat(1025).into())]);
        let err = HeadObject.validate(&raw).unwrap_err();
        assert_eq!(err.field, "key");
    }
}
