//! Multipart upload lifecycle: initiate, upload parts, list, complete, abort.
//!
//! The upload id returned by `CreateMultipartUpload` is exposed in the response
//! data as `upload_id` so later steps of the same plan can refer to it.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use s3probe_core::{
    Operation, OperationContext, ParamReader, ParamValue, ParameterError, Params, ResponsePayload,
};
use serde_json::json;

use crate::bucket::opt_count;
use crate::names;
use crate::object::tagging_header;
use crate::sdk::{capture, ok, OpResult};

const MAX_PART_NUMBER: i32 = 10_000;

/// Bucket, key and the upload id every step after initiation needs.
#[derive(Debug)]
pub struct UploadTarget {
    bucket: String,
    key: String,
    upload_id: String,
}

impl UploadTarget {
    fn read(reader: &ParamReader<'_>) -> Result<Self, ParameterError> {
        Ok(Self {
            bucket: names::bucket(reader, "bucket")?,
            key: names::key(reader, "key")?,
            upload_id: reader.require_str("upload_id")?,
        })
    }
}

fn check_part_number(n: i64) -> Result<i32, String> {
    i32::try_from(n)
        .ok()
        .filter(|n| (1..=MAX_PART_NUMBER).contains(n))
        .ok_or_else(|| format!("part number must be between 1 and {MAX_PART_NUMBER}, got {n}"))
}

/// First present key among `names`; plans may use either snake case or the S3 casing.
fn part_field<'a>(
    entry: &'a BTreeMap<String, ParamValue>,
    names: &[&str],
) -> Option<&'a ParamValue> {
    names.iter().find_map(|name| entry.get(*name))
}

/// A part reference for completion, in the order given by the plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PartRef {
    number: i32,
    etag: String,
}

fn read_parts(reader: &ParamReader<'_>) -> Result<Vec<PartRef>, ParameterError> {
    let list = match reader.get("parts") {
        Some(ParamValue::List(list)) if !list.is_empty() => list,
        Some(ParamValue::List(_)) => return Err(reader.error("parts", "must not be empty")),
        Some(_) => return Err(reader.error("parts", "expected a list of parts")),
        None => return Err(ParameterError::missing("CompleteMultipartUpload", "parts")),
    };

    list.iter()
        .enumerate()
        .map(|(index, value)| {
            let entry = value
                .as_map()
                .ok_or_else(|| reader.error("parts", format!("entry {index} must be a mapping")))?;
            let number = part_field(entry, &["part_number", "PartNumber"])
                .and_then(ParamValue::as_i64)
                .ok_or_else(|| {
                    reader.error("parts", format!("entry {index} needs an integer 'part_number'"))
                })?;
            let number = check_part_number(number).map_err(|reason| reader.error("parts", reason))?;
            let etag = part_field(entry, &["etag", "ETag"])
                .and_then(ParamValue::to_scalar_string)
                .filter(|etag| !etag.is_empty())
                .ok_or_else(|| reader.error("parts", format!("entry {index} needs an 'etag'")))?;
            Ok(PartRef { number, etag })
        })
        .collect()
}

pub struct CreateUploadParams {
    bucket: String,
    key: String,
    content_type: Option<String>,
    metadata: Option<BTreeMap<String, String>>,
    tagging: Option<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CreateMultipartUpload;

#[async_trait]
impl Operation for CreateMultipartUpload {
    type Params = CreateUploadParams;

    fn name(&self) -> &str {
        "CreateMultipartUpload"
    }

    fn validate(&self, raw: &Params) -> Result<CreateUploadParams, ParameterError> {
        let reader = ParamReader::new("CreateMultipartUpload", raw);
        Ok(CreateUploadParams {
            bucket: names::bucket(&reader, "bucket")?,
            key: names::key(&reader, "key")?,
            content_type: reader.opt_str("content_type")?,
            metadata: reader.opt_string_map("metadata")?,
            tagging: reader.opt_string_map("tags")?.as_ref().map(tagging_header),
        })
    }

    async fn perform(&self, ctx: &OperationContext, p: &CreateUploadParams) -> OpResult {
        let metadata = p
            .metadata
            .as_ref()
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<HashMap<_, _>>());

        let result = ctx
            .s3()
            .create_multipart_upload()
            .bucket(&p.bucket)
            .key(&p.key)
            .set_content_type(p.content_type.clone())
            .set_metadata(metadata)
            .set_tagging(p.tagging.clone())
            .send()
            .await;

        match result {
            Ok(out) => ok(ResponsePayload::new().with_status(200).with_data(json!({
                "bucket": out.bucket(),
                "key": out.key(),
                "upload_id": out.upload_id(),
            }))),
            Err(err) => capture(err),
        }
    }
}

#[derive(Debug)]
pub struct UploadPartParams {
    target: UploadTarget,
    part_number: i32,
    body: Vec<u8>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UploadPart;

#[async_trait]
impl Operation for UploadPart {
    type Params = UploadPartParams;

    fn name(&self) -> &str {
        "UploadPart"
    }

    fn validate(&self, raw: &Params) -> Result<UploadPartParams, ParameterError> {
        let reader = ParamReader::new("UploadPart", raw);
        let part_number = reader
            .opt_i64("part_number")?
            .ok_or_else(|| ParameterError::missing("UploadPart", "part_number"))?;
        let part_number =
            check_part_number(part_number).map_err(|reason| reader.error("part_number", reason))?;
        let body = reader
            .opt_bytes("body")?
            .ok_or_else(|| ParameterError::missing("UploadPart", "body"))?;
        Ok(UploadPartParams {
            target: UploadTarget::read(&reader)?,
            part_number,
            body,
        })
    }

    async fn perform(&self, ctx: &OperationContext, p: &UploadPartParams) -> OpResult {
        let result = ctx
            .s3()
            .upload_part()
            .bucket(&p.target.bucket)
            .key(&p.target.key)
            .upload_id(&p.target.upload_id)
            .part_number(p.part_number)
            .body(ByteStream::from(p.body.clone()))
            .send()
            .await;

        match result {
            Ok(out) => ok(ResponsePayload::new()
                .with_status(200)
                .with_opt_header("ETag", out.e_tag())
                .with_data(json!({ "part_number": p.part_number, "etag": out.e_tag() }))),
            Err(err) => capture(err),
        }
    }
}

#[derive(Debug)]
pub struct CompleteUploadParams {
    target: UploadTarget,
    parts: Vec<PartRef>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CompleteMultipartUpload;

#[async_trait]
impl Operation for CompleteMultipartUpload {
    type Params = CompleteUploadParams;

    fn name(&self) -> &str {
        "CompleteMultipartUpload"
    }

    /// Parts are sent in plan order; the service rules on ordering.
    fn validate(&self, raw: &Params) -> Result<CompleteUploadParams, ParameterError> {
        let reader = ParamReader::new("CompleteMultipartUpload", raw);
        Ok(CompleteUploadParams {
            target: UploadTarget::read(&reader)?,
            parts: read_parts(&reader)?,
        })
    }

    async fn perform(&self, ctx: &OperationContext, p: &CompleteUploadParams) -> OpResult {
        let parts = p
            .parts
            .iter()
            .map(|part| {
                CompletedPart::builder()
                    .part_number(part.number)
                    .e_tag(&part.etag)
                    .build()
            })
            .collect();
        let upload = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        let result = ctx
            .s3()
            .complete_multipart_upload()
            .bucket(&p.target.bucket)
            .key(&p.target.key)
            .upload_id(&p.target.upload_id)
            .multipart_upload(upload)
            .send()
            .await;

        match result {
            Ok(out) => ok(ResponsePayload::new()
                .with_status(200)
                .with_opt_header("ETag", out.e_tag())
                .with_opt_header("x-amz-version-id", out.version_id())
                .with_opt_header("Location", out.location())),
            Err(err) => capture(err),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AbortMultipartUpload;

#[async_trait]
impl Operation for AbortMultipartUpload {
    type Params = UploadTarget;

    fn name(&self) -> &str {
        "AbortMultipartUpload"
    }

    fn validate(&self, raw: &Params) -> Result<UploadTarget, ParameterError> {
        UploadTarget::read(&ParamReader::new("AbortMultipartUpload", raw))
    }

    async fn perform(&self, ctx: &OperationContext, p: &UploadTarget) -> OpResult {
        let result = ctx
            .s3()
            .abort_multipart_upload()
            .bucket(&p.bucket)
            .key(&p.key)
            .upload_id(&p.upload_id)
            .send()
            .await;

        match result {
            Ok(_) => ok(ResponsePayload::new().with_status(204)),
            Err(err) => capture(err),
        }
    }
}

#[derive(Debug)]
pub struct ListPartsParams {
    target: UploadTarget,
    max_parts: Option<i32>,
    part_number_marker: Option<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ListParts;

#[async_trait]
impl Operation for ListParts {
    type Params = ListPartsParams;

    fn name(&self) -> &str {
        "ListParts"
    }

    fn validate(&self, raw: &Params) -> Result<ListPartsParams, ParameterError> {
        let reader = ParamReader::new("ListParts", raw);
        let part_number_marker = reader
            .opt_i64("part_number_marker")?
            .map(|n| {
                if n < 0 {
                    Err(reader.error("part_number_marker", "must not be negative"))
                } else {
                    Ok(n.to_string())
                }
            })
            .transpose()?;
        Ok(ListPartsParams {
            target: UploadTarget::read(&reader)?,
            max_parts: opt_count(&reader, "max_parts")?,
            part_number_marker,
        })
    }

    async fn perform(&self, ctx: &OperationContext, p: &ListPartsParams) -> OpResult {
        let result = ctx
            .s3()
            .list_parts()
            .bucket(&p.target.bucket)
            .key(&p.target.key)
            .upload_id(&p.target.upload_id)
            .set_max_parts(p.max_parts)
            .set_part_number_marker(p.part_number_marker.clone())
            .send()
            .await;

        match result {
            Ok(out) => {
                let parts: Vec<_> = out
                    .parts()
                    .iter()
                    .map(|part| {
                        json!({
                            "part_number": part.part_number(),
                            "etag": part.e_tag(),
                            "size": part.size(),
                        })
                    })
                    .collect();
                ok(ResponsePayload::new().with_status(200).with_data(json!({
                    "parts": parts,
                    "is_truncated": out.is_truncated().unwrap_or(false),
                    "next_part_number_marker": out.next_part_number_marker(),
                })))
            }
            Err(err) => capture(err),
        }
    }
}
