//! Mapping of SDK results onto outcome records.
//!
//! Service errors become failed outcomes carrying the S3 error code; everything
//! else (dispatch, timeout, unparseable response) is an operation fault.

use std::collections::{BTreeMap, HashMap};

use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::types::{Tag, Tagging};
use s3probe_core::{OperationFault, OutcomeRecord, ResponsePayload};
use tracing::debug;

pub(crate) type OpResult = Result<OutcomeRecord, OperationFault>;

/// Folds an SDK error into the outcome contract.
pub(crate) fn capture<E>(err: SdkError<E, HttpResponse>) -> OpResult
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match &err {
        SdkError::ServiceError(ctx) => {
            let raw = ctx.raw();
            let status = raw.status().as_u16();
            let code = ctx
                .err()
                .code()
                .map(str::to_string)
                .unwrap_or_else(|| code_for_status(status).to_string());
            let message = ctx
                .err()
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| DisplayErrorContext(&err).to_string());

            debug!(code = %code, status, "service error response");

            let mut payload = ResponsePayload::new().with_status(status);
            for (name, value) in raw.headers().iter() {
                payload = payload.with_header(name, value);
            }
            Ok(OutcomeRecord::api_error(code, message, Some(payload)))
        }
        SdkError::TimeoutError(_) => Err(OperationFault::timeout(
            DisplayErrorContext(&err).to_string(),
        )),
        SdkError::DispatchFailure(failure) if failure.is_timeout() => Err(
            OperationFault::timeout(DisplayErrorContext(&err).to_string()),
        ),
        SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => Err(
            OperationFault::transport(DisplayErrorContext(&err).to_string()),
        ),
        _ => Err(OperationFault::local(DisplayErrorContext(&err).to_string())),
    }
}

/// Error responses without a body (HEAD requests) only carry a status.
fn code_for_status(status: u16) -> &'static str {
    match status {
        301 => "PermanentRedirect",
        400 => "BadRequest",
        403 => "Forbidden",
        404 => "NotFound",
        405 => "MethodNotAllowed",
        409 => "Conflict",
        412 => "PreconditionFailed",
        500 => "InternalError",
        503 => "ServiceUnavailable",
        _ => "UnknownError",
    }
}

pub(crate) fn metadata_map(metadata: Option<&HashMap<String, String>>) -> BTreeMap<String, String> {
    metadata
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}

/// Builds a tag set request body.
pub(crate) fn tagging(tags: &BTreeMap<String, String>) -> Result<Tagging, OperationFault> {
    let tag_set = tags
        .iter()
        .map(|(k, v)| Tag::builder().key(k).value(v).build())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| OperationFault::local(e.to_string()))?;
    Tagging::builder()
        .set_tag_set(Some(tag_set))
        .build()
        .map_err(|e| OperationFault::local(e.to_string()))
}

/// Tag set as a JSON object, for response assertions and reports.
pub(crate) fn tags_json(tags: &[Tag]) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = tags
        .iter()
        .map(|t| (t.key().to_string(), serde_json::Value::from(t.value())))
        .collect();
    serde_json::json!({ "tags": map })
}

pub(crate) fn ok(payload: ResponsePayload) -> OpResult {
    Ok(OutcomeRecord::success(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_fallback_codes() {
        assert_eq!(code_for_status(404), "NotFound");
        assert_eq!(code_for_status(403), "Forbidden");
        assert_eq!(code_for_status(418), "UnknownError");
    }

    #[test]
    fn metadata_is_sorted() {
        let raw = HashMap::from([
            ("b".to_string(), "2".to_string()),
            ("a".to_string(), "1".to_string()),
        ]);
        let map = metadata_map(Some(&raw));
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(metadata_map(None).is_empty());
    }

    #[test]
    fn tag_sets_round_trip_through_json() {
        let tags = BTreeMap::from([("env".to_string(), "dev".to_string())]);
        let built = tagging(&tags).unwrap();
        let json = tags_json(built.tag_set());
        assert_eq!(json["tags"]["env"], "dev");
    }
}
