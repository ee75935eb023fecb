//! Pass/fail judgement of an observed outcome against its declared expectation.
//!
//! A declared, expected API error is a passing result. Only the mismatch between
//! what was expected and what was observed makes a test fail.

use regex::Regex;
use tracing::debug;

use crate::model::{ExpectedOutcome, ResponseAssertions};
use crate::operation::{OutcomeRecord, ResponsePayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub verdict: Verdict,
    pub message: Option<String>,
}

impl Evaluation {
    pub fn pass() -> Self {
        Self {
            verdict: Verdict::Pass,
            message: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Fail,
            message: Some(message.into()),
        }
    }

    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }
}

pub fn evaluate(expected: &ExpectedOutcome, observed: &OutcomeRecord) -> Evaluation {
    match (expected.expects_success(), observed.success) {
        (true, false) => {
            let detail = match (&observed.error_code, &observed.error_message) {
                (Some(code), Some(msg)) => format!("{code}: {msg}"),
                (Some(code), None) => code.clone(),
                (None, Some(msg)) => msg.clone(),
                (None, None) => "unknown error".to_string(),
            };
            Evaluation::fail(format!("Operation failed: {detail}"))
        }
        (false, true) => Evaluation::fail("Expected failure but operation succeeded"),
        (true, true) => match expected.response_contains() {
            None => Evaluation::pass(),
            Some(assertions) => match check_response(assertions, observed.response.as_ref()) {
                Ok(()) => Evaluation::pass(),
                Err(reason) => {
                    debug!(reason = %reason, "response assertion mismatch");
                    Evaluation::fail(format!("Response validation failed: {reason}"))
                }
            },
        },
        (false, false) => match expected.error_code() {
            Some(want) if observed.error_code.as_deref() != Some(want) => {
                Evaluation::fail(format!(
                    "Expected error code {want} but got {}",
                    observed.error_code.as_deref().unwrap_or("none")
                ))
            }
            _ => Evaluation::pass(),
        },
    }
}

/// Returns the first mismatch between the assertions and the response.
fn check_response(
    assertions: &ResponseAssertions,
    response: Option<&ResponsePayload>,
) -> Result<(), String> {
    let empty = ResponsePayload::default();
    let response = response.unwrap_or(&empty);

    for (name, want) in &assertions.headers {
        match response.header(name) {
            Some(got) if got == want => {}
            Some(got) => return Err(format!("header '{name}' is '{got}', expected '{want}'")),
            None => return Err(format!("header '{name}' is missing")),
        }
    }

    if let Some(pattern) = &assertions.body_pattern {
        let re = Regex::new(pattern).map_err(|e| format!("invalid body pattern: {e}"))?;
        let body = response.body.as_deref().unwrap_or("");
        if !re.is_match(body) {
            return Err(format!("body does not match /{pattern}/"));
        }
    }

    for (key, want) in &assertions.metadata {
        match response.metadata.get(key) {
            Some(got) if got == want => {}
            Some(got) => return Err(format!("metadata '{key}' is '{got}', expected '{want}'")),
            None => return Err(format!("metadata '{key}' is missing")),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::OperationFault;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn ok_with_body(body: &str) -> OutcomeRecord {
        OutcomeRecord::success(
            ResponsePayload::new()
                .with_header("Content-Type", "text/plain")
                .with_metadata(BTreeMap::from([("owner".to_string(), "qa".to_string())]))
                .with_body_bytes(body.as_bytes()),
        )
    }

    #[test]
    fn expected_error_code_passes() {
        let expected = ExpectedOutcome::failure("NoSuchBucket").unwrap();
        let observed = OutcomeRecord::api_error("NoSuchBucket", "gone", None);
        assert!(evaluate(&expected, &observed).passed());
    }

    #[test]
    fn error_code_mismatch_fails() {
        let expected = ExpectedOutcome::failure("NoSuchBucket").unwrap();
        let observed = OutcomeRecord::api_error("NoSuchKey", "gone", None);
        let eval = evaluate(&expected, &observed);
        assert_eq!(eval.verdict, Verdict::Fail);
        assert_eq!(
            eval.message.as_deref(),
            Some("Expected error code NoSuchBucket but got NoSuchKey")
        );
    }

    #[test]
    fn unexpected_success_fails() {
        let expected = ExpectedOutcome::failure("AccessDenied").unwrap();
        let eval = evaluate(&expected, &ok_with_body(""));
        assert_eq!(
            eval.message.as_deref(),
            Some("Expected failure but operation succeeded")
        );
    }

    #[test]
    fn unexpected_failure_reports_unknown_error() {
        let mut observed = OutcomeRecord::from_fault(&OperationFault::local("boom"));
        observed.error_message = None;
        let eval = evaluate(&ExpectedOutcome::success(), &observed);
        assert_eq!(eval.message.as_deref(), Some("Operation failed: unknown error"));
    }

    #[test]
    fn response_assertions_match() {
        let assertions = ResponseAssertions::default()
            .with_header("content-type", "text/plain")
            .with_body_pattern("^hel+o")
            .with_metadata("owner", "qa");
        let expected = ExpectedOutcome::success_with(assertions).unwrap();
        assert!(evaluate(&expected, &ok_with_body("hello world")).passed());

        let eval = evaluate(&expected, &ok_with_body("goodbye"));
        assert_eq!(eval.verdict, Verdict::Fail);
        assert!(eval
            .message
            .unwrap()
            .starts_with("Response validation failed"));
    }

    #[test]
    fn header_value_must_match_exactly() {
        let expected = ExpectedOutcome::success_with(
            ResponseAssertions::default().with_header("Content-Type", "TEXT/PLAIN"),
        )
        .unwrap();
        assert!(!evaluate(&expected, &ok_with_body("x")).passed());
    }

    #[test]
    fn missing_metadata_fails() {
        let expected = ExpectedOutcome::success_with(
            ResponseAssertions::default().with_metadata("team", "storage"),
        )
        .unwrap();
        assert!(!evaluate(&expected, &ok_with_body("x")).passed());
    }

    fn code() -> impl Strategy<Value = String> {
        prop::sample::select(vec![
            "AccessDenied",
            "NoSuchBucket",
            "NoSuchKey",
            "SlowDown",
            "InternalError",
        ])
        .prop_map(str::to_string)
    }

    proptest! {
        #[test]
        fn agreement_without_assertions_passes(success in any::<bool>(), code in code()) {
            let expected = if success {
                ExpectedOutcome::success()
            } else {
                ExpectedOutcome::new(false, Some(code.clone()), None).unwrap()
            };
            let observed = if success {
                OutcomeRecord::success(ResponsePayload::new())
            } else {
                OutcomeRecord::api_error(code, "msg", None)
            };
            prop_assert!(evaluate(&expected, &observed).passed());
        }

        #[test]
        fn disagreement_always_fails(success in any::<bool>(), code in code()) {
            let expected = if success {
                ExpectedOutcome::success()
            } else {
                ExpectedOutcome::new(false, Some(code.clone()), None).unwrap()
            };
            let observed = if success {
                OutcomeRecord::api_error(code, "msg", None)
            } else {
                OutcomeRecord::success(ResponsePayload::new())
            };
            prop_assert_eq!(evaluate(&expected, &observed).verdict, Verdict::Fail);
        }

        #[test]
        fn expected_outcome_invariant(success in any::<bool>(), code in proptest::option::of(code())) {
            let built = ExpectedOutcome::new(success, code.clone(), None);
            prop_assert_eq!(built.is_ok(), success == code.is_none());
        }
    }
}
