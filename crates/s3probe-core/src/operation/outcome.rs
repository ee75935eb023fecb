//! Raw outcome of one operation call, before it is judged.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{OperationFault, ParameterError};

/// Observable parts of a service response that assertions can look at.
///
/// Header names are stored lower-cased so lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Operation-specific fields (listing entries, tag sets, version ids...).
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

impl ResponsePayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Adds the header only when a value is present.
    pub fn with_opt_header(self, name: impl AsRef<str>, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(v) => self.with_header(name, v),
            None => self,
        }
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Stores the body as text; non UTF-8 bytes are replaced.
    pub fn with_body_bytes(mut self, bytes: &[u8]) -> Self {
        self.body = Some(String::from_utf8_lossy(bytes).into_owned());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Where a failed outcome came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FaultOrigin {
    /// The service answered with a structured error response.
    Api,
    /// Parameters were rejected before any call was made.
    Parameter { message: String },
    /// Transport or local failure; there is no interpretable remote outcome.
    System { message: String },
}

impl FaultOrigin {
    pub fn is_system(&self) -> bool {
        !matches!(self, Self::Api)
    }
}

/// What an operation implementation observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub success: bool,
    #[serde(with = "crate::model::duration_ms")]
    pub duration: Duration,
    pub response: Option<ResponsePayload>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub fault: Option<FaultOrigin>,
}

impl OutcomeRecord {
    pub fn success(response: ResponsePayload) -> Self {
        Self {
            success: true,
            duration: Duration::ZERO,
            response: Some(response),
            error_code: None,
            error_message: None,
            fault: None,
        }
    }

    /// A structured error returned by the service.
    pub fn api_error(
        code: impl Into<String>,
        message: impl Into<String>,
        response: Option<ResponsePayload>,
    ) -> Self {
        Self {
            success: false,
            duration: Duration::ZERO,
            response,
            error_code: Some(code.into()),
            error_message: Some(message.into()),
            fault: Some(FaultOrigin::Api),
        }
    }

    pub fn from_fault(fault: &OperationFault) -> Self {
        let message = fault.to_string();
        Self {
            success: false,
            duration: Duration::ZERO,
            response: None,
            error_code: None,
            error_message: Some(message.clone()),
            fault: Some(FaultOrigin::System { message }),
        }
    }

    pub fn from_parameter_error(err: &ParameterError) -> Self {
        let message = err.to_string();
        Self {
            success: false,
            duration: Duration::ZERO,
            response: None,
            error_code: None,
            error_message: Some(message.clone()),
            fault: Some(FaultOrigin::Parameter { message }),
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// True when the failure did not come from a structured service response.
    pub fn is_system_fault(&self) -> bool {
        self.fault.as_ref().is_some_and(FaultOrigin::is_system)
    }
}
