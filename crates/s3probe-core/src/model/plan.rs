//! Test plan model: global endpoint configuration, credentials, groups and operations.
//!
//! Plan objects are immutable once built. Runtime state (group status, timings) lives
//! in the engine's run-scoped status table, never on these types.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{PlanError, PlanResult};

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Named access credentials. The name is an identifier, never a secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSet {
    pub name: String,
    pub access_key: String,
    pub secret_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
}

impl CredentialSet {
    pub fn new(
        name: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            session_token: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Short access-key prefix used to tell rotated keys apart without exposing them.
    pub fn fingerprint(&self) -> String {
        self.access_key.chars().take(8).collect()
    }
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("name", &self.name)
            .field("access_key", &format_args!("{}…", self.fingerprint()))
            .field("secret_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Endpoint, region, addressing style and the credential sets a plan may use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub endpoint_url: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub path_style: bool,
    pub credentials: Vec<CredentialSet>,
}

impl GlobalConfig {
    pub fn new(endpoint_url: impl Into<String>, credentials: Vec<CredentialSet>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            region: default_region(),
            path_style: false,
            credentials,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_path_style(mut self, path_style: bool) -> Self {
        self.path_style = path_style;
        self
    }

    pub fn credential(&self, name: &str) -> Option<&CredentialSet> {
        self.credentials.iter().find(|c| c.name == name)
    }

    pub fn validate(&self) -> PlanResult<()> {
        validate_endpoint(&self.endpoint_url)?;
        if !is_valid_region(&self.region) {
            return Err(PlanError::InvalidRegion(self.region.clone()));
        }
        let mut seen = HashSet::new();
        for cred in &self.credentials {
            if cred.name.is_empty()
                || !cred
                    .name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                return Err(PlanError::Invalid(format!(
                    "credential name contains invalid characters: '{}'",
                    cred.name
                )));
            }
            if !seen.insert(cred.name.as_str()) {
                return Err(PlanError::DuplicateName {
                    kind: "credential",
                    name: cred.name.clone(),
                });
            }
        }
        Ok(())
    }
}

pub(crate) fn validate_endpoint(raw: &str) -> PlanResult<()> {
    let parsed = url::Url::parse(raw).map_err(|e| PlanError::InvalidEndpoint {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(PlanError::InvalidEndpoint {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(PlanError::InvalidEndpoint {
            url: raw.to_string(),
            reason: "missing host".to_string(),
        });
    }
    Ok(())
}

pub(crate) fn is_valid_region(region: &str) -> bool {
    let bytes = region.as_bytes();
    let edge_ok = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    bytes.len() >= 2
        && bytes.first().is_some_and(edge_ok)
        && bytes.last().is_some_and(edge_ok)
        && bytes.iter().all(|b| edge_ok(b) || *b == b'-')
}

/// A single parameter value as declared in the plan.
///
/// `Bytes` is only produced by the loader when it materializes `file://` references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<ParamValue>),
    Map(BTreeMap<String, ParamValue>),
    #[serde(skip_deserializing)]
    Bytes(Vec<u8>),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Text(s) => match s.to_ascii_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, ParamValue>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Scalar rendering used for string-typed S3 fields (metadata values, tags).
    pub fn to_scalar_string(&self) -> Option<String> {
        match self {
            Self::Bool(b) => Some(b.to_string()),
            Self::Int(n) => Some(n.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::Text(s) => Some(s.clone()),
            Self::List(_) | Self::Map(_) | Self::Bytes(_) => None,
        }
    }

    /// Payload bytes: literal text is sent as UTF-8.
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Self::Bytes(b) => Some(b.clone()),
            Self::Text(s) => Some(s.as_bytes().to_vec()),
            _ => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for ParamValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<Vec<u8>> for ParamValue {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

pub type Params = BTreeMap<String, ParamValue>;

/// Optional assertions on a successful response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseAssertions {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl ResponseAssertions {
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.body_pattern = Some(pattern.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    fn check_pattern(&self) -> PlanResult<()> {
        if let Some(pattern) = &self.body_pattern {
            regex::Regex::new(pattern).map_err(|e| PlanError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct RawExpectedOutcome {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    response_contains: Option<ResponseAssertions>,
}

fn default_success() -> bool {
    true
}

impl TryFrom<RawExpectedOutcome> for ExpectedOutcome {
    type Error = PlanError;

    fn try_from(raw: RawExpectedOutcome) -> Result<Self, Self::Error> {
        ExpectedOutcome::new(raw.success, raw.error_code, raw.response_contains)
    }
}

/// The pass/fail oracle for one operation.
///
/// `error_code` is required when `success` is false and forbidden when it is true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawExpectedOutcome")]
pub struct ExpectedOutcome {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_contains: Option<ResponseAssertions>,
}

impl ExpectedOutcome {
    pub fn new(
        success: bool,
        error_code: Option<String>,
        response_contains: Option<ResponseAssertions>,
    ) -> PlanResult<Self> {
        match (success, &error_code) {
            (true, Some(code)) => return Err(PlanError::UnexpectedErrorCode(code.clone())),
            (false, None) => return Err(PlanError::MissingErrorCode),
            (false, Some(code)) if code.trim().is_empty() => {
                return Err(PlanError::MissingErrorCode)
            }
            _ => {}
        }
        if let Some(assertions) = &response_contains {
            assertions.check_pattern()?;
        }
        Ok(Self {
            success,
            error_code,
            response_contains,
        })
    }

    pub fn success() -> Self {
        Self {
            success: true,
            error_code: None,
            response_contains: None,
        }
    }

    pub fn failure(error_code: impl Into<String>) -> PlanResult<Self> {
        Self::new(false, Some(error_code.into()), None)
    }

    pub fn success_with(assertions: ResponseAssertions) -> PlanResult<Self> {
        Self::new(true, None, Some(assertions))
    }

    pub fn expects_success(&self) -> bool {
        self.success
    }

    pub fn error_code(&self) -> Option<&str> {
        self.error_code.as_deref()
    }

    pub fn response_contains(&self) -> Option<&ResponseAssertions> {
        self.response_contains.as_ref()
    }
}

impl Default for ExpectedOutcome {
    fn default() -> Self {
        Self::success()
    }
}

/// One step of a group: an operation name, its parameters and the expected outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanOperation {
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    #[serde(default)]
    pub parameters: Params,
    #[serde(default)]
    pub expected: ExpectedOutcome,
}

impl PlanOperation {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            credential: None,
            parameters: Params::new(),
            expected: ExpectedOutcome::success(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_credential(mut self, name: impl Into<String>) -> Self {
        self.credential = Some(name.into());
        self
    }

    pub fn expect(mut self, expected: ExpectedOutcome) -> Self {
        self.expected = expected;
        self
    }
}

/// Execution phases of a group, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Setup,
    Run,
    Teardown,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Setup, Phase::Run, Phase::Teardown];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Setup => "setup",
            Phase::Run => "run",
            Phase::Teardown => "teardown",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestGroup {
    pub name: String,
    pub credential: String,
    #[serde(default)]
    pub setup: Vec<PlanOperation>,
    pub run: Vec<PlanOperation>,
    #[serde(default)]
    pub teardown: Vec<PlanOperation>,
}

impl TestGroup {
    pub fn new(name: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            credential: credential.into(),
            setup: Vec::new(),
            run: Vec::new(),
            teardown: Vec::new(),
        }
    }

    pub fn with_setup(mut self, op: PlanOperation) -> Self {
        self.setup.push(op);
        self
    }

    pub fn with_run(mut self, op: PlanOperation) -> Self {
        self.run.push(op);
        self
    }

    pub fn with_teardown(mut self, op: PlanOperation) -> Self {
        self.teardown.push(op);
        self
    }

    pub fn phase(&self, phase: Phase) -> &[PlanOperation] {
        match phase {
            Phase::Setup => &self.setup,
            Phase::Run => &self.run,
            Phase::Teardown => &self.teardown,
        }
    }

    pub fn operation_count(&self) -> usize {
        self.setup.len() + self.run.len() + self.teardown.len()
    }

    /// Every operation in execution order.
    pub fn operations(&self) -> impl Iterator<Item = (Phase, &PlanOperation)> {
        Phase::ALL
            .into_iter()
            .flat_map(move |phase| self.phase(phase).iter().map(move |op| (phase, op)))
    }
}

/// A complete, validated test plan as handed over by the loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestPlan {
    /// Where the plan came from (file path, URL...). Informational only.
    #[serde(default)]
    pub source: String,
    pub config: GlobalConfig,
    /// Plan-level default for group parallelism.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel: Option<bool>,
    pub groups: Vec<TestGroup>,
}

impl TestPlan {
    pub fn new(source: impl Into<String>, config: GlobalConfig) -> Self {
        Self {
            source: source.into(),
            config,
            parallel: None,
            groups: Vec::new(),
        }
    }

    pub fn with_group(mut self, group: TestGroup) -> Self {
        self.groups.push(group);
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = Some(parallel);
        self
    }

    pub fn group(&self, name: &str) -> Option<&TestGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Parses an in-memory YAML document and checks its structure.
    pub fn from_yaml_str(yaml: &str, source: impl Into<String>) -> PlanResult<Self> {
        let mut plan: TestPlan =
            serde_yaml::from_str(yaml).map_err(|e| PlanError::Parse(e.to_string()))?;
        plan.source = source.into();
        plan.check_structure()?;
        Ok(plan)
    }

    /// Structural invariants: valid global config, unique group names, non-empty run phases.
    pub fn check_structure(&self) -> PlanResult<()> {
        self.config.validate()?;
        let mut seen = HashSet::new();
        for group in &self.groups {
            if !seen.insert(group.name.as_str()) {
                return Err(PlanError::DuplicateName {
                    kind: "group",
                    name: group.name.clone(),
                });
            }
            if group.run.is_empty() {
                return Err(PlanError::EmptyRunPhase(group.name.clone()));
            }
        }
        Ok(())
    }
}
