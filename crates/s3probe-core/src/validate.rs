//! Whole-plan validation that collects every problem instead of stopping at the first.
//!
//! Run this before handing a plan to the engine; the engine itself assumes a
//! validated plan and records whatever still goes wrong as result records.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::catalog::OperationCatalog;
use crate::model::plan::{is_valid_region, validate_endpoint};
use crate::model::{Phase, TestPlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    /// Dotted path to the offending node, e.g. `groups[basic].run[2]`.
    pub location: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{level}: {}: {}", self.location, self.message)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        !self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    fn push(&mut self, severity: Severity, location: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity,
            location: location.into(),
            message: message.into(),
        });
    }
}

pub fn validate_plan(plan: &TestPlan, catalog: &OperationCatalog) -> ValidationReport {
    let mut report = ValidationReport::default();
    let config = &plan.config;

    if let Err(e) = validate_endpoint(&config.endpoint_url) {
        report.push(Severity::Error, "config.endpoint_url", e.to_string());
    }
    if !is_valid_region(&config.region) {
        report.push(
            Severity::Error,
            "config.region",
            format!("invalid region '{}'", config.region),
        );
    }

    let mut credentials = HashSet::new();
    for cred in &config.credentials {
        if !credentials.insert(cred.name.as_str()) {
            report.push(
                Severity::Error,
                format!("config.credentials[{}]", cred.name),
                "duplicate credential name",
            );
        }
        if cred.access_key.is_empty() || cred.secret_key.is_empty() {
            report.push(
                Severity::Error,
                format!("config.credentials[{}]", cred.name),
                "access_key and secret_key are required",
            );
        }
    }

    if plan.groups.is_empty() {
        report.push(Severity::Warning, "groups", "plan has no test groups");
    }

    let mut groups = HashSet::new();
    for group in &plan.groups {
        let here = format!("groups[{}]", group.name);
        if !groups.insert(group.name.as_str()) {
            report.push(Severity::Error, &here, "duplicate group name");
        }
        if !credentials.contains(group.credential.as_str()) {
            report.push(
                Severity::Error,
                &here,
                format!("unknown credential '{}'", group.credential),
            );
        }
        if group.run.is_empty() {
            report.push(Severity::Error, &here, "run phase has no operations");
        }

        for phase in Phase::ALL {
            for (index, op) in group.phase(phase).iter().enumerate() {
                let at = format!("{here}.{phase}[{}]", index + 1);
                if !catalog.contains(&op.operation) {
                    let severity = if catalog.is_lenient() {
                        Severity::Warning
                    } else {
                        Severity::Error
                    };
                    report.push(severity, &at, format!("unknown operation '{}'", op.operation));
                }
                if let Some(name) = &op.credential {
                    if !credentials.contains(name.as_str()) {
                        report.push(Severity::Error, &at, format!("unknown credential '{name}'"));
                    }
                }
                if let Some(pattern) = op
                    .expected
                    .response_contains()
                    .and_then(|a| a.body_pattern.as_deref())
                {
                    if let Err(e) = regex::Regex::new(pattern) {
                        report.push(Severity::Error, &at, format!("invalid body pattern: {e}"));
                    }
                }
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CredentialSet, GlobalConfig, PlanOperation, TestGroup};
    use crate::operation::NoopOperation;

    fn catalog() -> OperationCatalog {
        OperationCatalog::new()
            .with(NoopOperation::new("CreateBucket"))
            .with(NoopOperation::new("ListBuckets"))
    }

    fn base() -> TestPlan {
        TestPlan::new(
            "t",
            GlobalConfig::new(
                "http://localhost:9000",
                vec![CredentialSet::new("admin", "AK", "SK")],
            ),
        )
    }

    #[test]
    fn valid_plan_has_no_issues() {
        let plan = base().with_group(
            TestGroup::new("g", "admin")
                .with_setup(PlanOperation::new("CreateBucket"))
                .with_run(PlanOperation::new("ListBuckets")),
        );
        let report = validate_plan(&plan, &catalog());
        assert!(report.is_ok(), "{:?}", report.issues);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn collects_all_problems() {
        let plan = base()
            .with_group(
                TestGroup::new("g", "ghost")
                    .with_run(PlanOperation::new("Frobnicate").with_credential("nobody")),
            )
            .with_group(TestGroup::new("g", "admin"));
        let report = validate_plan(&plan, &catalog());
        assert!(!report.is_ok());
        let messages: Vec<String> = report.errors().map(|i| i.to_string()).collect();
        assert_eq!(messages.len(), 5, "{messages:#?}");
        assert!(messages
            .iter()
            .any(|m| m.contains("groups[g].run[1]") && m.contains("unknown operation 'Frobnicate'")));
        assert!(messages.iter().any(|m| m.contains("duplicate group name")));
    }

    #[test]
    fn lenient_catalog_downgrades_unknown_operations() {
        let plan = base().with_group(TestGroup::new("g", "admin").with_run(PlanOperation::new("Frobnicate")));
        let report = validate_plan(&plan, &catalog().lenient(true));
        assert!(report.is_ok());
        assert_eq!(report.warnings().count(), 1);
    }
}
