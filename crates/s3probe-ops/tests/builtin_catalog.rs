//! The built-in catalog wired into the engine, without a live S3 endpoint.

use s3probe_core::{
    validate_plan, CredentialSet, Engine, EngineSettings, GlobalConfig, PlanOperation,
    ResultStatus, RunOptions, TestGroup, TestPlan,
};
use s3probe_ops::builtin_catalog;

fn plan(endpoint: &str, group: TestGroup) -> TestPlan {
    let global = GlobalConfig::new(
        endpoint,
        vec![CredentialSet::new("admin", "AKIAADMIN0001", "secret")],
    )
    .with_path_style(true);
    TestPlan::new("builtin", global).with_group(group)
}

#[test]
fn test_catalog_registers_every_builtin_operation() {
    let catalog = builtin_catalog();
    let expected = [
        "AbortMultipartUpload",
        "CompleteMultipartUpload",
        "CopyObject",
        "CreateBucket",
        "CreateMultipartUpload",
        "DeleteBucket",
        "DeleteBucketPolicy",
        "DeleteBucketTagging",
        "DeleteObject",
        "DeleteObjectTagging",
        "GetBucketLocation",
        "GetBucketPolicy",
        "GetBucketTagging",
        "GetBucketVersioning",
        "GetObject",
        "GetObjectTagging",
        "HeadBucket",
        "HeadObject",
        "ListBuckets",
        "ListObjectVersions",
        "ListObjectsV2",
        "ListParts",
        "PutBucketPolicy",
        "PutBucketTagging",
        "PutBucketVersioning",
        "PutObject",
        "PutObjectTagging",
        "UploadPart",
    ];
    assert_eq!(catalog.names(), expected);
    assert!(!catalog.is_lenient());
}

#[tokio::test]
async fn test_dry_run_checks_parameters_only() -> anyhow::Result<()> {
    let engine = Engine::new(builtin_catalog(), EngineSettings::default().with_dry_run(true));
    let group = TestGroup::new("dry", "admin")
        .with_run(PlanOperation::new("CreateBucket").param("bucket", "demo-bucket"))
        .with_run(
            PlanOperation::new("PutObject")
                .param("bucket", "demo-bucket")
                .param("key", "a/b.txt")
                .param("body", "hello"),
        )
        .with_run(PlanOperation::new("HeadBucket").param("bucket", "Bad_Name"))
        .with_run(PlanOperation::new("PutBucketVersioning").param("bucket", "demo-bucket"));

    let session = engine
        .run_plan(&plan("http://127.0.0.1:1", group), RunOptions::all())
        .await?;

    let statuses: Vec<_> = session.results().iter().map(|r| r.status()).collect();
    assert_eq!(
        statuses,
        [
            ResultStatus::Pass,
            ResultStatus::Pass,
            ResultStatus::Error,
            ResultStatus::Error
        ]
    );
    let message = session.results()[2].error_message().unwrap_or_default();
    assert!(message.contains("HeadBucket"), "{message}");
    assert!(message.contains("'bucket'"), "{message}");
    Ok(())
}

#[tokio::test]
async fn test_unreachable_endpoint_is_a_system_error() -> anyhow::Result<()> {
    let engine = Engine::new(builtin_catalog(), EngineSettings::default());
    let group = TestGroup::new("offline", "admin")
        .with_run(PlanOperation::new("ListBuckets"));

    let session = engine
        .run_plan(&plan("http://127.0.0.1:1", group), RunOptions::all())
        .await?;

    let record = &session.results()[0];
    assert_eq!(record.status(), ResultStatus::Error);
    assert!(record.error_code().is_none());
    Ok(())
}

#[test]
fn test_validation_flags_names_missing_from_catalog() {
    let group = TestGroup::new("g", "admin")
        .with_run(PlanOperation::new("ListBuckets"))
        .with_run(PlanOperation::new("PutObjekt"));
    let report = validate_plan(&plan("http://localhost:9000", group), &builtin_catalog());

    assert!(!report.is_ok());
    let errors: Vec<_> = report.errors().collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("PutObjekt"));
}

#[tokio::test]
async fn test_multipart_sequence_validates_in_dry_run() -> anyhow::Result<()> {
    let engine = Engine::new(builtin_catalog(), EngineSettings::default().with_dry_run(true));
    let upload = |name: &str| {
        PlanOperation::new(name)
            .param("bucket", "uploads")
            .param("key", "big.bin")
            .param("upload_id", "u-1")
    };
    let group = TestGroup::new("multipart", "admin")
        .with_run(
            PlanOperation::new("CreateMultipartUpload")
                .param("bucket", "uploads")
                .param("key", "big.bin"),
        )
        .with_run(upload("UploadPart").param("part_number", 1_i64).param("body", "chunk"))
        .with_run(upload("UploadPart").param("part_number", 10_001_i64).param("body", "chunk"))
        .with_run(upload("ListParts").param("max_parts", 10_i64))
        .with_run(upload("AbortMultipartUpload"))
        .with_run(PlanOperation::new("ListObjectVersions").param("bucket", "uploads"))
        .with_run(PlanOperation::new("GetBucketLocation").param("bucket", "uploads"));

    let session = engine
        .run_plan(&plan("http://127.0.0.1:1", group), RunOptions::all())
        .await?;

    let statuses: Vec<_> = session.results().iter().map(|r| r.status()).collect();
    assert_eq!(
        statuses,
        [
            ResultStatus::Pass,
            ResultStatus::Pass,
            ResultStatus::Error,
            ResultStatus::Pass,
            ResultStatus::Pass,
            ResultStatus::Pass,
            ResultStatus::Pass,
        ]
    );
    let message = session.results()[2].error_message().unwrap_or_default();
    assert!(message.contains("'part_number'"), "{message}");
    Ok(())
}
