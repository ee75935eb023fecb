//! Built-in S3 operations for the s3probe engine.
//!
//! Bucket, object, sub-resource and multipart operations. Each one validates
//! the plan's parameter map into typed parameters, issues one SDK call and
//! captures the result. Service error responses become
//! failed outcomes carrying the S3 error code; connection, timeout and response
//! parsing problems are reported as faults.
//!
//! ```no_run
//! use s3probe_core::{Engine, EngineSettings};
//!
//! let engine = Engine::new(s3probe_ops::builtin_catalog(), EngineSettings::default());
//! ```

pub mod bucket;
pub mod bucket_config;
pub mod multipart;
mod names;
pub mod object;
mod sdk;

use s3probe_core::OperationCatalog;

pub use bucket::{
    CreateBucket, DeleteBucket, GetBucketLocation, HeadBucket, ListBuckets, ListObjectVersions,
    ListObjectsV2,
};
pub use bucket_config::{
    DeleteBucketPolicy, DeleteBucketTagging, GetBucketPolicy, GetBucketTagging,
    GetBucketVersioning, PutBucketPolicy, PutBucketTagging, PutBucketVersioning,
};
pub use multipart::{
    AbortMultipartUpload, CompleteMultipartUpload, CreateMultipartUpload, ListParts, UploadPart,
};
pub use object::{
    CopyObject, DeleteObject, DeleteObjectTagging, GetObject, GetObjectTagging, HeadObject,
    PutObject, PutObjectTagging,
};

/// A catalog with every built-in operation registered under its S3 API name.
pub fn builtin_catalog() -> OperationCatalog {
    OperationCatalog::new()
        .with(CreateBucket)
        .with(DeleteBucket)
        .with(HeadBucket)
        .with(ListBuckets)
        .with(ListObjectsV2)
        .with(ListObjectVersions)
        .with(GetBucketLocation)
        .with(GetBucketVersioning)
        .with(PutBucketVersioning)
        .with(GetBucketTagging)
        .with(PutBucketTagging)
        .with(DeleteBucketTagging)
        .with(GetBucketPolicy)
        .with(PutBucketPolicy)
        .with(DeleteBucketPolicy)
        .with(PutObject)
        .with(GetObject)
        .with(HeadObject)
        .with(DeleteObject)
        .with(CopyObject)
        .with(GetObjectTagging)
        .with(PutObjectTagging)
        .with(DeleteObjectTagging)
        .with(CreateMultipartUpload)
        .with(UploadPart)
        .with(ListParts)
        .with(CompleteMultipartUpload)
        .with(AbortMultipartUpload)
}
