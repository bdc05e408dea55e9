//! AWS adapters for the bridge seams.
//!
//! [`KmsCustodian`] implements `KeyCustodian` against KMS and
//! [`CodeBuildJobs`] implements `JobService` against CodeBuild. Both speak
//! the JSON-1.1 protocol through [`client::JsonClient`], signed with SigV4.

pub mod client;
pub mod codebuild;
pub mod credentials;
pub mod kms;
pub mod sigv4;

pub use codebuild::CodeBuildJobs;
pub use credentials::{CredentialProvider, CredentialSource, Credentials};
pub use kms::KmsCustodian;
