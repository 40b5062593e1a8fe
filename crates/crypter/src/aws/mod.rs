//! AWS KMS access for the envelope provider.
//!
//! The provider only talks to the [`KeyService`] trait; [`AwsKeyService`] is
//! the production implementation over `aws-sdk-kms`.

pub mod kms;

pub use kms::{AwsKeyService, DataKey, KeyService};
