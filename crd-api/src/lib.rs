//! The `BucketPodAttachment` custom resource: wire schema, labels/annotations, and CRD bootstrap.

pub use bpar::{BucketPodAttachment, BucketPodAttachmentSpec, BucketPodAttachmentStatus, WorkloadAttachment};

mod bpar;
pub mod labels;
pub mod setup;
