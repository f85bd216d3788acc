//! Shared entity model every backend adapter speaks.

mod deployment;
mod filter;
mod package;

pub use deployment::{
    Deployment, DeploymentCondition, DeploymentHistory, DeploymentRequest, DeploymentRevision,
    DeploymentStatus, DeploymentStatusDetail, DeploymentUpdate, LogOptions,
};
pub use filter::Filter;
pub use package::{DeploymentPackage, PackageUpload};
