//! dbt artifact parsing and DAG construction
//!
//! This crate handles:
//! - Parsing manifest.json (dbt-generated artifacts)
//! - Validating model nodes into a typed `Project`
//! - Building dependency graphs (DAG) and impact traversal

pub mod manifest;
pub mod dag;
pub mod project;

pub use manifest::{
    DependsOn, Manifest, ManifestError, ManifestMetadata, ManifestNode, ManifestSource, NodeConfig,
    RefEntry,
};
pub use dag::{DependencyGraph, NodeId};
pub use project::{ModelNode, Project, ResourceKind};
