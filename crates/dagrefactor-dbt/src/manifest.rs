//! dbt manifest.json parsing
//!
//! Parses dbt-generated manifest.json to extract models, sources, and dependencies.
//! Only the fields the analysis needs are modelled; required fields that are
//! missing or ill-typed fail the load instead of surfacing later as gaps.

use dagrefactor_core::AnalysisError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// dbt manifest.json structure (subset of fields we care about)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Metadata about the manifest
    pub metadata: ManifestMetadata,

    /// Model, test, seed and snapshot nodes
    pub nodes: HashMap<String, ManifestNode>,

    /// Source definitions
    #[serde(default)]
    pub sources: HashMap<String, ManifestSource>,
}

impl Manifest {
    /// Load manifest from file
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ManifestError::IoError(path.display().to_string(), e.to_string()))?;

        Self::from_str(&contents)
    }

    /// Parse manifest from JSON string
    pub fn from_str(json: &str) -> Result<Self, ManifestError> {
        serde_json::from_str(json)
            .map_err(|e| ManifestError::ParseError(e.to_string()))
    }

    /// Get all enabled model nodes (filters out tests, seeds, etc.), ordered by unique_id
    pub fn models(&self) -> BTreeMap<&str, &ManifestNode> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.is_model() && node.config.enabled)
            .map(|(id, node)| (id.as_str(), node))
            .collect()
    }

    /// Get a specific node by unique_id
    pub fn get_node(&self, unique_id: &str) -> Option<&ManifestNode> {
        self.nodes.get(unique_id)
    }

    /// Get a specific source by unique_id
    pub fn get_source(&self, unique_id: &str) -> Option<&ManifestSource> {
        self.sources.get(unique_id)
    }
}

/// Manifest metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub dbt_schema_version: String,
    pub dbt_version: String,
    #[serde(default)]
    pub generated_at: Option<String>,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub invocation_id: Option<String>,
}

/// A node in the manifest (model, test, snapshot, etc.)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestNode {
    /// Unique identifier (e.g., "model.my_project.users")
    pub unique_id: String,

    /// Node name (e.g., "users")
    pub name: String,

    /// Resource type (model, test, snapshot, etc.)
    pub resource_type: String,

    /// Package name
    #[serde(default)]
    pub package_name: String,

    /// Original file path
    #[serde(default)]
    pub original_file_path: String,

    /// Raw, uncompiled SQL. dbt < 1.3 calls this `raw_sql`.
    #[serde(default, alias = "raw_sql")]
    pub raw_code: Option<String>,

    /// Declared `ref()` calls
    #[serde(default)]
    pub refs: Vec<RefEntry>,

    /// Declared `source()` calls as [source_name, table_name]
    #[serde(default)]
    pub sources: Vec<Vec<String>>,

    /// Node configuration
    #[serde(default)]
    pub config: NodeConfig,

    /// Resolved dependencies
    #[serde(default)]
    pub depends_on: DependsOn,

    /// Fully qualified name
    #[serde(default)]
    pub fqn: Vec<String>,
}

impl ManifestNode {
    pub fn is_model(&self) -> bool {
        self.resource_type == "model"
    }
}

/// A declared ref. Older manifests store `["name"]` or `["package", "name"]`,
/// newer ones store `{"name": ..., "package": ..., "version": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RefEntry {
    Structured {
        name: String,
        #[serde(default)]
        package: Option<String>,
        #[serde(default)]
        version: Option<serde_json::Value>,
    },
    Legacy(Vec<String>),
}

impl RefEntry {
    /// Referenced model name
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Structured { name, .. } => Some(name),
            Self::Legacy(parts) => parts.last().map(String::as_str),
        }
    }
}

/// Node configuration (from dbt_project.yml or model config)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Whether the node is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Materialization type
    #[serde(default)]
    pub materialized: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            materialized: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Dependencies structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependsOn {
    /// List of node unique_ids this node depends on
    #[serde(default)]
    pub nodes: Vec<String>,
}

/// A source in the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestSource {
    /// Unique identifier (e.g., "source.my_project.raw.users")
    pub unique_id: String,

    /// Source name (e.g., "raw")
    pub source_name: String,

    /// Table name (e.g., "users")
    pub name: String,

    /// Schema name
    #[serde(default)]
    pub schema: Option<String>,

    /// Identifier (actual table name)
    #[serde(default)]
    pub identifier: Option<String>,
}

/// Manifest parsing and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to read manifest file {0}: {1}")]
    IoError(String, String),

    #[error("Failed to parse manifest JSON: {0}")]
    ParseError(String),

    #[error("Node {node} is missing required field '{field}'")]
    MissingField { node: String, field: String },

    #[error("Node {node} is invalid: {reason}")]
    InvalidNode { node: String, reason: String },

    #[error("Dependency cycle between: {}", .0.join(", "))]
    CyclicDependency(Vec<String>),
}

impl From<ManifestError> for AnalysisError {
    fn from(err: ManifestError) -> Self {
        match err {
            ManifestError::CyclicDependency(nodes) => AnalysisError::CyclicDependency(nodes),
            other => AnalysisError::MalformedManifest(other.to_string()),
        }
    }
}
