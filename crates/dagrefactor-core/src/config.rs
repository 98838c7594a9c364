//! Configuration schema (dagrefactor.toml)

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Tolerance used when checking that a weight table sums to 1.0
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// SQL dialect used when tokenizing model SQL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectConfig {
    /// BigQuery SQL dialect
    BigQuery,

    /// Snowflake SQL dialect
    Snowflake,

    /// PostgreSQL SQL dialect
    Postgres,

    /// Generic ANSI SQL
    Ansi,
}

impl Default for DialectConfig {
    fn default() -> Self {
        Self::Ansi
    }
}

/// Weights of the four similarity components. Must sum to 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityWeights {
    /// Textual similarity of normalized SQL bodies
    pub text: f64,

    /// Jaccard similarity of declared references
    pub refs: f64,

    /// Jaccard similarity of declared sources
    pub sources: f64,

    /// Ratio of matching structural features
    pub structure: f64,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            text: 0.4,
            refs: 0.3,
            sources: 0.2,
            structure: 0.1,
        }
    }
}

impl SimilarityWeights {
    pub fn sum(&self) -> f64 {
        self.text + self.refs + self.sources + self.structure
    }
}

/// Similarity engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityConfig {
    /// Pairs scoring at or above this value are reported
    #[serde(default = "default_similarity_threshold")]
    pub threshold: f64,

    #[serde(default)]
    pub weights: SimilarityWeights,
}

fn default_similarity_threshold() -> f64 {
    0.8
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            threshold: default_similarity_threshold(),
            weights: SimilarityWeights::default(),
        }
    }
}

/// Per-feature weights of the complexity score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityWeights {
    pub joins: f64,
    pub window_functions: f64,
    pub ctes: f64,
    pub aggregations: f64,
    /// Applied to references + sources
    pub dependencies: f64,
    pub case_statements: f64,
    pub filters: f64,
}

impl Default for ComplexityWeights {
    fn default() -> Self {
        Self {
            joins: 1.5,
            window_functions: 2.0,
            ctes: 1.0,
            aggregations: 1.0,
            dependencies: 1.0,
            case_statements: 0.5,
            filters: 0.5,
        }
    }
}

/// Complexity scorer settings
///
/// A model is complex when any one trip-wire fires: score above
/// `score_threshold`, more than `max_joins` joins, or SQL longer than
/// `max_sql_length` characters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityConfig {
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f64,

    #[serde(default = "default_max_joins")]
    pub max_joins: usize,

    #[serde(default = "default_max_sql_length")]
    pub max_sql_length: usize,

    /// Multiplier applied to the weighted sum before clamping to [0, 100]
    #[serde(default = "default_scale")]
    pub scale: f64,

    #[serde(default)]
    pub weights: ComplexityWeights,
}

fn default_score_threshold() -> f64 {
    70.0
}

fn default_max_joins() -> usize {
    5
}

fn default_max_sql_length() -> usize {
    1000
}

fn default_scale() -> f64 {
    2.0
}

impl Default for ComplexityConfig {
    fn default() -> Self {
        Self {
            score_threshold: default_score_threshold(),
            max_joins: default_max_joins(),
            max_sql_length: default_max_sql_length(),
            scale: default_scale(),
            weights: ComplexityWeights::default(),
        }
    }
}

/// Naming convention for intermediate models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamingConfig {
    /// Prefix of the identifier's leaf segment (after the last '.')
    #[serde(default = "default_intermediate_prefix")]
    pub intermediate_prefix: String,

    /// Regex matched against the full identifier. Takes precedence over the prefix.
    #[serde(default)]
    pub intermediate_pattern: Option<String>,
}

fn default_intermediate_prefix() -> String {
    "int_".to_string()
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            intermediate_prefix: default_intermediate_prefix(),
            intermediate_pattern: None,
        }
    }
}

impl NamingConfig {
    /// Build the predicate deciding which models are intermediates
    pub fn matcher(&self) -> Result<IntermediateMatcher, ConfigError> {
        match &self.intermediate_pattern {
            Some(pattern) => Regex::new(pattern)
                .map(IntermediateMatcher::Pattern)
                .map_err(|e| ConfigError::InvalidPattern(pattern.clone(), e.to_string())),
            None => Ok(IntermediateMatcher::Prefix(self.intermediate_prefix.clone())),
        }
    }
}

/// Compiled intermediate-model predicate
#[derive(Debug, Clone)]
pub enum IntermediateMatcher {
    /// Leaf segment starts with the prefix
    Prefix(String),

    /// Full identifier matches the regex
    Pattern(Regex),
}

impl IntermediateMatcher {
    pub fn matches(&self, unique_id: &str) -> bool {
        match self {
            Self::Prefix(prefix) => {
                let leaf = unique_id.rsplit('.').next().unwrap_or(unique_id);
                leaf.starts_with(prefix.as_str())
            }
            Self::Pattern(regex) => regex.is_match(unique_id),
        }
    }
}

impl Default for IntermediateMatcher {
    fn default() -> Self {
        Self::Prefix(default_intermediate_prefix())
    }
}

/// Allowlist rules for specific models or patterns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllowlistRules {
    /// Models excluded from analysis entirely (glob patterns over unique_id or name)
    #[serde(default)]
    pub skip_models: Vec<String>,
}

impl AllowlistRules {
    /// Check if a model matches any pattern in the list
    fn matches_pattern(model: &str, patterns: &[String]) -> bool {
        patterns.iter().any(|pattern| {
            if pattern.contains('*') {
                glob_match(pattern, model)
            } else {
                pattern == model
            }
        })
    }

    /// Check if a model should be skipped
    pub fn is_model_skipped(&self, model: &str) -> bool {
        Self::matches_pattern(model, &self.skip_models)
    }
}

/// Refactoring generator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriteConfig {
    /// Generate rewritten SQL for redundant-reference findings
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// SQL dialect used by the tokenizer
    #[serde(default)]
    pub dialect: DialectConfig,

    #[serde(default)]
    pub similarity: SimilarityConfig,

    #[serde(default)]
    pub complexity: ComplexityConfig,

    #[serde(default)]
    pub naming: NamingConfig,

    #[serde(default)]
    pub allowlist: AllowlistRules,

    #[serde(default)]
    pub rewrite: RewriteConfig,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: std::path::PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dialect: DialectConfig::default(),
            similarity: SimilarityConfig::default(),
            complexity: ComplexityConfig::default(),
            naming: NamingConfig::default(),
            allowlist: AllowlistRules::default(),
            rewrite: RewriteConfig::default(),
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut config = Self::from_toml(&contents)?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Check value ranges, weight sums and the naming pattern
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sum = self.similarity.weights.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::InvalidWeights(sum));
        }

        let threshold = self.similarity.threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::InvalidThreshold(format!(
                "similarity.threshold must be within [0, 1], got {}",
                threshold
            )));
        }

        let score = self.complexity.score_threshold;
        if !(0.0..=100.0).contains(&score) {
            return Err(ConfigError::InvalidThreshold(format!(
                "complexity.score_threshold must be within [0, 100], got {}",
                score
            )));
        }

        if self.complexity.scale <= 0.0 {
            return Err(ConfigError::InvalidThreshold(format!(
                "complexity.scale must be positive, got {}",
                self.complexity.scale
            )));
        }

        self.naming.matcher().map(|_| ())
    }
}

/// Simple glob matching (supports * and **)
fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern == "*" || pattern == "**" {
        return true;
    }

    if let Some(star_pos) = pattern.find('*') {
        let prefix = &pattern[..star_pos];
        let suffix = &pattern[star_pos + 1..];

        text.starts_with(prefix) && text.ends_with(suffix)
    } else {
        pattern == text
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Similarity weights must sum to 1.0, got {0}")]
    InvalidWeights(f64),

    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("Invalid intermediate pattern '{0}': {1}")]
    InvalidPattern(String, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.dialect, DialectConfig::Ansi);
        assert_eq!(config.similarity.threshold, 0.8);
        assert_eq!(config.complexity.max_joins, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_weights_not_summing_to_one() {
        let toml = r#"
            [similarity.weights]
            text = 0.5
            refs = 0.3
            sources = 0.2
            structure = 0.1
        "#;

        let err = Config::from_toml(toml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWeights(_)));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let toml = r#"
            [similarity]
            threshold = 0.9

            [naming]
            intermediate_prefix = "mid_"
        "#;

        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.similarity.threshold, 0.9);
        assert_eq!(config.similarity.weights, SimilarityWeights::default());
        assert_eq!(config.complexity.max_sql_length, 1000);

        let matcher = config.naming.matcher().unwrap();
        assert!(matcher.matches("model.shop.mid_orders"));
        assert!(!matcher.matches("model.shop.int_orders"));
    }

    #[test]
    fn intermediate_matcher_uses_leaf_segment() {
        let matcher = IntermediateMatcher::default();
        assert!(matcher.matches("model.shop.int_orders"));
        assert!(matcher.matches("int_orders"));
        assert!(!matcher.matches("model.int_project.stg_orders"));
    }

    #[test]
    fn intermediate_pattern_overrides_prefix() {
        let naming = NamingConfig {
            intermediate_prefix: "int_".to_string(),
            intermediate_pattern: Some(r"\.intermediate__".to_string()),
        };
        let matcher = naming.matcher().unwrap();
        assert!(matcher.matches("model.shop.intermediate__orders"));
        assert!(!matcher.matches("model.shop.int_orders"));
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let naming = NamingConfig {
            intermediate_prefix: "int_".to_string(),
            intermediate_pattern: Some("(".to_string()),
        };
        assert!(matches!(naming.matcher(), Err(ConfigError::InvalidPattern(_, _))));
    }

    #[test]
    fn allowlist_pattern_matching() {
        let rules = AllowlistRules {
            skip_models: vec!["model.shop.legacy_*".to_string()],
        };

        assert!(rules.is_model_skipped("model.shop.legacy_orders"));
        assert!(!rules.is_model_skipped("model.shop.orders"));
    }

    #[test]
    fn config_toml_roundtrip() {
        let config = Config::default();
        let toml = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(config.similarity, parsed.similarity);
        assert_eq!(config.complexity, parsed.complexity);
    }

    #[test]
    fn glob_matching() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("staging.*", "staging.users"));
        assert!(glob_match("*.sql", "model.sql"));
        assert!(!glob_match("staging.*", "prod.users"));
    }
}
