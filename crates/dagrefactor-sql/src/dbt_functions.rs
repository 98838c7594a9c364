//! dbt-specific function extraction
//!
//! Handles dbt Jinja templates like {{ ref('model') }}, {{ source('source', 'table') }}
//! and the {{ config(...) }} block.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::ops::Range;

static REF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"\bref\s*\(\s*['"]([^'"]+)['"]\s*(?:,\s*['"]([^'"]+)['"]\s*)?(?:,\s*(?:v|version)\s*=\s*[^)]*)?\)"#,
    )
    .expect("static regex")
});

static SOURCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bsource\s*\(\s*['"]([^'"]+)['"]\s*,\s*['"]([^'"]+)['"]\s*\)"#).expect("static regex")
});

static CONFIG_OPEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{-?\s*config\s*\(").expect("static regex"));

/// A reference to a dbt model or source
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum DbtReference {
    /// ref('model_name') or ref('package', 'model_name')
    Ref {
        package: Option<String>,
        model_name: String,
    },

    /// source('source_name', 'table_name')
    Source {
        source_name: String,
        table_name: String,
    },
}

impl DbtReference {
    /// Dependency identifier: the model name, or `source_name.table` for sources
    pub fn identifier(&self) -> String {
        match self {
            Self::Ref { model_name, .. } => model_name.clone(),
            Self::Source { source_name, table_name } => format!("{source_name}.{table_name}"),
        }
    }

    /// Render as a Jinja expression
    pub fn render(&self) -> String {
        match self {
            Self::Ref { package: Some(package), model_name } => {
                format!("{{{{ ref('{package}', '{model_name}') }}}}")
            }
            Self::Ref { package: None, model_name } => format!("{{{{ ref('{model_name}') }}}}"),
            Self::Source { source_name, table_name } => {
                format!("{{{{ source('{source_name}', '{table_name}') }}}}")
            }
        }
    }
}

/// Extracts dbt-specific functions from SQL
pub struct DbtFunctionExtractor;

impl DbtFunctionExtractor {
    /// Extract all dbt references from SQL, in order of appearance
    ///
    /// Both one- and two-argument `ref()` forms are recognised; the last
    /// positional argument is the model name.
    pub fn extract(sql: &str) -> Vec<DbtReference> {
        let mut found: Vec<(usize, DbtReference)> = REF_RE
            .captures_iter(sql)
            .filter_map(|caps| {
                let start = caps.get(0)?.start();
                let first = caps.get(1)?.as_str().to_string();
                let reference = match caps.get(2) {
                    Some(second) => DbtReference::Ref {
                        package: Some(first),
                        model_name: second.as_str().to_string(),
                    },
                    None => DbtReference::Ref {
                        package: None,
                        model_name: first,
                    },
                };
                Some((start, reference))
            })
            .collect();

        found.extend(SOURCE_RE.captures_iter(sql).filter_map(|caps| {
            let start = caps.get(0)?.start();
            Some((
                start,
                DbtReference::Source {
                    source_name: caps.get(1)?.as_str().to_string(),
                    table_name: caps.get(2)?.as_str().to_string(),
                },
            ))
        }));

        found.sort_by_key(|(start, _)| *start);
        found.into_iter().map(|(_, reference)| reference).collect()
    }

    /// Dependency identifiers referenced anywhere in `sql`
    pub fn dependencies(sql: &str) -> BTreeSet<String> {
        Self::extract(sql).iter().map(DbtReference::identifier).collect()
    }

    /// Parse a single Jinja expression such as `{{ ref('orders') }}`
    pub fn parse_reference(expression: &str) -> Option<DbtReference> {
        Self::extract(expression).into_iter().next()
    }

    /// Byte range of the first `{{ config(...) }}` block, including braces
    pub fn config_block(sql: &str) -> Option<Range<usize>> {
        let open = CONFIG_OPEN_RE.find(sql)?;
        let bytes = sql.as_bytes();

        // balance the config( ... ) call, skipping quoted text
        let mut depth = 1usize;
        let mut quote: Option<u8> = None;
        let mut i = open.end();
        while i < bytes.len() && depth > 0 {
            let b = bytes[i];
            match quote {
                Some(q) if b == q => quote = None,
                Some(_) => {}
                None => match b {
                    b'\'' | b'"' => quote = Some(b),
                    b'(' => depth += 1,
                    b')' => depth -= 1,
                    _ => {}
                },
            }
            i += 1;
        }
        if depth != 0 {
            return None;
        }

        let close = sql[i..].find("}}")?;
        let between = sql[i..i + close].trim();
        if !between.is_empty() && between != "-" {
            return None;
        }
        Some(open.start()..i + close + 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_ref() {
        let sql = "SELECT * FROM {{ ref('users') }}";
        let refs = DbtFunctionExtractor::extract(sql);

        assert_eq!(refs.len(), 1);
        assert_eq!(
            refs[0],
            DbtReference::Ref {
                package: None,
                model_name: "users".to_string()
            }
        );
    }

    #[test]
    fn extract_two_argument_ref() {
        let refs = DbtFunctionExtractor::extract("select * from {{ ref(\"core\", \"users\") }}");
        assert_eq!(refs[0].identifier(), "users");
        assert_eq!(refs[0].render(), "{{ ref('core', 'users') }}");
    }

    #[test]
    fn extract_source() {
        let sql = "SELECT * FROM {{ source('raw', 'users') }}";
        let refs = DbtFunctionExtractor::extract(sql);

        assert_eq!(refs.len(), 1);
        if let DbtReference::Source { source_name, table_name } = &refs[0] {
            assert_eq!(source_name, "raw");
            assert_eq!(table_name, "users");
        } else {
            panic!("expected source");
        }
        assert_eq!(refs[0].identifier(), "raw.users");
    }

    #[test]
    fn extract_multiple_in_order() {
        let sql = r#"
            WITH base AS (
                SELECT * FROM {{ source('raw', 'users') }}
            ),
            filtered AS (
                SELECT * FROM {{ ref('staging_users') }}
            )
            SELECT * FROM filtered
        "#;

        let refs = DbtFunctionExtractor::extract(sql);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].identifier(), "raw.users");
        assert_eq!(refs[1].identifier(), "staging_users");
    }

    #[test]
    fn config_block_is_balanced() {
        let sql = "{{ config(materialized='table', tags=['a', 'b)'], meta={'x': (1)}) }}\nselect 1";
        let range = DbtFunctionExtractor::config_block(sql).unwrap();
        assert!(sql[range.clone()].starts_with("{{ config("));
        assert!(sql[range.clone()].ends_with("}}"));
        assert_eq!(sql[range.end..].trim(), "select 1");
    }

    #[test]
    fn no_config_block() {
        assert!(DbtFunctionExtractor::config_block("select 1").is_none());
        assert!(DbtFunctionExtractor::config_block("{{ config(materialized='view' }}").is_none());
    }
}
