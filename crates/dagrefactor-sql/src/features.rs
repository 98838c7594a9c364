//! Structural feature counts over normalized SQL

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use crate::normalize::normalize_sql;

static JOIN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bjoin\b").expect("static regex"));
static WINDOW_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bover\s*\(").expect("static regex"));
static AGGREGATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(count|sum|avg|min|max|array_agg|string_agg|listagg)\s*\(").expect("static regex")
});
static CASE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bcase\b").expect("static regex"));
static FILTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(where|having|qualify)\b").expect("static regex"));
static GROUP_BY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bgroup\s+by\b").expect("static regex"));
static UNION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bunion\b").expect("static regex"));
static CTE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\w+\s+as\s*\(\s*select\b").expect("static regex"));
static RANKING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bover\s*\(|\b(row_number|rank|dense_rank)\s*\(|\bqualify\b|\bpartition\s+by\b")
        .expect("static regex")
});

/// Keyword counts used by complexity scoring and similarity bucketing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SqlFeatures {
    pub joins: usize,
    pub window_functions: usize,
    pub aggregations: usize,
    pub case_statements: usize,
    pub filters: usize,
    pub group_bys: usize,
    pub unions: usize,
    pub ctes: usize,
    pub uses_ranking: bool,
}

impl SqlFeatures {
    pub fn from_sql(sql: &str) -> Self {
        Self::from_normalized(&normalize_sql(sql))
    }

    /// Count features in text already passed through `normalize_sql`
    pub fn from_normalized(normalized: &str) -> Self {
        let count = |re: &Regex| re.find_iter(normalized).count();
        Self {
            joins: count(&JOIN_RE),
            window_functions: count(&WINDOW_RE),
            aggregations: count(&AGGREGATION_RE),
            case_statements: count(&CASE_RE),
            filters: count(&FILTER_RE),
            group_bys: count(&GROUP_BY_RE),
            unions: count(&UNION_RE),
            ctes: count(&CTE_RE),
            uses_ranking: RANKING_RE.is_match(normalized),
        }
    }

    pub fn has_group_by(&self) -> bool {
        self.group_bys > 0
    }

    pub fn has_window(&self) -> bool {
        self.window_functions > 0
    }
}
