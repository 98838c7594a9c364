//! Column reference tokenization
//!
//! Uses the sqlparser tokenizer for the configured dialect and falls back to a
//! regex scan when the tokenizer rejects the input (unbalanced quotes, exotic
//! syntax inside Jinja-heavy models).

use std::collections::BTreeSet;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use sqlparser::dialect::{BigQueryDialect, Dialect, GenericDialect, PostgreSqlDialect, SnowflakeDialect};
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Token, Tokenizer, Word};
use dagrefactor_core::DialectConfig;
use crate::scanner::ScannedSql;

/// Words that are never column references
const RESERVED: &[&str] = &[
    "all", "and", "any", "as", "asc", "between", "by", "case", "cast", "cross", "current",
    "current_date", "current_time", "current_timestamp", "desc", "distinct", "else", "end",
    "escape", "except", "exists", "false", "fetch", "filter", "first", "following", "for",
    "from", "full", "group", "having", "ilike", "in", "inner", "intersect", "interval", "is",
    "join", "last", "lateral", "left", "like", "limit", "localtime", "localtimestamp",
    "materialized", "natural", "not", "null", "nulls", "offset", "on", "or", "order", "outer",
    "over", "partition", "preceding", "qualify", "range", "recursive", "right", "row", "rows",
    "select", "similar", "some", "then", "true", "unbounded", "union", "using", "values",
    "when", "where", "window", "with", "within",
];

/// Date parts that may precede `FROM` inside `extract(...)`
const DATE_PARTS: &[&str] = &[
    "year", "quarter", "month", "week", "day", "dow", "doy", "hour", "minute", "second", "epoch",
];

static FALLBACK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z_][\w$]*)(?:\s*\.\s*([A-Za-z_][\w$]*|\*))*(\s*\()?").expect("static regex")
});

pub fn is_reserved(word: &str) -> bool {
    RESERVED.contains(&word.to_ascii_lowercase().as_str())
}

/// A column token, optionally qualified by a relation name or alias
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ColumnRef {
    pub qualifier: Option<String>,
    pub column: String,
}

impl ColumnRef {
    pub fn new(qualifier: Option<&str>, column: &str) -> Self {
        Self {
            qualifier: qualifier.map(str::to_string),
            column: column.to_string(),
        }
    }
}

/// Tokenizer with configurable dialect
#[derive(Debug)]
pub struct ColumnTokenizer {
    dialect: Box<dyn Dialect>,
}

impl ColumnTokenizer {
    /// Create a tokenizer with the generic dialect
    pub fn new() -> Self {
        Self {
            dialect: Box::new(GenericDialect {}),
        }
    }

    /// Create a tokenizer from a dialect config
    pub fn from_dialect(dialect: &DialectConfig) -> Self {
        let dialect: Box<dyn Dialect> = match dialect {
            DialectConfig::BigQuery => Box::new(BigQueryDialect {}),
            DialectConfig::Snowflake => Box::new(SnowflakeDialect {}),
            DialectConfig::Postgres => Box::new(PostgreSqlDialect {}),
            DialectConfig::Ansi => Box::new(GenericDialect {}),
        };
        Self { dialect }
    }

    /// Column references in `sql`, de-duplicated in order of first appearance.
    ///
    /// Unqualified names in `exclude` (relation names, aliases, CTE names) are dropped.
    pub fn column_refs(&self, sql: &str, exclude: &BTreeSet<String>) -> Vec<ColumnRef> {
        let scan = ScannedSql::scan(sql);
        let text = scan.without_templates();

        let raw = match Tokenizer::new(self.dialect.as_ref(), &text).tokenize() {
            Ok(tokens) => Self::from_tokens(&tokens),
            Err(err) => {
                tracing::debug!(error = %err, "tokenizer rejected input, using regex fallback");
                Self::from_regex(&scan.masked())
            }
        };

        let mut seen = BTreeSet::new();
        raw.into_iter()
            .filter(|r| r.qualifier.is_some() || !exclude.contains(&r.column))
            .filter(|r| seen.insert(r.clone()))
            .collect()
    }

    fn from_tokens(tokens: &[Token]) -> Vec<ColumnRef> {
        let tokens: Vec<&Token> = tokens
            .iter()
            .filter(|t| !matches!(t, Token::Whitespace(_)))
            .collect();

        let mut refs = Vec::new();
        let mut i = 0;
        while i < tokens.len() {
            let Token::Word(first) = tokens[i] else {
                i += 1;
                continue;
            };

            let mut chain: Vec<&Word> = vec![first];
            let mut wildcard = false;
            let mut j = i + 1;
            while j + 1 < tokens.len() && matches!(tokens[j], Token::Period) {
                match tokens[j + 1] {
                    Token::Word(word) => {
                        chain.push(word);
                        j += 2;
                    }
                    Token::Mul => {
                        wildcard = true;
                        j += 2;
                        break;
                    }
                    _ => break,
                }
            }

            let prev = i.checked_sub(1).map(|p| tokens[p]);
            let before_prev = i.checked_sub(2).map(|p| tokens[p]);
            let next = tokens.get(j).copied();
            i = j;

            if wildcard || matches!(next, Some(Token::LParen)) {
                continue;
            }
            if matches!(prev, Some(Token::DoubleColon) | Some(Token::Period)) {
                continue;
            }
            if let Some(Token::Word(p)) = prev {
                let introduces_name = p.quote_style.is_none()
                    && matches!(p.keyword, Keyword::FROM | Keyword::JOIN | Keyword::AS | Keyword::INTO);
                let is_extract = p.keyword == Keyword::FROM
                    && matches!(before_prev, Some(Token::Word(w)) if DATE_PARTS.contains(&w.value.to_ascii_lowercase().as_str()));
                if introduces_name && !is_extract {
                    continue;
                }
            }

            let Some(column) = chain.last() else { continue };
            if chain.len() == 1 && column.quote_style.is_none() {
                let lower = column.value.to_ascii_lowercase();
                let date_part = DATE_PARTS.contains(&lower.as_str())
                    && matches!(next, Some(Token::Word(w)) if w.keyword == Keyword::FROM);
                if date_part || is_reserved(&lower) {
                    continue;
                }
            }

            let qualifier = (chain.len() >= 2).then(|| normalize_word(chain[chain.len() - 2]));
            refs.push(ColumnRef {
                qualifier,
                column: normalize_word(column),
            });
        }
        refs
    }

    fn from_regex(masked: &str) -> Vec<ColumnRef> {
        let mut refs = Vec::new();
        for caps in FALLBACK_RE.captures_iter(masked) {
            let Some(whole) = caps.get(0) else { continue };
            if caps.get(3).is_some() {
                continue;
            }

            let before = masked[..whole.start()].trim_end();
            if before.ends_with('.') || before.ends_with("::") {
                continue;
            }
            let prev_word = before
                .rsplit(|c: char| !c.is_ascii_alphanumeric() && c != '_')
                .next()
                .unwrap_or("")
                .to_ascii_lowercase();
            if matches!(prev_word.as_str(), "from" | "join" | "as" | "into") {
                continue;
            }

            let parts: Vec<String> = whole
                .as_str()
                .split('.')
                .map(|p| p.trim().to_ascii_lowercase())
                .collect();
            let Some(column) = parts.last() else { continue };
            if column == "*" || (parts.len() == 1 && is_reserved(column)) {
                continue;
            }
            let qualifier = (parts.len() >= 2).then(|| parts[parts.len() - 2].clone());
            refs.push(ColumnRef {
                qualifier,
                column: column.clone(),
            });
        }
        refs
    }
}

impl Default for ColumnTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercase unquoted identifiers; quoted ones keep their spelling
fn normalize_word(word: &Word) -> String {
    match word.quote_style {
        Some(_) => word.value.clone(),
        None => word.value.to_ascii_lowercase(),
    }
}
