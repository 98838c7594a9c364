//! FROM / JOIN relation extraction
//!
//! Finds the relations a query reads (dbt refs, sources, CTEs or raw tables)
//! together with their aliases and, for joins, the byte span of the whole
//! join clause so it can be removed verbatim.

use std::ops::Range;
use serde::Serialize;
use crate::dbt_functions::{DbtFunctionExtractor, DbtReference};
use crate::scanner::{is_word_byte, Region, ScannedSql};
use crate::tokens::is_reserved;

const JOIN_MODIFIERS: &[&str] = &["left", "right", "inner", "outer", "full", "cross", "natural"];

/// Keywords that end a join clause
pub const CLAUSE_KEYWORDS: &[&str] = &[
    "where", "group by", "order by", "having", "qualify", "limit", "union", "intersect", "except",
    "window",
];

/// What a relation points at
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum RelationTarget {
    /// `{{ ref('model') }}`
    Ref(String),
    /// `{{ source('s', 't') }}` as `s.t`
    Source(String),
    /// CTE name or raw table, lowercased with quotes stripped
    Table(String),
}

/// A FROM/JOIN target with its optional alias
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Relation {
    pub target: RelationTarget,
    pub alias: Option<String>,
}

impl Relation {
    pub fn name(&self) -> &str {
        match &self.target {
            RelationTarget::Ref(name) | RelationTarget::Source(name) | RelationTarget::Table(name) => name,
        }
    }

    /// Name that columns of this relation are qualified with
    pub fn qualifier(&self) -> &str {
        if let Some(alias) = &self.alias {
            return alias;
        }
        let name = self.name();
        name.rsplit('.').next().unwrap_or(name)
    }

    /// Whether this relation reads the dbt dependency `identifier`
    pub fn reads_dependency(&self, identifier: &str) -> bool {
        match &self.target {
            RelationTarget::Ref(name) | RelationTarget::Source(name) => name == identifier,
            RelationTarget::Table(_) => false,
        }
    }

    /// Whether this relation reads the CTE `name`
    pub fn reads_table(&self, name: &str) -> bool {
        matches!(&self.target, RelationTarget::Table(table) if table == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClauseKind {
    From,
    Join,
}

/// A relation located in query text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationMatch {
    pub relation: Relation,
    pub clause: ClauseKind,
    /// Parenthesis depth of the FROM/JOIN keyword
    pub depth: u32,
    pub keyword: Range<usize>,
    pub target_span: Range<usize>,
    pub alias_span: Option<Range<usize>>,
    /// Whole clause: join modifiers through the ON/USING condition for joins,
    /// keyword through alias for FROM
    pub clause_span: Range<usize>,
}

/// Top-level relations of a query
pub fn relations(text: &str) -> Vec<Relation> {
    scan_relations(text)
        .into_iter()
        .filter(|m| m.depth == 0)
        .map(|m| m.relation)
        .collect()
}

/// Relations at every depth, in text order
pub fn scan_relations(text: &str) -> Vec<RelationMatch> {
    let scan = ScannedSql::scan(text);
    let bytes = text.as_bytes();

    let mut keywords: Vec<(Range<usize>, ClauseKind)> = scan
        .keyword_positions("from", None)
        .into_iter()
        .map(|r| (r, ClauseKind::From))
        .chain(
            scan.keyword_positions("join", None)
                .into_iter()
                .map(|r| (r, ClauseKind::Join)),
        )
        .collect();
    keywords.sort_by_key(|(range, _)| range.start);

    let mut matches = Vec::new();
    for (keyword, clause) in keywords {
        let Some(depth) = scan.depth_at(keyword.start) else { continue };
        let start = scan.skip_trivia(keyword.end, false);
        let Some((target, target_span)) = read_target(&scan, start) else { continue };

        // table-valued function such as unnest(...)
        let after = scan.skip_trivia(target_span.end, false);
        if bytes.get(after) == Some(&b'(') && matches!(target, RelationTarget::Table(_)) {
            continue;
        }

        let alias_span = read_alias(&scan, after, depth);
        let alias = alias_span
            .as_ref()
            .map(|span| text[span.clone()].to_ascii_lowercase());
        let relation_end = alias_span.as_ref().map_or(target_span.end, |s| s.end);

        let clause_start = match clause {
            ClauseKind::Join => join_start(&scan, keyword.start, depth),
            ClauseKind::From => keyword.start,
        };

        matches.push(RelationMatch {
            relation: Relation { target, alias },
            clause,
            depth,
            keyword,
            target_span,
            alias_span,
            clause_span: clause_start..relation_end,
        });
    }

    // extend each join to the start of the next clause at its depth
    let join_starts: Vec<(u32, usize)> = matches
        .iter()
        .filter(|m| m.clause == ClauseKind::Join)
        .map(|m| (m.depth, m.clause_span.start))
        .collect();
    for m in matches.iter_mut().filter(|m| m.clause == ClauseKind::Join) {
        let from = m.clause_span.end;
        let mut end = scan
            .find_any_keyword(from..scan.len(), CLAUSE_KEYWORDS, Some(m.depth))
            .map_or(scan.len(), |r| r.start);
        if let Some(next_join) = join_starts
            .iter()
            .filter(|(d, s)| *d == m.depth && *s >= from)
            .map(|(_, s)| *s)
            .min()
        {
            end = end.min(next_join);
        }
        if let Some(close) = (from..end).find(|&i| matches!(scan.region(i), Some(Region::Code(d)) if d < m.depth)) {
            end = close;
        }
        let trimmed = from + text[from..end].trim_end().len();
        m.clause_span = m.clause_span.start..trimmed;
    }

    matches
}

fn read_target(scan: &ScannedSql<'_>, start: usize) -> Option<(RelationTarget, Range<usize>)> {
    let text = scan.text();
    let bytes = text.as_bytes();

    if scan.region(start) == Some(Region::Template) {
        let mut end = start;
        while scan.region(end) == Some(Region::Template) {
            end += 1;
        }
        let expression = &text[start..end];
        let target = match DbtFunctionExtractor::parse_reference(expression) {
            Some(reference @ DbtReference::Ref { .. }) => RelationTarget::Ref(reference.identifier()),
            Some(reference @ DbtReference::Source { .. }) => RelationTarget::Source(reference.identifier()),
            None => RelationTarget::Table(expression.trim().to_string()),
        };
        return Some((target, start..end));
    }

    let mut end = start;
    while end < bytes.len() {
        let in_quoted = scan.region(end) == Some(Region::Literal) && bytes[start] != b'\'';
        let in_name = scan.depth_at(end).is_some() && (is_word_byte(bytes[end]) || bytes[end] == b'.');
        if in_quoted || in_name {
            end += 1;
        } else {
            break;
        }
    }
    if end == start {
        return None;
    }

    let name: String = text[start..end]
        .chars()
        .filter(|c| !matches!(c, '"' | '`'))
        .collect::<String>()
        .to_ascii_lowercase();
    if name.is_empty() || is_reserved(&name) {
        return None;
    }
    Some((RelationTarget::Table(name), start..end))
}

fn read_alias(scan: &ScannedSql<'_>, pos: usize, depth: u32) -> Option<Range<usize>> {
    let bytes = scan.text().as_bytes();
    let start = match scan.keyword_at(pos, "as", Some(depth)) {
        Some(end) => scan.skip_trivia(end, false),
        None => pos,
    };

    if !scan.is_code_at(start, depth) || !bytes.get(start).is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_') {
        return None;
    }
    let mut end = start;
    while end < bytes.len() && is_word_byte(bytes[end]) && scan.is_code_at(end, depth) {
        end += 1;
    }
    let word = &scan.text()[start..end];
    if is_reserved(word) || JOIN_MODIFIERS.contains(&word.to_ascii_lowercase().as_str()) {
        return None;
    }
    Some(start..end)
}

/// Walk back from a JOIN keyword over its modifiers
fn join_start(scan: &ScannedSql<'_>, join: usize, depth: u32) -> usize {
    let text = scan.text();
    let mut start = join;
    loop {
        let before = text[..start].trim_end();
        let word_start = before
            .rfind(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .map_or(0, |p| p + 1);
        let word = &before[word_start..];
        if word.is_empty()
            || !JOIN_MODIFIERS.contains(&word.to_ascii_lowercase().as_str())
            || !scan.is_code_at(word_start, depth)
        {
            return start;
        }
        start = word_start;
    }
}
