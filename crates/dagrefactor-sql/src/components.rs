//! SQL component parsing
//!
//! Splits a raw dbt model into its config block, CTE list and main query,
//! and extracts per-query structure (dependencies, select items, relations,
//! filters, column references). This is deliberately not a full SQL parser:
//! it only isolates what the refactoring detectors need and never fails on
//! syntax it does not understand, except when there is no SELECT at all.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use dagrefactor_core::DialectConfig;
use crate::dbt_functions::DbtFunctionExtractor;
use crate::normalize::normalize_sql;
use crate::relations::{scan_relations, Relation, RelationTarget};
use crate::scanner::{is_word_byte, Region, ScannedSql};
use crate::tokens::{is_reserved, ColumnRef, ColumnTokenizer};

/// `select * from <cte> [alias] [where 1=1 | where true]`
static TRIVIAL_ALIAS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^select \* from ([\w$]+)(?: (?:as )?[\w$]+)?(?: where (?:1 ?= ?1|true))?$")
        .expect("static regex")
});

static BARE_ALIAS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^(.*[\w)'\x22\]])\s+([A-Za-z_][\w$]*)$").expect("static regex"));

static COLUMN_PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(?:(?:[A-Za-z_][\w$]*|"[^"]+"|`[^`]+`)\.)*([A-Za-z_][\w$]*|"[^"]+"|`[^`]+`)$"#)
        .expect("static regex")
});

/// Keywords that end the select list
const SELECT_LIST_END: &[&str] = &[
    "from", "where", "group by", "having", "qualify", "order by", "limit", "union", "intersect",
    "except", "window",
];

/// Keywords that end a WHERE clause
const WHERE_END: &[&str] = &[
    "group by", "order by", "having", "qualify", "limit", "union", "intersect", "except", "window",
];

/// Recoverable parse failure, recorded per model
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Malformed SQL: {0}")]
    MalformedSql(String),
}

/// One item of a select list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectItem {
    /// `*` or `t.*`
    Wildcard { qualifier: Option<String> },

    Expression {
        /// Expression text without its alias
        expression: String,
        /// Output column name
        name: String,
        alias: Option<String>,
        /// Columns the expression reads
        refs: Vec<ColumnRef>,
    },
}

impl SelectItem {
    pub fn output_name(&self) -> String {
        match self {
            Self::Wildcard { qualifier: Some(q) } => format!("{q}.*"),
            Self::Wildcard { qualifier: None } => "*".to_string(),
            Self::Expression { name, .. } => name.clone(),
        }
    }
}

/// Structure of one query (a CTE body or the main query)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryParts {
    /// dbt dependency identifiers (`model`, `source.table`)
    pub dependencies: BTreeSet<String>,
    pub select_items: Vec<SelectItem>,
    /// Top-level FROM/JOIN relations
    pub relations: Vec<Relation>,
    /// Top-level WHERE predicates
    pub filters: Vec<String>,
    pub column_refs: Vec<ColumnRef>,
    /// Earlier CTEs read at any depth
    pub upstream_ctes: BTreeSet<String>,
}

/// A common table expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CteReference {
    pub name: String,
    pub body: String,
    pub dependencies: BTreeSet<String>,
    /// Projected column names (`*` / `t.*` for wildcards)
    pub columns: Vec<String>,
    pub filters: Vec<String>,
    pub is_constant: bool,
    pub select_items: Vec<SelectItem>,
    pub relations: Vec<Relation>,
    pub upstream_ctes: BTreeSet<String>,
    pub column_refs: Vec<ColumnRef>,
}

impl CteReference {
    fn new(name: String, body: String, parts: QueryParts, is_constant: bool) -> Self {
        Self {
            columns: parts.select_items.iter().map(SelectItem::output_name).collect(),
            name,
            body,
            dependencies: parts.dependencies,
            filters: parts.filters,
            is_constant,
            select_items: parts.select_items,
            relations: parts.relations,
            upstream_ctes: parts.upstream_ctes,
            column_refs: parts.column_refs,
        }
    }

    /// Whether this CTE reads exactly one dbt dependency and nothing else
    pub fn reads_only(&self, identifier: &str) -> bool {
        self.dependencies.len() == 1
            && self.dependencies.contains(identifier)
            && self.upstream_ctes.is_empty()
    }
}

/// Columns a query exposes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnSet {
    pub names: BTreeSet<String>,
    /// A wildcard over a relation whose columns are unknown
    pub wildcard: bool,
}

impl ColumnSet {
    pub fn exposes(&self, column: &str) -> bool {
        self.wildcard || (column != "*" && self.names.contains(column))
    }

    pub fn exposes_all<'a>(&self, columns: impl IntoIterator<Item = &'a String>) -> bool {
        columns.into_iter().all(|c| self.exposes(c))
    }
}

/// A parsed model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlComponent {
    /// Literal `{{ config(...) }}` text
    pub config_block: Option<String>,
    /// Jinja or comments between the config block and `WITH`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preamble: Option<String>,
    /// CTEs in definition order
    pub ctes: Vec<CteReference>,
    pub main_query: String,
    /// CTE name -> columns referenced in its body
    pub referenced_columns: BTreeMap<String, BTreeSet<String>>,
    pub main: QueryParts,
}

impl SqlComponent {
    pub fn get(&self, name: &str) -> Option<&CteReference> {
        self.ctes.iter().find(|cte| cte.name.eq_ignore_ascii_case(name))
    }

    pub fn cte_names(&self) -> impl Iterator<Item = &str> {
        self.ctes.iter().map(|cte| cte.name.as_str())
    }

    /// Every dbt dependency identifier in the model
    pub fn dependencies(&self) -> BTreeSet<String> {
        self.ctes
            .iter()
            .flat_map(|cte| cte.dependencies.iter().cloned())
            .chain(self.main.dependencies.iter().cloned())
            .collect()
    }

    /// Reassemble the model text
    pub fn to_sql(&self) -> String {
        let ctes: Vec<(&str, &str)> = self
            .ctes
            .iter()
            .map(|cte| (cte.name.as_str(), cte.body.as_str()))
            .collect();
        render_sql(
            self.config_block.as_deref(),
            self.preamble.as_deref(),
            &ctes,
            &self.main_query,
        )
    }

    /// Columns exposed by the model's final select
    pub fn output_columns(&self) -> ColumnSet {
        let mut visiting = BTreeSet::new();
        self.expand_columns(&self.main.select_items, &self.main.relations, &mut visiting)
    }

    /// Columns exposed by one CTE
    pub fn cte_columns(&self, name: &str) -> ColumnSet {
        let mut visiting = BTreeSet::new();
        self.cte_columns_inner(name, &mut visiting)
    }

    fn cte_columns_inner(&self, name: &str, visiting: &mut BTreeSet<String>) -> ColumnSet {
        let Some(cte) = self.get(name) else {
            return ColumnSet::default();
        };
        if !visiting.insert(cte.name.clone()) {
            return ColumnSet::default();
        }
        let columns = self.expand_columns(&cte.select_items, &cte.relations, visiting);
        visiting.remove(&cte.name);
        columns
    }

    fn expand_columns(
        &self,
        items: &[SelectItem],
        relations: &[Relation],
        visiting: &mut BTreeSet<String>,
    ) -> ColumnSet {
        let mut set = ColumnSet::default();
        for item in items {
            match item {
                SelectItem::Expression { name, .. } => {
                    set.names.insert(name.clone());
                }
                SelectItem::Wildcard { qualifier } => {
                    let targets = relations
                        .iter()
                        .filter(|rel| qualifier.as_deref().map_or(true, |q| rel.qualifier() == q));
                    let mut matched = false;
                    for relation in targets {
                        matched = true;
                        match &relation.target {
                            RelationTarget::Table(table) if self.get(table).is_some() => {
                                let upstream = self.cte_columns_inner(table, visiting);
                                set.names.extend(upstream.names);
                                set.wildcard |= upstream.wildcard;
                            }
                            _ => set.wildcard = true,
                        }
                    }
                    if !matched {
                        set.wildcard = true;
                    }
                }
            }
        }
        set
    }
}

/// Assemble model text from its parts
pub fn render_sql(
    config_block: Option<&str>,
    preamble: Option<&str>,
    ctes: &[(&str, &str)],
    main_query: &str,
) -> String {
    let mut out = String::new();
    if let Some(config) = config_block {
        out.push_str(config);
        out.push_str("\n\n");
    }
    if let Some(preamble) = preamble {
        out.push_str(preamble);
        out.push_str("\n\n");
    }
    if !ctes.is_empty() {
        out.push_str("with ");
        for (i, (name, body)) in ctes.iter().enumerate() {
            if i > 0 {
                out.push_str(",\n\n");
            }
            let _ = write!(out, "{} as (\n    {}\n)", render_identifier(name), body.trim());
        }
        out.push_str("\n\n");
    }
    out.push_str(main_query.trim());
    out.push('\n');
    out
}

fn render_identifier(name: &str) -> String {
    let plain = name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'$');
    if plain && !is_reserved(name) {
        name.to_string()
    } else {
        format!("\"{name}\"")
    }
}

/// Parser for dbt model SQL
#[derive(Debug, Default)]
pub struct ComponentParser {
    tokenizer: ColumnTokenizer,
}

impl ComponentParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_dialect(dialect: &DialectConfig) -> Self {
        Self {
            tokenizer: ColumnTokenizer::from_dialect(dialect),
        }
    }

    /// Parse raw model SQL into components
    pub fn parse(&self, sql: &str) -> Result<SqlComponent, ParseError> {
        let (config_block, rest) = match DbtFunctionExtractor::config_block(sql) {
            Some(range) => (
                Some(sql[range.clone()].to_string()),
                format!("{}{}", &sql[..range.start], &sql[range.end..]),
            ),
            None => (None, sql.to_string()),
        };

        let scan = ScannedSql::scan(&rest);
        if !scan.contains_keyword("select") {
            return Err(ParseError::MalformedSql("no SELECT keyword".to_string()));
        }

        let split = split_ctes(&scan);
        let preamble = split
            .with_start
            .map(|start| rest[..start].trim())
            .filter(|text| !text.is_empty())
            .map(str::to_string);
        let main_query = rest[split.main_start..].trim().to_string();

        let mut ctes: Vec<CteReference> = Vec::with_capacity(split.ctes.len());
        let mut known: Vec<String> = Vec::new();
        for (name, body) in split.ctes {
            if known.contains(&name) {
                tracing::debug!(cte = %name, "duplicate CTE name, keeping first definition");
                continue;
            }
            let parts = self.analyze_query(&body, &known);
            let is_constant = is_constant(&body, &parts, &known);
            known.push(name.clone());
            ctes.push(CteReference::new(name, body, parts, is_constant));
        }

        let main = self.analyze_query(&main_query, &known);
        let referenced_columns = ctes
            .iter()
            .map(|cte| {
                let columns = cte.column_refs.iter().map(|r| r.column.clone()).collect();
                (cte.name.clone(), columns)
            })
            .collect();

        Ok(SqlComponent {
            config_block,
            preamble,
            ctes,
            main_query,
            referenced_columns,
            main,
        })
    }

    /// Extract structure from one query
    pub fn analyze_query(&self, text: &str, known_ctes: &[String]) -> QueryParts {
        let scan = ScannedSql::scan(text);
        let matches = scan_relations(text);

        let relations: Vec<Relation> = matches
            .iter()
            .filter(|m| m.depth == 0)
            .map(|m| m.relation.clone())
            .collect();
        let upstream_ctes = matches
            .iter()
            .filter_map(|m| match &m.relation.target {
                RelationTarget::Table(name) if known_ctes.contains(name) => Some(name.clone()),
                _ => None,
            })
            .collect();

        let mut exclude: BTreeSet<String> = known_ctes.iter().cloned().collect();
        for m in &matches {
            exclude.insert(m.relation.qualifier().to_string());
            if let RelationTarget::Table(name) = &m.relation.target {
                exclude.insert(name.clone());
            }
        }

        QueryParts {
            dependencies: DbtFunctionExtractor::dependencies(text),
            select_items: self.select_items(&scan),
            relations,
            filters: where_clauses(&scan),
            column_refs: self.tokenizer.column_refs(text, &exclude),
            upstream_ctes,
        }
    }

    fn select_items(&self, scan: &ScannedSql<'_>) -> Vec<SelectItem> {
        let text = scan.text();
        let Some(select) = scan.find_keyword(0..scan.len(), "select", Some(0)) else {
            return Vec::new();
        };

        let mut start = scan.skip_trivia(select.end, false);
        for modifier in ["distinct", "all"] {
            if let Some(end) = scan.keyword_at(start, modifier, Some(0)) {
                start = scan.skip_trivia(end, false);
            }
        }
        let end = scan
            .find_any_keyword(start..scan.len(), SELECT_LIST_END, Some(0))
            .map_or(scan.len(), |r| r.start);

        scan.split_at_depth(start..end, b',', 0)
            .into_iter()
            .map(|range| text[range].trim())
            .filter(|item| !item.is_empty())
            .map(|item| self.select_item(item))
            .collect()
    }

    fn select_item(&self, item: &str) -> SelectItem {
        if item == "*" {
            return SelectItem::Wildcard { qualifier: None };
        }
        if let Some(prefix) = item.strip_suffix(".*") {
            if COLUMN_PATH_RE.is_match(prefix.trim()) {
                let qualifier = last_segment(prefix.trim());
                return SelectItem::Wildcard { qualifier: Some(qualifier) };
            }
        }

        let (expression, alias) = split_alias(item);
        let name = match &alias {
            Some(alias) => alias.clone(),
            None if COLUMN_PATH_RE.is_match(expression) => last_segment(expression),
            None => normalize_sql(expression),
        };
        let refs = self.tokenizer.column_refs(expression, &BTreeSet::new());

        SelectItem::Expression {
            expression: expression.to_string(),
            name,
            alias,
            refs,
        }
    }
}

struct CteSplit {
    ctes: Vec<(String, String)>,
    with_start: Option<usize>,
    main_start: usize,
}

/// Locate `WITH [RECURSIVE] name [(cols)] AS [[NOT] MATERIALIZED] (body), ...`
fn split_ctes(scan: &ScannedSql<'_>) -> CteSplit {
    let text = scan.text();
    let bytes = text.as_bytes();
    let start = scan.skip_trivia(0, true);

    let Some(after_with) = scan.keyword_at(start, "with", Some(0)) else {
        return CteSplit { ctes: Vec::new(), with_start: None, main_start: 0 };
    };

    let mut ctes = Vec::new();
    let mut pos = scan.skip_trivia(after_with, false);
    if let Some(end) = scan.keyword_at(pos, "recursive", Some(0)) {
        pos = scan.skip_trivia(end, false);
    }

    let main_start = loop {
        let item_start = pos;
        let malformed = if ctes.is_empty() { start } else { item_start };

        let Some((name, after_name)) = read_identifier(scan, pos) else { break malformed };
        let mut p = scan.skip_trivia(after_name, false);

        if bytes.get(p) == Some(&b'(') {
            let Some(close) = scan.matching_paren(p) else { break malformed };
            p = scan.skip_trivia(close + 1, false);
        }

        let Some(after_as) = scan.keyword_at(p, "as", Some(0)) else { break malformed };
        p = scan.skip_trivia(after_as, false);
        if let Some(end) = scan.keyword_at(p, "not", Some(0)) {
            p = scan.skip_trivia(end, false);
        }
        if let Some(end) = scan.keyword_at(p, "materialized", Some(0)) {
            p = scan.skip_trivia(end, false);
        }

        if bytes.get(p) != Some(&b'(') {
            break malformed;
        }
        let Some(close) = scan.matching_paren(p) else { break malformed };

        ctes.push((name, text[p + 1..close].trim().to_string()));
        pos = scan.skip_trivia(close + 1, false);

        if bytes.get(pos) == Some(&b',') && scan.is_code_at(pos, 0) {
            pos = scan.skip_trivia(pos + 1, false);
        } else {
            break pos;
        }
    };

    if ctes.is_empty() {
        tracing::debug!("WITH clause without parseable CTEs, treating whole text as main query");
        return CteSplit { ctes, with_start: None, main_start: 0 };
    }

    CteSplit { ctes, with_start: Some(start), main_start }
}

/// Read a CTE name; unquoted names are lowercased
fn read_identifier(scan: &ScannedSql<'_>, pos: usize) -> Option<(String, usize)> {
    let text = scan.text();
    let bytes = text.as_bytes();
    let first = *bytes.get(pos)?;

    if matches!(first, b'"' | b'`') && scan.region(pos) == Some(Region::Literal) {
        let mut end = pos;
        while scan.region(end) == Some(Region::Literal) {
            end += 1;
        }
        let name = text[pos + 1..end.saturating_sub(1).max(pos + 1)].to_string();
        return (!name.is_empty()).then_some((name, end));
    }

    if !(first.is_ascii_alphabetic() || first == b'_') {
        return None;
    }
    let mut end = pos;
    while end < bytes.len() && is_word_byte(bytes[end]) {
        end += 1;
    }
    let name = text[pos..end].to_ascii_lowercase();
    if is_reserved(&name) {
        return None;
    }
    Some((name, end))
}

/// Top-level WHERE predicates
fn where_clauses(scan: &ScannedSql<'_>) -> Vec<String> {
    let text = scan.text();
    scan.keyword_positions("where", Some(0))
        .into_iter()
        .filter_map(|kw| {
            let end = scan
                .find_any_keyword(kw.end..scan.len(), WHERE_END, Some(0))
                .map_or(scan.len(), |r| r.start);
            let predicate = text[kw.end..end].trim();
            (!predicate.is_empty()).then(|| predicate.to_string())
        })
        .collect()
}

/// Split `expr AS alias` / `expr alias` at top level
fn split_alias(item: &str) -> (&str, Option<String>) {
    let scan = ScannedSql::scan(item);

    if let Some(as_kw) = scan.keyword_positions("as", Some(0)).pop() {
        let alias = item[as_kw.end..].trim();
        if COLUMN_PATH_RE.is_match(alias) && !alias.contains('.') {
            return (item[..as_kw.start].trim(), Some(last_segment(alias)));
        }
    }

    if let Some(caps) = BARE_ALIAS_RE.captures(item) {
        if let (Some(expr), Some(alias)) = (caps.get(1), caps.get(2)) {
            let code = scan.is_code_at(alias.start(), 0);
            let operator_before = expr
                .as_str()
                .trim_end()
                .ends_with(|c: char| matches!(c, '+' | '-' | '*' | '/' | '|' | '=' | '<' | '>' | ','));
            if code && !operator_before && !is_reserved(alias.as_str()) {
                let before_word = expr
                    .as_str()
                    .rsplit(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .next()
                    .unwrap_or("");
                // `not flag`, `distinct id` and similar keep their trailing word
                if !is_reserved(before_word) || before_word.eq_ignore_ascii_case("end") {
                    return (expr.as_str().trim(), Some(alias.as_str().to_ascii_lowercase()));
                }
            }
        }
    }

    (item, None)
}

/// Last dotted segment, unquoted; lowercased unless it was quoted
fn last_segment(path: &str) -> String {
    let caps = COLUMN_PATH_RE.captures(path);
    let segment = caps
        .and_then(|c| c.get(1))
        .map_or(path, |m| m.as_str());
    if let Some(inner) = segment
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| segment.strip_prefix('`').and_then(|s| s.strip_suffix('`')))
    {
        inner.to_string()
    } else {
        segment.to_ascii_lowercase()
    }
}

/// Conservative constant classification: no FROM anywhere and nothing read,
/// or a trivial `select *` alias of an earlier CTE
fn is_constant(body: &str, parts: &QueryParts, known_ctes: &[String]) -> bool {
    let scan = ScannedSql::scan(body);
    if !scan.contains_keyword("from") && parts.dependencies.is_empty() && parts.column_refs.is_empty() {
        return true;
    }

    let normalized = normalize_sql(body);
    TRIVIAL_ALIAS_RE
        .captures(&normalized)
        .and_then(|caps| caps.get(1))
        .is_some_and(|name| known_ctes.iter().any(|cte| cte == name.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(sql: &str) -> SqlComponent {
        ComponentParser::new().parse(sql).unwrap()
    }

    #[test]
    fn splits_config_ctes_and_main() {
        let sql = r#"{{ config(materialized='table') }}

with orders as (
    select * from {{ ref('stg_orders') }}
),
customers (id, name) as (
    select id, name from {{ source('raw', 'customers') }} where active
)
select o.order_id, c.name
from orders o
join customers c on o.customer_id = c.id"#;

        let component = parse(sql);
        assert_eq!(component.config_block.as_deref(), Some("{{ config(materialized='table') }}"));
        assert_eq!(component.cte_names().collect::<Vec<_>>(), vec!["orders", "customers"]);

        let orders = component.get("orders").unwrap();
        assert_eq!(orders.dependencies, BTreeSet::from(["stg_orders".to_string()]));
        assert_eq!(orders.columns, vec!["*".to_string()]);
        assert!(!orders.is_constant);

        let customers = component.get("customers").unwrap();
        assert_eq!(customers.dependencies, BTreeSet::from(["raw.customers".to_string()]));
        assert_eq!(customers.filters, vec!["active".to_string()]);
        assert_eq!(customers.columns, vec!["id".to_string(), "name".to_string()]);

        assert!(component.main_query.starts_with("select o.order_id"));
        assert_eq!(
            component.main.upstream_ctes,
            BTreeSet::from(["customers".to_string(), "orders".to_string()])
        );
        assert_eq!(component.main.relations.len(), 2);
    }

    #[test]
    fn constant_ctes() {
        let component = parse("WITH c AS (SELECT 1 AS x) SELECT * FROM t");
        let c = component.get("c").unwrap();
        assert!(c.is_constant);
        assert!(c.dependencies.is_empty());
        assert_eq!(c.columns, vec!["x".to_string()]);

        let component = parse("with a as (select id from t), b as (select * from a where 1=1) select * from b");
        assert!(!component.get("a").unwrap().is_constant);
        assert!(component.get("b").unwrap().is_constant);

        let component = parse("with d as (select current_date as today) select * from d");
        assert!(component.get("d").unwrap().is_constant);
    }

    #[test]
    fn plain_select_has_no_ctes() {
        let component = parse("select a, b from {{ ref('x') }}");
        assert!(component.ctes.is_empty());
        assert_eq!(component.main_query, "select a, b from {{ ref('x') }}");
        assert_eq!(component.main.dependencies, BTreeSet::from(["x".to_string()]));
    }

    #[test]
    fn missing_select_is_malformed() {
        let err = ComponentParser::new().parse("{{ config(materialized='view') }}").unwrap_err();
        assert!(matches!(err, ParseError::MalformedSql(_)));
        assert!(ComponentParser::new().parse("-- select\ninsert into t values (1)").is_err());
    }

    #[test]
    fn materialized_and_recursive() {
        let component = parse(
            "with recursive a as not materialized (select 1 as n), b as materialized (select n from a) select * from b",
        );
        assert_eq!(component.cte_names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(component.get("b").unwrap().upstream_ctes, BTreeSet::from(["a".to_string()]));
    }

    #[test]
    fn duplicate_cte_keeps_first() {
        let component = parse("with a as (select 1 as x), a as (select 2 as y) select * from a");
        assert_eq!(component.ctes.len(), 1);
        assert_eq!(component.get("a").unwrap().columns, vec!["x".to_string()]);
    }

    #[test]
    fn select_item_names() {
        let component = parse(
            "select o.id, amount * 2 as doubled, upper(name) display_name, count(*), t.* from orders o join t on true",
        );
        let names: Vec<String> = component.main.select_items.iter().map(SelectItem::output_name).collect();
        assert_eq!(names, vec!["id", "doubled", "display_name", "count(*)", "t.*"]);
    }

    #[test]
    fn parenthesised_text_inside_strings() {
        let component = parse("with a as (select ')' as p from t) select p from a");
        assert_eq!(component.get("a").unwrap().body, "select ')' as p from t");
    }

    #[test]
    fn output_columns_expand_ctes() {
        let component = parse(
            "with a as (select id, name from {{ ref('x') }}), b as (select * from a) select b.*, 1 as extra from b",
        );
        let columns = component.output_columns();
        assert!(!columns.wildcard);
        assert_eq!(
            columns.names,
            BTreeSet::from(["extra".to_string(), "id".to_string(), "name".to_string()])
        );

        let external = parse("select * from {{ ref('x') }}").output_columns();
        assert!(external.wildcard);
        assert!(external.exposes("anything"));
    }

    #[test]
    fn to_sql_reparses_to_same_structure() {
        let sql = "{{ config(materialized='table') }}\nwith a as (select id from {{ ref('x') }}), b as (select id from a) select * from b";
        let first = parse(sql);
        let second = parse(&first.to_sql());

        assert_eq!(first.cte_names().collect::<Vec<_>>(), second.cte_names().collect::<Vec<_>>());
        for (left, right) in first.ctes.iter().zip(&second.ctes) {
            assert_eq!(left.dependencies, right.dependencies);
        }
        assert_eq!(first.config_block, second.config_block);
    }
}
