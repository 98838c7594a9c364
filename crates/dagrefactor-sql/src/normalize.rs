//! Text normalization for comparison and keyword counting

use crate::scanner::{Region, ScannedSql};

/// Strip comments, collapse whitespace runs to one space and lowercase
pub fn normalize_sql(sql: &str) -> String {
    let scan = ScannedSql::scan(sql);
    let mut out = String::with_capacity(sql.len());
    let mut pending_space = false;

    for (pos, ch) in sql.char_indices() {
        if scan.region(pos) == Some(Region::Comment) {
            pending_space = true;
            continue;
        }
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.extend(ch.to_lowercase());
    }

    out
}
