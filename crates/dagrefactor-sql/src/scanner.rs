//! Depth-tracking scanner over raw dbt SQL
//!
//! Classifies every byte of the input as code (with its parenthesis depth),
//! string literal / quoted identifier, comment, or Jinja template region.
//! Everything that is not code is opaque to keyword and delimiter searches.

use std::ops::Range;

/// Classification of a single byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// SQL code at the given parenthesis depth
    Code(u32),
    /// String literal or quoted identifier
    Literal,
    /// `--` or `/* */` comment
    Comment,
    /// `{{ }}`, `{% %}` or `{# #}`
    Template,
}

/// Scanned SQL text
#[derive(Debug, Clone)]
pub struct ScannedSql<'a> {
    text: &'a str,
    regions: Vec<Region>,
}

impl<'a> ScannedSql<'a> {
    pub fn scan(text: &'a str) -> Self {
        let bytes = text.as_bytes();
        let mut regions = Vec::with_capacity(bytes.len());
        let mut depth: u32 = 0;
        let mut i = 0;

        while i < bytes.len() {
            let next = bytes.get(i + 1).copied();
            match bytes[i] {
                quote @ (b'\'' | b'"' | b'`') => {
                    let end = Self::quoted_end(bytes, i, quote);
                    regions.extend(std::iter::repeat(Region::Literal).take(end - i));
                    i = end;
                }
                b'-' if next == Some(b'-') => {
                    let end = bytes[i..]
                        .iter()
                        .position(|b| *b == b'\n')
                        .map_or(bytes.len(), |p| i + p);
                    regions.extend(std::iter::repeat(Region::Comment).take(end - i));
                    i = end;
                }
                b'/' if next == Some(b'*') => {
                    let end = find_from(bytes, i + 2, b"*/").map_or(bytes.len(), |p| p + 2);
                    regions.extend(std::iter::repeat(Region::Comment).take(end - i));
                    i = end;
                }
                b'{' if matches!(next, Some(b'{' | b'%' | b'#')) => {
                    let close: &[u8] = match next {
                        Some(b'{') => b"}}",
                        Some(b'%') => b"%}",
                        _ => b"#}",
                    };
                    let end = find_from(bytes, i + 2, close).map_or(bytes.len(), |p| p + 2);
                    regions.extend(std::iter::repeat(Region::Template).take(end - i));
                    i = end;
                }
                b'(' => {
                    regions.push(Region::Code(depth));
                    depth += 1;
                    i += 1;
                }
                b')' => {
                    depth = depth.saturating_sub(1);
                    regions.push(Region::Code(depth));
                    i += 1;
                }
                _ => {
                    regions.push(Region::Code(depth));
                    i += 1;
                }
            }
        }

        Self { text, regions }
    }

    /// End (exclusive) of a quoted region starting at `start`. Doubled quotes
    /// and backslash escapes stay inside the region.
    fn quoted_end(bytes: &[u8], start: usize, quote: u8) -> usize {
        let mut i = start + 1;
        while i < bytes.len() {
            if bytes[i] == b'\\' && quote == b'\'' {
                i += 2;
                continue;
            }
            if bytes[i] == quote {
                if bytes.get(i + 1) == Some(&quote) {
                    i += 2;
                    continue;
                }
                return i + 1;
            }
            i += 1;
        }
        bytes.len()
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn region(&self, pos: usize) -> Option<Region> {
        self.regions.get(pos).copied()
    }

    /// Parenthesis depth at `pos`, `None` outside code
    pub fn depth_at(&self, pos: usize) -> Option<u32> {
        match self.regions.get(pos) {
            Some(Region::Code(depth)) => Some(*depth),
            _ => None,
        }
    }

    pub fn is_code_at(&self, pos: usize, depth: u32) -> bool {
        self.depth_at(pos) == Some(depth)
    }

    /// Position of the `)` closing the `(` at `open`
    pub fn matching_paren(&self, open: usize) -> Option<usize> {
        let bytes = self.text.as_bytes();
        if bytes.get(open) != Some(&b'(') {
            return None;
        }
        let depth = self.depth_at(open)?;
        (open + 1..bytes.len()).find(|&i| bytes[i] == b')' && self.is_code_at(i, depth))
    }

    /// Next non-whitespace code position at or after `from`, skipping comments
    /// and (optionally) template regions
    pub fn skip_trivia(&self, from: usize, skip_templates: bool) -> usize {
        let bytes = self.text.as_bytes();
        let mut i = from;
        while i < bytes.len() {
            match self.regions[i] {
                Region::Comment => i += 1,
                Region::Template if skip_templates => i += 1,
                Region::Code(_) if bytes[i].is_ascii_whitespace() => i += 1,
                _ => break,
            }
        }
        i
    }

    /// Whether a (possibly multi-word) keyword starts exactly at `pos` at the
    /// given depth. Returns the end of the match.
    pub fn keyword_at(&self, pos: usize, keyword: &str, depth: Option<u32>) -> Option<usize> {
        let bytes = self.text.as_bytes();
        let in_code = |i: usize| match (self.region(i), depth) {
            (Some(Region::Code(d)), Some(want)) => d == want,
            (Some(Region::Code(_)), None) => true,
            _ => false,
        };

        if !in_code(pos) || (pos > 0 && is_word_byte(bytes[pos - 1]) && in_code(pos - 1)) {
            return None;
        }

        let mut i = pos;
        for (n, word) in keyword.split_whitespace().enumerate() {
            if n > 0 {
                let ws_start = i;
                while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                if i == ws_start {
                    return None;
                }
            }
            let end = i + word.len();
            if end > bytes.len() || !bytes[i..end].eq_ignore_ascii_case(word.as_bytes()) || !in_code(i) {
                return None;
            }
            i = end;
        }

        if i < bytes.len() && is_word_byte(bytes[i]) {
            return None;
        }
        Some(i)
    }

    /// All matches of a keyword at `depth` (any depth when `None`)
    pub fn keyword_positions(&self, keyword: &str, depth: Option<u32>) -> Vec<Range<usize>> {
        self.keyword_positions_in(0..self.len(), keyword, depth)
    }

    pub fn keyword_positions_in(
        &self,
        range: Range<usize>,
        keyword: &str,
        depth: Option<u32>,
    ) -> Vec<Range<usize>> {
        let mut found = Vec::new();
        let mut i = range.start;
        while i < range.end.min(self.len()) {
            match self.keyword_at(i, keyword, depth) {
                Some(end) => {
                    found.push(i..end);
                    i = end;
                }
                None => i += 1,
            }
        }
        found
    }

    /// First match of a keyword at `depth` within `range`
    pub fn find_keyword(&self, range: Range<usize>, keyword: &str, depth: Option<u32>) -> Option<Range<usize>> {
        let end = range.end.min(self.len());
        (range.start..end).find_map(|i| self.keyword_at(i, keyword, depth).map(|e| i..e))
    }

    /// Earliest match of any of `keywords` at `depth` within `range`
    pub fn find_any_keyword(&self, range: Range<usize>, keywords: &[&str], depth: Option<u32>) -> Option<Range<usize>> {
        let end = range.end.min(self.len());
        (range.start..end).find_map(|i| {
            keywords
                .iter()
                .find_map(|kw| self.keyword_at(i, kw, depth).map(|e| i..e))
        })
    }

    pub fn contains_keyword(&self, keyword: &str) -> bool {
        self.find_keyword(0..self.len(), keyword, None).is_some()
    }

    /// Split `range` at every `sep` byte found in code at `depth`
    pub fn split_at_depth(&self, range: Range<usize>, sep: u8, depth: u32) -> Vec<Range<usize>> {
        let bytes = self.text.as_bytes();
        let end = range.end.min(bytes.len());
        let mut parts = Vec::new();
        let mut start = range.start;
        for i in range.start..end {
            if bytes[i] == sep && self.is_code_at(i, depth) {
                parts.push(start..i);
                start = i + 1;
            }
        }
        parts.push(start..end);
        parts
    }

    /// Text with every non-code byte replaced by a space. Offsets are preserved.
    pub fn masked(&self) -> String {
        let masked: Vec<u8> = self
            .text
            .bytes()
            .zip(&self.regions)
            .map(|(b, region)| match region {
                Region::Code(_) => b,
                _ => b' ',
            })
            .collect();
        String::from_utf8_lossy(&masked).into_owned()
    }

    /// Text with comments and templates blanked out; literals are kept
    pub fn without_templates(&self) -> String {
        let masked: Vec<u8> = self
            .text
            .bytes()
            .zip(&self.regions)
            .map(|(b, region)| match region {
                Region::Comment | Region::Template => b' ',
                _ => b,
            })
            .collect();
        String::from_utf8_lossy(&masked).into_owned()
    }
}

pub(crate) fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

fn find_from(haystack: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| from + p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_tracking() {
        let sql = "select (a + (b)) from t";
        let scan = ScannedSql::scan(sql);
        assert_eq!(scan.depth_at(0), Some(0));
        assert_eq!(scan.depth_at(7), Some(0));
        assert_eq!(scan.depth_at(8), Some(1));
        assert_eq!(scan.depth_at(13), Some(2));
        assert_eq!(scan.matching_paren(7), Some(15));
        assert_eq!(scan.matching_paren(12), Some(14));
    }

    #[test]
    fn literals_comments_and_templates_are_opaque() {
        let sql = "select ')' as x -- from here\n/* from */ from {{ ref('a') }} where y = 'from'";
        let scan = ScannedSql::scan(sql);

        let froms = scan.keyword_positions("from", Some(0));
        assert_eq!(froms.len(), 1);
        assert_eq!(&sql[froms[0].clone()], "from");
        assert_eq!(scan.depth_at(sql.len() - 1), None);

        // the quoted paren does not open a level
        let where_pos = sql.find("where").unwrap();
        assert_eq!(scan.depth_at(where_pos), Some(0));
    }

    #[test]
    fn escaped_quotes_stay_in_literal() {
        let sql = "select 'it''s (' as a, b from t";
        let scan = ScannedSql::scan(sql);
        let from = scan.find_keyword(0..sql.len(), "from", Some(0)).unwrap();
        assert_eq!(&sql[from], "from");
    }

    #[test]
    fn multi_word_keywords() {
        let sql = "select a from t group   by a order by a";
        let scan = ScannedSql::scan(sql);
        let group = scan.keyword_positions("group by", Some(0));
        assert_eq!(group.len(), 1);
        assert_eq!(&sql[group[0].clone()], "group   by");
        assert!(scan.keyword_positions("grouping", None).is_empty());
    }

    #[test]
    fn keyword_needs_word_boundaries() {
        let scan = ScannedSql::scan("select from_date, datefrom from t");
        assert_eq!(scan.keyword_positions("from", None).len(), 1);
    }

    #[test]
    fn split_at_top_level_commas() {
        let sql = "a, coalesce(b, c), 'x,y'";
        let scan = ScannedSql::scan(sql);
        let parts: Vec<&str> = scan
            .split_at_depth(0..sql.len(), b',', 0)
            .into_iter()
            .map(|r| sql[r].trim())
            .collect();
        assert_eq!(parts, vec!["a", "coalesce(b, c)", "'x,y'"]);
    }

    #[test]
    fn masking_preserves_offsets() {
        let sql = "select {{ ref('a') }} -- c\n";
        let scan = ScannedSql::scan(sql);
        let masked = scan.masked();
        assert_eq!(masked.len(), sql.len());
        assert!(masked.starts_with("select "));
        assert!(!masked.contains("ref"));
    }
}
