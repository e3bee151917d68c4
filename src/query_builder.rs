use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

/// Field modifiers understood by the volumes endpoint. A query that already
/// carries one of these is trusted as-is.
const FIELD_MODIFIERS: [&str; 4] = ["intitle:", "inauthor:", "isbn:", "subject:"];

/// Parameters attached to every free-text search.
pub const SEARCH_PARAMS: [(&str, &str); 4] = [
    ("maxResults", "40"),
    ("projection", "full"),
    ("orderBy", "newest"),
    ("printType", "books"),
];

static TITLE_BY_AUTHOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)^\s*"?(.+?)"?\s+by\s+"?(.+?)"?\s*$"#).expect("valid title-by-author pattern")
});

static TITLE_COMMA_AUTHOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*"?(.+?)"?\s*,\s*"?(.+?)"?\s*$"#).expect("valid title-comma-author pattern")
});

/// Which rule produced a [`StructuredQuery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryShape {
    Fielded,
    Isbn,
    TitleAuthor,
    TitleFallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredQuery {
    pub q: String,
    pub params: BTreeMap<String, String>,
    pub shape: QueryShape,
}

impl StructuredQuery {
    fn new(q: String, shape: QueryShape) -> Self {
        let params = SEARCH_PARAMS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self { q, params, shape }
    }
}

/// Turns a free-text search box value into a volumes query.
///
/// Rules are tried in order and the first one that applies wins:
/// fielded pass-through, ISBN-10/13, `"<title>" by "<author>"`,
/// `<title>, <author>`, and finally a title search with the raw term
/// appended as a fallback token.
///
/// Ten or thirteen digit strings that are not ISBNs (phone numbers and the
/// like) are still classified as ISBNs.
pub fn build_query(raw: &str) -> StructuredQuery {
    let q = raw.trim();

    let lowered = q.to_lowercase();
    if FIELD_MODIFIERS.iter().any(|m| lowered.contains(m)) {
        return StructuredQuery::new(q.to_string(), QueryShape::Fielded);
    }

    if let Some(isbn) = isbn_candidate(q) {
        return StructuredQuery::new(format!("isbn:{isbn}"), QueryShape::Isbn);
    }

    if let Some((title, author)) = split_title_author(q) {
        return StructuredQuery::new(
            format!(r#"intitle:"{title}"+inauthor:"{author}""#),
            QueryShape::TitleAuthor,
        );
    }

    StructuredQuery::new(format!(r#"intitle:"{q}"+{q}"#), QueryShape::TitleFallback)
}

/// Keeps digits and `X`/`x`, then checks for an ISBN-10/13 shape where only
/// the last character may be a check `X`.
fn isbn_candidate(q: &str) -> Option<String> {
    let kept: String = q
        .chars()
        .filter(|c| c.is_ascii_digit() || c.eq_ignore_ascii_case(&'x'))
        .collect();

    if kept.len() != 10 && kept.len() != 13 {
        return None;
    }

    let (body, last) = kept.split_at(kept.len() - 1);
    let body_ok = body.chars().all(|c| c.is_ascii_digit());
    let last_ok = last
        .chars()
        .all(|c| c.is_ascii_digit() || c.eq_ignore_ascii_case(&'x'));

    (body_ok && last_ok).then_some(kept)
}

fn split_title_author(q: &str) -> Option<(String, String)> {
    let caps = TITLE_BY_AUTHOR
        .captures(q)
        .or_else(|| TITLE_COMMA_AUTHOR.captures(q))?;

    let title = caps.get(1)?.as_str().trim().to_string();
    let author = caps.get(2)?.as_str().trim().to_string();
    Some((title, author))
}

#[test]
fn test_isbn_candidate() {
    assert_eq!(isbn_candidate("0-306-40615-2").as_deref(), Some("0306406152"));
    assert_eq!(isbn_candidate("080442957X").as_deref(), Some("080442957X"));
    assert_eq!(isbn_candidate("08044295x7"), None);
    assert_eq!(isbn_candidate("12345"), None);
    assert_eq!(isbn_candidate(""), None);
}

#[test]
fn test_split_title_author() {
    assert_eq!(
        split_title_author(r#""The Hobbit" BY "J.R.R. Tolkien""#),
        Some(("The Hobbit".to_string(), "J.R.R. Tolkien".to_string()))
    );
    assert_eq!(
        split_title_author("Emma ,  Jane Austen "),
        Some(("Emma".to_string(), "Jane Austen".to_string()))
    );
    assert_eq!(split_title_author("standalone"), None);
}
