use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::fetcher::Fetch;
use crate::normalizer::{BookRecord, CatalogItem, normalize, normalize_items};
use crate::query_builder::build_query;

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/books/v1";
pub const DEFAULT_SECTION_LIMIT: usize = 12;

/// Hand-picked (title, author) pairs looked up first for a section.
pub fn curated(section: &str) -> &'static [(&'static str, &'static str)] {
    match section {
        "manga" => &[
            ("Vinland Saga", "Makoto Yukimura"),
            ("Naruto", "Masashi Kishimoto"),
            ("One Piece", "Eiichiro Oda"),
            ("Boruto: Naruto Next Generations", "Ukyō Kodachi"),
            ("Berserk", "Kentaro Miura"),
            ("My Hero Academia", "Kohei Horikoshi"),
            ("Demon Slayer", "Koyoharu Gotouge"),
        ],
        "fiction" => &[
            ("To Kill a Mockingbird", "Harper Lee"),
            ("The Great Gatsby", "F. Scott Fitzgerald"),
            ("Pride and Prejudice", "Jane Austen"),
            ("1984", "George Orwell"),
            ("The Catcher in the Rye", "J.D. Salinger"),
        ],
        "scifi" => &[
            ("Dune", "Frank Herbert"),
            ("Foundation", "Isaac Asimov"),
            ("Neuromancer", "William Gibson"),
            ("Ender's Game", "Orson Scott Card"),
            ("The Martian", "Andy Weir"),
        ],
        "philosophy" => &[
            ("Meditations", "Marcus Aurelius"),
            ("Letters from a Stoic", "Seneca"),
            ("The Republic", "Plato"),
            ("Nicomachean Ethics", "Aristotle"),
            ("Thus Spoke Zarathustra", "Friedrich Nietzsche"),
            ("Discourses and Selected Writings", "Epictetus"),
        ],
        "comics" => &[
            ("The Avengers", "Stan Lee"),
            ("The Amazing Spider-Man", "Stan Lee"),
            ("Batman: The Dark Knight Returns", "Frank Miller"),
            ("Watchmen", "Alan Moore"),
            ("Saga", "Brian K. Vaughan"),
            ("Paper Girls", "Brian K. Vaughan"),
        ],
        _ => &[],
    }
}

/// Broad subject query used to top up a section.
pub fn section_query(section: &str) -> Option<&'static str> {
    match section {
        "manga" => Some(r#"(subject:manga OR subject:"graphic novels" OR "manga")"#),
        "fiction" => Some("subject:fiction"),
        "scifi" => Some(r#"(subject:"science fiction" OR "sci-fi" OR "scifi")"#),
        "philosophy" => Some("subject:philosophy"),
        "fantasy" => Some("subject:fantasy"),
        "comics" => Some(r#"(subject:comics OR subject:"graphic novels")"#),
        _ => None,
    }
}

/// Search, browse and lookup operations against the volumes API.
pub struct CatalogService {
    fetcher: Arc<dyn Fetch>,
    base_url: String,
    api_key: Option<String>,
    curated_delay: Duration,
}

impl CatalogService {
    pub fn new(fetcher: Arc<dyn Fetch>, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            curated_delay: Duration::from_millis(300),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.is_empty());
        self
    }

    /// Pause between curated lookups, to stay polite with the API.
    pub fn with_curated_delay(mut self, delay: Duration) -> Self {
        self.curated_delay = delay;
        self
    }

    fn url<'a, I>(&self, path: &str, params: I) -> Option<String>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut url = match Url::parse(&format!("{}/{}", self.base_url, path)) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!("invalid catalog url for {path}: {e}");
                return None;
            }
        };
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
            if let Some(key) = &self.api_key {
                pairs.append_pair("key", key);
            }
        }
        Some(url.to_string())
    }

    async fn fetch_volumes<'a, I>(&self, params: I) -> Option<Value>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let url = self.url("volumes", params)?;
        self.fetcher.fetch(&url).await
    }

    /// Free-text search. Blank input returns nothing without calling the API.
    pub async fn search(&self, raw: &str) -> Vec<BookRecord> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Vec::new();
        }
        tracing::debug!("[search] query: {raw}");

        let query = build_query(raw);
        let params = std::iter::once(("q", query.q.as_str()))
            .chain(query.params.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let Some(data) = self.fetch_volumes(params).await else {
            tracing::info!("[search] api error, returning empty list");
            return Vec::new();
        };
        let total = data.get("totalItems").and_then(Value::as_u64).unwrap_or(0);
        tracing::debug!("[search] total items found: {total}");

        let books: Vec<BookRecord> = normalize_items(&data)
            .into_iter()
            .filter(BookRecord::has_cover)
            .collect();
        tracing::debug!("[search] returning {} books", books.len());
        books
    }

    /// Curated titles first, then the section's broad query, deduplicated by
    /// id and capped at `limit`.
    pub async fn section(&self, name: &str, limit: usize) -> Vec<BookRecord> {
        let mut books: Vec<BookRecord> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for (title, author) in curated(name) {
            if books.len() >= limit {
                break;
            }
            if !self.curated_delay.is_zero() {
                tokio::time::sleep(self.curated_delay).await;
            }

            let q = format!(r#"intitle:"{title}" inauthor:"{author}""#);
            let params = [
                ("q", q.as_str()),
                ("maxResults", "5"),
                ("orderBy", "relevance"),
                ("projection", "full"),
            ];
            let Some(data) = self.fetch_volumes(params).await else {
                continue;
            };

            if let Some(book) = normalize_items(&data)
                .into_iter()
                .find(|b| b.has_cover() && !seen.contains(&b.id))
            {
                seen.insert(book.id.clone());
                books.push(book);
            }
        }

        if books.len() < limit {
            if let Some(q) = section_query(name) {
                let params = [
                    ("q", q),
                    ("orderBy", "relevance"),
                    ("maxResults", "40"),
                    ("printType", "books"),
                    ("projection", "full"),
                ];
                if let Some(data) = self.fetch_volumes(params).await {
                    for book in normalize_items(&data) {
                        if book.has_cover() && seen.insert(book.id.clone()) {
                            books.push(book);
                        }
                    }
                }
            }
        }

        books.truncate(limit);
        books
    }

    /// Books by the same author and with similar title words.
    pub async fn related(&self, title: &str, author: &str) -> Vec<BookRecord> {
        let title = title.trim();
        let author = author.trim();
        if title.is_empty() && author.is_empty() {
            return Vec::new();
        }

        let q = related_query(title, author);
        let params = [
            ("q", q.as_str()),
            ("maxResults", "20"),
            ("orderBy", "relevance"),
        ];
        match self.fetch_volumes(params).await {
            Some(data) => normalize_items(&data)
                .into_iter()
                .filter(BookRecord::has_cover)
                .collect(),
            None => {
                tracing::info!("[related] api error, returning empty list");
                Vec::new()
            }
        }
    }

    pub async fn book_by_id(&self, volume_id: &str) -> Option<BookRecord> {
        let mut url = Url::parse(&format!("{}/volumes/", self.base_url)).ok()?;
        url.path_segments_mut().ok()?.pop_if_empty().push(volume_id);
        url.query_pairs_mut().append_pair("projection", "full");
        if let Some(key) = &self.api_key {
            url.query_pairs_mut().append_pair("key", key);
        }

        let data = self.fetcher.fetch(url.as_str()).await?;
        match CatalogItem::deserialize(&data) {
            Ok(item) => Some(normalize(&item)),
            Err(e) => {
                tracing::error!("book_by_id {volume_id}: malformed volume: {e}");
                None
            }
        }
    }
}

/// `inauthor:<author> intitle:<w1+w2+w3>` where the title words are the first
/// three purely alphabetic ones. Falls back to the raw title or author.
pub fn related_query(title: &str, author: &str) -> String {
    let tokens = title
        .split_whitespace()
        .take(3)
        .filter(|t| t.chars().all(char::is_alphabetic))
        .collect::<Vec<_>>()
        .join("+");

    let mut parts = Vec::new();
    if !author.is_empty() {
        parts.push(format!("inauthor:{author}"));
    }
    if !tokens.is_empty() {
        parts.push(format!("intitle:{tokens}"));
    }

    if parts.is_empty() {
        if title.is_empty() { author } else { title }.to_string()
    } else {
        parts.join(" ")
    }
}

#[test]
fn test_related_query() {
    assert_eq!(
        related_query("The Fellowship of the Ring", "J.R.R. Tolkien"),
        "inauthor:J.R.R. Tolkien intitle:The+Fellowship+of"
    );
    assert_eq!(related_query("Catch 22", ""), "intitle:Catch");
    assert_eq!(related_query("", "Plato"), "inauthor:Plato");
    assert_eq!(related_query("1984", ""), "1984");
}
