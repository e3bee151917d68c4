use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const UNKNOWN_AUTHOR: &str = "Unknown Author";
pub const UNTITLED: &str = "Untitled";
pub const NO_DESCRIPTION: &str = "No description available.";
pub const NOT_FOR_SALE: &str = "NOT_FOR_SALE";
pub const NO_PAGES: &str = "NO_PAGES";

const READER_URL: &str = "https://play.google.com/books/reader";

/// One entry of a volumes response. Every field is optional; defaults are
/// resolved in [`normalize`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CatalogItem {
    pub id: Option<String>,
    pub self_link: Option<String>,
    pub volume_info: VolumeInfo,
    pub sale_info: SaleInfo,
    pub access_info: AccessInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VolumeInfo {
    pub title: Option<String>,
    /// Usually a list of names, but kept loose so a bare string still works.
    pub authors: Option<Value>,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub published_date: Option<String>,
    pub categories: Option<Vec<String>>,
    pub page_count: Option<u64>,
    pub language: Option<String>,
    pub average_rating: Option<f64>,
    pub ratings_count: Option<u64>,
    pub image_links: ImageLinks,
    pub info_link: Option<String>,
    pub preview_link: Option<String>,
    pub canonical_volume_link: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageLinks {
    pub extra_large: Option<String>,
    pub large: Option<String>,
    pub medium: Option<String>,
    pub small: Option<String>,
    pub thumbnail: Option<String>,
    pub small_thumbnail: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SaleInfo {
    pub saleability: Option<String>,
    pub buy_link: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessInfo {
    pub viewability: Option<String>,
    pub web_reader_link: Option<String>,
}

/// The application's view of a catalog item, as served to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookRecord {
    pub id: String,
    pub title: String,
    pub author: String,
    pub cover: Option<String>,
    pub description: String,
    pub buy_link: String,
    pub info_link: Option<String>,
    pub preview_link: Option<String>,
    pub pdf_link: String,
    #[serde(rename = "publishedDate")]
    pub published_date: Option<String>,
    pub categories: Vec<String>,
    #[serde(rename = "pageCount")]
    pub page_count: Option<u64>,
    pub language: Option<String>,
    pub publisher: Option<String>,
    pub saleability: String,
    pub is_free: bool,
    pub viewability: String,
    pub rating: Option<f64>,
    #[serde(rename = "ratingsCount")]
    pub ratings_count: Option<u64>,
}

impl BookRecord {
    pub fn has_cover(&self) -> bool {
        self.cover.is_some()
    }
}

fn present(value: &Option<String>) -> Option<&String> {
    value.as_ref().filter(|s| !s.is_empty())
}

fn first_present<'a>(candidates: &[&'a Option<String>]) -> Option<String> {
    candidates
        .iter()
        .find_map(|c| present(c))
        .cloned()
}

fn author_names(authors: Option<&Value>) -> Vec<String> {
    let as_text = |v: &Value| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    match authors {
        Some(Value::Array(list)) => list.iter().map(as_text).collect(),
        Some(other) => vec![as_text(other)],
        None => vec![UNKNOWN_AUTHOR.to_string()],
    }
}

pub fn is_free(saleability: Option<&str>, viewability: Option<&str>) -> bool {
    saleability == Some("FREE") || viewability == Some("ALL_PAGES")
}

pub fn reader_url(id: &str) -> String {
    format!("{READER_URL}?id={id}")
}

/// Builds a [`BookRecord`] from one catalog item. Never fails: absent fields
/// fall back to fixed defaults.
pub fn normalize(item: &CatalogItem) -> BookRecord {
    let volume = &item.volume_info;
    let sale = &item.sale_info;
    let access = &item.access_info;
    let images = &volume.image_links;

    let cover = first_present(&[
        &images.extra_large,
        &images.large,
        &images.medium,
        &images.small,
        &images.thumbnail,
        &images.small_thumbnail,
    ]);

    let viewability = access.viewability.as_deref();
    let free = is_free(sale.saleability.as_deref(), viewability);
    let has_viewable_pages = viewability.is_some_and(|v| !v.is_empty() && v != NO_PAGES);

    let preview_link = match present(&item.id) {
        Some(id) if free || has_viewable_pages => Some(reader_url(id)),
        _ => first_present(&[
            &volume.preview_link,
            &access.web_reader_link,
            &volume.canonical_volume_link,
        ]),
    };

    let id = item.id.clone().unwrap_or_default();
    let pdf_link = format!("/pdfs/{id}.pdf");

    BookRecord {
        title: volume.title.clone().unwrap_or_else(|| UNTITLED.to_string()),
        author: author_names(volume.authors.as_ref()).join(", "),
        cover,
        description: volume
            .description
            .clone()
            .unwrap_or_else(|| NO_DESCRIPTION.to_string()),
        buy_link: sale.buy_link.clone().unwrap_or_else(|| "#".to_string()),
        info_link: first_present(&[&volume.info_link, &item.self_link]),
        preview_link,
        pdf_link,
        published_date: volume.published_date.clone(),
        categories: volume.categories.clone().unwrap_or_default(),
        page_count: volume.page_count,
        language: volume.language.clone(),
        publisher: volume.publisher.clone(),
        saleability: sale
            .saleability
            .clone()
            .unwrap_or_else(|| NOT_FOR_SALE.to_string()),
        is_free: free,
        viewability: access
            .viewability
            .clone()
            .unwrap_or_else(|| NO_PAGES.to_string()),
        rating: volume.average_rating,
        ratings_count: volume.ratings_count,
        id,
    }
}

/// Normalizes every well-formed item of a volumes response. Items that do not
/// deserialize are logged and skipped.
pub fn normalize_items(response: &Value) -> Vec<BookRecord> {
    let Some(items) = response.get("items").and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|raw| match CatalogItem::deserialize(raw) {
            Ok(item) => Some(normalize(&item)),
            Err(e) => {
                tracing::warn!("skipping malformed catalog item: {e}");
                None
            }
        })
        .collect()
}

#[test]
fn test_author_names_coercion() {
    use serde_json::json;

    assert_eq!(author_names(None), vec![UNKNOWN_AUTHOR.to_string()]);
    assert_eq!(author_names(Some(&json!("Solo"))), vec!["Solo".to_string()]);
    assert_eq!(
        author_names(Some(&json!(["A", "B"]))),
        vec!["A".to_string(), "B".to_string()]
    );
    assert_eq!(author_names(Some(&json!(42))), vec!["42".to_string()]);
}
