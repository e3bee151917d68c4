use serde::Deserialize;
use serde_json::{Value, json};

use bookshelf::normalizer::{
    BookRecord, CatalogItem, NO_DESCRIPTION, NO_PAGES, NOT_FOR_SALE, UNKNOWN_AUTHOR, UNTITLED,
    normalize, normalize_items,
};

fn record(raw: Value) -> BookRecord {
    let item = CatalogItem::deserialize(&raw).unwrap();
    normalize(&item)
}

mod cover_tests {
    use super::*;

    #[test]
    fn test_largest_image_wins() {
        let book = record(json!({
            "id": "x",
            "volumeInfo": {"imageLinks": {"thumbnail": "t.jpg", "large": "l.jpg"}}
        }));
        assert_eq!(book.cover.as_deref(), Some("l.jpg"));
    }

    #[test]
    fn test_full_priority_order() {
        let keys = ["extraLarge", "large", "medium", "small", "thumbnail", "smallThumbnail"];
        for (i, key) in keys.iter().enumerate() {
            let mut links = serde_json::Map::new();
            for lower in &keys[i..] {
                links.insert(lower.to_string(), json!(format!("{lower}.jpg")));
            }
            let book = record(json!({"id": "x", "volumeInfo": {"imageLinks": links}}));
            assert_eq!(book.cover, Some(format!("{key}.jpg")));
        }
    }

    #[test]
    fn test_empty_url_is_skipped() {
        let book = record(json!({
            "id": "x",
            "volumeInfo": {"imageLinks": {"extraLarge": "", "smallThumbnail": "s.jpg"}}
        }));
        assert_eq!(book.cover.as_deref(), Some("s.jpg"));
    }

    #[test]
    fn test_no_images_means_no_cover() {
        let book = record(json!({"id": "x", "volumeInfo": {"title": "T"}}));
        assert_eq!(book.cover, None);
        assert!(!book.has_cover());
    }
}

mod availability_tests {
    use super::*;

    #[test]
    fn test_free_saleability() {
        let book = record(json!({
            "id": "abc",
            "saleInfo": {"saleability": "FREE"},
            "volumeInfo": {"previewLink": "https://example.com/preview"}
        }));
        assert!(book.is_free);
        assert_eq!(
            book.preview_link.as_deref(),
            Some("https://play.google.com/books/reader?id=abc")
        );
    }

    #[test]
    fn test_all_pages_viewability_is_free() {
        let book = record(json!({
            "id": "abc",
            "saleInfo": {"saleability": "FOR_SALE"},
            "accessInfo": {"viewability": "ALL_PAGES"}
        }));
        assert!(book.is_free);
        assert_eq!(book.viewability, "ALL_PAGES");
    }

    #[test]
    fn test_partial_viewability_uses_reader_but_is_not_free() {
        let book = record(json!({
            "id": "abc",
            "accessInfo": {"viewability": "PARTIAL"},
            "volumeInfo": {"previewLink": "https://example.com/preview"}
        }));
        assert!(!book.is_free);
        assert_eq!(
            book.preview_link.as_deref(),
            Some("https://play.google.com/books/reader?id=abc")
        );
    }

    #[test]
    fn test_preview_fallback_order() {
        let all = json!({
            "id": "abc",
            "accessInfo": {"viewability": "NO_PAGES", "webReaderLink": "web"},
            "volumeInfo": {"previewLink": "preview", "canonicalVolumeLink": "canonical"}
        });
        assert_eq!(record(all).preview_link.as_deref(), Some("preview"));

        let no_preview = json!({
            "id": "abc",
            "accessInfo": {"webReaderLink": "web"},
            "volumeInfo": {"previewLink": "", "canonicalVolumeLink": "canonical"}
        });
        assert_eq!(record(no_preview).preview_link.as_deref(), Some("web"));

        let canonical_only = json!({
            "id": "abc",
            "volumeInfo": {"canonicalVolumeLink": "canonical"}
        });
        assert_eq!(record(canonical_only).preview_link.as_deref(), Some("canonical"));

        let nothing = json!({"id": "abc"});
        assert_eq!(record(nothing).preview_link, None);
    }

    #[test]
    fn test_not_free_when_nothing_says_so() {
        let book = record(json!({"id": "abc"}));
        assert!(!book.is_free);
        assert_eq!(book.saleability, NOT_FOR_SALE);
        assert_eq!(book.viewability, NO_PAGES);
    }
}

mod author_tests {
    use super::*;

    #[test]
    fn test_authors_joined() {
        let book = record(json!({"id": "x", "volumeInfo": {"authors": ["A", "B"]}}));
        assert_eq!(book.author, "A, B");
    }

    #[test]
    fn test_missing_authors() {
        let book = record(json!({"id": "x", "volumeInfo": {}}));
        assert_eq!(book.author, UNKNOWN_AUTHOR);
    }

    #[test]
    fn test_null_authors() {
        let book = record(json!({"id": "x", "volumeInfo": {"authors": null}}));
        assert_eq!(book.author, UNKNOWN_AUTHOR);
    }

    #[test]
    fn test_single_string_author() {
        let book = record(json!({"id": "x", "volumeInfo": {"authors": "Solo Writer"}}));
        assert_eq!(book.author, "Solo Writer");
    }
}

mod default_tests {
    use super::*;

    #[test]
    fn test_empty_item_defaults() {
        let book = record(json!({}));
        assert_eq!(book.id, "");
        assert_eq!(book.title, UNTITLED);
        assert_eq!(book.author, UNKNOWN_AUTHOR);
        assert_eq!(book.description, NO_DESCRIPTION);
        assert_eq!(book.buy_link, "#");
        assert_eq!(book.saleability, NOT_FOR_SALE);
        assert_eq!(book.viewability, NO_PAGES);
        assert!(book.categories.is_empty());
        assert_eq!(book.cover, None);
        assert_eq!(book.rating, None);
    }

    #[test]
    fn test_pdf_link_from_id() {
        assert_eq!(record(json!({"id": "zyTCAlFPjgYC"})).pdf_link, "/pdfs/zyTCAlFPjgYC.pdf");
        assert_eq!(record(json!({})).pdf_link, "/pdfs/.pdf");
    }

    #[test]
    fn test_info_link_falls_back_to_self_link() {
        let book = record(json!({"id": "x", "selfLink": "https://api/self"}));
        assert_eq!(book.info_link.as_deref(), Some("https://api/self"));

        let book = record(json!({
            "id": "x",
            "selfLink": "https://api/self",
            "volumeInfo": {"infoLink": "https://info"}
        }));
        assert_eq!(book.info_link.as_deref(), Some("https://info"));
    }

    #[test]
    fn test_metadata_carried_over() {
        let book = record(json!({
            "id": "x",
            "volumeInfo": {
                "title": "Dune",
                "publisher": "Chilton",
                "publishedDate": "1965",
                "categories": ["Fiction"],
                "pageCount": 412,
                "language": "en",
                "averageRating": 4.5,
                "ratingsCount": 1200
            },
            "saleInfo": {"buyLink": "https://buy"}
        }));
        assert_eq!(book.title, "Dune");
        assert_eq!(book.publisher.as_deref(), Some("Chilton"));
        assert_eq!(book.published_date.as_deref(), Some("1965"));
        assert_eq!(book.categories, vec!["Fiction".to_string()]);
        assert_eq!(book.page_count, Some(412));
        assert_eq!(book.language.as_deref(), Some("en"));
        assert_eq!(book.rating, Some(4.5));
        assert_eq!(book.ratings_count, Some(1200));
        assert_eq!(book.buy_link, "https://buy");
    }

    #[test]
    fn test_serialized_field_names() {
        let book = record(json!({"id": "x", "volumeInfo": {"publishedDate": "2001"}}));
        let value = serde_json::to_value(&book).unwrap();
        assert_eq!(value["publishedDate"], "2001");
        assert!(value.get("pageCount").is_some());
        assert!(value.get("ratingsCount").is_some());
        assert_eq!(value["pdf_link"], "/pdfs/x.pdf");
    }
}

mod bulk_tests {
    use super::*;

    #[test]
    fn test_malformed_item_is_skipped() {
        let response = json!({
            "items": [
                {"id": "good", "volumeInfo": {"title": "Fine"}},
                {"id": "bad", "volumeInfo": {"title": 42}},
                {"id": "also-good"}
            ]
        });
        let books = normalize_items(&response);
        let ids: Vec<&str> = books.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["good", "also-good"]);
    }

    #[test]
    fn test_missing_items_key() {
        assert!(normalize_items(&json!({"totalItems": 0})).is_empty());
        assert!(normalize_items(&json!({"items": "nope"})).is_empty());
    }
}
