use axum::{
    Json,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Redirect, Response},
};
use reqwest::Url;

use crate::catalog::DEFAULT_SECTION_LIMIT;
use crate::error::{AppError, AppResult};
use crate::normalizer::BookRecord;

use super::AppState;
use super::models::{HealthResponse, PdfParams, RelatedParams, SearchParams, SectionParams};

/// Liveness only, the database is not touched.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        debug: state.debug,
    })
}

pub async fn search_books(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Json<Vec<BookRecord>> {
    Json(state.catalog.search(&params.q).await)
}

pub async fn books_by_section(
    State(state): State<AppState>,
    Path(section_name): Path<String>,
    Query(params): Query<SectionParams>,
) -> Json<Vec<BookRecord>> {
    let limit = params
        .limit
        .as_deref()
        .and_then(|l| l.trim().parse::<usize>().ok())
        .unwrap_or(DEFAULT_SECTION_LIMIT);

    Json(state.catalog.section(&section_name, limit).await)
}

pub async fn related_books(
    State(state): State<AppState>,
    Query(params): Query<RelatedParams>,
) -> Json<Vec<BookRecord>> {
    Json(state.catalog.related(&params.title, &params.author).await)
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\']) && !name.contains("..")
}

/// Serves a local PDF, or sends the client to `fallback` (usually the
/// catalog preview) when the file is not there.
pub async fn serve_pdf(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    Query(params): Query<PdfParams>,
) -> AppResult<Response> {
    if !is_plain_file_name(&filename) {
        return Err(AppError::bad_request("invalid file name"));
    }

    match tokio::fs::read(state.pdf_dir.join(&filename)).await {
        Ok(bytes) => Ok(([(header::CONTENT_TYPE, "application/pdf")], bytes).into_response()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let fallback = params
                .fallback
                .filter(|f| Url::parse(f).is_ok_and(|u| matches!(u.scheme(), "http" | "https")));
            match fallback {
                Some(url) => Ok(Redirect::to(&url).into_response()),
                None => Err(AppError::NotFound),
            }
        }
        Err(e) => Err(AppError::Internal(
            anyhow::Error::from(e).context(format!("reading pdf {filename}")),
        )),
    }
}

#[test]
fn test_is_plain_file_name() {
    assert!(is_plain_file_name("abc123.pdf"));
    assert!(!is_plain_file_name("../secret.pdf"));
    assert!(!is_plain_file_name("nested/file.pdf"));
    assert!(!is_plain_file_name(""));
}
