use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use futures::{StreamExt, stream};
use mongodb::bson::oid::ObjectId;

use crate::data_models::{Shelf, TO_READ};
use crate::error::{AppError, AppResult};
use crate::normalizer::BookRecord;

use super::AppState;
use super::accounts::CurrentUser;
use super::models::{
    AddBookResponse, BookIdRequest, MyListAddResponse, OkResponse, ShelfBooksParams,
    ShelfNameRequest, ShelfView,
};

const DEFAULT_SHELF_BOOKS_LIMIT: i64 = 40;
const CONCURRENT_BOOK_LOOKUPS: usize = 8;

/// Resolves a shelf id from the path, 404 unless the user owns it.
async fn owned_shelf(state: &AppState, user_id: &str, shelf_id: &str) -> AppResult<Shelf> {
    let shelf_id = ObjectId::parse_str(shelf_id).map_err(|_| AppError::NotFound)?;
    state
        .shelves
        .find_owned(user_id, shelf_id)
        .await?
        .ok_or(AppError::NotFound)
}

/// `limit` query value for shelf listings: absent means the default, zero
/// means nothing, negative or non-numeric values are rejected.
fn shelf_books_limit(raw: Option<&str>) -> AppResult<i64> {
    match raw.map(str::trim) {
        None | Some("") => Ok(DEFAULT_SHELF_BOOKS_LIMIT),
        Some(raw) => match raw.parse::<i64>() {
            Ok(limit) if limit >= 0 => Ok(limit),
            Ok(_) => Err(AppError::bad_request("limit must not be negative")),
            Err(_) => Err(AppError::bad_request("limit must be an integer")),
        },
    }
}

fn required(value: String, field: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::bad_request(format!("{field} required")));
    }
    Ok(value.to_string())
}

pub async fn ensure_defaults(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<OkResponse>> {
    state.shelves.ensure_defaults(&user.id).await?;
    Ok(Json(OkResponse { ok: true }))
}

pub async fn list_shelves(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<ShelfView>>> {
    let shelves = state.shelves.list(&user.id).await?;
    Ok(Json(shelves.into_iter().map(ShelfView::from).collect()))
}

pub async fn create_shelf(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    body: Option<Json<ShelfNameRequest>>,
) -> AppResult<(StatusCode, Json<ShelfView>)> {
    let name = required(body.map(|Json(b)| b.name).unwrap_or_default(), "name")?;

    match state.shelves.create(&user.id, &name).await? {
        Some(shelf) => Ok((StatusCode::CREATED, Json(shelf.into()))),
        None => Err(AppError::bad_request(format!("shelf '{name}' already exists"))),
    }
}

pub async fn rename_shelf(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(shelf_id): Path<String>,
    body: Option<Json<ShelfNameRequest>>,
) -> AppResult<Json<OkResponse>> {
    let shelf = owned_shelf(&state, &user.id, &shelf_id).await?;
    if shelf.is_default {
        return Err(AppError::bad_request("cannot rename default shelf"));
    }
    let name = required(body.map(|Json(b)| b.name).unwrap_or_default(), "name")?;

    if !state.shelves.rename(shelf.id, &name).await? {
        return Err(AppError::bad_request(format!("shelf '{name}' already exists")));
    }
    Ok(Json(OkResponse { ok: true }))
}

pub async fn delete_shelf(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(shelf_id): Path<String>,
) -> AppResult<Json<OkResponse>> {
    let shelf = owned_shelf(&state, &user.id, &shelf_id).await?;
    if shelf.is_default {
        return Err(AppError::bad_request("cannot delete default shelf"));
    }

    state.shelves.delete(shelf.id).await?;
    Ok(Json(OkResponse { ok: true }))
}

/// Books on a shelf, newest first. Each id is looked up in the catalog and
/// entries without a cover are left out.
pub async fn shelf_books(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(shelf_id): Path<String>,
    Query(params): Query<ShelfBooksParams>,
) -> AppResult<Json<Vec<BookRecord>>> {
    let shelf = owned_shelf(&state, &user.id, &shelf_id).await?;
    let limit = shelf_books_limit(params.limit.as_deref())?;
    if limit == 0 {
        return Ok(Json(Vec::new()));
    }

    let ids = state.shelves.book_ids(shelf.id, limit).await?;
    let catalog = &state.catalog;
    let books: Vec<BookRecord> = stream::iter(ids)
        .map(|id| async move { catalog.book_by_id(&id).await })
        .buffered(CONCURRENT_BOOK_LOOKUPS)
        .filter_map(|book| async move { book.filter(BookRecord::has_cover) })
        .collect()
        .await;

    Ok(Json(books))
}

pub async fn add_shelf_book(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(shelf_id): Path<String>,
    body: Option<Json<BookIdRequest>>,
) -> AppResult<Json<AddBookResponse>> {
    let shelf = owned_shelf(&state, &user.id, &shelf_id).await?;
    let book_id = required(body.map(|Json(b)| b.book_id).unwrap_or_default(), "book_id")?;

    let added = state.shelves.add_book(shelf.id, &book_id).await?;
    Ok(Json(AddBookResponse { ok: true, added }))
}

pub async fn remove_shelf_book(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((shelf_id, book_id)): Path<(String, String)>,
) -> AppResult<Json<OkResponse>> {
    let shelf = owned_shelf(&state, &user.id, &shelf_id).await?;
    state.shelves.remove_book(shelf.id, &book_id).await?;
    Ok(Json(OkResponse { ok: true }))
}

/// Quick-add to the "To Read" shelf.
pub async fn mylist_add(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    body: Option<Json<BookIdRequest>>,
) -> AppResult<Json<MyListAddResponse>> {
    let book_id = required(body.map(|Json(b)| b.book_id).unwrap_or_default(), "book_id")?;

    state.shelves.ensure_defaults(&user.id).await?;
    let shelf = state
        .shelves
        .find_by_name(&user.id, TO_READ)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("default shelf missing")))?;

    let added = state.shelves.add_book(shelf.id, &book_id).await?;
    Ok(Json(MyListAddResponse {
        ok: true,
        shelf_id: shelf.id.to_hex(),
        added,
    }))
}
