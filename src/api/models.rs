use serde::{Deserialize, Serialize};

use crate::data_models::{Shelf, User};

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct SectionParams {
    pub limit: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RelatedParams {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
}

#[derive(Debug, Deserialize)]
pub struct PdfParams {
    pub fallback: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ShelfBooksParams {
    pub limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ShelfNameRequest {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct BookIdRequest {
    #[serde(default)]
    pub book_id: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub debug: bool,
}

#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: String,
    pub name: String,
    pub email: String,
    pub avatar: String,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            avatar: user.avatar,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProfileView {
    pub id: String,
    pub name: String,
    pub avatar: String,
}

impl From<User> for ProfileView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            avatar: user.avatar,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserView,
    pub created: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct NoGravatarResponse {
    pub error: String,
    pub gravatar_signup_url: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteProfileResponse {
    pub success: bool,
    pub self_deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct ShelfView {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

impl From<Shelf> for ShelfView {
    fn from(shelf: Shelf) -> Self {
        Self {
            id: shelf.id.to_hex(),
            name: shelf.name,
            is_default: shelf.is_default,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct AddBookResponse {
    pub ok: bool,
    pub added: bool,
}

#[derive(Debug, Serialize)]
pub struct MyListAddResponse {
    pub ok: bool,
    pub shelf_id: String,
    pub added: bool,
}
