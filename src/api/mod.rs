use axum::{
    Router,
    routing::{delete, get, patch, post},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::auth::{Gravatar, TokenIssuer};
use crate::catalog::CatalogService;
use crate::db::{Database, ShelfRepo, UserRepo};

pub mod accounts;
pub mod handlers;
pub mod models;
pub mod shelves;

/// Everything a handler may need, built once in `main`.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CatalogService>,
    pub users: Arc<UserRepo>,
    pub shelves: Arc<ShelfRepo>,
    pub gravatar: Arc<Gravatar>,
    pub tokens: TokenIssuer,
    pub pdf_dir: PathBuf,
    pub debug: bool,
}

impl AppState {
    pub fn new(
        catalog: CatalogService,
        db: &Database,
        gravatar: Gravatar,
        tokens: TokenIssuer,
        pdf_dir: PathBuf,
        debug: bool,
    ) -> Self {
        Self {
            catalog: Arc::new(catalog),
            users: Arc::new(UserRepo::new(db)),
            shelves: Arc::new(ShelfRepo::new(db)),
            gravatar: Arc::new(gravatar),
            tokens,
            pdf_dir,
            debug,
        }
    }
}

pub fn create_router(state: AppState, static_dir: &Path) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        // Catalog
        .route("/api/books/search", get(handlers::search_books))
        .route("/api/books/section/:section_name", get(handlers::books_by_section))
        .route("/api/books/related", get(handlers::related_books))
        .route("/pdfs/:filename", get(handlers::serve_pdf))
        // Accounts
        .route("/login", post(accounts::login))
        .route("/profiles", get(accounts::list_profiles))
        .route("/api/profiles/:profile_id", delete(accounts::delete_profile))
        // Shelves
        .route("/api/shelves/defaults", post(shelves::ensure_defaults))
        .route(
            "/api/shelves",
            get(shelves::list_shelves).post(shelves::create_shelf),
        )
        .route(
            "/api/shelves/:shelf_id",
            patch(shelves::rename_shelf).delete(shelves::delete_shelf),
        )
        .route(
            "/api/shelves/:shelf_id/books",
            get(shelves::shelf_books).post(shelves::add_shelf_book),
        )
        .route(
            "/api/shelves/:shelf_id/books/:book_id",
            delete(shelves::remove_shelf_book),
        )
        .route("/api/mylist/add", post(shelves::mylist_add))
        .with_state(state)
        // Static file serving for the UI
        .fallback_service(ServeDir::new(static_dir))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
