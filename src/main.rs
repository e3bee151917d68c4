use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use bookshelf::api::{AppState, create_router};
use bookshelf::auth::{Gravatar, TokenIssuer};
use bookshelf::catalog::CatalogService;
use bookshelf::config::Config;
use bookshelf::db::Database;
use bookshelf::fetcher::{CachedFetcher, HttpFetcher};

#[derive(Parser)]
#[command(name = "bookshelf", about = "Book discovery and personal shelves")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Report which configuration values were found
    CheckEnv,
    /// Verify the database answers and list its collections
    CheckDb,
    /// Create the unique indexes the application relies on
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    // Initialize tracing subscriber (handles both tracing and log crate)
    let level = if config.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .init();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::CheckEnv => {
            check_env(&config);
            Ok(())
        }
        Command::CheckDb => check_db(&config).await,
        Command::Migrate => {
            let db = Database::from_config(&config).await?;
            db.ensure_indexes().await?;
            println!("Migrations applied successfully.");
            Ok(())
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let tokens = TokenIssuer::new(config.require_secret_key()?, config.token_ttl);

    let db = Database::from_config(&config).await?;
    db.ensure_indexes().await?;

    let fetcher = CachedFetcher::new(HttpFetcher::new()?, config.cache_ttl);
    let catalog = CatalogService::new(Arc::new(fetcher), config.catalog_base_url.clone())
        .with_api_key(config.google_books_api_key.clone())
        .with_curated_delay(config.curated_delay);
    if config.google_books_api_key.is_none() {
        tracing::warn!("GOOGLE_BOOKS_API_KEY is not set, using anonymous quota");
    }

    let state = AppState::new(
        catalog,
        &db,
        Gravatar::new(config.gravatar_base_url.clone())?,
        tokens,
        config.pdf_dir.clone(),
        config.debug,
    );
    let app = create_router(state, &config.static_dir);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("bookshelf listening on {addr}");

    axum::serve(listener, app).await?;
    Ok(())
}

fn check_env(config: &Config) {
    println!("--- Environment check ---");
    println!("MONGO_URI: loaded");
    println!("MONGO_DB_NAME: {}", config.mongo_db_name);
    println!(
        "SECRET_KEY: {}",
        if config.secret_key.is_some() { "loaded" } else { "missing" }
    );
    match &config.google_books_api_key {
        Some(key) => {
            let tail = key
                .char_indices()
                .rev()
                .nth(3)
                .map_or(key.as_str(), |(i, _)| &key[i..]);
            println!("GOOGLE_BOOKS_API_KEY: loaded (...{tail})");
        }
        None => println!("GOOGLE_BOOKS_API_KEY: missing"),
    }
    println!("--- Environment check finished ---");
}

async fn check_db(config: &Config) -> anyhow::Result<()> {
    let db = Database::from_config(config).await?;
    let collections = db
        .database()
        .list_collection_names()
        .await
        .context("Failed to list collections")?;
    println!(
        "Collections in '{}': {:?}",
        db.database().name(),
        collections
    );
    println!("OK: database connectivity verified.");
    Ok(())
}
