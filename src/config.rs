use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::catalog::DEFAULT_BASE_URL;
use crate::fetcher::DEFAULT_CACHE_TTL;

pub const DEFAULT_GRAVATAR_URL: &str = "https://www.gravatar.com";

/// Process configuration, read once at startup and handed to whoever needs it.
#[derive(Debug, Clone)]
pub struct Config {
    pub mongo_uri: String,
    pub mongo_db_name: String,
    pub secret_key: Option<String>,
    pub google_books_api_key: Option<String>,
    pub port: u16,
    pub debug: bool,
    pub cache_ttl: Duration,
    pub token_ttl: Duration,
    pub static_dir: PathBuf,
    pub pdf_dir: PathBuf,
    pub catalog_base_url: String,
    pub gravatar_base_url: String,
    pub curated_delay: Duration,
}

impl Config {
    pub fn from_env() -> Result<Config> {
        dotenv().ok(); // Load .env file if present
        Ok(Config {
            mongo_uri: get_env("MONGO_URI")?,
            mongo_db_name: get_env_or_default("MONGO_DB_NAME", "bookshelf"),
            secret_key: get_env_opt("SECRET_KEY"),
            google_books_api_key: get_env_opt("GOOGLE_BOOKS_API_KEY"),
            port: parse_env("PORT", 5000)?,
            debug: flag("DEBUG"),
            cache_ttl: Duration::from_secs(parse_env(
                "CACHE_TTL_SECS",
                DEFAULT_CACHE_TTL.as_secs(),
            )?),
            token_ttl: Duration::from_secs(parse_env("TOKEN_TTL_SECS", 7 * 24 * 3600)?),
            static_dir: get_env_or_default("STATIC_DIR", "static").into(),
            pdf_dir: get_env_or_default("PDF_DIR", "pdfs").into(),
            catalog_base_url: get_env_or_default("CATALOG_BASE_URL", DEFAULT_BASE_URL),
            gravatar_base_url: get_env_or_default("GRAVATAR_BASE_URL", DEFAULT_GRAVATAR_URL),
            curated_delay: Duration::from_millis(parse_env("CURATED_DELAY_MS", 300)?),
        })
    }

    pub fn require_secret_key(&self) -> Result<&str> {
        self.secret_key
            .as_deref()
            .context("Missing required environment variable: SECRET_KEY")
    }
}

fn get_env(key: &str) -> Result<String> {
    get_env_opt(key).with_context(|| format!("Missing required environment variable: {key}"))
}

fn get_env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn get_env_or_default(key: &str, default: &str) -> String {
    get_env_opt(key).unwrap_or_else(|| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get_env_opt(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {key}: {raw}")),
        None => Ok(default),
    }
}

fn flag(key: &str) -> bool {
    env::var(key).is_ok_and(|v| v == "1")
}
