pub mod api;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod data_models;
pub mod db;
pub mod error;
pub mod fetcher;
pub mod normalizer;
pub mod query_builder;
