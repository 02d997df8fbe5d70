pub mod auth;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fetch;
pub mod formatter;
pub mod models;
pub mod normalizer;
pub mod selector;
