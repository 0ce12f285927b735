//! Repository layer for database persistence.
//!
//! All database access uses Diesel ORM with diesel-async. SQLite is always
//! available; PostgreSQL is enabled with the `postgres` feature.

pub mod context;
pub mod jobs;
pub mod keywords;
pub mod models;
pub mod pool;
pub mod url_catalog;
pub mod util;

pub use context::DbContext;
pub use jobs::JobRepository;
pub use keywords::KeywordRepository;
pub use pool::{DbPool, DieselError};
pub use url_catalog::UrlCatalogRepository;
