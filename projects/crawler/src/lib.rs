//! Resumable GitHub repository star crawler
//!
//! - GraphQL search pagination with cursor checkpoints in `crawl/`
//! - PostgreSQL models and queries in `db/`
//! - Requires GITHUB_TOKEN and DATABASE_URL env vars

pub mod config;
pub mod crawl;
pub mod db;
