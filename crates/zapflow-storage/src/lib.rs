//! ZapFlow Storage - Embedded database layer
//!
//! This crate provides the SQLite-backed persistence layer for ZapFlow:
//! connection pool, models, repositories, and migrations.

pub mod db;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use models::*;
pub use repository::*;
