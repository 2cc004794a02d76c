//! Data layer module
//!
//! SQLite persistence for local actors, relationships, posts and the
//! processed-activity ledger.

mod database;
mod models;

pub use database::Database;
pub use models::*;

#[cfg(test)]
mod database_test;
