//! SQLite backend for the Tome shared stores.
//!
//! Implements the usage-counter, rate-limit, and credential store traits
//! over a single database file, wrapping [`tokio_rusqlite`] so all database
//! access runs on a dedicated thread pool without blocking the async
//! runtime. Increment and window operations run inside SQL transactions so
//! concurrent requests for the same key cannot race past a limit.

mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
