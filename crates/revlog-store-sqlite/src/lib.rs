//! SQLite backend for the revlog change-history store.
//!
//! All access is synchronous on a single [`rusqlite::Connection`] owned by
//! the store handle. Writes run inside explicit transactions.

mod encode;
mod query;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use schema::LATEST_VERSION;
pub use store::SqliteStore;
