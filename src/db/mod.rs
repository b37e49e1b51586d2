//! Local database
//!
//! SQLite backing for the `sqlite` store driver.
//!
//! ```ignore
//! use isbank::db::{create_pool, migrations};
//!
//! let pool = create_pool("data/isbank.db").await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, create_test_pool};
