/*!
 * SQLite persistence for chapters, their audit trail and story contexts.
 */

pub mod connection;
pub mod repository;
pub mod schema;

// Re-export main types
pub use connection::DatabaseConnection;
pub use repository::Repository;
