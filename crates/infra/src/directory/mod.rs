//! Directory adapters (users, roles, permissions).

pub mod postgres;

pub use postgres::PostgresDirectory;
