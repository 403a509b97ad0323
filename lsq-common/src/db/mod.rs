//! Database initialization and schema management

pub mod init;
pub mod migrations;

pub use init::{create_tables, init_database};
