//! Database layer: the durable on-device submission queue

mod connection;
mod migrations;
mod store;

pub use connection::Database;
pub use store::{SqliteSubmissionStore, SubmissionStore};
