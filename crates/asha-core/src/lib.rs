//! asha-core - Core library for ASHA Collect
//!
//! This crate contains the durable offline submission queue, the
//! connectivity monitor, and the sync engine that drains pending form
//! submissions to the remote backend. Form rendering and authentication
//! live in external collaborators; this core only ever sees an opaque
//! payload and a category.

pub mod config;
pub mod connectivity;
pub mod db;
pub mod error;
pub mod intake;
pub mod models;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Category, Payload, Submission, SubmissionId, SyncState};
