//! Data models

mod submission;

pub use submission::{Category, Payload, Submission, SubmissionId, SyncState};
