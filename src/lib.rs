//! SiteForge: provider-backed website generation jobs.
//!
//! A job moves pending -> generating -> completed | failed. Creating a job
//! reserves its full price against the team balance; a failed job refunds
//! exactly once; completed output is a parsed file set plus a deterministic
//! zip archive, both persisted for later download and editing.

pub mod commands;
pub mod core;
pub mod error;
pub mod models;
