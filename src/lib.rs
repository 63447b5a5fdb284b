//! Periodic point-in-time backups of a live SQLite database.
//!
//! A [`backup::Scheduler`] ticks at a fixed frequency and asks its
//! [`backup::Backuper`] to copy, vacuum, compress and prune. Each finished
//! artifact is published as a [`backup::BackupResult`] for a downstream
//! [`sink::ResultSink`].

pub mod backup;
pub mod config;
pub mod database;
pub mod error;
pub mod sink;
pub mod utils;
#[cfg(test)]
mod test_utils;
