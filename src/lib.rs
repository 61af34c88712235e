//! Quality-control temperature log.
//!
//! Readings arrive over UDP ([`socket`]), are stored in postgres ([`database`]) and are
//! summarised by the pure functions in [`report`]. Every operation that changes data or shows a
//! restricted view takes an [`access::AccessContext`] naming the acting user.
pub mod access;
pub mod config;
pub mod database;
pub mod error;
pub mod export;
pub mod record;
pub mod report;
pub mod socket;
pub mod store;

#[cfg(test)]
mod test_helpers;

pub use error::{Error, Result};
