//! # csvshelf Common Library
//!
//! Shared code for the csvshelf service crates:
//! - Error type and result alias
//! - Configuration loading and root folder resolution
//! - Database bootstrap (pool, pragmas, schema)
//! - Timestamp and UUID helpers

pub mod config;
pub mod db;
pub mod error;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
