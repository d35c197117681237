//! CI build-server detection for the gitstamp system.
//!
//! Hosted CI systems announce themselves through environment variables and
//! expose build numbers and branch names through their own conventions.
//! This crate detects which system a build is running on from an immutable
//! environment snapshot and maps those conventions onto gitstamp's
//! property keys. Detection is pure: nothing here reads the process
//! environment unless explicitly asked to snapshot it.

pub mod build_data;
pub mod env;
pub mod server;
