//! Property handling for the gitstamp system.
//!
//! Collected git and build metadata is held as an ordered string-to-string
//! map ([`set::PropertySet`]), filtered by property name
//! ([`filter::PropertyFilter`]), and persisted in one of several file
//! formats ([`format::OutputFormat`]). [`generator::PropertiesFileGenerator`]
//! ties these together and rewrites the output file only when its content
//! actually changed.

pub mod filter;
pub mod format;
pub mod generator;
pub mod keys;
pub mod set;
