//! Reading and writing property files in multiple formats.
//!
//! The caller hands over an ordered [`PropertySet`] and a format tag; the
//! shape of the map never changes, only its on-disk encoding. JSON, YAML
//! and TOML go through serde; the key/value properties format is written
//! and parsed here.

use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::set::PropertySet;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur while reading or writing a property file.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The file could not be read or written.
    #[error("failed to access properties file: {0}")]
    Io(#[from] io::Error),

    /// JSON encoding or decoding failed.
    #[error("invalid json properties: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML encoding or decoding failed.
    #[error("invalid yaml properties: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML encoding failed.
    #[error("failed to encode toml properties: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// TOML decoding failed.
    #[error("invalid toml properties: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// A key/value properties line had no separator.
    #[error("malformed properties line {line}")]
    Malformed {
        /// 1-based line number of the offending line.
        line: usize,
    },
}

/// A specialized `Result` type for property file operations.
pub type Result<T> = std::result::Result<T, FormatError>;

// ---------------------------------------------------------------------------
// OutputFormat
// ---------------------------------------------------------------------------

/// The on-disk encoding of a generated properties file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// `key=value` lines.
    #[default]
    Properties,
    /// A flat JSON object.
    Json,
    /// A flat YAML mapping.
    Yaml,
    /// A flat TOML table.
    Toml,
}

impl OutputFormat {
    /// The conventional file extension for this format.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Properties => "properties",
            OutputFormat::Json => "json",
            OutputFormat::Yaml => "yml",
            OutputFormat::Toml => "toml",
        }
    }

    /// Encode `properties` in this format.
    ///
    /// # Errors
    ///
    /// Returns the underlying encoder error for the serde-backed formats;
    /// the properties format itself cannot fail.
    pub fn render(self, properties: &PropertySet) -> Result<String> {
        match self {
            OutputFormat::Properties => Ok(render_properties(properties)),
            OutputFormat::Json => {
                let mut text = serde_json::to_string_pretty(properties)?;
                text.push('\n');
                Ok(text)
            }
            OutputFormat::Yaml => Ok(serde_yaml::to_string(properties)?),
            OutputFormat::Toml => Ok(toml::to_string(properties)?),
        }
    }

    /// Decode a property map from `text` in this format.
    ///
    /// # Errors
    ///
    /// Returns the underlying decoder error, or [`FormatError::Malformed`]
    /// for a properties line without a separator.
    pub fn parse(self, text: &str) -> Result<PropertySet> {
        match self {
            OutputFormat::Properties => parse_properties(text),
            OutputFormat::Json => Ok(serde_json::from_str(text)?),
            OutputFormat::Yaml => Ok(serde_yaml::from_str(text)?),
            OutputFormat::Toml => Ok(toml::from_str(text)?),
        }
    }
}

/// Write `properties` to `path` in the given format, creating parent
/// directories as needed.
///
/// # Errors
///
/// Returns [`FormatError::Io`] on filesystem failures, or the encoder
/// error for the chosen format.
pub fn write_properties_file(
    path: &Path,
    format: OutputFormat,
    properties: &PropertySet,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let text = format.render(properties)?;
    fs::write(path, text)?;
    debug!(path = %path.display(), ?format, "wrote properties file");
    Ok(())
}

/// Read a property map from `path` in the given format.
///
/// # Errors
///
/// Returns [`FormatError::Io`] on filesystem failures, or the decoder
/// error for the chosen format.
pub fn read_properties_file(path: &Path, format: OutputFormat) -> Result<PropertySet> {
    let text = fs::read_to_string(path)?;
    format.parse(&text)
}

// ---------------------------------------------------------------------------
// Key/value properties encoding
// ---------------------------------------------------------------------------

const PROPERTIES_HEADER: &str = "# Generated by gitstamp";

fn render_properties(properties: &PropertySet) -> String {
    let mut out = String::new();
    out.push_str(PROPERTIES_HEADER);
    out.push('\n');
    for (key, value) in properties.iter() {
        out.push_str(&escape_properties(key, true));
        out.push('=');
        out.push_str(&escape_properties(value, false));
        out.push('\n');
    }
    out
}

fn parse_properties(text: &str) -> Result<PropertySet> {
    let mut properties = PropertySet::new();
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let (key, value) =
            split_property_line(line).ok_or(FormatError::Malformed { line: index + 1 })?;
        properties.put(unescape_properties(key), unescape_properties(value));
    }
    Ok(properties)
}

/// Backslash-escape separator and comment characters. Spaces are escaped
/// everywhere in keys but only at the start of values.
fn escape_properties(text: &str, escape_spaces: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for (position, ch) in text.chars().enumerate() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '=' | ':' | '#' | '!' => {
                out.push('\\');
                out.push(ch);
            }
            ' ' if escape_spaces || position == 0 => out.push_str("\\ "),
            _ => out.push(ch),
        }
    }
    out
}

fn unescape_properties(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Find the first unescaped `=` or `:` separator.
fn split_property_line(line: &str) -> Option<(&str, &str)> {
    let mut escaped = false;
    for (index, byte) in line.bytes().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' => escaped = true,
            b'=' | b':' => return Some((&line[..index], &line[index + 1..])),
            _ => {}
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
