//! Descriptive metadata read from a plugin's main file header.
//!
//! Plugins describe themselves with `Key: value` lines in the leading
//! comment block of their main file:
//!
//! ```text
//! /*
//!  * Plugin Name: Example
//!  * Plugin URI: https://example.com
//!  * Version: 1.2.0
//!  * Author: Example Inc.
//!  * Description: Does things.
//!  */
//! ```
//!
//! Only the first 8 KiB of the file are scanned.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Bytes scanned for header fields.
const HEADER_SCAN_BYTES: u64 = 8 * 1024;

/// Shown when the manifest cannot be read.
pub const UNDEFINED: &str = "Undefined";

/// Metadata from a plugin manifest.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub name: String,
    pub url: String,
    pub version: String,
    pub author: String,
    pub description: String,
}

impl PluginMetadata {
    /// Loads metadata for the plugin at `plugins_dir/local_path`.
    ///
    /// A missing or unreadable file yields [`PluginMetadata::placeholder`].
    #[must_use]
    pub fn load(plugins_dir: &Path, local_path: &str) -> Self {
        let path = plugins_dir.join(local_path);
        let mut buf = Vec::new();
        let read = File::open(&path)
            .and_then(|f| f.take(HEADER_SCAN_BYTES).read_to_end(&mut buf));
        match read {
            Ok(_) => Self::parse(&String::from_utf8_lossy(&buf)),
            Err(_) => Self::placeholder(local_path),
        }
    }

    /// Metadata used when the manifest does not exist.
    #[must_use]
    pub fn placeholder(local_path: &str) -> Self {
        Self {
            name: local_path.to_string(),
            url: String::new(),
            version: UNDEFINED.to_string(),
            author: UNDEFINED.to_string(),
            description: String::new(),
        }
    }

    /// Extracts header fields from manifest text. Absent fields are empty.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        Self {
            name: header_field(text, "Plugin Name"),
            url: header_field(text, "Plugin URI"),
            version: header_field(text, "Version"),
            author: header_field(text, "Author"),
            description: header_field(text, "Description"),
        }
    }

    /// Author for display, falling back to [`UNDEFINED`].
    #[must_use]
    pub fn author_or_undefined(&self) -> &str {
        if self.author.is_empty() {
            UNDEFINED
        } else {
            &self.author
        }
    }
}

/// First value of `key` in the header, matched case-insensitively.
fn header_field(text: &str, key: &str) -> String {
    for line in text.lines() {
        let line = line.trim_start_matches([' ', '\t', '/', '*', '#', '@']);
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if !name.eq_ignore_ascii_case(key) {
            continue;
        }
        let value = value.trim();
        let value = value.strip_suffix("*/").unwrap_or(value).trim();
        return value.to_string();
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_key_must_match_exactly() {
        // "Plugin URI" must not be picked up as "Plugin Name".
        let text = "/*\n * Plugin URI: https://x.test\n * Plugin Name: X\n */";
        assert_eq!(header_field(text, "Plugin Name"), "X");
        assert_eq!(header_field(text, "Plugin URI"), "https://x.test");
    }

    #[test]
    fn trailing_comment_close_is_stripped() {
        assert_eq!(header_field("/* Version: 2.0 */", "Version"), "2.0");
    }
}
