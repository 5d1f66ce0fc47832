//! Configuration entries
//!
//! One `key=value` pair as returned by the server in a reply line.

/// An immutable key/value pair decoded from one reply line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    key: String,
    value: String,
}

impl ConfigEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Parse `key=value` from a reply line
    ///
    /// A line without `=` is a key at its default and gets an empty value.
    /// Surrounding double quotes on the value are stripped.
    pub fn parse(line: &str) -> Self {
        match line.split_once('=') {
            Some((key, value)) => Self::new(key, unquote(value)),
            None => Self::new(line, ""),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}
