//! Error taxonomy
//!
//! Maps server-assigned numeric error codes to canonical messages.
//!
//! Tables are plain immutable values handed to the connection through
//! [`ClientConfig`](crate::config::ClientConfig), so two connections can speak
//! different protocol revisions side by side. Unknown codes are expected as the
//! protocol evolves and always resolve to a fallback message.

use std::borrow::Cow;

use thiserror::Error;

/// Messages of the legacy binary protocol, indexed by code
const LEGACY_MESSAGES: &[&str] = &[
    "Unspecified error",
    "Unrecognized command",
    "Unrecognized configuration key",
    "Invalid configuration value",
    "Unrecognized byte code",
    "Unauthorized",
    "Failed authentication attempt",
    "Resource exhausted",
    "No such stream",
    "No such circuit",
    "No such OR",
];

/// Failure statuses of the text protocol
const STANDARD_ENTRIES: &[(i32, &str)] = &[
    (451, "Resource exhausted"),
    (500, "Syntax error: protocol"),
    (510, "Unrecognized command"),
    (511, "Unimplemented command"),
    (512, "Syntax error in command argument"),
    (513, "Unrecognized command argument"),
    (514, "Authentication required"),
    (515, "Bad authentication"),
    (550, "Unspecified error"),
    (551, "Internal error"),
    (552, "Unrecognized entity"),
    (553, "Invalid configuration value"),
    (554, "Invalid descriptor"),
    (555, "Unmanaged entity"),
];

/// Ordered code → message table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorTable {
    /// Sorted by code, codes unique
    entries: Vec<(i32, Cow<'static, str>)>,
}

impl ErrorTable {
    /// Dense table: the message at index `i` has code `i`
    pub fn indexed<I, S>(messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Cow<'static, str>>,
    {
        let entries = messages
            .into_iter()
            .enumerate()
            .map(|(i, m)| (i as i32, m.into()))
            .collect();
        Self { entries }
    }

    /// Sparse table from `(code, message)` pairs
    ///
    /// Later duplicates of a code replace earlier ones.
    pub fn from_entries<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (i32, S)>,
        S: Into<Cow<'static, str>>,
    {
        let mut entries: Vec<(i32, Cow<'static, str>)> =
            pairs.into_iter().map(|(c, m)| (c, m.into())).collect();

        // Stable sort keeps insertion order among equal codes; keep the last one.
        entries.sort_by_key(|(code, _)| *code);
        let mut deduped: Vec<(i32, Cow<'static, str>)> = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(last) = deduped.last_mut() {
                if last.0 == entry.0 {
                    *last = entry;
                    continue;
                }
            }
            deduped.push(entry);
        }

        Self { entries: deduped }
    }

    /// Table for the legacy binary protocol (codes 0..=10)
    pub fn legacy() -> Self {
        Self::indexed(LEGACY_MESSAGES.iter().copied())
    }

    /// Table for the text protocol's 4xx/5xx statuses
    pub fn standard() -> Self {
        Self::from_entries(STANDARD_ENTRIES.iter().copied())
    }

    /// Resolve a code to its message; never fails
    pub fn resolve(&self, code: i32) -> Cow<'_, str> {
        match self.lookup(code) {
            Some(message) => Cow::Borrowed(message),
            None => Cow::Owned(format!("Unrecognized error #{}", code)),
        }
    }

    /// Exact table entry for `code`, if any
    pub fn lookup(&self, code: i32) -> Option<&str> {
        self.entries
            .binary_search_by_key(&code, |(c, _)| *c)
            .ok()
            .map(|i| self.entries[i].1.as_ref())
    }

    /// Build the error for a failed command
    pub fn error(&self, code: i32, detail: impl Into<String>) -> ProtocolError {
        ProtocolError {
            code,
            message: self.resolve(code).into_owned(),
            detail: detail.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ErrorTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// A server-reported failure for one command
///
/// Carries the numeric code for branching and the resolved message for display.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Protocol error {code}: {message}{}", detail_suffix(.detail))]
pub struct ProtocolError {
    /// Code as reported by the server
    pub code: i32,

    /// Canonical message from the error table
    pub message: String,

    /// Server's own text from the failing line (may be empty)
    pub detail: String,
}

impl ProtocolError {
    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }
}

fn detail_suffix(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!(" ({})", detail)
    }
}
