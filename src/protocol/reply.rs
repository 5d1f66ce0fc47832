//! Reply definitions
//!
//! Parsed units coming back from the server.

use super::{ConfigEntry, Event};

/// Separator following the three-digit status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separator {
    /// Mid-reply line, more status lines follow
    Continuation,

    /// Mid-reply line followed by a verbatim data block
    Data,

    /// Final line of the unit
    Terminal,
}

/// One status line of a unit, with its data block if it opened one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyLine {
    pub status: u16,
    pub separator: Separator,
    pub text: String,

    /// Unescaped data lines, present only for `Separator::Data`
    pub data: Option<Vec<String>>,
}

/// The server's response to exactly one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    status: u16,
    lines: Vec<ReplyLine>,
}

impl Reply {
    pub fn new(status: u16, lines: Vec<ReplyLine>) -> Self {
        Self { status, lines }
    }

    /// Status code shared by every line of the reply
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn lines(&self) -> &[ReplyLine] {
        &self.lines
    }

    /// Text of the terminal line
    pub fn text(&self) -> &str {
        self.lines.last().map(|l| l.text.as_str()).unwrap_or("")
    }

    /// Decode `key=value` lines into config entries
    ///
    /// A data block becomes the value of the key on its opening line, joined
    /// with `\n`. A bare terminal `OK` line is a status marker, not an entry.
    pub fn config_entries(&self) -> Vec<ConfigEntry> {
        let last = self.lines.len().saturating_sub(1);
        self.lines
            .iter()
            .enumerate()
            .filter(|(i, line)| !(*i == last && line.text == "OK"))
            .map(|(_, line)| match &line.data {
                Some(data) => {
                    let key = line.text.strip_suffix('=').unwrap_or(&line.text);
                    ConfigEntry::new(key, data.join("\n"))
                }
                None => ConfigEntry::parse(&line.text),
            })
            .collect()
    }
}

/// One complete unit produced by the stream parser
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unit {
    /// Belongs to the oldest outstanding command
    Reply(Reply),

    /// Unsolicited notification
    Event(Event),
}

impl Unit {
    pub fn status(&self) -> u16 {
        match self {
            Unit::Reply(reply) => reply.status(),
            Unit::Event(event) => event.status(),
        }
    }

    pub fn is_event(&self) -> bool {
        matches!(self, Unit::Event(_))
    }
}
