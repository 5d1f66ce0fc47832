//! Event definitions
//!
//! Unsolicited notifications, identified by the first word of their first line.

use std::fmt;

use super::ReplyLine;

/// Event categories
///
/// Tags the client does not know land in `Unrecognized`, so listeners can
/// still subscribe to them by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    Circuit,
    Stream,
    OrConn,
    Bandwidth,
    Debug,
    Info,
    Notice,
    Warn,
    Err,
    NewDesc,
    AddrMap,
    NewConsensus,
    NetworkStatus,
    Guard,
    StatusGeneral,
    StatusClient,
    StatusServer,
    DescChanged,
    Unrecognized(String),
}

impl EventType {
    /// Map a wire tag to its event type (case-insensitive)
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_uppercase().as_str() {
            "CIRC" => EventType::Circuit,
            "STREAM" => EventType::Stream,
            "ORCONN" => EventType::OrConn,
            "BW" => EventType::Bandwidth,
            "DEBUG" => EventType::Debug,
            "INFO" => EventType::Info,
            "NOTICE" => EventType::Notice,
            "WARN" => EventType::Warn,
            "ERR" => EventType::Err,
            "NEWDESC" => EventType::NewDesc,
            "ADDRMAP" => EventType::AddrMap,
            "NEWCONSENSUS" => EventType::NewConsensus,
            "NS" => EventType::NetworkStatus,
            "GUARD" => EventType::Guard,
            "STATUS_GENERAL" => EventType::StatusGeneral,
            "STATUS_CLIENT" => EventType::StatusClient,
            "STATUS_SERVER" => EventType::StatusServer,
            "DESCCHANGED" => EventType::DescChanged,
            upper => EventType::Unrecognized(upper.to_string()),
        }
    }

    /// Wire tag
    pub fn as_tag(&self) -> &str {
        match self {
            EventType::Circuit => "CIRC",
            EventType::Stream => "STREAM",
            EventType::OrConn => "ORCONN",
            EventType::Bandwidth => "BW",
            EventType::Debug => "DEBUG",
            EventType::Info => "INFO",
            EventType::Notice => "NOTICE",
            EventType::Warn => "WARN",
            EventType::Err => "ERR",
            EventType::NewDesc => "NEWDESC",
            EventType::AddrMap => "ADDRMAP",
            EventType::NewConsensus => "NEWCONSENSUS",
            EventType::NetworkStatus => "NS",
            EventType::Guard => "GUARD",
            EventType::StatusGeneral => "STATUS_GENERAL",
            EventType::StatusClient => "STATUS_CLIENT",
            EventType::StatusServer => "STATUS_SERVER",
            EventType::DescChanged => "DESCCHANGED",
            EventType::Unrecognized(tag) => tag,
        }
    }

    /// Canonical form, as the parser would produce it
    ///
    /// An `Unrecognized` tag is uppercased, or becomes the known variant it
    /// names.
    pub fn normalized(self) -> Self {
        match self {
            EventType::Unrecognized(tag) => EventType::from_tag(&tag),
            known => known,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// An unsolicited server notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    event_type: EventType,
    status: u16,
    lines: Vec<ReplyLine>,
}

impl Event {
    /// Build an event from the lines of one unit
    pub fn new(status: u16, lines: Vec<ReplyLine>) -> Self {
        let tag = lines
            .first()
            .and_then(|line| line.text.split_whitespace().next())
            .unwrap_or("");
        let event_type = EventType::from_tag(tag);
        Self {
            event_type,
            status,
            lines,
        }
    }

    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn lines(&self) -> &[ReplyLine] {
        &self.lines
    }

    /// First line text after the tag
    pub fn body(&self) -> &str {
        let text = self.lines.first().map(|l| l.text.as_str()).unwrap_or("");
        let text = text.trim_start();
        match text.find(char::is_whitespace) {
            Some(pos) => text[pos..].trim_start(),
            None => "",
        }
    }

    /// Whitespace-separated fields of [`Event::body`]
    pub fn arguments(&self) -> impl Iterator<Item = &str> {
        self.body().split_whitespace()
    }
}
