//! Reply/event stream parser
//!
//! A serial state machine over the incoming line stream.
//!
//! ## States
//! ```text
//!                 DDD-text / DDD+text (data done)
//!               ┌───────────────────────┐
//!               ▼                       │
//!   ┌──────────────────────┐  DDD+text  ┌──────────────────────────┐
//!   │ AwaitingStatusLine   │──────────▶│ AccumulatingMultiline    │
//!   └──────────┬───────────┘            │ (verbatim until ".")     │
//!              │ DDD text               └──────────────────────────┘
//!              ▼
//!        unit complete ──▶ Event (status in event range) | Reply
//! ```
//!
//! Anything that does not fit the grammar is a framing error. Dropping a line
//! would shift every later reply onto the wrong command.

use std::io::{BufRead, Read};

use bytes::BytesMut;

use crate::config::ParserConfig;
use crate::error::{CtlError, Result};
use super::{Event, Reply, ReplyLine, Separator, Unit};

/// Parser state between lines
#[derive(Debug, Clone, PartialEq, Eq)]
enum ParseState {
    AwaitingStatusLine,
    AccumulatingMultiline { data: Vec<String> },
}

/// Incremental parser for the reply/event stream
#[derive(Debug)]
pub struct StreamParser {
    config: ParserConfig,
    state: ParseState,

    /// Lines of the unit in progress
    lines: Vec<ReplyLine>,
}

impl StreamParser {
    pub fn new(config: ParserConfig) -> Self {
        Self {
            config,
            state: ParseState::AwaitingStatusLine,
            lines: Vec::new(),
        }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// True when no unit is partially parsed
    pub fn is_idle(&self) -> bool {
        self.state == ParseState::AwaitingStatusLine && self.lines.is_empty()
    }

    /// Feed one line (with or without its line ending)
    ///
    /// Returns the unit this line completes, if any.
    pub fn push_line(&mut self, raw: &[u8]) -> Result<Option<Unit>> {
        let line = strip_line_ending(raw);
        if line.len() > self.config.max_line_len {
            return Err(CtlError::Framing(format!(
                "Line too long: {} bytes (max {})",
                line.len(),
                self.config.max_line_len
            )));
        }

        tracing::trace!(line = %String::from_utf8_lossy(line), "<<");

        if let ParseState::AccumulatingMultiline { data } = &mut self.state {
            if line == self.config.data_terminator.as_bytes() {
                let data = std::mem::take(data);
                self.state = ParseState::AwaitingStatusLine;
                if let Some(opening) = self.lines.last_mut() {
                    opening.data = Some(data);
                }
            } else {
                // Leading ".." is an escaped "."
                let unescaped = if line.starts_with(b"..") { &line[1..] } else { line };
                data.push(String::from_utf8_lossy(unescaped).into_owned());
            }
            return Ok(None);
        }

        let (status, separator, text) = self.parse_status_line(line)?;

        if let Some(first) = self.lines.first() {
            if first.status != status {
                return Err(CtlError::Framing(format!(
                    "Status changed mid-reply: {} then {}",
                    first.status, status
                )));
            }
        }

        self.lines.push(ReplyLine {
            status,
            separator,
            text,
            data: None,
        });

        match separator {
            Separator::Continuation => Ok(None),
            Separator::Data => {
                self.state = ParseState::AccumulatingMultiline { data: Vec::new() };
                Ok(None)
            }
            Separator::Terminal => Ok(Some(self.finish_unit(status))),
        }
    }

    /// Decode the next unit from a byte buffer
    ///
    /// Consumes complete lines from `src`; a trailing partial line stays in
    /// the buffer until more bytes arrive.
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Unit>> {
        loop {
            let newline = match src.iter().position(|&b| b == b'\n') {
                Some(pos) => pos,
                None => {
                    // +2 leaves room for a CRLF that has not fully arrived
                    if src.len() > self.config.max_line_len + 2 {
                        return Err(CtlError::Framing(format!(
                            "Line too long: more than {} bytes without a line ending",
                            self.config.max_line_len
                        )));
                    }
                    return Ok(None);
                }
            };

            let line = src.split_to(newline + 1);
            if let Some(unit) = self.push_line(&line)? {
                return Ok(Some(unit));
            }
        }
    }

    /// Read lines from `reader` until one unit is complete
    ///
    /// Returns `Ok(None)` on a clean end of stream between units.
    pub fn read_unit<R: BufRead>(&mut self, reader: &mut R) -> Result<Option<Unit>> {
        let limit = (self.config.max_line_len + 2) as u64;
        let mut buf = Vec::with_capacity(256);

        loop {
            buf.clear();
            let n = reader.by_ref().take(limit).read_until(b'\n', &mut buf)?;

            if n == 0 {
                return match self.is_idle() {
                    true => Ok(None),
                    false => Err(CtlError::Framing("Stream ended mid-reply".to_string())),
                };
            }

            if buf.last() != Some(&b'\n') {
                if n as u64 == limit {
                    return Err(CtlError::Framing(format!(
                        "Line too long: more than {} bytes without a line ending",
                        self.config.max_line_len
                    )));
                }
                return Err(CtlError::Framing("Stream ended mid-line".to_string()));
            }

            if let Some(unit) = self.push_line(&buf)? {
                return Ok(Some(unit));
            }
        }
    }

    /// Parse `DDD<sep><text>`
    fn parse_status_line(&self, line: &[u8]) -> Result<(u16, Separator, String)> {
        if line.len() < 4 {
            return Err(CtlError::Framing(format!(
                "Status line too short: {:?}",
                String::from_utf8_lossy(line)
            )));
        }

        let digits = &line[..3];
        if !digits.iter().all(u8::is_ascii_digit) {
            return Err(CtlError::Framing(format!(
                "Missing status code: {:?}",
                String::from_utf8_lossy(line)
            )));
        }
        let status = digits
            .iter()
            .fold(0u16, |acc, d| acc * 10 + u16::from(d - b'0'));

        let separator = match line[3] {
            b if b == self.config.continuation => Separator::Continuation,
            b if b == self.config.data => Separator::Data,
            b if b == self.config.terminal => Separator::Terminal,
            other => {
                return Err(CtlError::Framing(format!(
                    "Unknown separator {:?} after status {}",
                    char::from(other),
                    status
                )))
            }
        };

        let text = String::from_utf8_lossy(&line[4..]).into_owned();
        Ok((status, separator, text))
    }

    fn finish_unit(&mut self, status: u16) -> Unit {
        let lines = std::mem::take(&mut self.lines);
        if self.config.is_event(status) {
            Unit::Event(Event::new(status, lines))
        } else {
            Unit::Reply(Reply::new(status, lines))
        }
    }
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new(ParserConfig::default())
    }
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
