//! Configuration for ctlwire
//!
//! Centralized configuration with sensible defaults.

use std::ops::RangeInclusive;
use std::sync::Arc;

use crate::error::{CtlError, Result};
use crate::protocol::ErrorTable;

/// Main configuration for one control connection
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// Control port address (host:port)
    pub control_addr: String,

    /// Connect timeout (milliseconds, 0 = OS default)
    pub connect_timeout_ms: u64,

    /// Socket read timeout (milliseconds, 0 = none)
    ///
    /// This is an idle-kill timer: a connection that receives nothing for
    /// this long fails with an `Io` error and is torn down, even between
    /// units. Events can be arbitrarily far apart, so leave it at 0 unless
    /// the peer is expected to talk continuously. Use `reply_timeout_ms` to
    /// bound a single command.
    pub read_timeout_ms: u64,

    /// Write timeout (milliseconds, 0 = none)
    pub write_timeout_ms: u64,

    /// How long `Connection::request` waits for each reply (milliseconds,
    /// 0 = forever)
    ///
    /// On expiry the caller gets `Timeout` and detaches; the connection
    /// stays open.
    pub reply_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Protocol Configuration
    // -------------------------------------------------------------------------
    /// Line grammar constants
    pub parser: ParserConfig,

    /// Code → message table for server-reported failures
    pub error_table: Arc<ErrorTable>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            control_addr: "127.0.0.1:9051".to_string(),
            connect_timeout_ms: 5000,
            read_timeout_ms: 0,
            write_timeout_ms: 5000,
            reply_timeout_ms: 0,
            parser: ParserConfig::default(),
            error_table: Arc::new(ErrorTable::default()),
        }
    }
}

impl ClientConfig {
    /// Create a new config builder
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Check the config for values the parser cannot work with
    pub fn validate(&self) -> Result<()> {
        self.parser.validate()
    }
}

/// Builder for ClientConfig
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the control port address
    pub fn control_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.control_addr = addr.into();
        self
    }

    /// Set the connect timeout (in milliseconds)
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Set the per-request reply timeout (in milliseconds, 0 = forever)
    pub fn reply_timeout_ms(mut self, ms: u64) -> Self {
        self.config.reply_timeout_ms = ms;
        self
    }

    /// Set the line grammar
    pub fn parser(mut self, parser: ParserConfig) -> Self {
        self.config.parser = parser;
        self
    }

    /// Set the error table
    pub fn error_table(mut self, table: ErrorTable) -> Self {
        self.config.error_table = Arc::new(table);
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

/// Protocol-specific constants of the reply line grammar
///
/// ```text
/// DDD<sep><text>
///      │
///      ├── continuation  more status lines follow
///      ├── data          data lines follow until the terminator line
///      └── terminal      last line of the unit
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserConfig {
    /// Separator of a mid-reply line
    pub continuation: u8,

    /// Separator of a line that opens a data block
    pub data: u8,

    /// Separator of the final line
    pub terminal: u8,

    /// Line that closes a data block
    pub data_terminator: String,

    /// Status codes reserved for asynchronous events
    pub event_codes: RangeInclusive<u16>,

    /// Status codes that resolve a command successfully
    pub success_codes: RangeInclusive<u16>,

    /// Longest accepted line, excluding the line ending
    pub max_line_len: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            continuation: b'-',
            data: b'+',
            terminal: b' ',
            data_terminator: ".".to_string(),
            event_codes: 600..=699,
            success_codes: 200..=299,
            max_line_len: 64 * 1024, // 64 KB
        }
    }
}

impl ParserConfig {
    /// Create a new parser config builder
    pub fn builder() -> ParserConfigBuilder {
        ParserConfigBuilder::default()
    }

    pub fn is_event(&self, status: u16) -> bool {
        self.event_codes.contains(&status)
    }

    pub fn is_success(&self, status: u16) -> bool {
        self.success_codes.contains(&status)
    }

    /// Check that the grammar is unambiguous
    pub fn validate(&self) -> Result<()> {
        let seps = [self.continuation, self.data, self.terminal];
        if seps[0] == seps[1] || seps[0] == seps[2] || seps[1] == seps[2] {
            return Err(CtlError::Config(format!(
                "Separators must be distinct: {:?}",
                seps.map(char::from)
            )));
        }

        if self.data_terminator.is_empty() {
            return Err(CtlError::Config("Data terminator must not be empty".to_string()));
        }

        let overlap = self.event_codes.start() <= self.success_codes.end()
            && self.success_codes.start() <= self.event_codes.end();
        if overlap && !self.event_codes.is_empty() && !self.success_codes.is_empty() {
            return Err(CtlError::Config(format!(
                "Event codes {:?} overlap success codes {:?}",
                self.event_codes, self.success_codes
            )));
        }

        if self.max_line_len == 0 {
            return Err(CtlError::Config("max_line_len must be non-zero".to_string()));
        }

        Ok(())
    }
}

/// Builder for ParserConfig
#[derive(Default)]
pub struct ParserConfigBuilder {
    config: ParserConfig,
}

impl ParserConfigBuilder {
    /// Set the continuation, data and terminal separators
    pub fn separators(mut self, continuation: u8, data: u8, terminal: u8) -> Self {
        self.config.continuation = continuation;
        self.config.data = data;
        self.config.terminal = terminal;
        self
    }

    /// Set the line that closes a data block
    pub fn data_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.config.data_terminator = terminator.into();
        self
    }

    /// Set the status codes reserved for events
    pub fn event_codes(mut self, codes: RangeInclusive<u16>) -> Self {
        self.config.event_codes = codes;
        self
    }

    /// Set the status codes that count as success
    pub fn success_codes(mut self, codes: RangeInclusive<u16>) -> Self {
        self.config.success_codes = codes;
        self
    }

    /// Set the longest accepted line
    pub fn max_line_len(mut self, len: usize) -> Self {
        self.config.max_line_len = len;
        self
    }

    pub fn build(self) -> ParserConfig {
        self.config
    }
}
