//! Protocol Module
//!
//! Defines the wire protocol spoken on the control connection.
//!
//! ## Command Format
//! ```text
//! KEYWORD [SP arguments] CRLF
//! ```
//!
//! ## Reply / Event Format
//! ```text
//! 250-version=0.4.8          mid-reply line
//! 250+config-text=           data block follows
//! SocksPort 9050
//! .                          data block terminator
//! 250 OK                     terminal line
//!
//! 650 CIRC 12 BUILT ...      asynchronous event (6xx)
//! ```
//!
//! ### Status Classes
//! - 2xx: success, resolves the oldest pending command
//! - 4xx/5xx: failure, resolves it with a `ProtocolError`
//! - 6xx: asynchronous event, never touches the pending queue

pub mod codec;
mod command;
mod config_entry;
mod error_table;
mod event;
mod parser;
mod reply;

pub use command::{CommandFrame, CommandType, BINARY_HEADER_SIZE};
pub use config_entry::ConfigEntry;
pub use error_table::{ErrorTable, ProtocolError};
pub use event::{Event, EventType};
pub use parser::StreamParser;
pub use reply::{Reply, ReplyLine, Separator, Unit};
