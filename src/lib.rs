//! # ctlwire
//!
//! Client core for line-oriented control protocols with:
//! - Strictly ordered command/reply exchange over one persistent connection
//! - Unsolicited asynchronous events interleaved between replies
//! - Multi-line replies with verbatim data blocks
//! - Big-endian binary fields where the protocol embeds them
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Callers (any number of threads)             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ submit(CommandFrame)
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      Dispatcher                              │
//! │        (writer lock · FIFO of pending commands)              │
//! └──────────┬──────────────────────────────────▲───────────────┘
//!            │ write                            │ on_incoming_unit
//!            ▼                                  │
//!   ┌─────────────────┐                ┌────────┴────────┐
//!   │    Transport    │───── bytes ───▶│  StreamParser   │
//!   │  (TCP / stream) │                │ (reader thread) │
//!   └─────────────────┘                └────────┬────────┘
//!                                               │ Event
//!                                               ▼
//!                                      ┌─────────────────┐
//!                                      │    Listeners    │
//!                                      └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod dispatch;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{CtlError, Result};
pub use config::{ClientConfig, ParserConfig};
pub use dispatch::{Dispatcher, ListenerId, PendingReply};
pub use network::Connection;
pub use protocol::{
    CommandFrame, CommandType, ConfigEntry, ErrorTable, Event, EventType, ProtocolError, Reply,
    StreamParser, Unit,
};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of ctlwire
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
