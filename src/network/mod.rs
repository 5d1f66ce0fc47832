//! Network Module
//!
//! Transport ownership and connection lifecycle.
//!
//! ## Architecture
//! - One background reader thread per connection
//! - Callers submit from any thread through the shared dispatcher
//! - `close` (or end of stream, or a fatal error) tears down every pending
//!   command

mod connection;

pub use connection::{Connection, READER_THREAD_NAME};
