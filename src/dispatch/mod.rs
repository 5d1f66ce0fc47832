//! Dispatch Module
//!
//! Matches replies to commands and fans events out to listeners.
//!
//! ## Concurrency Model
//! ```text
//!   submit (any thread)                 reader thread (exactly one)
//!   ───────────────────                 ───────────────────────────
//!   writer lock ──┐                     parser ─▶ on_incoming_unit
//!                 ├─▶ pending.push                  │
//!                 └─▶ write + flush                 ├─ Reply ─▶ pending.pop ─▶ slot
//!                                                   └─ Event ─▶ listener snapshot
//! ```
//!
//! - `writer`: one frame on the wire at a time
//! - `pending`: the only structure both sides mutate
//! - `listeners`: read-locked only long enough to clone a snapshot
//!
//! Lock order is writer → pending. Listeners are invoked with no lock held,
//! so they may register or unregister freely.

mod listeners;
mod pending;

pub use listeners::{Listener, ListenerId, ListenerRegistry};
pub use pending::{PendingCommand, PendingQueue, PendingReply};

use std::io::Write;
use std::ops::RangeInclusive;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::config::ClientConfig;
use crate::error::{CtlError, Result};
use crate::protocol::{CommandFrame, ErrorTable, Event, EventType, Reply, Unit};

/// Correlation engine for one logical connection
pub struct Dispatcher {
    /// Transport writer; held for the whole of one frame
    writer: Mutex<Box<dyn Write + Send>>,

    /// FIFO of commands awaiting replies, plus the closed flag
    pending: Mutex<PendingQueue>,

    /// Event listeners by type
    listeners: RwLock<ListenerRegistry>,

    /// Code → message table for failed commands
    error_table: Arc<ErrorTable>,

    /// Reply statuses that count as success
    success_codes: RangeInclusive<u16>,
}

impl Dispatcher {
    /// Create a dispatcher writing frames to `writer`
    pub fn new<W>(writer: W, config: &ClientConfig) -> Self
    where
        W: Write + Send + 'static,
    {
        Self {
            writer: Mutex::new(Box::new(writer)),
            pending: Mutex::new(PendingQueue::new()),
            listeners: RwLock::new(ListenerRegistry::new()),
            error_table: Arc::clone(&config.error_table),
            success_codes: config.parser.success_codes.clone(),
        }
    }

    // =========================================================================
    // Caller Side
    // =========================================================================

    /// Send a command and queue it for the next unmatched reply
    ///
    /// The pending entry is queued before the first byte is written, so a
    /// fast reply can never find the queue empty.
    pub fn submit(&self, frame: CommandFrame) -> Result<PendingReply> {
        let bytes = frame.encode();

        let mut writer = self.writer.lock();
        let reply = self.pending.lock().push(frame.command_type().clone())?;

        tracing::debug!(
            id = reply.id(),
            command = %frame.command_type().keyword(),
            bytes = bytes.len(),
            "Submitting command"
        );

        let written = writer.write_all(&bytes).and_then(|_| writer.flush());
        drop(writer);

        if let Err(e) = written {
            tracing::warn!("Write failed for command {}: {}", reply.id(), e);
            self.shutdown(&format!("write failed: {}", e));
            return Err(CtlError::Io(e));
        }

        Ok(reply)
    }

    /// Subscribe to one event type
    pub fn register_listener<F>(&self, event_type: EventType, listener: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let event_type = event_type.normalized();
        let id = self
            .listeners
            .write()
            .register(event_type.clone(), Arc::new(listener));
        tracing::debug!(?id, event = %event_type, "Listener registered");
        id
    }

    /// Remove a listener; false if it was not registered
    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        self.listeners.write().unregister(id)
    }

    // =========================================================================
    // Reader Side
    // =========================================================================

    /// Route one parsed unit
    ///
    /// Events go to listeners. Replies resolve the oldest pending command.
    /// A reply with nothing pending closes the dispatcher and fails with
    /// `UnmatchedReply`. Units arriving after close are ignored.
    pub fn on_incoming_unit(&self, unit: Unit) -> Result<()> {
        match unit {
            Unit::Event(event) => {
                if !self.is_closed() {
                    self.dispatch_event(&event);
                }
                Ok(())
            }
            Unit::Reply(reply) => self.match_reply(reply),
        }
    }

    fn match_reply(&self, reply: Reply) -> Result<()> {
        let head = {
            let mut pending = self.pending.lock();
            if pending.is_closed() {
                tracing::trace!(status = reply.status(), "Reply after close ignored");
                return Ok(());
            }
            pending.pop()
        };

        let command = match head {
            Some(command) => command,
            None => {
                let err = CtlError::UnmatchedReply {
                    status: reply.status(),
                };
                self.shutdown(&err.to_string());
                return Err(err);
            }
        };

        let result = if self.success_codes.contains(&reply.status()) {
            Ok(reply)
        } else {
            let error = self
                .error_table
                .error(i32::from(reply.status()), reply.text());
            Err(CtlError::Protocol(error))
        };

        command.resolve(result);
        Ok(())
    }

    fn dispatch_event(&self, event: &Event) {
        // Snapshot, then release the lock before calling out
        let listeners = self.listeners.read().snapshot(event.event_type());

        tracing::debug!(
            event = %event.event_type(),
            listeners = listeners.len(),
            "Dispatching event"
        );

        for listener in listeners {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener(event)));
            if outcome.is_err() {
                tracing::warn!(event = %event.event_type(), "Event listener panicked");
            }
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close and fail every pending command with `ConnectionClosed`
    ///
    /// Idempotent; returns how many commands were torn down by this call.
    pub fn shutdown(&self, reason: &str) -> usize {
        let drained = match self.pending.lock().close(reason) {
            Some(drained) => drained,
            None => return 0,
        };

        let count = drained.len();
        tracing::debug!(pending = count, reason, "Dispatcher shut down");

        for command in drained {
            command.resolve(Err(CtlError::ConnectionClosed(reason.to_string())));
        }
        count
    }

    pub fn is_closed(&self) -> bool {
        self.pending.lock().is_closed()
    }

    pub fn close_reason(&self) -> Option<String> {
        self.pending.lock().close_reason().map(str::to_string)
    }

    /// Number of commands awaiting replies
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}
