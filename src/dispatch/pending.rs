//! Pending commands
//!
//! The FIFO of commands awaiting a reply, and the caller-side handle.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::error::{CtlError, Result};
use crate::protocol::{CommandType, Reply};

/// A submitted command whose reply has not arrived yet
#[derive(Debug)]
pub struct PendingCommand {
    id: u64,
    submitted_at: Instant,
    command_type: CommandType,

    /// Single-assignment result slot (capacity 1, sent to exactly once)
    slot: Sender<Result<Reply>>,
}

impl PendingCommand {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn submitted_at(&self) -> Instant {
        self.submitted_at
    }

    pub fn command_type(&self) -> &CommandType {
        &self.command_type
    }

    /// Fill the result slot, consuming the command
    ///
    /// A caller that stopped waiting has dropped its receiver; the result is
    /// then discarded.
    pub fn resolve(self, result: Result<Reply>) {
        tracing::debug!(
            id = self.id,
            command = %self.command_type.keyword(),
            ok = result.is_ok(),
            elapsed_ms = self.submitted_at.elapsed().as_millis() as u64,
            "Command resolved"
        );
        if self.slot.send(result).is_err() {
            tracing::trace!(id = self.id, "Caller detached before result");
        }
    }
}

/// FIFO of pending commands plus the connection's closed flag
///
/// Enqueue and close share one lock, so a command is either queued before
/// close (and torn down by it) or rejected.
#[derive(Debug, Default)]
pub struct PendingQueue {
    queue: VecDeque<PendingCommand>,
    next_id: u64,
    closed: Option<String>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command at the tail and hand back its reply handle
    pub fn push(&mut self, command_type: CommandType) -> Result<PendingReply> {
        if let Some(reason) = &self.closed {
            return Err(CtlError::ConnectionClosed(reason.clone()));
        }

        self.next_id += 1;
        let (tx, rx) = channel::bounded(1);
        let submitted_at = Instant::now();

        self.queue.push_back(PendingCommand {
            id: self.next_id,
            submitted_at,
            command_type,
            slot: tx,
        });

        Ok(PendingReply {
            id: self.next_id,
            submitted_at,
            rx,
            taken: AtomicBool::new(false),
        })
    }

    /// Remove the oldest command
    pub fn pop(&mut self) -> Option<PendingCommand> {
        self.queue.pop_front()
    }

    /// Mark closed and take every queued command
    ///
    /// Returns `None` if already closed, so teardown runs once.
    pub fn close(&mut self, reason: &str) -> Option<Vec<PendingCommand>> {
        if self.closed.is_some() {
            return None;
        }
        self.closed = Some(reason.to_string());
        Some(self.queue.drain(..).collect())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_some()
    }

    pub fn close_reason(&self) -> Option<&str> {
        self.closed.as_deref()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Caller-side handle for one submitted command
///
/// Waiting blocks only the caller. Giving up (timeout or drop) detaches the
/// handle; the command stays queued and its reply is still consumed in order.
#[derive(Debug)]
pub struct PendingReply {
    id: u64,
    submitted_at: Instant,
    rx: Receiver<Result<Reply>>,

    /// Set once the result has been handed out
    taken: AtomicBool,
}

impl PendingReply {
    /// Sequence number assigned at submit
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Time since submit
    pub fn elapsed(&self) -> Duration {
        self.submitted_at.elapsed()
    }

    /// Block until the reply (or teardown) arrives
    pub fn wait(self) -> Result<Reply> {
        if self.is_taken() {
            return Err(CtlError::ResultTaken(self.id));
        }
        self.rx.recv().unwrap_or_else(|_| Err(slot_dropped()))
    }

    /// Block for at most `timeout`
    ///
    /// On timeout the handle stays usable and can be waited on again. Once
    /// the result has been taken, further waits fail with `ResultTaken`.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Reply> {
        if self.is_taken() {
            return Err(CtlError::ResultTaken(self.id));
        }
        match self.rx.recv_timeout(timeout) {
            Ok(result) => self.take(result),
            Err(RecvTimeoutError::Timeout) => Err(CtlError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(slot_dropped()),
        }
    }

    /// Take the result if it has arrived
    ///
    /// Returns `None` while the reply is outstanding and again after the
    /// result has been taken.
    pub fn try_result(&self) -> Option<Result<Reply>> {
        if self.is_taken() {
            return None;
        }
        match self.rx.try_recv() {
            Ok(result) => Some(self.take(result)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(slot_dropped())),
        }
    }

    /// Whether the result has already been handed out
    pub fn is_taken(&self) -> bool {
        self.taken.load(Ordering::Acquire)
    }

    fn take(&self, result: Result<Reply>) -> Result<Reply> {
        self.taken.store(true, Ordering::Release);
        result
    }
}

fn slot_dropped() -> CtlError {
    CtlError::ConnectionClosed("result slot dropped without a reply".to_string())
}
