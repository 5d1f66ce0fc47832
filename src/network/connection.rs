//! Control Connection
//!
//! Owns one transport, its background reader thread and the dispatcher.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::ClientConfig;
use crate::dispatch::{Dispatcher, ListenerId, PendingReply};
use crate::error::{CtlError, Result};
use crate::protocol::{CommandFrame, CommandType, ConfigEntry, Event, EventType, Reply, StreamParser};

/// Name given to every background reader thread
pub const READER_THREAD_NAME: &str = "ctlwire-reader";

/// A live control connection
///
/// Commands may be submitted from any number of threads. Replies and events
/// are read by one background thread; listeners run on that thread and must
/// hand long work off elsewhere.
pub struct Connection {
    /// Correlation engine shared with the reader thread
    dispatcher: Arc<Dispatcher>,

    /// Reader thread, joined once
    reader: Mutex<Option<JoinHandle<Result<()>>>>,

    /// Socket handle used to unblock the reader on close
    socket: Option<TcpStream>,

    /// Set when the owner closes, so the resulting read error is not fatal
    closed_by_owner: Arc<AtomicBool>,

    /// Deadline applied by `request` and the convenience commands
    reply_timeout: Option<Duration>,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Connect to `config.control_addr` over TCP
    ///
    /// Authentication is a separate step (see [`Connection::authenticate`]).
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        config.validate()?;

        let addr = config
            .control_addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                CtlError::Config(format!("No address for {}", config.control_addr))
            })?;

        let stream = if config.connect_timeout_ms > 0 {
            TcpStream::connect_timeout(&addr, Duration::from_millis(config.connect_timeout_ms))?
        } else {
            TcpStream::connect(addr)?
        };

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        if config.read_timeout_ms > 0 {
            stream.set_read_timeout(Some(Duration::from_millis(config.read_timeout_ms)))?;
        }
        if config.write_timeout_ms > 0 {
            stream.set_write_timeout(Some(Duration::from_millis(config.write_timeout_ms)))?;
        }

        // Clone stream for separate read/write/shutdown handles
        let read_stream = stream.try_clone()?;
        let write_stream = stream.try_clone()?;

        let mut conn = Self::spawn(
            BufReader::new(read_stream),
            BufWriter::new(write_stream),
            config,
            addr.to_string(),
        )?;
        conn.socket = Some(stream);
        Ok(conn)
    }

    /// Run the client core over an already established transport
    ///
    /// End of stream on `reader` is the connection-closed signal.
    pub fn open<R, W>(reader: R, writer: W, config: &ClientConfig) -> Result<Self>
    where
        R: BufRead + Send + 'static,
        W: Write + Send + 'static,
    {
        config.validate()?;
        Self::spawn(reader, writer, config, "stream".to_string())
    }

    fn spawn<R, W>(reader: R, writer: W, config: &ClientConfig, peer_addr: String) -> Result<Self>
    where
        R: BufRead + Send + 'static,
        W: Write + Send + 'static,
    {
        let dispatcher = Arc::new(Dispatcher::new(writer, config));
        let parser = StreamParser::new(config.parser.clone());
        let closed_by_owner = Arc::new(AtomicBool::new(false));

        let handle = {
            let dispatcher = Arc::clone(&dispatcher);
            let closed_by_owner = Arc::clone(&closed_by_owner);
            let peer = peer_addr.clone();
            thread::Builder::new()
                .name(READER_THREAD_NAME.to_string())
                .spawn(move || read_loop(reader, parser, dispatcher, closed_by_owner, peer))?
        };

        tracing::debug!("Control connection established to {}", peer_addr);

        Ok(Self {
            dispatcher,
            reader: Mutex::new(Some(handle)),
            socket: None,
            closed_by_owner,
            reply_timeout: (config.reply_timeout_ms > 0)
                .then(|| Duration::from_millis(config.reply_timeout_ms)),
            peer_addr,
        })
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Send a command; the handle resolves when its reply arrives
    pub fn submit(&self, frame: CommandFrame) -> Result<PendingReply> {
        self.dispatcher.submit(frame)
    }

    /// Send a command and block for its reply
    ///
    /// Waits at most `reply_timeout_ms` when one is configured.
    pub fn request(&self, frame: CommandFrame) -> Result<Reply> {
        let pending = self.submit(frame)?;
        match self.reply_timeout {
            Some(timeout) => pending.wait_timeout(timeout),
            None => pending.wait(),
        }
    }

    /// Authenticate with a password or hex cookie (empty for none)
    pub fn authenticate(&self, secret: &str) -> Result<()> {
        let body = if secret.is_empty() {
            String::new()
        } else {
            format!("\"{}\"", escape_quoted(secret))
        };
        self.request(CommandFrame::new(CommandType::Authenticate, body))?;
        Ok(())
    }

    /// Query runtime information keys
    pub fn get_info(&self, keys: &[&str]) -> Result<Vec<ConfigEntry>> {
        let reply = self.request(CommandFrame::new(CommandType::GetInfo, keys.join(" ")))?;
        Ok(reply.config_entries())
    }

    /// Query configuration values
    pub fn get_conf(&self, keys: &[&str]) -> Result<Vec<ConfigEntry>> {
        let reply = self.request(CommandFrame::new(CommandType::GetConf, keys.join(" ")))?;
        Ok(reply.config_entries())
    }

    /// Replace the set of event types the server sends
    pub fn set_events(&self, event_types: &[EventType]) -> Result<()> {
        let tags: Vec<&str> = event_types.iter().map(EventType::as_tag).collect();
        self.request(CommandFrame::new(CommandType::SetEvents, tags.join(" ")))?;
        Ok(())
    }

    /// Ask the server to hang up, then close
    pub fn quit(&self) -> Result<()> {
        let result = self.request(CommandFrame::empty(CommandType::Quit));
        self.close();
        match result {
            Ok(_) | Err(CtlError::ConnectionClosed(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Subscribe to one event type; runs on the reader thread
    pub fn register_listener<F>(&self, event_type: EventType, listener: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.dispatcher.register_listener(event_type, listener)
    }

    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        self.dispatcher.unregister_listener(id)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close the connection
    ///
    /// Every pending command fails with `ConnectionClosed`. For TCP
    /// connections the socket is shut down and the reader joined; for
    /// caller-supplied streams the reader is joined only if it has already
    /// finished.
    pub fn close(&self) {
        self.closed_by_owner.store(true, Ordering::SeqCst);
        self.dispatcher.shutdown("closed by owner");

        if let Some(socket) = &self.socket {
            // Reader sees EOF or an error and exits
            let _ = socket.shutdown(Shutdown::Both);
        }

        let mut reader = self.reader.lock();
        // A listener may close from the reader thread itself
        let joinable = match reader.as_ref() {
            Some(handle) => {
                handle.thread().id() != thread::current().id()
                    && (self.socket.is_some() || handle.is_finished())
            }
            None => false,
        };
        if joinable {
            if let Some(handle) = reader.take() {
                let _ = handle.join();
            }
        }

        tracing::debug!("Control connection to {} closed", self.peer_addr);
    }

    /// Block until the reader stops
    ///
    /// Returns the fatal error that ended the connection, if any. A second
    /// call, or a call after `close`, returns `Ok(())`.
    pub fn wait_closed(&self) -> Result<()> {
        let handle = self.reader.lock().take();
        match handle {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                Err(CtlError::ConnectionClosed("reader thread panicked".to_string()))
            }),
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.dispatcher.is_closed()
    }

    /// Why the connection closed, once it has
    pub fn close_reason(&self) -> Option<String> {
        self.dispatcher.close_reason()
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if !self.dispatcher.is_closed() || self.reader.lock().is_some() {
            self.close();
        }
    }
}

/// Background reader: parse units and hand them to the dispatcher until the
/// stream ends or a fatal error occurs
fn read_loop<R: BufRead>(
    mut reader: R,
    mut parser: StreamParser,
    dispatcher: Arc<Dispatcher>,
    closed_by_owner: Arc<AtomicBool>,
    peer_addr: String,
) -> Result<()> {
    let outcome = loop {
        match parser.read_unit(&mut reader) {
            Ok(Some(unit)) => {
                if let Err(e) = dispatcher.on_incoming_unit(unit) {
                    break Err(e);
                }
            }
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        }
    };

    if closed_by_owner.load(Ordering::SeqCst) {
        tracing::trace!("Reader for {} stopped after close", peer_addr);
        return Ok(());
    }

    match outcome {
        Ok(()) => {
            tracing::debug!("Control connection {} reached end of stream", peer_addr);
            dispatcher.shutdown("connection closed by peer");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Fatal error on control connection {}: {}", peer_addr, e);
            dispatcher.shutdown(&e.to_string());
            Err(e)
        }
    }
}

/// Escape `"` and `\` for a quoted argument
fn escape_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
