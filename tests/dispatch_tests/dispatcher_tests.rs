//! Tests for the Dispatcher
//!
//! These tests verify:
//! - FIFO matching of replies to commands
//! - Events never consume a pending command
//! - Fatal handling of unmatched replies
//! - Exactly-once teardown of pending commands
//! - Listener ordering, isolation and snapshot semantics
//! - Detach-on-timeout and concurrent submit

use std::io::{self, Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use ctlwire::{
    ClientConfig, CommandFrame, CommandType, CtlError, Dispatcher, EventType, StreamParser, Unit,
};

// =============================================================================
// Helper Functions
// =============================================================================

/// Writer whose bytes can be inspected after the fact
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writer that accepts `remaining` writes, then fails
struct FailingWriter {
    remaining: usize,
}

impl Write for FailingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"));
        }
        self.remaining -= 1;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn setup() -> (Dispatcher, SharedBuf) {
    let buf = SharedBuf::default();
    let dispatcher = Dispatcher::new(buf.clone(), &ClientConfig::default());
    (dispatcher, buf)
}

fn unit(text: &[u8]) -> Unit {
    let mut parser = StreamParser::default();
    parser
        .read_unit(&mut Cursor::new(text))
        .unwrap()
        .expect("one complete unit")
}

fn getinfo(key: &str) -> CommandFrame {
    CommandFrame::new(CommandType::GetInfo, key)
}

// =============================================================================
// FIFO Matching Tests
// =============================================================================

#[test]
fn test_fifo_matching_with_many_outstanding() {
    let (dispatcher, _buf) = setup();

    let handles: Vec<_> = (0..5)
        .map(|i| dispatcher.submit(getinfo(&format!("key{}", i))).unwrap())
        .collect();
    assert_eq!(dispatcher.pending_count(), 5);

    for i in 0..5 {
        let line = format!("250 reply-{}\r\n", i);
        dispatcher.on_incoming_unit(unit(line.as_bytes())).unwrap();
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let reply = handle.wait().unwrap();
        assert_eq!(reply.text(), format!("reply-{}", i));
    }
    assert_eq!(dispatcher.pending_count(), 0);
}

#[test]
fn test_submit_writes_frames_in_order() {
    let (dispatcher, buf) = setup();

    let a = dispatcher.submit(getinfo("version")).unwrap();
    let b = dispatcher.submit(CommandFrame::empty(CommandType::Quit)).unwrap();

    assert_eq!(buf.contents(), "GETINFO version\r\nQUIT\r\n");
    assert!(a.id() < b.id());
}

#[test]
fn test_multi_line_then_terminal_reply() {
    let (dispatcher, _buf) = setup();

    let a = dispatcher.submit(getinfo("version config-file")).unwrap();
    let b = dispatcher.submit(getinfo("address")).unwrap();

    dispatcher
        .on_incoming_unit(unit(
            b"250-version=0.4.8\r\n250+config-file=\r\n/etc/torrc\r\n.\r\n250 OK\r\n",
        ))
        .unwrap();
    assert!(b.try_result().is_none());

    dispatcher
        .on_incoming_unit(unit(b"250 address=10.0.0.1\r\n"))
        .unwrap();

    let reply_a = a.wait().unwrap();
    assert_eq!(reply_a.lines().len(), 3);
    let entries = reply_a.config_entries();
    assert_eq!(entries[0].value(), "0.4.8");
    assert_eq!(entries[1].key(), "config-file");
    assert_eq!(entries[1].value(), "/etc/torrc");

    let reply_b = b.wait().unwrap();
    assert_eq!(reply_b.lines().len(), 1);
    assert_eq!(reply_b.config_entries()[0].value(), "10.0.0.1");
}

#[test]
fn test_error_reply_is_local_to_its_command() {
    let (dispatcher, _buf) = setup();

    let a = dispatcher.submit(getinfo("ns/id/ABCD")).unwrap();
    dispatcher
        .on_incoming_unit(unit(b"552 Unrecognized key \"ns/id/ABCD\"\r\n"))
        .unwrap();

    match a.wait() {
        Err(CtlError::Protocol(e)) => {
            assert_eq!(e.code(), 552);
            assert_eq!(e.message(), "Unrecognized entity");
            assert_eq!(e.detail(), "Unrecognized key \"ns/id/ABCD\"");
        }
        other => panic!("Expected protocol error, got {:?}", other),
    }

    // Connection stays usable
    assert!(!dispatcher.is_closed());
    let b = dispatcher.submit(getinfo("version")).unwrap();
    dispatcher.on_incoming_unit(unit(b"250 version=1\r\n")).unwrap();
    assert!(b.wait().is_ok());
}

#[test]
fn test_unknown_error_code_falls_back() {
    let (dispatcher, _buf) = setup();

    let a = dispatcher.submit(getinfo("x")).unwrap();
    dispatcher.on_incoming_unit(unit(b"599 something new\r\n")).unwrap();

    let err = a.wait().unwrap_err();
    let protocol = err.as_protocol().expect("protocol error");
    assert_eq!(protocol.message(), "Unrecognized error #599");
}

// =============================================================================
// Event Tests
// =============================================================================

#[test]
fn test_event_does_not_consume_pending_command() {
    let (dispatcher, _buf) = setup();

    let fired = Arc::new(AtomicUsize::new(0));
    let seen_body = Arc::new(Mutex::new(String::new()));
    {
        let fired = Arc::clone(&fired);
        let seen_body = Arc::clone(&seen_body);
        dispatcher.register_listener(EventType::Circuit, move |event| {
            fired.fetch_add(1, Ordering::SeqCst);
            *seen_body.lock().unwrap() = event.body().to_string();
        });
    }

    let a = dispatcher.submit(getinfo("version")).unwrap();

    dispatcher
        .on_incoming_unit(unit(b"650 CIRC 7 BUILT $AAAA~relay\r\n"))
        .unwrap();

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(*seen_body.lock().unwrap(), "7 BUILT $AAAA~relay");
    assert!(a.try_result().is_none());
    assert_eq!(dispatcher.pending_count(), 1);

    dispatcher.on_incoming_unit(unit(b"250 version=1\r\n")).unwrap();
    assert_eq!(a.wait().unwrap().text(), "version=1");
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn test_event_with_no_pending_command() {
    let (dispatcher, _buf) = setup();
    dispatcher
        .on_incoming_unit(unit(b"650 BW 100 200\r\n"))
        .unwrap();
    assert!(!dispatcher.is_closed());
}

#[test]
fn test_listeners_only_see_their_type() {
    let (dispatcher, _buf) = setup();

    let circ = Arc::new(AtomicUsize::new(0));
    let stream = Arc::new(AtomicUsize::new(0));
    {
        let circ = Arc::clone(&circ);
        dispatcher.register_listener(EventType::Circuit, move |_| {
            circ.fetch_add(1, Ordering::SeqCst);
        });
        let stream = Arc::clone(&stream);
        dispatcher.register_listener(EventType::Stream, move |_| {
            stream.fetch_add(1, Ordering::SeqCst);
        });
    }

    dispatcher.on_incoming_unit(unit(b"650 STREAM 1 NEW 0 x:80\r\n")).unwrap();
    dispatcher.on_incoming_unit(unit(b"650 STREAM 1 CLOSED 0 x:80\r\n")).unwrap();

    assert_eq!(circ.load(Ordering::SeqCst), 0);
    assert_eq!(stream.load(Ordering::SeqCst), 2);
}

#[test]
fn test_listeners_run_in_registration_order() {
    let (dispatcher, _buf) = setup();
    let order = Arc::new(Mutex::new(Vec::new()));

    for i in 0..3 {
        let order = Arc::clone(&order);
        dispatcher.register_listener(EventType::NewConsensus, move |_| {
            order.lock().unwrap().push(i);
        });
    }

    dispatcher.on_incoming_unit(unit(b"650 NEWCONSENSUS\r\n")).unwrap();
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
}

#[test]
fn test_listener_panic_is_isolated() {
    let (dispatcher, _buf) = setup();
    let delivered = Arc::new(AtomicUsize::new(0));

    dispatcher.register_listener(EventType::Warn, |_| panic!("listener failure"));
    {
        let delivered = Arc::clone(&delivered);
        dispatcher.register_listener(EventType::Warn, move |_| {
            delivered.fetch_add(1, Ordering::SeqCst);
        });
    }

    dispatcher.on_incoming_unit(unit(b"650 WARN disk full\r\n")).unwrap();
    dispatcher.on_incoming_unit(unit(b"650 WARN disk still full\r\n")).unwrap();

    assert_eq!(delivered.load(Ordering::SeqCst), 2);
    assert!(!dispatcher.is_closed());
}

#[test]
fn test_register_from_listener_sees_snapshot() {
    let (dispatcher, _buf) = setup();
    let dispatcher = Arc::new(dispatcher);
    let late_calls = Arc::new(AtomicUsize::new(0));

    {
        let inner = Arc::clone(&dispatcher);
        let late_calls = Arc::clone(&late_calls);
        let registered = AtomicUsize::new(0);
        dispatcher.register_listener(EventType::Notice, move |_| {
            if registered.fetch_add(1, Ordering::SeqCst) == 0 {
                let late_calls = Arc::clone(&late_calls);
                inner.register_listener(EventType::Notice, move |_| {
                    late_calls.fetch_add(1, Ordering::SeqCst);
                });
            }
        });
    }

    dispatcher.on_incoming_unit(unit(b"650 NOTICE first\r\n")).unwrap();
    assert_eq!(late_calls.load(Ordering::SeqCst), 0);

    dispatcher.on_incoming_unit(unit(b"650 NOTICE second\r\n")).unwrap();
    assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    assert_eq!(dispatcher.listener_count(), 2);
}

#[test]
fn test_unregister_listener() {
    let (dispatcher, _buf) = setup();
    let calls = Arc::new(AtomicUsize::new(0));

    let id = {
        let calls = Arc::clone(&calls);
        dispatcher.register_listener(EventType::Bandwidth, move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        })
    };

    assert!(dispatcher.unregister_listener(id));
    assert!(!dispatcher.unregister_listener(id));
    assert_eq!(dispatcher.listener_count(), 0);

    dispatcher.on_incoming_unit(unit(b"650 BW 1 2\r\n")).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_unrecognized_event_bucket() {
    let (dispatcher, _buf) = setup();
    let calls = Arc::new(AtomicUsize::new(0));
    {
        let calls = Arc::clone(&calls);
        dispatcher.register_listener(EventType::from_tag("HS_DESC"), move |event| {
            assert_eq!(event.event_type().as_tag(), "HS_DESC");
            calls.fetch_add(1, Ordering::SeqCst);
        });
    }

    dispatcher.on_incoming_unit(unit(b"650 HS_DESC UPLOAD x\r\n")).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unrecognized_tag_registered_in_lower_case() {
    let (dispatcher, _buf) = setup();
    let calls = Arc::new(AtomicUsize::new(0));
    {
        let calls = Arc::clone(&calls);
        dispatcher.register_listener(EventType::Unrecognized("foo".to_string()), move |event| {
            assert_eq!(event.event_type(), &EventType::Unrecognized("FOO".to_string()));
            calls.fetch_add(1, Ordering::SeqCst);
        });
    }
    {
        let calls = Arc::clone(&calls);
        dispatcher.register_listener(EventType::Unrecognized("circ".to_string()), move |event| {
            assert_eq!(event.event_type(), &EventType::Circuit);
            calls.fetch_add(10, Ordering::SeqCst);
        });
    }

    dispatcher.on_incoming_unit(unit(b"650 foo bar\r\n")).unwrap();
    dispatcher.on_incoming_unit(unit(b"650 CIRC 1 BUILT\r\n")).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 11);
}

// =============================================================================
// Fatal Error and Teardown Tests
// =============================================================================

#[test]
fn test_unmatched_reply_closes_dispatcher() {
    let (dispatcher, _buf) = setup();

    let err = dispatcher.on_incoming_unit(unit(b"250 OK\r\n")).unwrap_err();
    assert!(matches!(err, CtlError::UnmatchedReply { status: 250 }));
    assert!(err.is_fatal());
    assert!(dispatcher.is_closed());

    assert!(matches!(
        dispatcher.submit(getinfo("version")),
        Err(CtlError::ConnectionClosed(_))
    ));
}

#[test]
fn test_teardown_resolves_each_pending_once() {
    let (dispatcher, _buf) = setup();

    let handles: Vec<_> = (0..4)
        .map(|i| dispatcher.submit(getinfo(&format!("k{}", i))).unwrap())
        .collect();

    assert_eq!(dispatcher.shutdown("transport lost"), 4);
    assert_eq!(dispatcher.shutdown("again"), 0);
    assert_eq!(dispatcher.close_reason().as_deref(), Some("transport lost"));

    // A late reply does not resolve anything twice
    dispatcher.on_incoming_unit(unit(b"250 OK\r\n")).unwrap();

    for handle in handles {
        match handle.try_result() {
            Some(Err(CtlError::ConnectionClosed(reason))) => assert_eq!(reason, "transport lost"),
            other => panic!("Expected connection closed, got {:?}", other),
        }
        assert!(handle.try_result().is_none());
    }
}

#[test]
fn test_teardown_with_nothing_pending() {
    let (dispatcher, _buf) = setup();
    assert_eq!(dispatcher.shutdown("bye"), 0);
    assert!(dispatcher.is_closed());
}

#[test]
fn test_events_after_close_are_ignored() {
    let (dispatcher, _buf) = setup();
    let calls = Arc::new(AtomicUsize::new(0));
    {
        let calls = Arc::clone(&calls);
        dispatcher.register_listener(EventType::Circuit, move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        });
    }

    dispatcher.shutdown("bye");
    dispatcher.on_incoming_unit(unit(b"650 CIRC 1 BUILT\r\n")).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_write_failure_tears_down() {
    let dispatcher = Dispatcher::new(FailingWriter { remaining: 1 }, &ClientConfig::default());

    let first = dispatcher.submit(getinfo("version")).unwrap();
    let err = dispatcher.submit(getinfo("address")).unwrap_err();

    assert!(matches!(err, CtlError::Io(_)));
    assert!(dispatcher.is_closed());
    assert!(matches!(first.wait(), Err(CtlError::ConnectionClosed(_))));
}

// =============================================================================
// Detach and Concurrency Tests
// =============================================================================

#[test]
fn test_wait_timeout_detaches_without_removing() {
    let (dispatcher, _buf) = setup();

    let a = dispatcher.submit(getinfo("slow")).unwrap();
    let timeout = Duration::from_millis(20);
    assert!(matches!(a.wait_timeout(timeout), Err(CtlError::Timeout(d)) if d == timeout));
    assert_eq!(dispatcher.pending_count(), 1);

    let b = dispatcher.submit(getinfo("fast")).unwrap();
    dispatcher.on_incoming_unit(unit(b"250 slow=1\r\n")).unwrap();
    dispatcher.on_incoming_unit(unit(b"250 fast=2\r\n")).unwrap();

    assert_eq!(a.wait().unwrap().text(), "slow=1");
    assert_eq!(b.wait().unwrap().text(), "fast=2");
}

#[test]
fn test_result_is_taken_once_on_live_dispatcher() {
    let (dispatcher, _buf) = setup();

    let a = dispatcher.submit(getinfo("version")).unwrap();
    assert!(a.try_result().is_none());
    assert!(!a.is_taken());

    dispatcher.on_incoming_unit(unit(b"250 version=1\r\n")).unwrap();

    let first = a.try_result().expect("reply delivered");
    assert_eq!(first.unwrap().text(), "version=1");
    assert!(a.is_taken());

    // Later polls report nothing rather than a closed connection
    assert!(a.try_result().is_none());
    assert!(matches!(
        a.wait_timeout(Duration::from_millis(5)),
        Err(CtlError::ResultTaken(id)) if id == a.id()
    ));
    assert!(!dispatcher.is_closed());

    let id = a.id();
    match a.wait() {
        Err(CtlError::ResultTaken(taken)) => assert_eq!(taken, id),
        other => panic!("Expected result taken, got {:?}", other),
    }
}

#[test]
fn test_dropped_handle_still_consumes_its_reply() {
    let (dispatcher, _buf) = setup();

    drop(dispatcher.submit(getinfo("abandoned")).unwrap());
    let b = dispatcher.submit(getinfo("kept")).unwrap();

    dispatcher.on_incoming_unit(unit(b"250 abandoned=1\r\n")).unwrap();
    dispatcher.on_incoming_unit(unit(b"250 kept=2\r\n")).unwrap();

    assert_eq!(b.wait().unwrap().text(), "kept=2");
}

#[test]
fn test_wait_blocks_until_reader_delivers() {
    let (dispatcher, _buf) = setup();
    let dispatcher = Arc::new(dispatcher);

    let a = dispatcher.submit(getinfo("version")).unwrap();

    let reader = {
        let dispatcher = Arc::clone(&dispatcher);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            dispatcher.on_incoming_unit(unit(b"250 version=1\r\n")).unwrap();
        })
    };

    assert_eq!(a.wait().unwrap().text(), "version=1");
    reader.join().unwrap();
}

#[test]
fn test_concurrent_submit_keeps_frames_whole_and_ordered() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 50;

    let (dispatcher, buf) = setup();
    let dispatcher = Arc::new(dispatcher);

    let workers: Vec<_> = (0..THREADS)
        .map(|t| {
            let dispatcher = Arc::clone(&dispatcher);
            thread::spawn(move || {
                (0..PER_THREAD)
                    .map(|i| {
                        let key = format!("t{}-{}", t, i);
                        let handle = dispatcher.submit(getinfo(&key)).unwrap();
                        (handle, key)
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut submitted: Vec<_> = workers
        .into_iter()
        .flat_map(|w| w.join().unwrap())
        .collect();
    submitted.sort_by_key(|(handle, _)| handle.id());

    // Every frame is intact, and wire order equals queue order
    let written = buf.contents();
    let lines: Vec<&str> = written.split_terminator("\r\n").collect();
    assert_eq!(lines.len(), THREADS * PER_THREAD);
    for (line, (_, key)) in lines.iter().zip(&submitted) {
        assert_eq!(*line, format!("GETINFO {}", key));
    }

    for (_, key) in &submitted {
        let reply = format!("250 {}=ok\r\n", key);
        dispatcher.on_incoming_unit(unit(reply.as_bytes())).unwrap();
    }

    for (handle, key) in submitted {
        let reply = handle.wait().unwrap();
        assert_eq!(reply.config_entries()[0].key(), key);
    }
}
