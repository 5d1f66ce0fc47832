//! ctlwire CLI Client
//!
//! Command-line interface for talking to a control port.

use std::time::Duration;

use clap::{Parser, Subcommand};
use crossbeam::channel::{self, RecvTimeoutError};
use ctlwire::protocol::Separator;
use ctlwire::{ClientConfig, CommandFrame, CommandType, Connection, Event, EventType, Reply};
use tracing_subscriber::{fmt, EnvFilter};

/// Log filter used when RUST_LOG is unset
const DEFAULT_LOG_FILTER: &str = "info,ctlwire=debug";

/// ctlwire CLI
#[derive(Parser, Debug)]
#[command(name = "ctlwire-cli")]
#[command(about = "CLI for line-oriented control ports")]
#[command(version)]
struct Args {
    /// Control port address
    #[arg(short, long, default_value = "127.0.0.1:9051")]
    addr: String,

    /// Password or hex cookie for AUTHENTICATE (empty for none)
    #[arg(short, long, default_value = "")]
    password: String,

    /// How long to wait for each reply (milliseconds, 0 = forever)
    #[arg(short, long, default_value = "10000")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Query runtime information keys
    Info {
        /// Keys to query
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Query configuration values
    Conf {
        /// Keys to query
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Send one raw command line
    Raw {
        /// Command line, e.g. "GETINFO version"
        line: String,
    },

    /// Subscribe to events and print them until the connection closes
    Listen {
        /// Event tags, e.g. CIRC STREAM NEWCONSENSUS
        #[arg(required = true)]
        events: Vec<String>,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> ctlwire::Result<()> {
    // Every request below, AUTHENTICATE and SETEVENTS included, is bounded
    let config = ClientConfig::builder()
        .control_addr(&args.addr)
        .reply_timeout_ms(args.timeout_ms)
        .build();

    let conn = Connection::connect(&config)?;
    tracing::info!("Connected to {}", conn.peer_addr());
    conn.authenticate(&args.password)?;

    match args.command {
        Commands::Info { keys } => {
            let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
            for entry in conn.get_info(&keys)? {
                println!("{}={}", entry.key(), entry.value());
            }
        }
        Commands::Conf { keys } => {
            let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
            for entry in conn.get_conf(&keys)? {
                println!("{}={}", entry.key(), entry.value());
            }
        }
        Commands::Raw { line } => {
            let (keyword, body) = line.trim().split_once(' ').unwrap_or((line.trim(), ""));
            let frame = CommandFrame::new(CommandType::Raw(keyword.to_string()), body);
            let reply = conn.request(frame)?;
            print_reply(&reply);
        }
        Commands::Listen { events } => {
            let event_types: Vec<EventType> =
                events.iter().map(|tag| EventType::from_tag(tag)).collect();
            listen(&conn, &event_types)?;
        }
    }

    conn.close();
    Ok(())
}

/// Print events until the connection closes
///
/// Listeners only forward into a channel; printing happens on this thread so
/// the reader is never blocked on stdout.
fn listen(conn: &Connection, event_types: &[EventType]) -> ctlwire::Result<()> {
    let (tx, rx) = channel::unbounded::<Event>();

    for event_type in event_types {
        let tx = tx.clone();
        conn.register_listener(event_type.clone(), move |event| {
            let _ = tx.send(event.clone());
        });
    }
    drop(tx);

    conn.set_events(event_types)?;
    tracing::info!("Listening for {} event type(s)", event_types.len());

    loop {
        match rx.recv_timeout(Duration::from_millis(500)) {
            Ok(event) => print_event(&event),
            Err(RecvTimeoutError::Timeout) if !conn.is_closed() => continue,
            Err(_) => break,
        }
    }

    conn.wait_closed()
}

fn print_reply(reply: &Reply) {
    for line in reply.lines() {
        let sep = match line.separator {
            Separator::Continuation => '-',
            Separator::Data => '+',
            Separator::Terminal => ' ',
        };
        println!("{}{}{}", line.status, sep, line.text);
        if let Some(data) = &line.data {
            for data_line in data {
                println!("{}", data_line);
            }
            println!(".");
        }
    }
}

fn print_event(event: &Event) {
    println!("{} {}", event.event_type(), event.body());
    for line in event.lines().iter().skip(1) {
        println!("  {}", line.text);
    }
}
