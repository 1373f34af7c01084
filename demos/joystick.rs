//! Virtual joystick driving a remote device.
//!
//! Demonstrates:
//! - Building a connection with either transport
//! - Observing state changes and telemetry
//! - Writing the outbound value at input rate (50 Hz) while the link
//!   coalesces to its own pace
//! - Reading health (state, latency, last error)
//!
//! Usage:
//!   cargo run --example joystick -- ws://192.168.4.1:81/
//!   cargo run --example joystick -- http://192.168.4.1/joystick
//!   cargo run --example joystick -- ws://127.0.0.1:8765/ --debug
//!   cargo run --example joystick -- ws://127.0.0.1:8765/ --seconds 10

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use teleop_link::{Connection, ConnectionState};
use tokio::time::{MissedTickBehavior, interval};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_URL: &str = "ws://127.0.0.1:8765/";
const INPUT_RATE: Duration = Duration::from_millis(20);
const REPORT_EVERY: u32 = 50;

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments.
#[derive(Debug, Clone)]
struct Args {
    url: String,
    debug: bool,
    seconds: Option<u64>,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let url = args
            .iter()
            .find(|a| a.contains("://"))
            .cloned()
            .unwrap_or_else(|| DEFAULT_URL.to_string());
        let seconds = args
            .iter()
            .position(|a| a == "--seconds")
            .and_then(|i| args.get(i + 1))
            .and_then(|s| s.parse().ok());

        Self {
            url,
            debug: args.iter().any(|a| a == "--debug"),
            seconds,
        }
    }
}

/// Stick position sent to the device.
#[derive(Debug, Serialize)]
struct Stick {
    x: f64,
    y: f64,
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    println!("=== Joystick ===\n");

    // ========================================================================
    // Build Connection
    // ========================================================================

    let builder = Connection::builder();
    let builder = if args.url.starts_with("http") {
        builder.polling(&args.url)
    } else {
        builder.streaming(&args.url)
    };
    let conn = builder.build().context("building connection")?;

    println!("[1] Connection {} over {}", conn.id(), conn.transport());
    println!("    Target: {}\n", args.url);

    conn.on_state_change(|new, old| println!("    [link] {old} -> {new}"));

    // ========================================================================
    // Drive
    // ========================================================================

    println!("[2] Driving (Ctrl+C to stop)...");
    conn.start()?;

    let deadline = args.seconds.map(Duration::from_secs);
    let started = tokio::time::Instant::now();
    let mut tick = interval(INPUT_RATE);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut n: u32 = 0;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = tick.tick() => {}
        }

        if deadline.is_some_and(|d| started.elapsed() >= d) {
            break;
        }

        let phase = started.elapsed().as_secs_f64();
        conn.set_structured_value(&Stick {
            x: (phase * 1.5).cos(),
            y: (phase * 1.5).sin(),
        })?;

        n = n.wrapping_add(1);
        if n % REPORT_EVERY == 0 {
            report(&conn);
        }
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    println!("\n[3] Stopping...");
    conn.stop();
    println!("    ✓ State: {}", conn.state());
    Ok(())
}

// ============================================================================
// Functions
// ============================================================================

fn report(conn: &Connection) {
    let health = conn.health();
    let latency = health
        .round_trip_ms()
        .map_or_else(|| "-".to_string(), |ms| format!("{ms}ms"));

    match health.state {
        ConnectionState::Error => {
            let cause = health
                .last_error
                .map_or_else(String::new, |e| e.to_string());
            println!("    [health] error: {cause}");
        }
        state => {
            let telemetry = conn
                .inbound_value()
                .map_or_else(|| "-".to_string(), |p| p.to_string());
            println!("    [health] {state} rtt={latency} telemetry={telemetry}");
        }
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        "teleop_link=debug"
    } else {
        "teleop_link=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}
