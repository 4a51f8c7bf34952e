//! Sterisort controller entry point.
//!
//! Hexagonal wiring with a synchronous control loop.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  SocketIoTransport / TcpTransport   LogEventSink               │
//! │  (Transport)                        (EventSink)                │
//! │  JsonFileConfig (ConfigPort)        MonotonicClock (ClockPort) │
//! │  Console thread ──OPERATOR_CHANNEL──▶ control loop             │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              Controller (pure logic)                   │    │
//! │  │  Channel · FSM · Dispatcher · Bins · Alerts            │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `sterisort [CONFIG_PATH]` (default `sterisort.json`).

use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};

use sterisort::adapters::clock::MonotonicClock;
use sterisort::adapters::console::{self, ConsoleCommand, OPERATOR_CHANNEL};
use sterisort::adapters::file_config::{DEFAULT_CONFIG_PATH, JsonFileConfig};
use sterisort::adapters::log_sink::LogEventSink;
use sterisort::adapters::socketio::SocketIoTransport;
use sterisort::adapters::tcp::TcpTransport;
use sterisort::app::commands::AppCommand;
use sterisort::app::ports::{ClockPort, ConfigError, ConfigPort};
use sterisort::app::service::Controller;
use sterisort::channel::transport::Transport;
use sterisort::config::{BackendProtocol, SystemConfig};

// ── Logging ───────────────────────────────────────────────────

fn log_filter() -> tracing_subscriber::EnvFilter {
    let level = if let Ok(v) = std::env::var("RUST_LOG") {
        v
    } else if let Ok(v) = std::env::var("STERISORT_LOG_LEVEL") {
        match v.as_str() {
            "silent" => "off".to_string(),
            "fatal" => "error".to_string(),
            other => other.to_string(),
        }
    } else {
        "info".to_string()
    };

    tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
}

fn init_logging() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    // `init` also installs the `log` bridge, so the library's `log`
    // records land in the same subscriber.
    tracing_subscriber::registry()
        .with(log_filter())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// ── Config ────────────────────────────────────────────────────

fn load_config(store: &JsonFileConfig) -> SystemConfig {
    match store.load() {
        Ok(cfg) => cfg,
        Err(ConfigError::NotFound) => {
            info!("No config at {}, writing defaults", store.path().display());
            let cfg = SystemConfig::default();
            if let Err(e) = store.save(&cfg) {
                warn!("Could not write default config: {}", e);
            }
            cfg
        }
        Err(e) => {
            warn!("Config load failed ({}), running with defaults", e);
            SystemConfig::default()
        }
    }
}

// ── Control loop ──────────────────────────────────────────────

/// Drive the controller until the operator quits, then shut it down.
fn run<T: Transport>(
    mut controller: Controller<T>,
    store: &JsonFileConfig,
    clock: &MonotonicClock,
    sink: &mut LogEventSink,
) {
    let interval = Duration::from_millis(controller.config().control_loop_interval_ms);
    controller.start(clock.now_ms(), sink);
    println!("{}", console::render(&controller.view()));

    info!("System ready. Entering control loop.");

    'control: loop {
        std::thread::sleep(interval);
        let now = clock.now_ms();

        while let Ok(command) = OPERATOR_CHANNEL.try_receive() {
            let result = match command {
                ConsoleCommand::App(cmd) => controller.handle_command(cmd, now, sink),
                ConsoleCommand::Reload => match store.load() {
                    Ok(cfg) => {
                        let current = controller.config();
                        if cfg.backend_addr != current.backend_addr
                            || cfg.backend_protocol != current.backend_protocol
                        {
                            warn!("Backend address/protocol changes apply on restart");
                        }
                        controller.handle_command(AppCommand::UpdateConfig(cfg), now, sink)
                    }
                    Err(e) => Err(e.into()),
                },
                ConsoleCommand::Show => Ok(()),
                ConsoleCommand::Quit => break 'control,
            };
            match result {
                Ok(()) => println!("{}", console::render(&controller.view())),
                Err(e) => println!("refused: {}", e),
            }
        }

        controller.tick(now, sink);
    }

    controller.shutdown(clock.now_ms(), sink);
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    init_logging();

    info!("╔══════════════════════════════════════╗");
    info!("║  Sterisort v{:<25}║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 1. Config ─────────────────────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let store = JsonFileConfig::new(config_path);
    let config = load_config(&store);
    info!(
        "Backend {} ({:?}) | auto_act={} | loop {}ms",
        config.backend_addr,
        config.backend_protocol,
        config.auto_act,
        config.control_loop_interval_ms
    );

    // ── 2. Adapters ───────────────────────────────────────────
    let clock = MonotonicClock::new();
    let mut sink = LogEventSink::new();
    console::spawn_reader().context("spawning console reader")?;

    // ── 3. Controller + control loop ──────────────────────────
    let addr = config.backend_addr.clone();
    match config.backend_protocol {
        BackendProtocol::SocketIo => run(
            Controller::new(config, SocketIoTransport::new(addr)),
            &store,
            &clock,
            &mut sink,
        ),
        BackendProtocol::Framed => run(
            Controller::new(config, TcpTransport::new(addr)),
            &store,
            &clock,
            &mut sink,
        ),
    }

    info!(
        "Shutdown complete after {}s ({} events)",
        clock.uptime_secs(),
        sink.emitted()
    );
    Ok(())
}
