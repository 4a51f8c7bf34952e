//! Operator console adapter.
//!
//! A stdin reader thread turns typed keywords into [`ConsoleCommand`]s and
//! hands them to the control loop through a bounded `embassy-sync`
//! channel.  The loop drains it with `try_receive`, so typing never blocks
//! the controller and the controller never blocks on the console.
//!
//! ```text
//! ┌──────────────┐  ConsoleCommand  ┌──────────────┐
//! │ stdin thread │ ───────────────▶ │ control loop │
//! └──────────────┘ OPERATOR_CHANNEL └──────────────┘
//! ```

use std::fmt::Write as _;
use std::io::BufRead;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{info, warn};

use crate::app::commands::{AppCommand, OperatorInput};
use crate::app::view::{OperatorView, Prompt};

/// Channel depth for operator commands.
const OPERATOR_DEPTH: usize = 8;

/// What the operator can type.
#[derive(Debug, Clone)]
pub enum ConsoleCommand {
    App(AppCommand),
    /// Re-read the config file and apply it.
    Reload,
    /// Print the operator view.
    Show,
    Quit,
}

/// Console thread → control loop.
pub static OPERATOR_CHANNEL: Channel<CriticalSectionRawMutex, ConsoleCommand, OPERATOR_DEPTH> =
    Channel::new();

/// Parse one console line.  Blank lines and unknown words yield `None`.
pub fn parse(line: &str) -> Option<ConsoleCommand> {
    let word = line.trim().to_ascii_lowercase();
    let command = match word.as_str() {
        "" => return None,
        "connect" | "reconnect" => ConsoleCommand::App(AppCommand::Reconnect),
        "reload" => ConsoleCommand::Reload,
        "show" | "status" | "?" => ConsoleCommand::Show,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => ConsoleCommand::App(AppCommand::Operator(OperatorInput::parse(other)?)),
    };
    Some(command)
}

/// Spawn the stdin reader.  End of input queues [`ConsoleCommand::Quit`].
pub fn spawn_reader() -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("console".into())
        .spawn(|| {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match parse(&line) {
                    Some(command) => {
                        let quit = matches!(command, ConsoleCommand::Quit);
                        if OPERATOR_CHANNEL.try_send(command).is_err() {
                            warn!("CONSOLE | command queue full, input dropped");
                        }
                        if quit {
                            return;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => println!("unknown command: {}", line.trim()),
                }
            }
            info!("CONSOLE | input closed");
            let _ = OPERATOR_CHANNEL.try_send(ConsoleCommand::Quit);
        })
}

/// Render the operator view as plain text.
pub fn render(view: &OperatorView) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "── {:?} ── link: {} (connects {}, frames {})",
        view.phase,
        view.link.label(),
        view.link_connects,
        view.frames_seen
    );
    let _ = writeln!(out, "status: {}", view.status);
    if let Some(category) = view.category {
        let _ = writeln!(
            out,
            "item:   {} ({:.0}%)  [{}]",
            category.display_name(),
            view.confidence,
            view.action_label
        );
    }
    for bin in &view.bins {
        let _ = writeln!(
            out,
            "bin:    {:<20} {:>5.1}%  {}",
            bin.bin.label(),
            bin.pct,
            bin.tier.label()
        );
    }
    for alert in &view.alerts {
        let _ = writeln!(out, "ALERT:  {}", alert.message);
    }
    match view.prompt {
        Some(Prompt::Disambiguation) => out.push_str("> used | unused | cancel\n"),
        Some(Prompt::Continuation) => out.push_str("> continue | end\n"),
        Some(Prompt::Warning) => out.push_str("> ack | cancel\n"),
        None => {}
    }
    out
}
