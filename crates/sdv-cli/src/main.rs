//! `sdv-console` – operator console for the lab's self-driving vehicle.
//!
//! 1. Checks for `~/.sdv-console/config.toml`; runs a **First-Run Wizard**
//!    when the file is absent.
//! 2. Connects to the vehicle's rosbridge server.
//! 3. Drops the operator into an **interactive REPL** (`/goto`, `/goal`,
//!    `/teleop`, `/stop`, …) while connection banners, goal confirmations
//!    and rejections stream in from the feedback bus.
//! 4. Intercepts **Ctrl-C** to send an emergency stop and exit safely.

mod config;
mod repl;
mod telemetry;

use colored::Colorize;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{Instrument, error, warn};

use sdv_console::{ConsoleConfig, ControlConsole, LogRenderer};
use sdv_middleware::{EventBus, Lane, LaneReceiver, WsConnector};
use sdv_types::{ConnectionState, Event, OperatorFeedback};

fn main() {
    // Held until exit so pending spans are flushed.
    let _tracing = telemetry::init_tracing("sdv-console");

    print_banner();

    // ── First-Run Wizard ──────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => run_first_run_wizard(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = ConsoleConfig::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };

    println!("  Bridge endpoint {}", cfg.endpoint().bold());
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start the async runtime");
            std::process::exit(1);
        }
    };
    let span = telemetry::session_span(&cfg);
    runtime.block_on(run(cfg).instrument(span));
}

// ─────────────────────────────────────────────────────────────────────────────
// Operator loop
// ─────────────────────────────────────────────────────────────────────────────

async fn run(cfg: ConsoleConfig) {
    let (link_tx, mut link_rx) = mpsc::unbounded_channel();
    let (stop_tx, mut stop_rx) = mpsc::unbounded_channel::<()>();

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; emergency stop on Ctrl-C will not be available");
    }

    let bus = Arc::new(EventBus::default());
    let last_pose = Arc::new(Mutex::new(None::<String>));
    tokio::spawn(print_feedback(
        bus.subscribe_to(Lane::Connection),
        bus.subscribe_to(Lane::Operator),
        bus.subscribe_to(Lane::Telemetry),
        Arc::clone(&last_pose),
    ));

    let mut console = ControlConsole::new(
        cfg,
        Arc::clone(&bus),
        Box::new(WsConnector::new(link_tx)),
        Box::new(LogRenderer::new()),
    );
    if let Err(e) = console.connect() {
        println!("{}: {}", "Connect failed".red(), e);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break, // EOF
                    Err(e) => {
                        eprintln!("{}: {}", "Read error".red(), e);
                        break;
                    }
                };
                if !line.trim().is_empty() {
                    match repl::parse_command(&line) {
                        Ok(command) => {
                            let pose = last_pose.lock().ok().and_then(|p| p.clone());
                            if repl::execute(&mut console, command, pose.as_deref()) == repl::Flow::Quit {
                                println!("{}", "Goodbye.".green());
                                break;
                            }
                        }
                        Err(msg) => println!(
                            "{} {}. Type {} for available commands.",
                            "✗".red(),
                            msg.yellow(),
                            "/help".bold()
                        ),
                    }
                }
                prompt();
            }
            Some(event) = link_rx.recv() => console.handle_link_event(event),
            Some(()) = stop_rx.recv() => {
                println!();
                println!("{}", "⚠  Ctrl-C received – emergency stop …".yellow().bold());
                match console.emergency_stop() {
                    Ok(()) => println!("{}", "  ✓ Goal cancelled.".green()),
                    Err(e) => println!("  {} {}", "✗".red(), e),
                }
                break;
            }
        }
    }

    console.disconnect();
    println!("{}", "  ✓ Exiting SDV console.".green());
}

/// Echo bus feedback next to the prompt. Pose readouts are only kept for
/// `/pose`; printing each one would flood the terminal.
async fn print_feedback(
    mut connection: LaneReceiver,
    mut operator: LaneReceiver,
    mut readouts: LaneReceiver,
    last_pose: Arc<Mutex<Option<String>>>,
) {
    loop {
        let event: Event = tokio::select! {
            Some(event) = connection.recv() => event,
            Some(event) = operator.recv() => event,
            Some(event) = readouts.recv() => event,
            else => break,
        };
        match event.payload {
            OperatorFeedback::PoseReadout(readout) => {
                if let Ok(mut slot) = last_pose.lock() {
                    *slot = Some(readout);
                }
            }
            OperatorFeedback::ConnectionChanged { state, diagnostic } => {
                let banner = match state {
                    ConnectionState::Connecting => "● Connecting to the SDV bridge …".yellow(),
                    ConnectionState::Open => "● Connected to the SDV bridge".green().bold(),
                    ConnectionState::Error => "● Error on the SDV bridge connection".red().bold(),
                    ConnectionState::Closed => "● Connection closed".dimmed(),
                };
                match diagnostic {
                    Some(diag) => println!("\n  {banner} ({diag})"),
                    None => println!("\n  {banner}"),
                }
                prompt();
            }
            OperatorFeedback::Rejected { action, reason } => {
                println!("\n  {} {}: {}", "▲".red().bold(), action.bold(), reason.red());
                prompt();
            }
            OperatorFeedback::GoalCancelled => {
                println!("\n  {}", "Goal cancelled".yellow());
                prompt();
            }
            // Confirmed synchronously by the REPL already.
            OperatorFeedback::GoalDispatched { .. } | OperatorFeedback::TeleopArmed(_) => {}
        }
    }
}

fn prompt() {
    print!("{} ", "sdv>".bold().cyan());
    std::io::stdout().flush().ok();
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> ConsoleConfig {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║     SDV Console First-Run Wizard     ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's point the console at a vehicle.\n");

    let mut cfg = ConsoleConfig::default();

    cfg.bridge_host = prompt_line(
        &format!("  Vehicle (rosbridge) host [{}]: ", cfg.bridge_host),
        &cfg.bridge_host,
    );

    let port_str = prompt_line(
        &format!("  rosbridge WebSocket port [{}]: ", cfg.bridge_port),
        &cfg.bridge_port.to_string(),
    );
    match port_str.trim().parse::<u16>() {
        Ok(p) => cfg.bridge_port = p,
        Err(_) => println!(
            "  {} '{}' is not a valid port number, keeping {}",
            "Warning:".yellow(),
            port_str,
            cfg.bridge_port
        ),
    }

    cfg.topics.pose = prompt_line(
        &format!("  Pose topic [{}]: ", cfg.topics.pose),
        &cfg.topics.pose,
    );

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }

    config::apply_env_overrides(&mut cfg);
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   _____ ____ _    __"#.bold().cyan());
    println!("{}", r#"  / ___// __ \ |  / /"#.bold().cyan());
    println!("{}", r#"  \__ \/ / / / | / / "#.bold().cyan());
    println!("{}", r#" ___/ / /_/ /| |/ /  "#.bold().cyan());
    println!("{}", r#"/____/_____/ |___/   "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "SDV Console".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Goal dispatch, teleoperation and live pose for the lab SDV");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::BufRead;
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
