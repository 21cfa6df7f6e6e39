//! REPL – operator commands for the SDV console.
//!
//! Supported commands:
//!   /connect                 – open the bridge connection
//!   /close                   – close it
//!   /stop                    – emergency stop (cancel goal, halt teleop)
//!   /goto <label>            – send a named waypoint
//!   /goal <x> <y> <w>        – send a free-form goal
//!   /waypoints               – list waypoint labels
//!   /teleop on|off           – arm or disarm the direction pad
//!   press|release <dir>      – direction key down/up (up, down, left, right or w/s/a/d)
//!   /zoom in|out             – zoom the map
//!   /pan <dir>               – pan the map
//!   /pose                    – show the latest pose readout
//!   /status                  – connection and console summary
//!   /help                    – show this list
//!   /quit | /exit            – stop and exit

use colored::Colorize;
use sdv_console::{ControlConsole, waypoint};
use sdv_types::{ConsoleError, Direction};

/// One parsed operator command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Connect,
    Close,
    Stop,
    Goto(String),
    Goal { x: String, y: String, w: String },
    Waypoints,
    Teleop(bool),
    Press(Direction),
    Release(Direction),
    ZoomIn,
    ZoomOut,
    Pan(Direction),
    Pose,
    Status,
    Help,
    Quit,
}

/// What the loop should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Parse one input line. Errors are user-facing messages.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    let args: Vec<&str> = rest.split_whitespace().collect();

    match head {
        "/connect" => Ok(Command::Connect),
        "/close" => Ok(Command::Close),
        "/stop" => Ok(Command::Stop),
        "/goto" if !rest.is_empty() => Ok(Command::Goto(rest.to_string())),
        "/goto" => Err("usage: /goto <label>  (see /waypoints)".to_string()),
        "/goal" => match args.as_slice() {
            [x, y, w] => Ok(Command::Goal {
                x: x.to_string(),
                y: y.to_string(),
                w: w.to_string(),
            }),
            _ => Err("usage: /goal <x> <y> <w>".to_string()),
        },
        "/waypoints" => Ok(Command::Waypoints),
        "/teleop" => match rest {
            "on" => Ok(Command::Teleop(true)),
            "off" => Ok(Command::Teleop(false)),
            _ => Err("usage: /teleop on|off".to_string()),
        },
        "press" | "/press" => direction(rest).map(Command::Press),
        "release" | "/release" => direction(rest).map(Command::Release),
        "/zoom" => match rest {
            "in" | "+" => Ok(Command::ZoomIn),
            "out" | "-" => Ok(Command::ZoomOut),
            _ => Err("usage: /zoom in|out".to_string()),
        },
        "/pan" => direction(rest).map(Command::Pan),
        "/pose" => Ok(Command::Pose),
        "/status" => Ok(Command::Status),
        "/help" => Ok(Command::Help),
        "/quit" | "/exit" => Ok(Command::Quit),
        other => Err(format!("unknown command '{other}'")),
    }
}

fn direction(raw: &str) -> Result<Direction, String> {
    raw.parse::<Direction>().map_err(|e| match e {
        ConsoleError::InvalidInput(msg) => msg,
        other => other.to_string(),
    })
}

/// Run one command against the console, printing the outcome.
///
/// Refusals are also emitted on the feedback bus by the console; here they
/// are only echoed next to the prompt.
pub fn execute(console: &mut ControlConsole, command: Command, last_pose: Option<&str>) -> Flow {
    match command {
        Command::Connect => match console.connect() {
            Ok(id) => println!("  Connecting to {} ({})", console.config().endpoint().bold(), id.to_string().dimmed()),
            Err(e) => report(&e),
        },
        Command::Close => console.disconnect(),
        Command::Stop => match console.emergency_stop() {
            Ok(()) => println!("{}", "  ■ Emergency stop sent".red().bold()),
            Err(e) => report(&e),
        },
        Command::Goto(label) => match console.send_waypoint(&label) {
            Ok(Some(seq)) => println!("  {} goal #{seq} → {}", "✓".green(), label.bold()),
            Ok(None) => println!(
                "  {} '{}'. Type {} for the list.",
                "Unknown waypoint".yellow(),
                label,
                "/waypoints".bold()
            ),
            Err(e) => report(&e),
        },
        Command::Goal { x, y, w } => match console.send_goal_input(&x, &y, &w) {
            Ok(seq) => println!("  {} goal #{seq} → ({x}, {y}) w={w}", "✓".green()),
            Err(e) => report(&e),
        },
        Command::Waypoints => {
            println!("{}", "Waypoints".bold().underline());
            for label in waypoint::labels() {
                println!("  • {label}");
            }
        }
        Command::Teleop(flag) => match console.set_teleop_armed(flag) {
            Ok(()) if flag => println!("  Teleop {}", "ARMED".yellow().bold()),
            Ok(()) => println!("  Teleop {}", "disarmed".green()),
            Err(e) => report(&e),
        },
        Command::Press(direction) => match console.direction_pressed(direction) {
            Ok(Some(cmd)) => println!("  linear {:+.2}  angular {:+.2}", cmd.linear.x, cmd.angular.z),
            Ok(None) => println!("  {}", "Teleop is not armed (/teleop on)".dimmed()),
            Err(e) => report(&e),
        },
        Command::Release(direction) => match console.direction_released(direction) {
            Ok(Some(cmd)) => println!("  linear {:+.2}  angular {:+.2}", cmd.linear.x, cmd.angular.z),
            Ok(None) => {}
            Err(e) => report(&e),
        },
        Command::ZoomIn => print_view(console.zoom_in().scale()),
        Command::ZoomOut => print_view(console.zoom_out().scale()),
        Command::Pan(direction) => {
            let (dx, dy) = console.pan(direction).offset();
            println!("  map offset ({dx:+.0} m, {dy:+.0} m)");
        }
        Command::Pose => match last_pose {
            Some(readout) => print!("{readout}"),
            None => println!("  {}", "No pose received yet".dimmed()),
        },
        Command::Status => print_status(console),
        Command::Help => print_help(),
        Command::Quit => return Flow::Quit,
    }
    Flow::Continue
}

fn report(error: &ConsoleError) {
    println!("  {} {}", "✗".red().bold(), error.to_string().red());
}

fn print_view(scale: f64) {
    println!("  map scale ×{scale:.2}");
}

fn print_status(console: &ControlConsole) {
    let status = console.status();
    println!("{}", "Console Status".bold().underline());
    println!("  Bridge      : {} ({})", status.endpoint.bold(), status.state.to_string().yellow());
    if let Some(id) = status.connection {
        println!("  Connection  : {}", id.to_string().dimmed());
    }
    if let Some(seen) = status.last_seen {
        println!("  Last frame  : {}", seen.format("%H:%M:%S%.3f"));
    }
    println!("  Last goal   : #{}", status.last_goal_sequence);
    println!(
        "  Teleop      : {}{}",
        if status.teleop_armed { "armed".yellow() } else { "disarmed".green() },
        if status.held.is_empty() { String::new() } else { format!(" holding {:?}", status.held) }
    );
    println!(
        "  Map         : {} ×{:.2}",
        if status.map_bound { "bound" } else { "not bound" },
        status.view.scale()
    );
    println!(
        "  Telemetry   : {} sample(s), {} decode error(s)",
        status.samples_shown, status.decode_errors
    );
}

pub fn print_help() {
    println!();
    println!("{}", "SDV Console Commands".bold().underline());
    println!("  {}      – open the bridge connection", "/connect".bold().cyan());
    println!("  {}        – close the bridge connection", "/close".bold().cyan());
    println!("  {}         – emergency stop", "/stop".bold().cyan());
    println!("  {} – send a named waypoint", "/goto <label>".bold().cyan());
    println!("  {} – send a free-form goal", "/goal <x> <y> <w>".bold().cyan());
    println!("  {}    – list waypoint labels", "/waypoints".bold().cyan());
    println!("  {} – arm or disarm teleoperation", "/teleop on|off".bold().cyan());
    println!("  {} – direction key down / up", "press|release <dir>".bold().cyan());
    println!("  {} – zoom the map", "/zoom in|out".bold().cyan());
    println!("  {}   – pan the map", "/pan <dir>".bold().cyan());
    println!("  {}         – latest pose readout", "/pose".bold().cyan());
    println!("  {}       – console status", "/status".bold().cyan());
    println!("  {}  – exit", "/quit  /exit".bold().cyan());
    println!();
}
