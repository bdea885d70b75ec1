//! Terminal output helpers
//!
//! Uses ANSI escape codes for colors and styling. Colours are only emitted
//! when stdout is a terminal and `NO_COLOR` is unset.

use std::io::{self, BufRead, IsTerminal, Write};

// ANSI color codes
pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";

pub const RED: &str = "\x1b[31m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const BLUE: &str = "\x1b[34m";
pub const MAGENTA: &str = "\x1b[35m";
pub const CYAN: &str = "\x1b[36m";
pub const GRAY: &str = "\x1b[90m";

/// Whether colour output should be used for stdout
pub fn colors_enabled() -> bool {
    std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal()
}

/// Whether stdin is attached to an interactive terminal
pub fn is_interactive() -> bool {
    io::stdin().is_terminal()
}

/// Wrap `text` in the given styles if colours are enabled
pub fn colorize(codes: &[&str], text: &str, enabled: bool) -> String {
    if enabled && !codes.is_empty() {
        let prefix: String = codes.iter().copied().collect();
        format!("{}{}{}", prefix, text, RESET)
    } else {
        text.to_string()
    }
}

/// Ask a yes/no question on stderr; anything but `y`/`yes` is a no
pub fn confirm(prompt: &str) -> io::Result<bool> {
    eprint!("{} [y/N] ", prompt);
    io::stderr().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

/// Human readable byte count
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = "B";
    for next in UNITS {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = next;
    }
    format!("{:.1} {}", value, unit)
}
