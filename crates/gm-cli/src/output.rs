//! Output formatting utilities for the CLI
//!
//! Colored status messages for the terminal and the error sink that
//! routes server errors to them.

use std::error::Error;
use std::io::{self, Write};

use crossterm::style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor};

use gm_core::ErrorSink;
use gm_tunnel::{FailureReason, TunnelError};

/// Write one colored status line: symbol, message, newline.
///
/// Callers pass a locked handle so that lines from concurrent reporters
/// never interleave.
fn write_status<W: Write>(out: &mut W, color: Color, symbol: &str, msg: &str) -> io::Result<()> {
    crossterm::execute!(
        out,
        SetForegroundColor(color),
        Print(symbol),
        Print(" "),
        ResetColor,
        Print(msg),
        Print("\n")
    )
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    let _ = write_status(&mut io::stdout().lock(), Color::Green, "✓", msg);
}

/// Print an error message in red with an X prefix
///
/// Outputs to stderr with red coloring for error feedback to the user.
pub fn print_error(msg: &str) {
    let _ = write_status(&mut io::stderr().lock(), Color::Red, "✗", msg);
}

/// Print a warning message in yellow with a warning symbol prefix
pub fn print_warning(msg: &str) {
    let _ = write_status(&mut io::stderr().lock(), Color::Yellow, "⚠", msg);
}

/// Print an informational message in cyan with an info symbol prefix
pub fn print_info(msg: &str) {
    let _ = write_status(&mut io::stdout().lock(), Color::Cyan, "ℹ", msg);
}

/// Print a command the user should copy, highlighted and indented
pub fn print_command(cmd: &str) {
    let mut stdout = io::stdout().lock();
    let _ = crossterm::execute!(
        stdout,
        Print("\n    "),
        SetAttribute(Attribute::Bold),
        SetForegroundColor(Color::Blue),
        Print(cmd),
        ResetColor,
        SetAttribute(Attribute::Reset),
        Print("\n\n")
    );
}

/// The command that connects to a gmash server
pub fn connect_command(host: &str, port: u16) -> String {
    format!("ssh -o UserKnownHostsFile=/dev/null -p {} {}", port, host)
}

/// What to tell the user when the tunnel could not be opened
pub fn tunnel_failure_message(error: &TunnelError) -> String {
    match error.reason() {
        FailureReason::MissingNgrok => {
            "Can't find ngrok. Install it and make sure it's in your PATH \
             (see https://ngrok.com/download)"
                .to_string()
        }
        FailureReason::UnexecutableNgrok => {
            format!("ngrok was found, but it couldn't be executed ({})", error.detail())
        }
        FailureReason::MissingAuthToken => {
            "ngrok's auth token must be installed \
             (see https://dashboard.ngrok.com/get-started)"
                .to_string()
        }
        _ => error.to_string(),
    }
}

/// Error sink that prints every report to stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleErrorSink;

impl ErrorSink for ConsoleErrorSink {
    fn report(&self, error: &(dyn Error + 'static)) {
        tracing::debug!("Reported: {:?}", error);
        print_error(&error.to_string());
    }
}
