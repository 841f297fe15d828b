//! Shell processes in pseudo-terminals
//!
//! Uses the portable-pty crate. The spawner applies the client's requested
//! size and `TERM`; terminal modes are not applied.

use std::io::{Read, Write};

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};

use gm_protocol::{PtyConfig, WindowChange};

use crate::error::SshdError;

/// Size used when a client asks for a zero-sized terminal
const DEFAULT_COLS: u16 = 80;
const DEFAULT_ROWS: u16 = 24;

/// Starts shell processes attached to new pseudo-terminals
pub trait PtySpawner: Send + Sync {
    /// Start `shell` in a pty configured from `pty`
    fn spawn(&self, shell: &str, pty: &PtyConfig) -> Result<Box<dyn ShellProcess>, SshdError>;
}

/// A running shell and the master side of its pty
pub trait ShellProcess: Send {
    /// Process id, when the platform reports one
    fn pid(&self) -> Option<u32>;

    /// Reader for the shell's output
    fn take_reader(&mut self) -> Result<Box<dyn Read + Send>, SshdError>;

    /// Writer for the shell's input. Can only be taken once.
    fn take_writer(&mut self) -> Result<Box<dyn Write + Send>, SshdError>;

    /// Apply new terminal dimensions
    fn resize(&mut self, change: &WindowChange) -> Result<(), SshdError>;

    /// Terminate the shell if it is still running
    fn kill(&mut self);

    /// Terminate the shell if needed, reap it, and close the pty
    fn close(self: Box<Self>);
}

/// [`PtySpawner`] backed by the platform's native pty system
#[derive(Debug, Default, Clone, Copy)]
pub struct NativePtySpawner;

impl PtySpawner for NativePtySpawner {
    fn spawn(&self, shell: &str, pty: &PtyConfig) -> Result<Box<dyn ShellProcess>, SshdError> {
        let size = pty_size(pty.width_chars, pty.height_rows, pty.width_pixels, pty.height_pixels);
        tracing::info!(
            "Starting {} in a {}x{} pty (TERM={:?})",
            shell,
            size.cols,
            size.rows,
            pty.term_name()
        );

        let spawn_error = |e: anyhow::Error| SshdError::Spawn {
            shell: shell.to_string(),
            source: e.into(),
        };

        let pair = native_pty_system().openpty(size).map_err(spawn_error)?;

        let mut cmd = CommandBuilder::new(shell);
        if !pty.term.is_empty() {
            cmd.env("TERM", pty.term_name().as_ref());
        }

        let child = pair.slave.spawn_command(cmd).map_err(spawn_error)?;
        // The child holds its own copy; reads on the master fail once it exits.
        drop(pair.slave);

        tracing::debug!("Spawned shell process with PID: {:?}", child.process_id());

        Ok(Box::new(NativeShell {
            master: pair.master,
            child,
        }))
    }
}

struct NativeShell {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
}

impl NativeShell {
    fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

impl ShellProcess for NativeShell {
    fn pid(&self) -> Option<u32> {
        self.child.process_id()
    }

    fn take_reader(&mut self) -> Result<Box<dyn Read + Send>, SshdError> {
        self.master
            .try_clone_reader()
            .map_err(|e| SshdError::Pty(e.into()))
    }

    fn take_writer(&mut self) -> Result<Box<dyn Write + Send>, SshdError> {
        self.master.take_writer().map_err(|e| SshdError::Pty(e.into()))
    }

    fn resize(&mut self, change: &WindowChange) -> Result<(), SshdError> {
        let size = pty_size(
            change.width_chars,
            change.height_rows,
            change.width_pixels,
            change.height_pixels,
        );
        tracing::debug!("Resizing pty to {}x{}", size.cols, size.rows);
        self.master.resize(size).map_err(|e| SshdError::Pty(e.into()))
    }

    fn kill(&mut self) {
        if self.is_running() {
            if let Err(e) = self.child.kill() {
                tracing::debug!("Failed to kill shell: {}", e);
            }
        }
    }

    fn close(mut self: Box<Self>) {
        self.kill();
        match self.child.wait() {
            Ok(status) => tracing::debug!("Shell exited: {:?}", status),
            Err(e) => tracing::debug!("Failed to reap shell: {}", e),
        }
    }
}

/// Convert requested dimensions to a pty size, clamping to `u16`
fn pty_size(cols: u32, rows: u32, pixel_width: u32, pixel_height: u32) -> PtySize {
    let clamp = |v: u32| u16::try_from(v).unwrap_or(u16::MAX);
    let or_default = |v: u32, default: u16| if v == 0 { default } else { clamp(v) };

    PtySize {
        cols: or_default(cols, DEFAULT_COLS),
        rows: or_default(rows, DEFAULT_ROWS),
        pixel_width: clamp(pixel_width),
        pixel_height: clamp(pixel_height),
    }
}
