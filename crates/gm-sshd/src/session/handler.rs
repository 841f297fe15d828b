//! Session channel handler
//!
//! Runs the request loop of one `session` channel. A successful `pty-req`
//! starts the shell and two copy directions:
//!
//! - output: pty -> channel, a blocking reader feeding an async forwarder
//! - input: channel -> pty, an async receiver feeding blocking writes
//!
//! Each direction reports on `drained` when it stops. The channel is torn
//! down (exit-status, channel close, pty close) only after both have
//! reported, and exactly once because teardown consumes the running shell.

use std::io::{Read, Write};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use gm_core::ShellConfig;
use gm_protocol::{request, PtyConfig, WindowChange};

use crate::channel::{AcceptedChannel, ChannelHandle, ChannelRequest};
use crate::error::SshdError;
use crate::server::ChannelProcessor;
use crate::session::pty::{NativePtySpawner, PtySpawner, ShellProcess};

/// Size of each read from the shell's pty
const READ_CHUNK: usize = 4096;

/// Chunks buffered between the pty reader and the channel
const OUTPUT_QUEUE: usize = 32;

/// Exit status reported for every shell
const EXIT_STATUS: u32 = 0;

/// Handles `session` channels by binding them to a shell
pub struct SessionHandler {
    shell: ShellConfig,
    spawner: Arc<dyn PtySpawner>,
}

impl SessionHandler {
    /// Handler that starts shells in native pseudo-terminals
    pub fn new(shell: ShellConfig) -> Self {
        Self::with_spawner(shell, Arc::new(NativePtySpawner))
    }

    /// Handler with a custom process spawner
    pub fn with_spawner(shell: ShellConfig, spawner: Arc<dyn PtySpawner>) -> Self {
        Self { shell, spawner }
    }

    /// Serve one channel until the peer closes it and any shell is gone
    pub async fn run(&self, channel: AcceptedChannel) {
        let AcceptedChannel {
            handle,
            mut requests,
            input,
        } = channel;

        let mut input = Some(input);
        let mut running: Option<RunningShell> = None;
        let mut requests_open = true;
        let mut closing = None;

        loop {
            tokio::select! {
                request = requests.recv(), if requests_open => match request {
                    Some(request) => {
                        self.handle_request(request, &handle, &mut input, &mut running);
                    }
                    None => {
                        tracing::debug!("Channel closed by peer");
                        requests_open = false;
                        if let Some(shell) = running.as_mut() {
                            shell.process.kill();
                        }
                    }
                },

                drained = next_drained(&mut running), if running.is_some() => {
                    let finished = running
                        .as_mut()
                        .map(|shell| shell.on_drained(drained))
                        .unwrap_or(false);
                    if finished {
                        // Requests keep being answered while the channel closes.
                        if let Some(shell) = running.take() {
                            closing = Some(tokio::spawn(teardown(shell, Arc::clone(&handle))));
                        }
                    }
                }

                else => break,
            }
        }

        if let Some(closing) = closing {
            if let Err(e) = closing.await {
                tracing::warn!("Session teardown failed: {}", e);
            }
        }
        tracing::debug!("Session channel handler finished");
    }

    fn handle_request(
        &self,
        request: ChannelRequest,
        handle: &Arc<dyn ChannelHandle>,
        input: &mut Option<mpsc::Receiver<Bytes>>,
        running: &mut Option<RunningShell>,
    ) {
        tracing::debug!(
            "Channel request {} (want_reply: {})",
            request.kind,
            request.want_reply
        );

        let result = match request.kind.as_str() {
            request::PTY_REQ => self.start_shell(&request.payload, handle, input, running),
            request::WINDOW_CHANGE => resize(&request.payload, running),
            _ => Ok(()),
        };

        if let Err(e) = &result {
            tracing::warn!("{} request failed: {}", request.kind, e);
            self.shell.report(e);
        }

        request.reply(result.is_ok());
    }

    fn start_shell(
        &self,
        payload: &[u8],
        handle: &Arc<dyn ChannelHandle>,
        input: &mut Option<mpsc::Receiver<Bytes>>,
        running: &mut Option<RunningShell>,
    ) -> Result<(), SshdError> {
        let pty = PtyConfig::parse(payload).map_err(|source| SshdError::Payload {
            request: request::PTY_REQ,
            source,
        })?;

        if input.is_none() {
            return Err(SshdError::ShellAlreadyStarted);
        }

        let mut process = self.spawner.spawn(self.shell.shell(), &pty)?;
        tracing::debug!("Shell {} started (pid {:?})", self.shell.shell(), process.pid());
        let (reader, writer) = match take_io(&mut *process) {
            Ok(io) => io,
            Err(e) => {
                process.close();
                return Err(e);
            }
        };
        let Some(input) = input.take() else {
            process.close();
            return Err(SshdError::ShellAlreadyStarted);
        };

        let (drained_tx, drained_rx) = mpsc::channel(2);
        let release_input = CancellationToken::new();

        tokio::spawn(copy_output(reader, Arc::clone(handle), drained_tx.clone()));
        tokio::spawn(copy_input(input, writer, release_input.clone(), drained_tx));

        *running = Some(RunningShell {
            process,
            drained: drained_rx,
            release_input,
            pending: 2,
        });
        Ok(())
    }
}

#[async_trait]
impl ChannelProcessor for SessionHandler {
    async fn process(&self, channel: AcceptedChannel) {
        self.run(channel).await;
    }
}

fn take_io(
    process: &mut dyn ShellProcess,
) -> Result<(Box<dyn Read + Send>, Box<dyn Write + Send>), SshdError> {
    Ok((process.take_reader()?, process.take_writer()?))
}

fn resize(payload: &[u8], running: &mut Option<RunningShell>) -> Result<(), SshdError> {
    let change = WindowChange::parse(payload).map_err(|source| SshdError::Payload {
        request: request::WINDOW_CHANGE,
        source,
    })?;

    match running {
        Some(shell) => shell.process.resize(&change),
        None => Ok(()),
    }
}

/// A copy direction between the channel and the pty
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// pty -> channel
    Output,
    /// channel -> pty
    Input,
}

struct RunningShell {
    process: Box<dyn ShellProcess>,
    drained: mpsc::Receiver<Direction>,
    release_input: CancellationToken,
    pending: usize,
}

impl RunningShell {
    /// Record a drained direction. Returns true once both have drained.
    fn on_drained(&mut self, direction: Option<Direction>) -> bool {
        match direction {
            Some(Direction::Output) => {
                tracing::debug!("Shell output drained");
                // Nothing reads the input anymore once the shell is gone.
                self.release_input.cancel();
            }
            Some(Direction::Input) => {
                tracing::debug!("Channel input drained");
            }
            // Both senders dropped without reporting
            None => return true,
        }

        self.pending = self.pending.saturating_sub(1);
        self.pending == 0
    }
}

async fn next_drained(running: &mut Option<RunningShell>) -> Option<Direction> {
    match running {
        Some(shell) => shell.drained.recv().await,
        None => std::future::pending().await,
    }
}

async fn teardown(shell: RunningShell, handle: Arc<dyn ChannelHandle>) {
    tracing::debug!("Both directions drained, closing session channel");

    if let Err(e) = handle.exit_status(EXIT_STATUS).await {
        tracing::debug!("Failed to send exit-status: {}", e);
    }
    if let Err(e) = handle.close().await {
        tracing::debug!("Failed to close channel: {}", e);
    }

    let process = shell.process;
    if let Err(e) = tokio::task::spawn_blocking(move || process.close()).await {
        tracing::warn!("Closing the shell pty failed: {}", e);
    }
}

/// pty -> channel
async fn copy_output(
    reader: Box<dyn Read + Send>,
    handle: Arc<dyn ChannelHandle>,
    drained: mpsc::Sender<Direction>,
) {
    let (tx, mut rx) = mpsc::channel(OUTPUT_QUEUE);
    spawn_pty_reader(reader, tx);

    while let Some(data) = rx.recv().await {
        if let Err(e) = handle.data(&data).await {
            tracing::debug!("Failed to send shell output: {}", e);
            break;
        }
    }

    let _ = drained.send(Direction::Output).await;
}

/// Read the pty on a blocking task until EOF, error, or the receiver is gone
fn spawn_pty_reader(mut reader: Box<dyn Read + Send>, tx: mpsc::Sender<Vec<u8>>) {
    tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; READ_CHUNK];

        loop {
            match reader.read(&mut buf) {
                Ok(0) => {
                    tracing::debug!("PTY reader EOF");
                    break;
                }
                Ok(n) => {
                    if tx.blocking_send(buf[..n].to_vec()).is_err() {
                        tracing::debug!("PTY output receiver closed");
                        break;
                    }
                }
                Err(e) => {
                    // EIO once the shell has exited
                    tracing::debug!("PTY reader closed: {}", e);
                    break;
                }
            }
        }
    });
}

/// channel -> pty
async fn copy_input(
    mut input: mpsc::Receiver<Bytes>,
    mut writer: Box<dyn Write + Send>,
    release: CancellationToken,
    drained: mpsc::Sender<Direction>,
) {
    loop {
        let data = tokio::select! {
            biased;

            _ = release.cancelled() => break,

            data = input.recv() => match data {
                Some(data) => data,
                None => break,
            },
        };

        let written = tokio::task::spawn_blocking(move || {
            let result = writer.write_all(&data).and_then(|()| writer.flush());
            (writer, result)
        })
        .await;

        match written {
            Ok((w, Ok(()))) => writer = w,
            Ok((_, Err(e))) => {
                tracing::debug!("Failed to write to pty: {}", e);
                break;
            }
            Err(e) => {
                tracing::warn!("PTY writer task failed: {}", e);
                break;
            }
        }
    }

    let _ = drained.send(Direction::Input).await;
}
