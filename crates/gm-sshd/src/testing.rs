//! In-memory fakes for driving the engine in unit tests

use std::error::Error;
use std::io::{self, Read, Write};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use gm_core::ShellConfig;
use gm_protocol::{PtyConfig, WindowChange};

use crate::channel::{AcceptedChannel, ChannelHandle, ChannelRequest, NewChannel, RejectReason};
use crate::error::SshdError;
use crate::session::{PtySpawner, ShellProcess};

const POLL: Duration = Duration::from_millis(10);

/// Ordered log of named events shared between fakes
#[derive(Debug, Default, Clone)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.count(event) > 0
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == event).count()
    }

    /// Assert that the first `first` precedes the first `then`
    pub fn assert_order(&self, first: &str, then: &str) {
        let entries = self.entries();
        let a = entries.iter().position(|e| e == first);
        let b = entries.iter().position(|e| e == then);
        match (a, b) {
            (Some(a), Some(b)) => assert!(a < b, "{first} after {then}: {entries:?}"),
            _ => panic!("missing {first} or {then}: {entries:?}"),
        }
    }
}

/// Errors collected by a test sink
#[derive(Debug, Default, Clone)]
pub struct CollectedErrors(Arc<Mutex<Vec<String>>>);

impl CollectedErrors {
    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn messages(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// A shell config whose sink collects error messages
pub fn collecting_shell(shell: &str) -> (ShellConfig, CollectedErrors) {
    let errors = CollectedErrors::default();
    let sink = {
        let seen = Arc::clone(&errors.0);
        move |error: &(dyn Error + 'static)| seen.lock().unwrap().push(error.to_string())
    };
    (ShellConfig::new(shell, Arc::new(sink)), errors)
}

/// What the engine sent on a fake channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Reply(bool),
    Data(Vec<u8>),
    ExitStatus(u32),
    Close,
}

/// Engine-facing half of an in-memory channel
pub struct FakeChannel {
    events: Arc<Mutex<Vec<ChannelEvent>>>,
    log: EventLog,
}

impl FakeChannel {
    pub fn pair() -> (AcceptedChannel, FakePeer) {
        Self::pair_with_log(EventLog::default())
    }

    pub fn pair_with_log(log: EventLog) -> (AcceptedChannel, FakePeer) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let (requests_tx, requests_rx) = mpsc::channel(32);
        let (input_tx, input_rx) = mpsc::channel(32);

        let channel = AcceptedChannel {
            handle: Arc::new(FakeChannel {
                events: Arc::clone(&events),
                log: log.clone(),
            }),
            requests: requests_rx,
            input: input_rx,
        };
        let peer = FakePeer {
            events,
            log,
            requests: Mutex::new(Some(requests_tx)),
            input: Mutex::new(Some(input_tx)),
        };
        (channel, peer)
    }

    fn record(&self, event: ChannelEvent, name: &str) {
        self.events.lock().unwrap().push(event);
        self.log.push(name);
    }
}

#[async_trait]
impl ChannelHandle for FakeChannel {
    async fn data(&self, data: &[u8]) -> Result<(), SshdError> {
        self.record(ChannelEvent::Data(data.to_vec()), "data");
        Ok(())
    }

    async fn exit_status(&self, status: u32) -> Result<(), SshdError> {
        self.record(ChannelEvent::ExitStatus(status), "exit-status");
        Ok(())
    }

    async fn close(&self) -> Result<(), SshdError> {
        self.record(ChannelEvent::Close, "channel-close");
        Ok(())
    }
}

/// Client-facing half of an in-memory channel
pub struct FakePeer {
    events: Arc<Mutex<Vec<ChannelEvent>>>,
    log: EventLog,
    requests: Mutex<Option<mpsc::Sender<ChannelRequest>>>,
    input: Mutex<Option<mpsc::Sender<Bytes>>>,
}

impl FakePeer {
    /// Send a request; its reply, if any, is recorded as a channel event
    pub async fn request(&self, request: ChannelRequest) {
        let events = Arc::clone(&self.events);
        let log = self.log.clone();
        let request = request.on_reply(move |success| {
            events.lock().unwrap().push(ChannelEvent::Reply(success));
            log.push("reply");
        });

        let tx = self.requests.lock().unwrap().clone();
        if let Some(tx) = tx {
            tx.send(request).await.unwrap();
        }
    }

    pub async fn input(&self, data: &[u8]) {
        let tx = self.input.lock().unwrap().clone();
        if let Some(tx) = tx {
            tx.send(Bytes::copy_from_slice(data)).await.unwrap();
        }
    }

    /// Send EOF
    pub fn eof(&self) {
        self.input.lock().unwrap().take();
    }

    /// Close the channel from the peer side
    pub fn close(&self) {
        self.eof();
        self.requests.lock().unwrap().take();
    }

    pub fn events(&self) -> Vec<ChannelEvent> {
        self.events.lock().unwrap().clone()
    }

    pub async fn wait_for(&self, event: ChannelEvent) {
        while !self.events().contains(&event) {
            tokio::time::sleep(POLL).await;
        }
    }

    pub async fn wait_for_log(&self, event: &str) {
        while !self.log.contains(event) {
            tokio::time::sleep(POLL).await;
        }
    }
}

/// A channel offer that records the decision in a log
pub struct FakeOffer {
    kind: String,
    log: EventLog,
    fail_accept: bool,
}

impl FakeOffer {
    pub fn new(kind: &str, log: EventLog) -> Box<dyn NewChannel> {
        Box::new(Self {
            kind: kind.to_string(),
            log,
            fail_accept: false,
        })
    }

    pub fn failing(kind: &str, log: EventLog) -> Box<dyn NewChannel> {
        Box::new(Self {
            kind: kind.to_string(),
            log,
            fail_accept: true,
        })
    }
}

#[async_trait]
impl NewChannel for FakeOffer {
    fn channel_type(&self) -> &str {
        &self.kind
    }

    async fn accept(self: Box<Self>) -> Result<AcceptedChannel, SshdError> {
        if self.fail_accept {
            return Err(SshdError::ChannelClosed);
        }
        self.log.push(format!("accepted {}", self.kind));
        let (channel, _peer) = FakeChannel::pair_with_log(self.log.clone());
        Ok(channel)
    }

    async fn reject(self: Box<Self>, reason: RejectReason, message: &str) -> Result<(), SshdError> {
        self.log
            .push(format!("rejected {} {} {}", self.kind, reason as u32, message));
        Ok(())
    }
}

/// Spawner that hands out one prepared [`FakeProcess`]
#[derive(Clone)]
pub struct FakeSpawner {
    log: EventLog,
    process: Arc<Mutex<Option<FakeProcess>>>,
    spawned: Arc<Mutex<usize>>,
}

impl FakeSpawner {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            process: Arc::new(Mutex::new(None)),
            spawned: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_process(self, process: FakeProcess) -> Self {
        *self.process.lock().unwrap() = Some(process);
        self
    }

    pub fn spawned(&self) -> usize {
        *self.spawned.lock().unwrap()
    }
}

impl PtySpawner for FakeSpawner {
    fn spawn(&self, shell: &str, _pty: &PtyConfig) -> Result<Box<dyn ShellProcess>, SshdError> {
        *self.spawned.lock().unwrap() += 1;
        self.log.push(format!("spawned {shell}"));
        let process = self
            .process
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| FakeProcess::new(self.log.clone()));
        Ok(Box::new(process))
    }
}

type KillSwitch = Arc<(Mutex<bool>, Condvar)>;

/// Scripted shell: emits fixed output, optionally stays alive until killed
pub struct FakeProcess {
    log: EventLog,
    output: Vec<Vec<u8>>,
    read_delay: Duration,
    write_delay: Duration,
    until_killed: bool,
    killed: KillSwitch,
    reader_taken: bool,
    writer_taken: bool,
}

impl FakeProcess {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            output: Vec::new(),
            read_delay: Duration::ZERO,
            write_delay: Duration::ZERO,
            until_killed: false,
            killed: Arc::new((Mutex::new(false), Condvar::new())),
            reader_taken: false,
            writer_taken: false,
        }
    }

    pub fn with_output(mut self, chunks: &[&[u8]]) -> Self {
        self.output = chunks.iter().map(|c| c.to_vec()).collect();
        self
    }

    /// Delay before every read, including the final EOF
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    /// Hold the output open until the process is killed
    pub fn until_killed(mut self) -> Self {
        self.until_killed = true;
        self
    }

    fn signal_kill(&self) {
        let (killed, cvar) = &*self.killed;
        *killed.lock().unwrap() = true;
        cvar.notify_all();
    }
}

impl ShellProcess for FakeProcess {
    fn pid(&self) -> Option<u32> {
        None
    }

    fn take_reader(&mut self) -> Result<Box<dyn Read + Send>, SshdError> {
        if std::mem::replace(&mut self.reader_taken, true) {
            return Err(SshdError::Pty("reader already taken".into()));
        }
        Ok(Box::new(FakeReader {
            log: self.log.clone(),
            chunks: self.output.drain(..).collect::<Vec<_>>().into_iter(),
            delay: self.read_delay,
            until_killed: self.until_killed,
            killed: Arc::clone(&self.killed),
        }))
    }

    fn take_writer(&mut self) -> Result<Box<dyn Write + Send>, SshdError> {
        if std::mem::replace(&mut self.writer_taken, true) {
            return Err(SshdError::Pty("writer already taken".into()));
        }
        Ok(Box::new(FakeWriter {
            log: self.log.clone(),
            delay: self.write_delay,
        }))
    }

    fn resize(&mut self, change: &WindowChange) -> Result<(), SshdError> {
        self.log.push(format!(
            "resized {}x{}",
            change.width_chars, change.height_rows
        ));
        Ok(())
    }

    fn kill(&mut self) {
        self.log.push("killed");
        self.signal_kill();
    }

    fn close(self: Box<Self>) {
        self.signal_kill();
        self.log.push("process-closed");
    }
}

struct FakeReader {
    log: EventLog,
    chunks: std::vec::IntoIter<Vec<u8>>,
    delay: Duration,
    until_killed: bool,
    killed: KillSwitch,
}

impl Read for FakeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        std::thread::sleep(self.delay);

        if let Some(chunk) = self.chunks.next() {
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            return Ok(n);
        }

        if self.until_killed {
            let (killed, cvar) = &*self.killed;
            let mut guard = killed.lock().unwrap();
            while !*guard {
                guard = cvar.wait(guard).unwrap();
            }
        }

        self.log.push("reader-eof");
        Ok(0)
    }
}

struct FakeWriter {
    log: EventLog,
    delay: Duration,
}

impl Write for FakeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        std::thread::sleep(self.delay);
        self.log
            .push(format!("wrote {}", String::from_utf8_lossy(buf)));
        self.log.push("write-finished");
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
