//! A single worker's connection cycle.
//!
//! Each worker connects once, sends one `SET` line, performs exactly one
//! read of up to [`READ_BUFFER_SIZE`] bytes and hands back what it got. There
//! is no framing and no retry; a truncated response is still the response.

use crate::payload::{PayloadMode, SetCommand};
use std::fmt;
use std::future::Future;
use std::io;
use std::string::FromUtf8Error;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

/// Upper bound on the single response read
pub const READ_BUFFER_SIZE: usize = 1024;

/// Host/port of the server under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Target {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Optional deadlines; `None` leaves the transport default in place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Option<Duration>,
    pub read: Option<Duration>,
}

/// Step at which a deadline expired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connect,
    Receive,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Connect => f.write_str("connect"),
            Phase::Receive => f.write_str("receive"),
        }
    }
}

/// Everything that can end a worker early.
#[derive(Debug)]
pub enum WorkerError {
    Connect(io::Error),
    Send(io::Error),
    Receive(io::Error),
    Decode(FromUtf8Error),
    Timeout(Phase, Duration),
    Panicked(String),
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerError::Connect(e) => write!(f, "connect failed: {e}"),
            WorkerError::Send(e) => write!(f, "send failed: {e}"),
            WorkerError::Receive(e) => write!(f, "receive failed: {e}"),
            WorkerError::Decode(e) => write!(f, "response is not valid UTF-8: {e}"),
            WorkerError::Timeout(phase, after) => {
                write!(f, "{phase} timed out after {}ms", after.as_millis())
            }
            WorkerError::Panicked(msg) => write!(f, "worker panicked: {msg}"),
        }
    }
}

impl std::error::Error for WorkerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WorkerError::Connect(e) | WorkerError::Send(e) | WorkerError::Receive(e) => Some(e),
            WorkerError::Decode(e) => Some(e),
            WorkerError::Timeout(..) | WorkerError::Panicked(_) => None,
        }
    }
}

/// Terminal state of one worker.
///
/// The raw response is kept in `result`; trailing line endings are only
/// stripped when the outcome is rendered as a log line.
#[derive(Debug)]
pub struct Outcome {
    pub worker: usize,
    pub command: Option<SetCommand>,
    pub result: Result<String, WorkerError>,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.result {
            Ok(response) => write!(
                f,
                "Connection {} received: {}",
                self.worker,
                response.trim_end_matches(['\r', '\n'])
            ),
            Err(e) => write!(f, "Connection {} encountered an error: {}", self.worker, e),
        }
    }
}

/// Run one full connection cycle for worker `id`.
///
/// Never fails: every error is folded into the returned [`Outcome`]. The
/// socket is dropped before this returns, whichever path was taken.
pub async fn run_worker(id: usize, target: &Target, payload: PayloadMode, timeouts: Timeouts) -> Outcome {
    let command = payload.generate(id);
    let result = connect_and_exchange(target, &command, timeouts).await;

    match &result {
        Ok(response) => trace!(worker = id, bytes = response.len(), "Response received"),
        Err(e) => debug!(worker = id, error = %e, "Worker failed"),
    }

    Outcome {
        worker: id,
        command: Some(command),
        result,
    }
}

async fn connect_and_exchange(
    target: &Target,
    command: &SetCommand,
    timeouts: Timeouts,
) -> Result<String, WorkerError> {
    let connect = TcpStream::connect((target.host.as_str(), target.port));
    let mut stream = with_deadline(timeouts.connect, Phase::Connect, async move {
        connect.await.map_err(WorkerError::Connect)
    })
    .await?;

    exchange(&mut stream, command, timeouts.read).await
}

/// Send `command` and read back a single response.
///
/// `read_timeout` only bounds the receive step; the write is left to the
/// transport.
pub async fn exchange<S>(
    stream: &mut S,
    command: &SetCommand,
    read_timeout: Option<Duration>,
) -> Result<String, WorkerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_command(stream, command).await?;
    with_deadline(read_timeout, Phase::Receive, read_response(stream)).await
}

async fn write_command<S>(stream: &mut S, command: &SetCommand) -> Result<(), WorkerError>
where
    S: AsyncWrite + Unpin,
{
    stream
        .write_all(&command.encode())
        .await
        .map_err(WorkerError::Send)?;
    stream.flush().await.map_err(WorkerError::Send)
}

/// One read, at most [`READ_BUFFER_SIZE`] bytes. EOF yields an empty string.
async fn read_response<S>(stream: &mut S) -> Result<String, WorkerError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; READ_BUFFER_SIZE];
    let n = stream.read(&mut buf).await.map_err(WorkerError::Receive)?;
    String::from_utf8(buf[..n].to_vec()).map_err(WorkerError::Decode)
}

async fn with_deadline<T, F>(limit: Option<Duration>, phase: Phase, fut: F) -> Result<T, WorkerError>
where
    F: Future<Output = Result<T, WorkerError>>,
{
    match limit {
        Some(after) => tokio::time::timeout(after, fut)
            .await
            .map_err(|_| WorkerError::Timeout(phase, after))?,
        None => fut.await,
    }
}
