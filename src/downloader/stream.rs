// Byte sources produced by backends and consumed by the relay
//
// Every source has an explicit `close()` so the relay can release the upstream
// (kill the subprocess, drop the HTTP connection) as soon as the caller leaves.

use std::fmt;
use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command as TokioCommand};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

/// Read size for subprocess pipes
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Cap on captured stderr so a chatty subprocess cannot grow memory
const STDERR_LIMIT: usize = 64 * 1024;

#[async_trait]
pub trait ByteSource: Send {
    /// Next chunk, `None` at end of stream
    async fn next_chunk(&mut self) -> io::Result<Option<Bytes>>;

    /// Release the upstream. Must be idempotent.
    async fn close(&mut self);
}

/// A readable byte source plus what is known about it up front
pub struct StreamHandle {
    pub source: Box<dyn ByteSource>,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    /// Title reported by the winning strategy, used for the download filename
    pub title: Option<String>,
}

impl StreamHandle {
    pub fn new(source: Box<dyn ByteSource>) -> Self {
        Self {
            source,
            content_type: None,
            content_length: None,
            title: None,
        }
    }

    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_content_length(mut self, length: Option<u64>) -> Self {
        self.content_length = length;
        self
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title.filter(|t| !t.trim().is_empty());
        self
    }
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .field("title", &self.title)
            .finish_non_exhaustive()
    }
}

/// What a winning strategy hands to the relay
#[derive(Debug)]
pub enum ResolutionResult {
    /// Bytes flow through this server
    Stream(StreamHandle),
    /// Caller should be redirected to this URL
    Redirect(String),
    /// Several candidate URLs; the enumerating backend ordered them best-first
    Picker(Vec<String>),
}

impl ResolutionResult {
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::Stream(_) => "stream",
            Self::Redirect(_) => "redirect",
            Self::Picker(_) => "picker",
        }
    }
}

/// Stdout of a subprocess (yt-dlp `-o -`)
pub struct ProcessSource {
    program: String,
    child: Child,
    stdout: Option<BufReader<ChildStdout>>,
    stderr_task: Option<JoinHandle<Vec<u8>>>,
    announced: Option<oneshot::Receiver<String>>,
    pending: Option<Bytes>,
}

impl ProcessSource {
    /// Spawn `program args..` with stdout piped. The child dies with this value.
    pub fn spawn(program: &str, args: &[String]) -> Result<Self, String> {
        Self::spawn_announcing(program, args, None)
    }

    /// Like [`spawn`](Self::spawn), but the first stderr line starting with `marker`
    /// is held back from the captured stderr and made available via [`announced`](Self::announced).
    pub fn spawn_announcing(
        program: &str,
        args: &[String],
        marker: Option<&'static str>,
    ) -> Result<Self, String> {
        let mut child = TokioCommand::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("Failed to start {}: {}", program, e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| format!("Failed to capture stdout from {}", program))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| format!("Failed to capture stderr from {}", program))?;

        let (announce_tx, announce_rx) = oneshot::channel();
        let stderr_task = tokio::spawn(collect_stderr(BufReader::new(stderr), marker, announce_tx));

        Ok(Self {
            program: program.to_string(),
            child,
            stdout: Some(BufReader::with_capacity(CHUNK_SIZE, stdout)),
            stderr_task: Some(stderr_task),
            announced: Some(announce_rx),
            pending: None,
        })
    }

    /// The marker line announced on stderr, waiting at most `wait` for it
    pub async fn announced(&mut self, wait: Duration) -> Option<String> {
        let rx = self.announced.take()?;
        match tokio::time::timeout(wait, rx).await {
            Ok(Ok(line)) => Some(line),
            _ => None,
        }
    }

    /// Wait for the first bytes so only a producing process is handed on.
    ///
    /// On an empty stdout the process is reaped and its stderr returned as the error.
    pub async fn prime(&mut self) -> Result<(), String> {
        match self.read_stdout().await {
            Ok(Some(first)) => {
                self.pending = Some(first);
                Ok(())
            }
            Ok(None) => {
                let status = self.child.wait().await.ok();
                let stderr = self.take_stderr().await;
                let stderr = stderr.trim();
                if stderr.is_empty() {
                    Err(format!(
                        "{} produced no output (exit status: {:?})",
                        self.program,
                        status.and_then(|s| s.code())
                    ))
                } else {
                    Err(stderr.to_string())
                }
            }
            Err(e) => {
                self.close().await;
                Err(format!("Failed to read stdout from {}: {}", self.program, e))
            }
        }
    }

    async fn read_stdout(&mut self) -> io::Result<Option<Bytes>> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
        let n = stdout.read_buf(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(buf.freeze()))
    }

    /// Reap the child at end of stdout. A non-zero exit means the output was truncated.
    async fn finish(&mut self) -> io::Result<Option<Bytes>> {
        self.stdout = None;
        let status = self.child.wait().await?;
        if status.success() {
            return Ok(None);
        }

        let stderr = self.take_stderr().await;
        Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("{} exited with {}: {}", self.program, status, stderr.trim()),
        ))
    }

    async fn take_stderr(&mut self) -> String {
        match self.stderr_task.take() {
            Some(task) => match task.await {
                Ok(bytes) => String::from_utf8_lossy(&bytes).to_string(),
                Err(_) => String::new(),
            },
            None => String::new(),
        }
    }
}

/// Capture stderr up to [`STDERR_LIMIT`], diverting the first `marker` line
async fn collect_stderr(
    mut stderr: BufReader<ChildStderr>,
    marker: Option<&'static str>,
    announce: oneshot::Sender<String>,
) -> Vec<u8> {
    let mut announce = marker.map(|m| (m, announce));
    let mut captured = Vec::new();
    let mut line = Vec::new();

    loop {
        line.clear();
        match stderr.read_until(b'\n', &mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        if let Some((marker, _)) = &announce {
            let text = String::from_utf8_lossy(&line);
            if let Some(rest) = text.trim_end().strip_prefix(*marker) {
                let rest = rest.to_string();
                if let Some((_, tx)) = announce.take() {
                    let _ = tx.send(rest);
                }
                continue;
            }
        }

        let room = STDERR_LIMIT.saturating_sub(captured.len());
        captured.extend_from_slice(&line[..line.len().min(room)]);
    }
    captured
}

#[async_trait]
impl ByteSource for ProcessSource {
    async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        if let Some(first) = self.pending.take() {
            return Ok(Some(first));
        }
        if self.stdout.is_none() {
            return Ok(None);
        }
        match self.read_stdout().await? {
            Some(chunk) => Ok(Some(chunk)),
            None => self.finish().await,
        }
    }

    async fn close(&mut self) {
        self.stdout = None;
        self.pending = None;
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        if let Ok(None) = self.child.try_wait() {
            debug!(program = %self.program, "Killing upstream process");
            let _ = self.child.kill().await;
        }
    }
}

/// Body of an upstream HTTP response
pub struct HttpSource {
    body: Option<BoxStream<'static, reqwest::Result<Bytes>>>,
}

impl HttpSource {
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            body: Some(response.bytes_stream().boxed()),
        }
    }
}

#[async_trait]
impl ByteSource for HttpSource {
    async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        let Some(body) = self.body.as_mut() else {
            return Ok(None);
        };

        match body.next().await {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(e)) => Err(io::Error::new(io::ErrorKind::Other, e)),
            None => Ok(None),
        }
    }

    async fn close(&mut self) {
        // Dropping the body stream closes the connection
        self.body = None;
    }
}
