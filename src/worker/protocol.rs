//! Line protocol spoken with exiftool in `-stay_open` mode.
//!
//! A request is a list of argument lines followed by `-execute`:
//!
//! ```text
//! -m
//! -S
//! -sort
//! /tmp/exifgate.Ab12Cd/file.Xy34Zw
//! -execute
//! ```
//!
//! The worker answers with zero or more result lines and then a sentinel,
//! `{ready}` or `{ready-}`. Nothing is processed until `-execute` arrives, so
//! every request is flushed as a unit.

use std::io;
use std::path::Path;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tracing::debug;

/// Arguments that put the worker into interactive mode, reading from stdin.
pub const LAUNCH_ARGS: [&str; 4] = ["-stay_open", "True", "-@", "-"];

/// Lines asking the worker to leave interactive mode.
pub const EXIT_DIRECTIVE: [&str; 2] = ["-stay_open", "False"];

/// Line that makes the worker run the queued arguments.
pub const EXECUTE: &str = "-execute";

/// Normal end-of-response marker.
pub const READY: &str = "{ready}";

/// End-of-response marker used when the worker reported an error.
pub const READY_WITH_ERROR: &str = "{ready-}";

/// Separator between a tag name and its value in result lines.
pub const FIELD_SEPARATOR: char = ':';

/// Output format requested from the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// `Tag:Value` lines.
    Plain,
    /// Same tags, rendered as HTML table rows.
    Html,
}

impl Mode {
    /// Option lines sent ahead of the file path.
    ///
    /// `-m` ignores minor errors, `-S` selects short tag output, `-E` escapes
    /// values as HTML and `-sort` orders tags alphabetically.
    pub fn options(&self) -> &'static [&'static str] {
        match self {
            Mode::Plain => &["-m", "-S", "-sort"],
            Mode::Html => &["-m", "-S", "-E", "-sort"],
        }
    }
}

/// Which sentinel ended a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    /// `{ready}`
    Ready,
    /// `{ready-}`
    ReadyWithError,
}

impl Sentinel {
    /// Recognize a sentinel line (line terminator already stripped).
    pub fn parse(line: &str) -> Option<Self> {
        match line {
            READY => Some(Sentinel::Ready),
            READY_WITH_ERROR => Some(Sentinel::ReadyWithError),
            _ => None,
        }
    }
}

/// Drops result lines whose leading field is on the ignore list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineFilter {
    /// Field names with the separator already appended.
    prefixes: Vec<String>,
}

impl LineFilter {
    /// Build a filter from field names such as `"Warning"`.
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut prefixes: Vec<String> = terms
            .into_iter()
            .map(|term| format!("{}{}", term.as_ref(), FIELD_SEPARATOR))
            .collect();
        prefixes.sort();
        prefixes.dedup();
        Self { prefixes }
    }

    /// Normalized prefixes.
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Whether `line` survives the filter.
    pub fn keeps(&self, line: &str) -> bool {
        !self.prefixes.iter().any(|prefix| line.starts_with(prefix.as_str()))
    }
}

/// Encode one request for `path`.
pub fn encode_request(mode: Mode, path: &Path) -> String {
    let mut request = String::new();
    for option in mode.options() {
        request.push_str(option);
        request.push('\n');
    }
    request.push_str(&path.to_string_lossy());
    request.push('\n');
    request.push_str(EXECUTE);
    request.push('\n');
    request
}

/// Encode the exit directive.
pub fn encode_exit() -> String {
    EXIT_DIRECTIVE.iter().map(|line| format!("{}\n", line)).collect()
}

/// Result of one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Lines kept by the filter, in worker order.
    pub lines: Vec<String>,
    /// Sentinel that terminated the response.
    pub sentinel: Sentinel,
}

/// The two pipe ends of a running worker.
///
/// Generic over the stream types so it can run over in-memory pipes in tests.
/// Callers must not interleave two exchanges on the same channel.
#[derive(Debug)]
pub struct ExchangeChannel<W, R> {
    writer: BufWriter<W>,
    reader: BufReader<R>,
}

impl<W, R> ExchangeChannel<W, R>
where
    W: AsyncWrite + Unpin,
    R: tokio::io::AsyncRead + Unpin,
{
    /// Wrap the worker's stdin and stdout.
    pub fn new(stdin: W, stdout: R) -> Self {
        Self {
            writer: BufWriter::new(stdin),
            reader: BufReader::new(stdout),
        }
    }

    /// Send one request and read its response.
    pub async fn exchange(
        &mut self,
        mode: Mode,
        path: &Path,
        filter: &LineFilter,
    ) -> io::Result<Response> {
        self.send_request(mode, path).await?;
        read_response(&mut self.reader, filter).await
    }

    /// Write a request and flush it.
    pub async fn send_request(&mut self, mode: Mode, path: &Path) -> io::Result<()> {
        debug!(path = %path.display(), ?mode, "notifying worker");
        self.writer
            .write_all(encode_request(mode, path).as_bytes())
            .await?;
        self.writer.flush().await
    }

    /// Ask the worker to leave interactive mode. No response is read.
    pub async fn send_exit(&mut self) -> io::Result<()> {
        debug!("sending exit directive");
        self.writer.write_all(encode_exit().as_bytes()).await?;
        self.writer.flush().await
    }
}

/// Read result lines until a sentinel, keeping those `filter` accepts.
///
/// Lines are decoded lossily; tag values may contain arbitrary bytes.
pub async fn read_response<R>(reader: &mut R, filter: &LineFilter) -> io::Result<Response>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = Vec::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "worker closed its output before the end of the response",
            ));
        }

        let raw = String::from_utf8_lossy(&buf);
        let line = raw.trim_end_matches(['\n', '\r']);

        if let Some(sentinel) = Sentinel::parse(line) {
            debug!(count = lines.len(), ?sentinel, "response read");
            return Ok(Response { lines, sentinel });
        }

        if filter.keeps(line) {
            lines.push(line.to_string());
        }
    }
}
