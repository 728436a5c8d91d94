//! Record stream adapter: detect an input file's container (zstd or plain JSONL)
//! and expose its lines as a lazy, forward-only sequence of decoded records.

use crate::error::ContainerError;
use serde_json::Value;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use zstd::stream::read::Decoder;

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Outer encoding of an input file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Container {
    Zstd,
    PlainJsonl,
}

/// Result of format detection. `Unrecognized` carries a human-readable reason.
pub enum RecordStream {
    Recognized(Records),
    Unrecognized(String),
}

/// One non-blank input line. Per-line JSON errors stay with the row;
/// they are not container errors.
#[derive(Debug)]
pub struct Record {
    pub ordinal: u64,
    pub value: Result<Value, serde_json::Error>,
}

/// A `Read` wrapper that counts compressed bytes read.
struct CountingReader<R: Read> {
    inner: R,
    counter: Arc<AtomicU64>,
}
impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.counter.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// Detect the container of `file` and wrap it in a record iterator.
///
/// Detection peeks at the first buffered bytes without consuming them:
/// zstd frame magic wins; a `.zst`/`.zstd` name without it is unrecognized;
/// `.jsonl`/`.ndjson`/`.json` names, or content starting with `{`, are plain JSONL.
/// zstd frames are opened with `window_log_max(31)` to avoid
/// "Frame requires too much memory" on the large monthly dumps.
pub fn open_record_stream(file: File, path: &Path, read_buf_bytes: usize) -> RecordStream {
    let cap = read_buf_bytes.max(8 * 1024);
    let bytes_read = Arc::new(AtomicU64::new(0));
    let counting = CountingReader { inner: file, counter: bytes_read.clone() };
    let mut head = BufReader::with_capacity(cap, counting);

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let container = match head.fill_buf() {
        Err(e) => return RecordStream::Unrecognized(format!("cannot read file header: {e}")),
        Ok(peek) if peek.starts_with(&ZSTD_MAGIC) => Container::Zstd,
        Ok(_) if ext == "zst" || ext == "zstd" => {
            return RecordStream::Unrecognized("zstd file name but no zstd frame header".to_string())
        }
        Ok(_) if matches!(ext.as_str(), "jsonl" | "ndjson" | "json") => Container::PlainJsonl,
        Ok(peek) => match peek.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') => Container::PlainJsonl,
            Some(_) => return RecordStream::Unrecognized("content is neither zstd nor JSON lines".to_string()),
            None => return RecordStream::Unrecognized("empty file with no recognized extension".to_string()),
        },
    };

    let reader: Box<dyn BufRead> = match container {
        Container::PlainJsonl => Box::new(head),
        Container::Zstd => {
            let mut decoder = match Decoder::with_buffer(head) {
                Ok(d) => d,
                Err(e) => return RecordStream::Unrecognized(format!("zstd decoder init failed: {e}")),
            };
            if let Err(e) = decoder.window_log_max(31) {
                return RecordStream::Unrecognized(format!("zstd decoder init failed: {e}"));
            }
            Box::new(BufReader::with_capacity(cap, decoder))
        }
    };

    RecordStream::Recognized(Records {
        reader,
        container,
        bytes_read,
        next_ordinal: 0,
        buf: Vec::with_capacity(16 * 1024),
        finished: false,
    })
}

/// Lazy, single-pass sequence of records in ordinal order.
/// After the first `Err(ContainerError)` the iterator is fused.
pub struct Records {
    reader: Box<dyn BufRead>,
    container: Container,
    bytes_read: Arc<AtomicU64>,
    next_ordinal: u64,
    buf: Vec<u8>,
    finished: bool,
}

impl Records {
    pub fn container(&self) -> Container { self.container }

    /// Shared counter of raw (compressed) bytes consumed from the file so far.
    pub fn bytes_counter(&self) -> Arc<AtomicU64> { self.bytes_read.clone() }

    /// Ordinal the next yielded record will carry.
    pub fn next_ordinal(&self) -> u64 { self.next_ordinal }

    /// True once end of stream or a container error has been reached.
    pub fn is_finished(&self) -> bool { self.finished }

    /// Read and discard rows below `ordinal` without decoding them.
    /// Returns the ordinal actually reached (smaller when the stream is shorter).
    pub fn skip_to(&mut self, ordinal: u64) -> Result<u64, ContainerError> {
        while !self.finished && self.next_ordinal < ordinal {
            match self.read_next_line() {
                Ok(true) => self.next_ordinal += 1,
                Ok(false) => self.finished = true,
                Err(e) => {
                    self.finished = true;
                    return Err(e);
                }
            }
        }
        Ok(self.next_ordinal)
    }

    /// Fill `buf` with the next non-blank line (without terminator).
    /// Ok(false) at end of stream.
    fn read_next_line(&mut self) -> Result<bool, ContainerError> {
        loop {
            self.buf.clear();
            let n = self
                .reader
                .read_until(b'\n', &mut self.buf)
                .map_err(|source| ContainerError::Read { rows_read: self.next_ordinal, source })?;
            if n == 0 {
                return Ok(false);
            }
            if self.buf.ends_with(b"\n") {
                self.buf.pop();
                if self.buf.ends_with(b"\r") { self.buf.pop(); }
            }
            if self.buf.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }
            return Ok(true);
        }
    }
}

impl Iterator for Records {
    type Item = Result<Record, ContainerError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_next_line() {
            Ok(true) => {
                let ordinal = self.next_ordinal;
                self.next_ordinal += 1;
                Some(Ok(Record { ordinal, value: serde_json::from_slice(&self.buf) }))
            }
            Ok(false) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
