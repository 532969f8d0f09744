//! Re-readable streams for the detection pipeline.
//!
//! Every detector attempt is followed by a reset to the beginning, so the
//! pipeline only works with streams that can replay what they produced.
//! [`BufferedStream`] adds that ability to any reader by keeping the bytes
//! it has handed out; [`DecodedStream`] exposes the decoded view of another
//! resettable stream.

use std::io::{self, Read};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::decoders::Decoder;

/// A readable stream that can be rewound to its first byte.
pub trait ResettableStream: Read + Send {
    /// Rewind so the next read returns the first byte again.
    fn reset_to_beginning(&mut self) -> io::Result<()>;

    /// Bound how many bytes must stay replayable; `None` removes the bound.
    ///
    /// Streams that hold everything in memory may ignore this.
    fn set_read_limit(&mut self, _limit: Option<usize>) {}
}

impl<S: ResettableStream + ?Sized> ResettableStream for Box<S> {
    fn reset_to_beginning(&mut self) -> io::Result<()> {
        (**self).reset_to_beginning()
    }

    fn set_read_limit(&mut self, limit: Option<usize>) {
        (**self).set_read_limit(limit);
    }
}

impl<T: AsRef<[u8]> + Send> ResettableStream for io::Cursor<T> {
    fn reset_to_beginning(&mut self) -> io::Result<()> {
        self.set_position(0);
        Ok(())
    }
}

/// Read at most `limit` bytes (everything when `None`) from the current
/// position.
pub fn read_prefix(stream: &mut dyn ResettableStream, limit: Option<usize>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    match limit {
        Some(limit) => {
            (&mut *stream).take(limit as u64).read_to_end(&mut buf)?;
        }
        None => {
            stream.read_to_end(&mut buf)?;
        }
    }
    Ok(buf)
}

/// Memory-backed replay buffer over any reader.
///
/// Bytes read from the inner reader are retained so that
/// [`reset_to_beginning`](ResettableStream::reset_to_beginning) can replay
/// them. Once more than the read limit has been retained the buffer is
/// dropped and the stream can no longer be reset.
pub struct BufferedStream<R> {
    inner: R,
    buffer: Vec<u8>,
    pos: usize,
    limit: Option<usize>,
    overflowed: bool,
}

impl<R: Read + Send> BufferedStream<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            pos: 0,
            limit: None,
            overflowed: false,
        }
    }

    pub fn with_read_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Bytes retained for replay so far.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl<R: Read + Send> Read for BufferedStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos < self.buffer.len() {
            let available = &self.buffer[self.pos..];
            let n = available.len().min(buf.len());
            buf[..n].copy_from_slice(&available[..n]);
            self.pos += n;
            return Ok(n);
        }

        let n = self.inner.read(buf)?;
        if n == 0 || self.overflowed {
            return Ok(n);
        }
        if self.limit.is_some_and(|limit| self.buffer.len() + n > limit) {
            tracing::debug!(
                retained = self.buffer.len(),
                "read limit exceeded, dropping replay buffer"
            );
            self.overflowed = true;
            self.buffer = Vec::new();
            self.pos = 0;
        } else {
            self.buffer.extend_from_slice(&buf[..n]);
            self.pos = self.buffer.len();
        }
        Ok(n)
    }
}

impl<R: Read + Send> ResettableStream for BufferedStream<R> {
    fn reset_to_beginning(&mut self) -> io::Result<()> {
        if self.overflowed {
            return Err(io::Error::other(
                "read limit exceeded, stream can no longer be reset",
            ));
        }
        self.pos = 0;
        Ok(())
    }

    fn set_read_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }
}

/// Base stream of a [`DecodedStream`] plus the encoded-byte budget derived
/// from the current read limit.
struct Base {
    stream: Box<dyn ResettableStream>,
    budget: Option<usize>,
    consumed: usize,
    /// Set once a read was cut short by the budget.
    truncated: bool,
}

type SharedBase = Arc<Mutex<Base>>;

fn lock(base: &SharedBase) -> io::Result<MutexGuard<'_, Base>> {
    base.lock()
        .map_err(|_| io::Error::other("base stream lock poisoned"))
}

/// Reader handed to a decoder; reads through to the shared base stream.
///
/// While a budget is set it is a hard cap: the decoder sees end of input
/// once the budget is spent, so the base never reads past what it can
/// replay.
struct BaseReader(SharedBase);

impl Read for BaseReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut base = lock(&self.0)?;
        let want = match base.budget {
            Some(budget) => buf.len().min(budget.saturating_sub(base.consumed)),
            None => buf.len(),
        };
        if want == 0 && !buf.is_empty() {
            base.truncated = true;
            return Ok(0);
        }
        let n = base.stream.read(&mut buf[..want])?;
        base.consumed += n;
        Ok(n)
    }
}

/// The decoded view of a resettable stream.
///
/// Decoding starts lazily on the first read. A reset rewinds the base
/// stream and discards the decoder state, so the next read decodes from
/// the start again. Under a read limit the decoded view may end early;
/// a decoder error caused by the cut (a partial base64 quantum, an
/// unfinished deflate block) reads as end of stream.
pub struct DecodedStream {
    base: SharedBase,
    decoder: Arc<dyn Decoder>,
    decoded: Option<Box<dyn Read + Send>>,
}

impl DecodedStream {
    pub fn new(base: Box<dyn ResettableStream>, decoder: Arc<dyn Decoder>) -> Self {
        Self {
            base: Arc::new(Mutex::new(Base {
                stream: base,
                budget: None,
                consumed: 0,
                truncated: false,
            })),
            decoder,
            decoded: None,
        }
    }

    pub fn decoder(&self) -> &dyn Decoder {
        self.decoder.as_ref()
    }
}

impl Read for DecodedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.decoded.is_none() {
            let base = Box::new(BaseReader(Arc::clone(&self.base)));
            self.decoded = Some(self.decoder.decode(base)?);
        }
        let result = match &mut self.decoded {
            Some(reader) => reader.read(buf),
            None => Ok(0),
        };
        match result {
            Err(error) if lock(&self.base)?.truncated => {
                tracing::debug!(%error, "decoding stopped at the read budget");
                Ok(0)
            }
            other => other,
        }
    }
}

impl ResettableStream for DecodedStream {
    fn reset_to_beginning(&mut self) -> io::Result<()> {
        self.decoded = None;
        let mut base = lock(&self.base)?;
        base.consumed = 0;
        base.truncated = false;
        base.stream.reset_to_beginning()
    }

    fn set_read_limit(&mut self, limit: Option<usize>) {
        let outer = limit.map(|inner| self.decoder.outer_limit(inner));
        match lock(&self.base) {
            Ok(mut base) => {
                base.budget = outer;
                base.stream.set_read_limit(outer);
            }
            Err(error) => tracing::warn!(%error, "could not forward read limit"),
        }
    }
}
