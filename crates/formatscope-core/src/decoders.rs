//! Decoders for wrapping formats and the registry that maps format tags
//! to them.

use std::collections::HashMap;
use std::io::{self, Read};
use std::sync::{Arc, OnceLock};

use base64::engine::general_purpose::STANDARD;

use crate::format::FormatTag;

/// Unwraps content encoded in one format.
pub trait Decoder: Send + Sync {
    /// The single format this decoder unwraps.
    fn format(&self) -> FormatTag;

    /// Wrap `input` so that reads yield the decoded bytes.
    fn decode(&self, input: Box<dyn Read + Send>) -> io::Result<Box<dyn Read + Send>>;

    /// Encoded bytes per decoded byte, worst case.
    fn ratio(&self) -> f32 {
        1.0
    }

    /// Fixed encoded overhead (headers, padding) in bytes.
    fn offset(&self) -> usize {
        0
    }

    /// Translate a read limit on decoded bytes into one on encoded bytes.
    fn outer_limit(&self, inner: usize) -> usize {
        let scaled = (inner as f64 * f64::from(self.ratio())).ceil();
        (scaled as usize).saturating_add(self.offset())
    }

    /// Human-readable name, defaulting to the unqualified type name.
    fn name(&self) -> &str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }
}

/// Standard-alphabet base64, ignoring line breaks and other whitespace.
#[derive(Debug, Default, Clone, Copy)]
pub struct Base64Decoder;

impl Decoder for Base64Decoder {
    fn format(&self) -> FormatTag {
        FormatTag::BASE64
    }

    fn decode(&self, input: Box<dyn Read + Send>) -> io::Result<Box<dyn Read + Send>> {
        let stripped = SkipWhitespace { inner: input };
        Ok(Box::new(base64::read::DecoderReader::new(stripped, &STANDARD)))
    }

    fn ratio(&self) -> f32 {
        1.4
    }

    fn offset(&self) -> usize {
        4
    }
}

/// Drops ASCII whitespace from the underlying reader.
struct SkipWhitespace<R> {
    inner: R,
}

impl<R: Read> Read for SkipWhitespace<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let n = self.inner.read(buf)?;
            if n == 0 {
                return Ok(0);
            }
            let mut kept = 0;
            for i in 0..n {
                if !buf[i].is_ascii_whitespace() {
                    buf[kept] = buf[i];
                    kept += 1;
                }
            }
            if kept > 0 {
                return Ok(kept);
            }
        }
    }
}

/// Gzip, including concatenated multi-member streams.
#[derive(Debug, Default, Clone, Copy)]
pub struct GzipDecoder;

impl Decoder for GzipDecoder {
    fn format(&self) -> FormatTag {
        FormatTag::GZIP
    }

    fn decode(&self, input: Box<dyn Read + Send>) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(flate2::read::MultiGzDecoder::new(input)))
    }

    fn offset(&self) -> usize {
        512
    }
}

/// Factory function type that creates decoder instances.
pub type DecoderFactory = fn() -> Arc<dyn Decoder>;

const DEFAULTS: &[DecoderFactory] = &[base64_decoder, gzip_decoder];

fn base64_decoder() -> Arc<dyn Decoder> {
    Arc::new(Base64Decoder)
}

fn gzip_decoder() -> Arc<dyn Decoder> {
    Arc::new(GzipDecoder)
}

/// Maps each decodable format tag to its decoder.
///
/// Passed explicitly to the detection strategy; [`default_decoders`] is a
/// read-only convenience over [`DecoderRegistry::with_defaults`].
#[derive(Clone, Default)]
pub struct DecoderRegistry {
    decoders: HashMap<FormatTag, Arc<dyn Decoder>>,
}

impl DecoderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in base64 and gzip decoders.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for factory in DEFAULTS {
            registry.register(factory());
        }
        registry
    }

    /// Register a decoder under its format, replacing any previous one.
    pub fn register(&mut self, decoder: Arc<dyn Decoder>) -> Option<Arc<dyn Decoder>> {
        self.decoders.insert(decoder.format(), decoder)
    }

    pub fn remove(&mut self, format: &FormatTag) -> Option<Arc<dyn Decoder>> {
        self.decoders.remove(format)
    }

    pub fn get(&self, format: &FormatTag) -> Option<&Arc<dyn Decoder>> {
        self.decoders.get(format)
    }

    pub fn contains(&self, format: &FormatTag) -> bool {
        self.decoders.contains_key(format)
    }

    /// Registered format tags, sorted.
    pub fn formats(&self) -> Vec<&FormatTag> {
        let mut formats: Vec<_> = self.decoders.keys().collect();
        formats.sort();
        formats
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}

impl std::fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.formats()).finish()
    }
}

/// Process-wide default decoders, built on first use and immutable after.
pub fn default_decoders() -> &'static DecoderRegistry {
    static DEFAULT: OnceLock<DecoderRegistry> = OnceLock::new();
    DEFAULT.get_or_init(DecoderRegistry::with_defaults)
}
