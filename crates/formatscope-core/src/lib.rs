//! # formatscope-core
//!
//! File format identification for opaque byte streams.
//!
//! Two subsystems:
//! - [`signature`]: matches content against a library of binary
//!   signatures, resolves priorities between formats and corroborates
//!   results with the file extension.
//! - [`detection`]: runs independent detectors over a re-readable stream
//!   and, when a detected format can be decoded, unwraps it and detects
//!   again (`base64 > zip`), up to a recursion bound.
//!
//! [`Engine`] wires both together from a [`ScopeConfig`].
//!
//! ```
//! use formatscope_core::{Engine, MemorySource};
//!
//! let engine = Engine::with_defaults().unwrap();
//! let source = MemorySource::new(&b"PK\x03\x04..."[..]).with_name("bundle.zip");
//! let ids = formatscope_core::identify(engine.identifier(), &source).unwrap();
//! assert_eq!(ids[0].tag.as_str(), "zip");
//!
//! let detection = engine.detect_bytes(b"UEsDBBQAAAAIAGV4YW1wbGU=".to_vec()).unwrap();
//! let layers: Vec<_> = detection.identified().map(|id| id.tag.as_str()).collect();
//! assert_eq!(layers, ["base64", "zip"]);
//! ```

pub mod config;
pub mod decoders;
pub mod detection;
pub mod diagnostics;
pub mod engine;
pub mod format;
#[cfg(feature = "filesystem")]
pub mod pipeline;
pub mod signature;
pub mod source;
pub mod stream;

pub use config::{ScopeConfig, ScopeConfigBuilder, generate_schema};
pub use decoders::{Base64Decoder, Decoder, DecoderRegistry, GzipDecoder, default_decoders};
pub use detection::{Detection, DetectionStrategy, Detector};
pub use diagnostics::{ConfigError, CoreError, CoreResult};
pub use engine::Engine;
pub use format::{FormatId, FormatSet, FormatTag};
#[cfg(feature = "filesystem")]
pub use pipeline::{PathReport, classify_paths, detect_paths};
pub use signature::{
    Classification, Hit, HitType, HitWarning, IdentificationStatus, SignatureIdentifier,
    SignatureModel,
};
pub use source::{ByteSource, FileSource, MemorySource};
pub use stream::{BufferedStream, DecodedStream, ResettableStream};

/// Format ids for `source`, best match first. Empty when nothing matched.
pub fn identify(
    identifier: &SignatureIdentifier,
    source: &dyn ByteSource,
) -> CoreResult<Vec<FormatId>> {
    identifier.identify(source)
}

/// Hits with their types and warnings, best first.
pub fn classify_with_hits(
    identifier: &SignatureIdentifier,
    source: &dyn ByteSource,
) -> CoreResult<Classification> {
    identifier.classify_with_hits(source)
}
