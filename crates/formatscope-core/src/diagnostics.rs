//! Error types for configuration loading, stream access and identification.

use std::path::PathBuf;
use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while loading or preparing configuration.
///
/// Every variant is fatal: a signature library, module table or config
/// file that produces one of these is rejected as a whole, before any
/// matching takes place.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unsupported matching strategy '{token}' on line {line}")]
    UnsupportedStrategy { line: usize, token: String },

    #[error("Unknown plugin module '{name}' on line {line}")]
    UnknownModule { line: usize, name: String },

    #[error("Malformed module definition on line {line}: {message}")]
    MalformedModuleLine { line: usize, message: String },

    #[error("Invalid regular expression on line {line}: {message}")]
    InvalidRegex { line: usize, message: String },

    #[error("Duplicate file format id {id}")]
    DuplicateFormat { id: u32 },

    #[error("Duplicate internal signature id {id}")]
    DuplicateSignature { id: u32 },

    #[error("File format {format} references unknown internal signature {signature}")]
    UnresolvedSignature { format: u32, signature: u32 },

    #[error("File format {format} has priority over unknown file format {target}")]
    UnresolvedFormat { format: u32, target: u32 },

    #[error("File format {format} declares priority over itself")]
    SelfPriority { format: u32 },

    #[error("File formats {first} and {second} each declare priority over the other")]
    MutualPriority { first: u32, second: u32 },

    #[error("Internal signature {signature} has no byte sequences")]
    EmptySignature { signature: u32 },

    #[error("Internal signature {signature} has a byte sequence with no sub-sequences")]
    EmptyByteSequence { signature: u32 },

    #[error("Internal signature {signature} has a sub-sequence with no fragments")]
    EmptySubSequence { signature: u32 },

    #[error("Internal signature {signature} has a zero-length fragment")]
    EmptyFragment { signature: u32 },

    #[error(
        "Internal signature {signature} has {fragments} fragments but {gaps} gaps (expected {})",
        .fragments.saturating_sub(1)
    )]
    MisalignedGaps {
        signature: u32,
        fragments: usize,
        gaps: usize,
    },

    #[error("Internal signature {signature} has an inverted gap {{{min}-{max}}}")]
    InvalidGap { signature: u32, min: usize, max: usize },

    #[error("Invalid pattern '{pattern}' at byte {position}: {message}")]
    InvalidPattern {
        pattern: String,
        position: usize,
        message: String,
    },

    #[error("Unsupported signature file: {path} (expected .toml, .json, .yaml or .yml)")]
    UnsupportedSignatureFile { path: PathBuf },

    #[error("Failed to parse signature file {source_name}: {message}")]
    SignatureFileParse {
        source_name: String,
        message: String,
    },

    #[error("Unsupported signature schema version '{version}'")]
    UnsupportedSchemaVersion { version: String },

    #[error("Invalid glob pattern: {pattern} ({error})")]
    InvalidGlobPattern { pattern: String, error: String },

    #[error("Invalid value for {field}: {message}")]
    ValueOutOfRange { field: String, message: String },
}

/// Errors surfaced by identification and detection entry points.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The data source itself failed (read, reset or seek).
    #[error("Stream error while {context}")]
    Stream {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file: {path}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File too large: {path} ({size} bytes, limit {limit} bytes)")]
    FileTooBig { path: PathBuf, size: u64, limit: u64 },

    #[error("Not a regular file: {path}")]
    FileNotRegular { path: PathBuf },

    #[error(transparent)]
    Other(anyhow::Error),
}

impl CoreError {
    pub(crate) fn stream(context: &'static str, source: std::io::Error) -> Self {
        CoreError::Stream { context, source }
    }

    /// Returns `true` for errors caused by configuration rather than data.
    pub fn is_config(&self) -> bool {
        matches!(self, CoreError::Config(_))
    }
}
