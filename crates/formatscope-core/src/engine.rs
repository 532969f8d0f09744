//! Engine facade: everything a caller needs, built once from a config.

use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::config::ScopeConfig;
use crate::detection::{Detection, DetectionStrategy, ModuleDetector, ModuleRegistry, SignatureDetector};
use crate::diagnostics::{CoreError, CoreResult};
use crate::format::FormatSet;
use crate::signature::{Classification, SignatureIdentifier, SignatureModel};
use crate::source::{ByteSource, FileSource, check_regular_file};
use crate::stream::{BufferedStream, ResettableStream};

/// A prepared signature library, module table and detection strategy.
///
/// Construction does all loading and validation; afterwards the engine is
/// immutable and can be shared between threads.
#[derive(Debug)]
pub struct Engine {
    config: ScopeConfig,
    identifier: SignatureIdentifier,
    strategy: DetectionStrategy,
    enabled: FormatSet,
}

impl Engine {
    /// Built-in signatures and modules with default settings.
    pub fn with_defaults() -> CoreResult<Self> {
        Self::from_config(&ScopeConfig::default())
    }

    pub fn from_config(config: &ScopeConfig) -> CoreResult<Self> {
        config.validate()?;

        let model = match config.signature_file() {
            Some(path) => SignatureModel::from_path(path)?,
            None => SignatureModel::builtin()?,
        };
        let model = Arc::new(model);
        let modules = match config.modules_file() {
            Some(path) => ModuleRegistry::from_path(path)?,
            None => ModuleRegistry::builtin()?,
        };

        let mut builder = DetectionStrategy::builder();
        builder
            .detector(Arc::new(
                SignatureDetector::new(Arc::clone(&model)).with_read_limit(config.read_limit()),
            ))
            .detector(Arc::new(ModuleDetector::new(Arc::new(modules))))
            .with_default_decoders()
            .max_recursion(config.max_recursion())
            .read_limit(config.read_limit());
        for name in config.disabled_detectors() {
            builder.without_detector(name);
        }
        for tag in config.disabled_decoders() {
            builder.without_decoder(tag.as_str());
        }
        let strategy = builder.build();
        let enabled = config.enabled_format_set(&strategy.declared_formats());

        debug!(
            formats = model.formats().len(),
            detectors = strategy.detectors().len(),
            decoders = strategy.decoders().len(),
            enabled = enabled.len(),
            "engine ready"
        );

        Ok(Self {
            config: config.clone(),
            identifier: SignatureIdentifier::new(model),
            strategy,
            enabled,
        })
    }

    pub fn config(&self) -> &ScopeConfig {
        &self.config
    }

    pub fn identifier(&self) -> &SignatureIdentifier {
        &self.identifier
    }

    pub fn strategy(&self) -> &DetectionStrategy {
        &self.strategy
    }

    /// Formats the detection pipeline is asked to look for.
    pub fn enabled_formats(&self) -> &FormatSet {
        &self.enabled
    }

    /// Signature classification of a whole source.
    pub fn classify(&self, source: &dyn ByteSource) -> CoreResult<Classification> {
        self.identifier.classify_with_hits(source)
    }

    pub fn classify_path(&self, path: &Path) -> CoreResult<Classification> {
        let source = FileSource::open(path, self.config.max_file_size())?;
        self.classify(&source)
    }

    /// Layered detection over a re-readable stream.
    pub fn detect(&self, stream: Box<dyn ResettableStream>) -> CoreResult<Detection> {
        self.strategy.run(&self.enabled, stream)
    }

    pub fn detect_bytes(&self, content: impl Into<Vec<u8>>) -> CoreResult<Detection> {
        self.detect(Box::new(Cursor::new(content.into())))
    }

    pub fn detect_path(&self, path: &Path) -> CoreResult<Detection> {
        check_regular_file(path, self.config.max_file_size())?;
        let file = File::open(path).map_err(|e| CoreError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        self.detect(Box::new(BufferedStream::new(file)))
    }
}
