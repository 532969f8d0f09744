//! Decode-and-redetect orchestration.

use std::collections::HashSet;
use std::fmt;
use std::io::Read;
use std::sync::Arc;

use crate::decoders::{Decoder, DecoderRegistry};
use crate::diagnostics::{CoreError, CoreResult};
use crate::format::{FormatId, FormatSet, FormatTag};
use crate::stream::{DecodedStream, ResettableStream};

use super::Detector;

/// Layers detected beyond the first before the run stops.
pub const DEFAULT_MAX_RECURSION: usize = 8;

/// Outcome of a detection run.
pub struct Detection {
    /// Detected formats, outermost first. Ends with an unknown id when the
    /// innermost layer could not be identified.
    pub layers: Vec<FormatId>,
    /// The innermost decoded stream, reset to its beginning.
    pub stream: Box<dyn ResettableStream>,
}

impl Detection {
    /// The first identified layer, if any.
    pub fn outermost(&self) -> Option<&FormatId> {
        self.layers.first().filter(|id| !id.is_unknown())
    }

    /// The deepest identified layer, if any.
    pub fn innermost(&self) -> Option<&FormatId> {
        self.layers.iter().rev().find(|id| !id.is_unknown())
    }

    /// Identified layers only, outermost first.
    pub fn identified(&self) -> impl Iterator<Item = &FormatId> {
        self.layers.iter().filter(|id| !id.is_unknown())
    }

    /// Read the innermost content to the end.
    pub fn read_content(&mut self) -> CoreResult<Vec<u8>> {
        let mut content = Vec::new();
        self.stream
            .read_to_end(&mut content)
            .map_err(|e| CoreError::stream("reading decoded content", e))?;
        Ok(content)
    }
}

impl fmt::Debug for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Detection")
            .field("layers", &self.layers)
            .finish_non_exhaustive()
    }
}

/// Detect the layers of `stream`.
///
/// Runs at most `max_recursion + 1` layers. Stream faults propagate;
/// detector faults are logged and skipped.
pub fn run(
    enabled: &FormatSet,
    detectors: &[Arc<dyn Detector>],
    decoders: &DecoderRegistry,
    stream: Box<dyn ResettableStream>,
    max_recursion: usize,
) -> CoreResult<Detection> {
    run_layers(enabled, detectors, decoders, stream, max_recursion, None)
}

fn run_layers(
    enabled: &FormatSet,
    detectors: &[Arc<dyn Detector>],
    decoders: &DecoderRegistry,
    mut stream: Box<dyn ResettableStream>,
    max_recursion: usize,
    read_limit: Option<usize>,
) -> CoreResult<Detection> {
    let mut layers = Vec::new();
    for layer in 0..=max_recursion {
        stream.set_read_limit(read_limit);
        let format = detect_layer(enabled, detectors, stream.as_mut())?;
        tracing::debug!(layer, format = %format, "layer resolved");
        let decoder = decoders.get(&format.tag).map(Arc::clone);
        layers.push(format);

        let Some(decoder) = decoder else {
            break;
        };
        tracing::debug!(layer, decoder = decoder.name(), "wrapping stream in decoder");
        stream = Box::new(DecodedStream::new(stream, decoder));
        if layer == max_recursion {
            tracing::debug!(max_recursion, "recursion bound reached");
        }
    }

    // The caller reads the innermost content in full.
    stream.set_read_limit(None);
    stream
        .reset_to_beginning()
        .map_err(|e| CoreError::stream("resetting decoded stream", e))?;
    Ok(Detection { layers, stream })
}

/// Run the eligible detectors for one layer.
///
/// Each layer starts from the full enabled set. A detector is skipped when
/// none of its declared formats remain; once it has run, all of them are
/// removed, whether or not it matched.
fn detect_layer(
    enabled: &FormatSet,
    detectors: &[Arc<dyn Detector>],
    stream: &mut dyn ResettableStream,
) -> CoreResult<FormatId> {
    let mut to_detect = enabled.clone();
    for detector in detectors {
        if to_detect.is_empty() {
            break;
        }
        let declared = detector.declared_formats();
        if !declared.intersects(&to_detect) {
            tracing::trace!(detector = detector.name(), "detector skipped");
            continue;
        }

        let outcome = detector.detect(&to_detect, stream);
        stream
            .reset_to_beginning()
            .map_err(|e| CoreError::stream("resetting stream after detector", e))?;

        match outcome {
            Ok(format) if format.is_unknown() => {}
            Ok(format) if to_detect.contains(&format.tag) => return Ok(format),
            Ok(format) => {
                tracing::debug!(
                    detector = detector.name(),
                    format = %format,
                    "ignoring format outside the requested set"
                );
            }
            Err(error) => {
                tracing::warn!(
                    detector = detector.name(),
                    error = %format!("{error:#}"),
                    "detector failed"
                );
            }
        }
        to_detect.remove_all(declared);
    }
    Ok(FormatId::unknown())
}

/// A configured detection pipeline: detectors in evaluation order, the
/// decoders available for unwrapping, and the run bounds.
pub struct DetectionStrategy {
    detectors: Vec<Arc<dyn Detector>>,
    decoders: DecoderRegistry,
    max_recursion: usize,
    read_limit: Option<usize>,
}

impl DetectionStrategy {
    pub fn builder() -> DetectionStrategyBuilder {
        DetectionStrategyBuilder::new()
    }

    pub fn detectors(&self) -> &[Arc<dyn Detector>] {
        &self.detectors
    }

    pub fn decoders(&self) -> &DecoderRegistry {
        &self.decoders
    }

    pub fn max_recursion(&self) -> usize {
        self.max_recursion
    }

    /// Every format some detector can report.
    pub fn declared_formats(&self) -> FormatSet {
        let mut formats = FormatSet::new();
        for detector in &self.detectors {
            formats.extend(detector.declared_formats());
        }
        formats
    }

    pub fn run(&self, enabled: &FormatSet, stream: Box<dyn ResettableStream>) -> CoreResult<Detection> {
        run_layers(
            enabled,
            &self.detectors,
            &self.decoders,
            stream,
            self.max_recursion,
            self.read_limit,
        )
    }
}

impl fmt::Debug for DetectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.detectors.iter().map(|d| d.name()).collect();
        f.debug_struct("DetectionStrategy")
            .field("detectors", &names)
            .field("decoders", &self.decoders)
            .field("max_recursion", &self.max_recursion)
            .field("read_limit", &self.read_limit)
            .finish()
    }
}

/// Builder for [`DetectionStrategy`].
///
/// ```
/// use formatscope_core::detection::DetectionStrategy;
///
/// let strategy = DetectionStrategy::builder()
///     .with_default_decoders()
///     .without_decoder("gzip")
///     .max_recursion(4)
///     .build();
/// assert_eq!(strategy.decoders().len(), 1);
/// ```
pub struct DetectionStrategyBuilder {
    detectors: Vec<Arc<dyn Detector>>,
    decoders: DecoderRegistry,
    disabled_detectors: HashSet<String>,
    max_recursion: usize,
    read_limit: Option<usize>,
}

impl DetectionStrategyBuilder {
    fn new() -> Self {
        Self {
            detectors: Vec::new(),
            decoders: DecoderRegistry::new(),
            disabled_detectors: HashSet::new(),
            max_recursion: DEFAULT_MAX_RECURSION,
            read_limit: None,
        }
    }

    /// Append a detector; detectors run in the order they are added.
    pub fn detector(&mut self, detector: Arc<dyn Detector>) -> &mut Self {
        self.detectors.push(detector);
        self
    }

    /// Exclude detectors whose [`name()`](Detector::name) matches.
    pub fn without_detector(&mut self, name: &str) -> &mut Self {
        self.disabled_detectors.insert(name.to_string());
        self
    }

    /// Add the built-in base64 and gzip decoders.
    pub fn with_default_decoders(&mut self) -> &mut Self {
        let defaults = DecoderRegistry::with_defaults();
        for tag in defaults.formats() {
            if let Some(decoder) = defaults.get(tag) {
                self.decoders.register(Arc::clone(decoder));
            }
        }
        self
    }

    pub fn decoder(&mut self, decoder: Arc<dyn Decoder>) -> &mut Self {
        self.decoders.register(decoder);
        self
    }

    pub fn without_decoder(&mut self, format: impl Into<FormatTag>) -> &mut Self {
        self.decoders.remove(&format.into());
        self
    }

    pub fn max_recursion(&mut self, max_recursion: usize) -> &mut Self {
        self.max_recursion = max_recursion;
        self
    }

    pub fn read_limit(&mut self, read_limit: Option<usize>) -> &mut Self {
        self.read_limit = read_limit;
        self
    }

    pub fn build(&mut self) -> DetectionStrategy {
        let disabled = std::mem::take(&mut self.disabled_detectors);
        DetectionStrategy {
            detectors: self
                .detectors
                .iter()
                .filter(|d| !disabled.contains(d.name()))
                .cloned()
                .collect(),
            decoders: self.decoders.clone(),
            max_recursion: self.max_recursion,
            read_limit: self.read_limit,
        }
    }
}
