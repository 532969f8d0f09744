//! Layered format detection.
//!
//! A [`Detector`] inspects a resettable stream and names at most one
//! format. The [`DetectionStrategy`] runs detectors layer by layer: when a
//! layer resolves to a format that has a registered decoder, the stream is
//! wrapped in that decoder and the next layer is detected on the decoded
//! content.

mod modules;
mod signature_detector;
mod strategy;

use crate::format::{FormatId, FormatSet};
use crate::stream::ResettableStream;

pub use modules::{
    Base64Rule, GzipRule, LiteralRule, MatchingRule, ModuleDetector, ModuleRegistry, PatternRule,
    RuleFactory, ZipRule,
};
pub use signature_detector::SignatureDetector;
pub use strategy::{DEFAULT_MAX_RECURSION, Detection, DetectionStrategy, DetectionStrategyBuilder, run};

/// A pluggable format detector.
///
/// Detectors own no position state across calls: the caller resets the
/// stream to its beginning after every `detect`, whatever the outcome.
pub trait Detector: Send + Sync {
    /// Identify the stream's format among `enabled`, or return
    /// [`FormatId::unknown`].
    ///
    /// An `Err` is a detector fault: the caller logs it and carries on as
    /// if the detector had found nothing.
    fn detect(
        &self,
        enabled: &FormatSet,
        stream: &mut dyn ResettableStream,
    ) -> anyhow::Result<FormatId>;

    /// Every format this detector can ever report.
    fn declared_formats(&self) -> &FormatSet;

    /// Human-readable name, defaulting to the unqualified type name.
    ///
    /// Used for logging and for disabling detectors from configuration.
    fn name(&self) -> &str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }
}
