//! Signature-based format identification.
//!
//! A [`SignatureModel`] is loaded once (see [`SignatureFile`] or
//! [`SignatureModel::builtin`]) and shared read-only. Each call to
//! [`SignatureIdentifier::classify_with_hits`] reads the source, evaluates
//! every internal signature with the [`SequenceMatcher`], then hands the
//! raw hits to the [`HitResolver`]. Hit lists are created per call and
//! never shared between sources.

mod evaluator;
mod hit;
mod loader;
mod matcher;
mod model;
mod pattern;
mod resolver;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::diagnostics::{CoreError, CoreResult};
use crate::format::FormatId;
use crate::source::ByteSource;

pub use evaluator::SignatureEvaluator;
pub use hit::{Hit, HitType, HitWarning};
pub use loader::{SCHEMA_VERSION, SequenceDef, SignatureDef, SignatureFile, SubSequenceDef};
pub use matcher::SequenceMatcher;
pub use model::{
    Anchor, ByteFragment, ByteSequence, FileFormat, Gap, InternalSignature, SignatureModel,
    SubSequence,
};
pub use pattern::{parse_gap, parse_pattern};
pub use resolver::{HitResolver, derive_extension};

/// Overall outcome of classifying one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentificationStatus {
    /// At least one binary signature matched.
    Positive,
    /// Only the file extension suggested a format.
    Tentative,
    /// Nothing matched. A valid outcome, not an error.
    Unidentified,
}

/// Final hit list for one source, best hit first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub hits: Vec<Hit>,
    pub status: IdentificationStatus,
}

impl Classification {
    fn from_hits(mut hits: Vec<Hit>) -> Self {
        // Stable sort: equal keys keep discovery order.
        hits.sort_by_key(|hit| (hit.hit_type, hit.warning.is_some()));
        let status = match hits.first() {
            None => IdentificationStatus::Unidentified,
            Some(hit) if hit.is_positive() => IdentificationStatus::Positive,
            Some(_) => IdentificationStatus::Tentative,
        };
        Self { hits, status }
    }

    pub fn is_identified(&self) -> bool {
        self.status != IdentificationStatus::Unidentified
    }

    /// Format ids in hit order.
    pub fn format_ids(&self) -> Vec<FormatId> {
        self.hits.iter().map(|hit| hit.format_id.clone()).collect()
    }

    pub fn best(&self) -> Option<&Hit> {
        self.hits.first()
    }
}

/// Entry point of the signature-matching subsystem.
#[derive(Debug, Clone)]
pub struct SignatureIdentifier {
    model: Arc<SignatureModel>,
}

impl SignatureIdentifier {
    pub fn new(model: Arc<SignatureModel>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &Arc<SignatureModel> {
        &self.model
    }

    /// Format ids for `source`, best match first.
    pub fn identify(&self, source: &dyn ByteSource) -> CoreResult<Vec<FormatId>> {
        Ok(self.classify_with_hits(source)?.format_ids())
    }

    /// Full hit list with hit types and warnings.
    pub fn classify_with_hits(&self, source: &dyn ByteSource) -> CoreResult<Classification> {
        let content = source
            .contents()
            .map_err(|e| CoreError::stream("reading source", e))?;
        Ok(self.classify_bytes(&content, source.file_name()))
    }

    /// Classify in-memory content directly.
    pub fn classify_bytes(&self, content: &[u8], file_name: Option<&str>) -> Classification {
        let raw = SignatureEvaluator::new(&self.model).evaluate(content);
        let hits = HitResolver::new(&self.model).resolve(raw, file_name);
        let classification = Classification::from_hits(hits);
        tracing::debug!(
            file = file_name.unwrap_or("<unnamed>"),
            status = ?classification.status,
            hits = classification.hits.len(),
            "classified source"
        );
        classification
    }
}
