//! Signature compliance checking.

use super::hit::Hit;
use super::matcher::SequenceMatcher;
use super::model::{InternalSignature, SignatureModel};

/// Evaluates internal signatures against content and emits raw hits.
#[derive(Debug, Clone, Copy)]
pub struct SignatureEvaluator<'m> {
    model: &'m SignatureModel,
    matcher: SequenceMatcher,
}

impl<'m> SignatureEvaluator<'m> {
    pub fn new(model: &'m SignatureModel) -> Self {
        Self {
            model,
            matcher: SequenceMatcher,
        }
    }

    /// A signature is compliant iff every byte sequence matches, checked in
    /// BOF, EOF, Variable order and stopping at the first miss.
    pub fn is_compliant(&self, signature: &InternalSignature, content: &[u8]) -> bool {
        signature
            .byte_sequences
            .iter()
            .all(|seq| self.matcher.matches(seq, content))
    }

    /// Evaluate every signature in the model; one hit per owning format of
    /// each compliant signature, in model order.
    pub fn evaluate(&self, content: &[u8]) -> Vec<Hit> {
        let mut hits = Vec::new();
        for signature in self.model.signatures() {
            if !self.is_compliant(signature, content) {
                continue;
            }
            tracing::trace!(signature = signature.id, "signature compliant");
            for &format_id in signature.formats() {
                if let Some(format) = self.model.format(format_id) {
                    hits.push(Hit::positive(format, signature.specific));
                }
            }
        }
        hits
    }
}
