use std::sync::Arc;

use anyhow::Context;

use crate::format::{FormatId, FormatSet};
use crate::signature::{SignatureIdentifier, SignatureModel};
use crate::stream::{ResettableStream, read_prefix};

use super::Detector;

/// Detector backed by the signature library.
///
/// Reads up to the read limit and reports the best positive hit whose tag
/// is enabled. Tentative hits are never reported: a stream has no name to
/// take an extension from.
#[derive(Debug, Clone)]
pub struct SignatureDetector {
    identifier: SignatureIdentifier,
    declared: FormatSet,
    read_limit: Option<usize>,
}

impl SignatureDetector {
    pub fn new(model: Arc<SignatureModel>) -> Self {
        let declared = model
            .formats()
            .iter()
            .filter(|format| !format.is_extension_only())
            .map(|format| format.tag.clone())
            .collect();
        Self {
            identifier: SignatureIdentifier::new(model),
            declared,
            read_limit: None,
        }
    }

    /// Inspect at most `limit` bytes per layer.
    pub fn with_read_limit(mut self, limit: Option<usize>) -> Self {
        self.read_limit = limit;
        self
    }
}

impl Detector for SignatureDetector {
    fn detect(
        &self,
        enabled: &FormatSet,
        stream: &mut dyn ResettableStream,
    ) -> anyhow::Result<FormatId> {
        let content = read_prefix(stream, self.read_limit).context("reading stream prefix")?;
        let classification = self.identifier.classify_bytes(&content, None);
        let best = classification
            .hits
            .into_iter()
            .filter(|hit| hit.is_positive())
            .find(|hit| enabled.contains(&hit.format_id.tag));
        Ok(best.map_or_else(FormatId::unknown, |hit| hit.format_id))
    }

    fn declared_formats(&self) -> &FormatSet {
        &self.declared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn detector() -> SignatureDetector {
        SignatureDetector::new(Arc::new(SignatureModel::builtin().unwrap()))
    }

    #[test]
    fn test_declares_only_signature_backed_formats() {
        let detector = detector();
        let declared = detector.declared_formats();
        assert!(declared.contains(&"zip".into()));
        assert!(declared.contains(&"pdf".into()));
        assert!(!declared.contains(&"txt".into()));
        assert!(!declared.contains(&"base64".into()));
    }

    #[test]
    fn test_detects_enabled_format() {
        let enabled: FormatSet = ["zip", "gzip"].into_iter().collect();
        let mut stream = Cursor::new(b"\x1f\x8b\x08\x00rest".to_vec());
        let id = detector().detect(&enabled, &mut stream).unwrap();
        assert_eq!(id, FormatId::tag_only("gzip"));
    }

    #[test]
    fn test_disabled_format_is_unknown() {
        let enabled: FormatSet = ["pdf"].into_iter().collect();
        let mut stream = Cursor::new(b"PK\x03\x04".to_vec());
        assert!(detector().detect(&enabled, &mut stream).unwrap().is_unknown());
    }

    #[test]
    fn test_read_limit_hides_late_markers() {
        let enabled: FormatSet = ["tar"].into_iter().collect();
        let mut content = vec![0u8; 257];
        content.extend_from_slice(b"ustar\x0000");
        let limited = detector().with_read_limit(Some(100));
        assert!(limited
            .detect(&enabled, &mut Cursor::new(content.clone()))
            .unwrap()
            .is_unknown());
        let unlimited = detector();
        assert_eq!(
            unlimited.detect(&enabled, &mut Cursor::new(content)).unwrap(),
            FormatId::tag_only("tar")
        );
    }

    #[test]
    fn test_name_is_unqualified_type_name() {
        assert_eq!(detector().name(), "SignatureDetector");
    }
}
