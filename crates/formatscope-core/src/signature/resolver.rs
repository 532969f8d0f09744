//! Hit resolution: deduplication, priority pruning and extension
//! corroboration.
//!
//! Every step is a function from one hit list to a new one; nothing is
//! removed from a list while it is being iterated.

use std::collections::HashSet;

use super::hit::{Hit, HitWarning};
use super::model::SignatureModel;

/// Derive the extension of a file name.
///
/// The extension is the text after the last `.`, provided that dot is not
/// the final character and no path separator follows it.
///
/// ```
/// use formatscope_core::signature::derive_extension;
///
/// assert_eq!(derive_extension("report.PDF"), Some("PDF"));
/// assert_eq!(derive_extension("archive.tar.gz"), Some("gz"));
/// assert_eq!(derive_extension("trailing."), None);
/// assert_eq!(derive_extension("dir.d/README"), None);
/// ```
pub fn derive_extension(name: &str) -> Option<&str> {
    let dot = name.rfind('.')?;
    let extension = &name[dot + 1..];
    if extension.is_empty() || extension.contains(['/', '\\']) {
        return None;
    }
    Some(extension)
}

/// Turns raw evaluator hits into the final hit list for one source.
#[derive(Debug, Clone, Copy)]
pub struct HitResolver<'m> {
    model: &'m SignatureModel,
}

impl<'m> HitResolver<'m> {
    pub fn new(model: &'m SignatureModel) -> Self {
        Self { model }
    }

    pub fn resolve(&self, hits: Vec<Hit>, file_name: Option<&str>) -> Vec<Hit> {
        let hits = self.deduplicate(hits);
        let hits = self.prune_by_priority(hits);
        self.corroborate_extension(hits, file_name.and_then(derive_extension))
    }

    /// Collapse hits for the same format into the first one, upgrading it
    /// to the most specific type seen.
    fn deduplicate(&self, hits: Vec<Hit>) -> Vec<Hit> {
        let mut resolved: Vec<Hit> = Vec::with_capacity(hits.len());
        for hit in hits {
            match resolved.iter_mut().find(|h| h.format == hit.format) {
                Some(existing) => {
                    if hit.hit_type < existing.hit_type {
                        existing.hit_type = hit.hit_type;
                        existing.specific = hit.specific;
                    }
                }
                None => resolved.push(hit),
            }
        }
        resolved
    }

    /// Drop every hit whose format is the target of a priority edge
    /// declared by a format in the incoming set.
    fn prune_by_priority(&self, hits: Vec<Hit>) -> Vec<Hit> {
        let dominated: HashSet<u32> = hits
            .iter()
            .filter_map(|hit| self.model.format(hit.format))
            .flat_map(|format| format.has_priority_over.iter().copied())
            .collect();
        if dominated.is_empty() {
            return hits;
        }
        hits.into_iter()
            .filter(|hit| {
                let keep = !dominated.contains(&hit.format);
                if !keep {
                    tracing::trace!(format = hit.format, "hit pruned by priority");
                }
                keep
            })
            .collect()
    }

    fn corroborate_extension(&self, hits: Vec<Hit>, extension: Option<&str>) -> Vec<Hit> {
        let Some(extension) = extension else {
            return hits
                .into_iter()
                .map(|hit| hit.with_warning(HitWarning::ExtensionMismatch))
                .collect();
        };

        if hits.iter().any(Hit::is_positive) {
            return hits
                .into_iter()
                .map(|hit| {
                    let corroborated = self
                        .model
                        .format(hit.format)
                        .is_some_and(|format| format.has_extension(extension));
                    if corroborated {
                        hit
                    } else {
                        hit.with_warning(HitWarning::ExtensionMismatch)
                    }
                })
                .collect();
        }

        let mut hits = hits;
        hits.extend(
            self.model
                .formats()
                .iter()
                .filter(|format| format.is_extension_only() && format.has_extension(extension))
                .map(Hit::tentative),
        );
        hits
    }
}
