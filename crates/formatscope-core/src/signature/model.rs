//! In-memory signature library: file formats, internal signatures and the
//! byte patterns they are built from.
//!
//! A [`SignatureModel`] can only be obtained through [`SignatureModel::prepare`],
//! which validates the library and compiles every byte sequence into the
//! step list the matcher walks. Once prepared, the model is immutable and
//! can be shared across threads behind an `Arc`.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::diagnostics::ConfigError;
use crate::format::{FormatId, FormatTag};

/// A run of literal bytes in which individual positions may be wildcards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteFragment {
    bytes: Vec<Option<u8>>,
}

impl ByteFragment {
    /// Build a fragment; `None` positions match any byte.
    pub fn new(bytes: Vec<Option<u8>>) -> Self {
        Self { bytes }
    }

    /// A fragment with no wildcard positions.
    pub fn literal(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.iter().copied().map(Some).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn positions(&self) -> &[Option<u8>] {
        &self.bytes
    }

    pub(crate) fn reversed(&self) -> Self {
        Self {
            bytes: self.bytes.iter().rev().copied().collect(),
        }
    }
}

impl fmt::Display for ByteFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.bytes.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match b {
                Some(b) => write!(f, "{b:02X}")?,
                None => f.write_str("??")?,
            }
        }
        Ok(())
    }
}

/// A bounded run of bytes that may be skipped between two fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Gap {
    pub min: usize,
    /// `None` means unbounded.
    pub max: Option<usize>,
}

impl Gap {
    pub const NONE: Gap = Gap {
        min: 0,
        max: Some(0),
    };

    pub fn exact(len: usize) -> Self {
        Self {
            min: len,
            max: Some(len),
        }
    }

    pub fn between(min: usize, max: usize) -> Self {
        Self {
            min,
            max: Some(max),
        }
    }

    pub fn at_least(min: usize) -> Self {
        Self { min, max: None }
    }

    pub fn is_unbounded(&self) -> bool {
        self.max.is_none()
    }

    /// Shift both bounds by `offset`.
    pub(crate) fn shifted(self, offset: usize) -> Self {
        Self {
            min: self.min.saturating_add(offset),
            max: self.max.map(|m| m.saturating_add(offset)),
        }
    }
}

impl fmt::Display for Gap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) if max == self.min => write!(f, "{{{}}}", self.min),
            Some(max) => write!(f, "{{{}-{}}}", self.min, max),
            None => write!(f, "{{{}-*}}", self.min),
        }
    }
}

/// Where a byte sequence is anchored in the source.
///
/// The derived ordering (BOF, EOF, Variable) is the evaluation order of
/// byte sequences within a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Anchor {
    Bof,
    Eof,
    Variable,
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Anchor::Bof => "BOF",
            Anchor::Eof => "EOF",
            Anchor::Variable => "Variable",
        })
    }
}

/// Ordered fragments separated by gaps.
///
/// `gaps[i]` separates `fragments[i]` from `fragments[i + 1]`. `offset` is
/// the gap between this sub-sequence and its anchor-side neighbour: the
/// previous sub-sequence (or the anchor) for BOF and Variable sequences,
/// the following sub-sequence (or end of file) for EOF sequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubSequence {
    pub offset: Gap,
    pub fragments: Vec<ByteFragment>,
    pub gaps: Vec<Gap>,
}

impl SubSequence {
    pub fn new(fragments: Vec<ByteFragment>, gaps: Vec<Gap>) -> Self {
        Self {
            offset: Gap::NONE,
            fragments,
            gaps,
        }
    }

    pub fn with_offset(mut self, offset: Gap) -> Self {
        self.offset = offset;
        self
    }
}

/// One compiled matching step: skip within `gap`, then match `fragment`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Step {
    pub(crate) gap: Gap,
    pub(crate) fragment: ByteFragment,
}

/// One or more sub-sequences anchored at BOF, EOF or a floating offset.
///
/// The fields are fixed at construction; `steps` is compiled from them
/// when the owning model is prepared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteSequence {
    anchor: Anchor,
    offset: usize,
    sub_sequences: Vec<SubSequence>,
    steps: Vec<Step>,
}

impl ByteSequence {
    pub fn new(anchor: Anchor, offset: usize, sub_sequences: Vec<SubSequence>) -> Self {
        Self {
            anchor,
            offset,
            sub_sequences,
            steps: Vec::new(),
        }
    }

    pub fn anchor(&self) -> Anchor {
        self.anchor
    }

    /// Reference offset from the anchor.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn sub_sequences(&self) -> &[SubSequence] {
        &self.sub_sequences
    }

    /// Steps in match order. Empty until the owning model is prepared.
    pub(crate) fn steps(&self) -> &[Step] {
        &self.steps
    }

    fn validate(&self, signature: u32) -> Result<(), ConfigError> {
        if self.sub_sequences.is_empty() {
            return Err(ConfigError::EmptyByteSequence { signature });
        }
        for sub in &self.sub_sequences {
            if sub.fragments.is_empty() {
                return Err(ConfigError::EmptySubSequence { signature });
            }
            if sub.fragments.iter().any(ByteFragment::is_empty) {
                return Err(ConfigError::EmptyFragment { signature });
            }
            if sub.gaps.len() + 1 != sub.fragments.len() {
                return Err(ConfigError::MisalignedGaps {
                    signature,
                    fragments: sub.fragments.len(),
                    gaps: sub.gaps.len(),
                });
            }
            for gap in std::iter::once(&sub.offset).chain(&sub.gaps) {
                if let Some(max) = gap.max
                    && max < gap.min
                {
                    return Err(ConfigError::InvalidGap {
                        signature,
                        min: gap.min,
                        max,
                    });
                }
            }
        }
        Ok(())
    }

    /// Flatten sub-sequences into steps in match order.
    ///
    /// EOF sequences are mirrored: the fragment nearest the end of the
    /// source comes first and its bytes are reversed, so the matcher can
    /// walk the source backwards with the same forward logic.
    fn compile(&mut self) {
        let mut steps = Vec::new();
        match self.anchor {
            Anchor::Bof | Anchor::Variable => {
                for (i, sub) in self.sub_sequences.iter().enumerate() {
                    for (j, fragment) in sub.fragments.iter().enumerate() {
                        let gap = if j == 0 { sub.offset } else { sub.gaps[j - 1] };
                        let gap = if i == 0 && j == 0 {
                            let anchored = gap.shifted(self.offset);
                            if self.anchor == Anchor::Variable {
                                Gap::at_least(anchored.min)
                            } else {
                                anchored
                            }
                        } else {
                            gap
                        };
                        steps.push(Step {
                            gap,
                            fragment: fragment.clone(),
                        });
                    }
                }
            }
            Anchor::Eof => {
                for (i, sub) in self.sub_sequences.iter().rev().enumerate() {
                    let last = sub.fragments.len() - 1;
                    for j in (0..sub.fragments.len()).rev() {
                        let gap = if j == last { sub.offset } else { sub.gaps[j] };
                        let gap = if i == 0 && j == last {
                            gap.shifted(self.offset)
                        } else {
                            gap
                        };
                        steps.push(Step {
                            gap,
                            fragment: sub.fragments[j].reversed(),
                        });
                    }
                }
            }
        }
        self.steps = steps;
    }
}

/// A named rule composed of byte sequences; compliant iff all of them match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalSignature {
    pub id: u32,
    /// Specific signatures identify a precise version; generic ones a family.
    pub specific: bool,
    pub byte_sequences: Vec<ByteSequence>,
    formats: Vec<u32>,
}

impl InternalSignature {
    pub fn new(id: u32, specific: bool, byte_sequences: Vec<ByteSequence>) -> Self {
        Self {
            id,
            specific,
            byte_sequences,
            formats: Vec::new(),
        }
    }

    /// Ids of the file formats that own this signature (set at preparation).
    pub fn formats(&self) -> &[u32] {
        &self.formats
    }
}

/// A file format known to the library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileFormat {
    pub id: u32,
    pub name: String,
    pub tag: FormatTag,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Internal signatures owned by this format.
    #[serde(default, rename = "signatures")]
    pub signature_ids: Vec<u32>,
    /// Formats whose hits are dropped when this format also hits.
    #[serde(default)]
    pub has_priority_over: Vec<u32>,
}

impl FileFormat {
    pub fn new(id: u32, name: impl Into<String>, tag: impl Into<FormatTag>) -> Self {
        Self {
            id,
            name: name.into(),
            tag: tag.into(),
            version: String::new(),
            mime_type: None,
            extensions: Vec::new(),
            signature_ids: Vec::new(),
            has_priority_over: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_signatures(mut self, ids: impl IntoIterator<Item = u32>) -> Self {
        self.signature_ids = ids.into_iter().collect();
        self
    }

    pub fn with_priority_over(mut self, ids: impl IntoIterator<Item = u32>) -> Self {
        self.has_priority_over = ids.into_iter().collect();
        self
    }

    pub fn format_id(&self) -> FormatId {
        FormatId::new(self.tag.clone(), self.version.clone())
    }

    /// Extension-only formats can only ever produce tentative hits.
    pub fn is_extension_only(&self) -> bool {
        self.signature_ids.is_empty()
    }

    /// Case-insensitive extension check.
    pub fn has_extension(&self, extension: &str) -> bool {
        self.extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(extension))
    }
}

/// The prepared signature library.
#[derive(Debug, Clone)]
pub struct SignatureModel {
    version: String,
    formats: Vec<FileFormat>,
    signatures: Vec<InternalSignature>,
    format_index: HashMap<u32, usize>,
}

impl SignatureModel {
    /// Validate the library, link signatures to their formats and compile
    /// every byte sequence.
    ///
    /// Fails with the first [`ConfigError`] found: duplicate ids,
    /// unresolvable references, self or mutual priority edges, and
    /// degenerate or malformed sequences are all rejected here so that
    /// matching never has to deal with them.
    pub fn prepare(
        version: impl Into<String>,
        formats: Vec<FileFormat>,
        mut signatures: Vec<InternalSignature>,
    ) -> Result<Self, ConfigError> {
        let mut format_index = HashMap::with_capacity(formats.len());
        for (i, format) in formats.iter().enumerate() {
            if format_index.insert(format.id, i).is_some() {
                return Err(ConfigError::DuplicateFormat { id: format.id });
            }
        }

        let mut signature_index = HashMap::with_capacity(signatures.len());
        for (i, sig) in signatures.iter().enumerate() {
            if signature_index.insert(sig.id, i).is_some() {
                return Err(ConfigError::DuplicateSignature { id: sig.id });
            }
        }

        let mut edges = HashSet::new();
        for format in &formats {
            for &target in &format.has_priority_over {
                if target == format.id {
                    return Err(ConfigError::SelfPriority { format: format.id });
                }
                if !format_index.contains_key(&target) {
                    return Err(ConfigError::UnresolvedFormat {
                        format: format.id,
                        target,
                    });
                }
                edges.insert((format.id, target));
            }
        }
        for &(from, to) in &edges {
            if from < to && edges.contains(&(to, from)) {
                return Err(ConfigError::MutualPriority {
                    first: from,
                    second: to,
                });
            }
        }

        for sig in &mut signatures {
            sig.formats.clear();
            if sig.byte_sequences.is_empty() {
                return Err(ConfigError::EmptySignature { signature: sig.id });
            }
            for seq in &sig.byte_sequences {
                seq.validate(sig.id)?;
            }
        }

        for format in &formats {
            for &sig_id in &format.signature_ids {
                let Some(&idx) = signature_index.get(&sig_id) else {
                    return Err(ConfigError::UnresolvedSignature {
                        format: format.id,
                        signature: sig_id,
                    });
                };
                let owners = &mut signatures[idx].formats;
                if !owners.contains(&format.id) {
                    owners.push(format.id);
                }
            }
        }

        for sig in &mut signatures {
            if sig.formats.is_empty() {
                tracing::debug!(signature = sig.id, "signature is not owned by any format");
            }
            // Stable sort keeps declaration order within each anchor kind.
            sig.byte_sequences.sort_by_key(|seq| seq.anchor);
            for seq in &mut sig.byte_sequences {
                seq.compile();
            }
        }

        Ok(Self {
            version: version.into(),
            formats,
            signatures,
            format_index,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn formats(&self) -> &[FileFormat] {
        &self.formats
    }

    pub fn signatures(&self) -> &[InternalSignature] {
        &self.signatures
    }

    pub fn format(&self, id: u32) -> Option<&FileFormat> {
        self.format_index.get(&id).map(|&i| &self.formats[i])
    }
}
