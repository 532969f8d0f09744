//! Classification hits produced for a single source.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::format::FormatId;

use super::model::FileFormat;

/// Confidence of a hit.
///
/// The derived ordering ranks hits best-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HitType {
    PositiveSpecific,
    PositiveGeneric,
    /// Derived from the file extension alone.
    Tentative,
}

impl HitType {
    pub fn is_positive(self) -> bool {
        !matches!(self, HitType::Tentative)
    }
}

impl fmt::Display for HitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HitType::PositiveSpecific => "positive (specific)",
            HitType::PositiveGeneric => "positive (generic)",
            HitType::Tentative => "tentative",
        })
    }
}

/// Annotation attached to a hit that was kept despite a doubt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HitWarning {
    /// The source's extension is missing or not one the format declares.
    ExtensionMismatch,
}

impl fmt::Display for HitWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HitWarning::ExtensionMismatch => f.write_str("possible file extension mismatch"),
        }
    }
}

/// One classification result for a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hit {
    /// Id of the matched [`FileFormat`].
    pub format: u32,
    pub format_id: FormatId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub hit_type: HitType,
    pub specific: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<HitWarning>,
}

impl Hit {
    pub fn positive(format: &FileFormat, specific: bool) -> Self {
        let hit_type = if specific {
            HitType::PositiveSpecific
        } else {
            HitType::PositiveGeneric
        };
        Self::with_type(format, hit_type, specific)
    }

    pub fn tentative(format: &FileFormat) -> Self {
        Self::with_type(format, HitType::Tentative, false)
    }

    fn with_type(format: &FileFormat, hit_type: HitType, specific: bool) -> Self {
        Self {
            format: format.id,
            format_id: format.format_id(),
            name: format.name.clone(),
            mime_type: format.mime_type.clone(),
            hit_type,
            specific,
            warning: None,
        }
    }

    pub fn is_positive(&self) -> bool {
        self.hit_type.is_positive()
    }

    pub fn with_warning(mut self, warning: HitWarning) -> Self {
        self.warning = Some(warning);
        self
    }
}
