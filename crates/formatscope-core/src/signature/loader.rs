//! Signature library files.
//!
//! A library is a versioned document listing file formats and the
//! internal signatures they own. The same schema is accepted as TOML,
//! JSON or YAML; the encoding is chosen from the file extension.
//!
//! ```toml
//! version = "1"
//!
//! [[formats]]
//! id = 1
//! name = "ZIP archive"
//! tag = "zip"
//! extensions = ["zip"]
//! signatures = [1]
//!
//! [[signatures]]
//! id = 1
//! specific = true
//!
//! [[signatures.sequences]]
//! anchor = "bof"
//! pattern = "50 4B 03 04"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::diagnostics::{ConfigError, CoreError, CoreResult};

use super::model::{Anchor, ByteSequence, FileFormat, InternalSignature, SignatureModel, SubSequence};
use super::pattern::{parse_gap, parse_pattern};

/// The only schema version this crate reads.
pub const SCHEMA_VERSION: &str = "1";

const BUILTIN_LIBRARY: &str = include_str!("../../signatures/default.toml");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignatureFile {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_created: Option<String>,
    #[serde(default)]
    pub formats: Vec<FileFormat>,
    #[serde(default)]
    pub signatures: Vec<SignatureDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignatureDef {
    pub id: u32,
    #[serde(default)]
    pub specific: bool,
    #[serde(default)]
    pub sequences: Vec<SequenceDef>,
}

/// A byte sequence, written either as a single `pattern` or as a list of
/// `sub_sequences`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SequenceDef {
    pub anchor: Anchor,
    #[serde(default)]
    pub offset: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_sequences: Vec<SubSequenceDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubSequenceDef {
    /// Leading gap from the anchor-side neighbour, e.g. `{0-16}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gap: Option<String>,
    pub pattern: String,
}

impl SignatureFile {
    /// Read a library from disk, choosing the parser by extension.
    pub fn from_path(path: &Path) -> CoreResult<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let parse: fn(&str, &str) -> Result<Self, ConfigError> = match extension.as_deref() {
            Some("toml") => Self::parse_toml,
            Some("json") => Self::parse_json,
            Some("yaml" | "yml") => Self::parse_yaml,
            _ => {
                return Err(ConfigError::UnsupportedSignatureFile {
                    path: path.to_path_buf(),
                }
                .into());
            }
        };
        let text = std::fs::read_to_string(path).map_err(|source| CoreError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(parse(&text, &path.display().to_string())?)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Self::parse_toml(text, "<toml>")
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Self::parse_json(text, "<json>")
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        Self::parse_yaml(text, "<yaml>")
    }

    fn parse_toml(text: &str, source_name: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| parse_error(source_name, e))
    }

    fn parse_json(text: &str, source_name: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| parse_error(source_name, e))
    }

    fn parse_yaml(text: &str, source_name: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(text).map_err(|e| parse_error(source_name, e))
    }

    /// Convert the document into a prepared [`SignatureModel`].
    pub fn into_model(self) -> Result<SignatureModel, ConfigError> {
        if self.version != SCHEMA_VERSION {
            return Err(ConfigError::UnsupportedSchemaVersion {
                version: self.version,
            });
        }
        let signatures = self
            .signatures
            .into_iter()
            .map(SignatureDef::into_signature)
            .collect::<Result<Vec<_>, _>>()?;
        SignatureModel::prepare(self.version, self.formats, signatures)
    }
}

fn parse_error(source_name: &str, error: impl std::fmt::Display) -> ConfigError {
    ConfigError::SignatureFileParse {
        source_name: source_name.to_string(),
        message: error.to_string(),
    }
}

impl SignatureDef {
    fn into_signature(self) -> Result<InternalSignature, ConfigError> {
        let sequences = self
            .sequences
            .into_iter()
            .map(|seq| seq.into_sequence(self.id))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(InternalSignature::new(self.id, self.specific, sequences))
    }
}

impl SequenceDef {
    fn into_sequence(self, signature: u32) -> Result<ByteSequence, ConfigError> {
        let mut subs = Vec::with_capacity(self.sub_sequences.len() + 1);
        match (self.pattern, self.sub_sequences.is_empty()) {
            (Some(_), false) => {
                return Err(ConfigError::SignatureFileParse {
                    source_name: format!("signature {signature}"),
                    message: "a sequence takes either `pattern` or `sub_sequences`, not both"
                        .to_string(),
                });
            }
            (Some(pattern), true) => subs.push(parse_pattern(&pattern)?),
            (None, _) => {
                for def in self.sub_sequences {
                    subs.push(def.into_sub_sequence()?);
                }
            }
        }
        Ok(ByteSequence::new(self.anchor, self.offset, subs))
    }
}

impl SubSequenceDef {
    fn into_sub_sequence(self) -> Result<SubSequence, ConfigError> {
        let sub = parse_pattern(&self.pattern)?;
        Ok(match self.gap {
            Some(gap) => sub.with_offset(parse_gap(&gap)?),
            None => sub,
        })
    }
}

impl SignatureModel {
    /// The library compiled into the crate.
    pub fn builtin() -> Result<Self, ConfigError> {
        SignatureFile::parse_toml(BUILTIN_LIBRARY, "built-in library")?.into_model()
    }

    /// Load and prepare a library file.
    pub fn from_path(path: &Path) -> CoreResult<Self> {
        let model = SignatureFile::from_path(path)?.into_model()?;
        tracing::debug!(
            path = %path.display(),
            formats = model.formats().len(),
            signatures = model.signatures().len(),
            "loaded signature library"
        );
        Ok(model)
    }
}
