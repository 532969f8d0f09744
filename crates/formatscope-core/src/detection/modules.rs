//! Configured detector modules.
//!
//! A module table maps format tags to cheap matching rules over a short
//! prefix of the stream. It is line oriented:
//!
//! ```text
//! # comment
//! pdf=string:%PDF-
//! xml=regexp:^\s*<\?xml\s
//! base64=class:base64
//! ```
//!
//! `string` rules match a literal prefix, `regexp` rules run a byte regex
//! over the first KiB, and `class` rules name one of the built-in plugin
//! rules. Any other mode is a configuration error.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::diagnostics::{ConfigError, CoreError, CoreResult};
use crate::format::{FormatId, FormatSet, FormatTag};
use crate::stream::{ResettableStream, read_prefix};

use super::Detector;

const BUILTIN_MODULES: &str = include_str!("../../signatures/modules.conf");

/// Window inspected by `regexp` rules.
const PATTERN_WINDOW: usize = 1024;

/// A matching rule evaluated against a stream prefix.
pub trait MatchingRule: Send + Sync {
    /// How many leading bytes the rule needs to see.
    fn window(&self) -> usize;

    /// `prefix` holds at most [`window`](Self::window) bytes; fewer when
    /// the stream is shorter.
    fn matches(&self, prefix: &[u8]) -> bool;
}

/// Matches a literal byte prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralRule {
    bytes: Vec<u8>,
}

impl LiteralRule {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Parse a literal with `\xNN`, `\n`, `\r`, `\t` and `\\` escapes.
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut bytes = Vec::with_capacity(text.len());
        let mut iter = text.bytes();
        while let Some(b) = iter.next() {
            if b != b'\\' {
                bytes.push(b);
                continue;
            }
            match iter.next() {
                Some(b'n') => bytes.push(b'\n'),
                Some(b'r') => bytes.push(b'\r'),
                Some(b't') => bytes.push(b'\t'),
                Some(b'\\') => bytes.push(b'\\'),
                Some(b'x') => {
                    let digits = [iter.next(), iter.next()];
                    let value = match digits {
                        [Some(hi), Some(lo)] => std::str::from_utf8(&[hi, lo])
                            .ok()
                            .and_then(|s| u8::from_str_radix(s, 16).ok()),
                        _ => None,
                    };
                    bytes.push(value.ok_or("\\x needs two hex digits")?);
                }
                Some(other) => return Err(format!("unknown escape \\{}", other as char)),
                None => return Err("dangling backslash".to_string()),
            }
        }
        if bytes.is_empty() {
            return Err("empty literal".to_string());
        }
        Ok(Self { bytes })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl MatchingRule for LiteralRule {
    fn window(&self) -> usize {
        self.bytes.len()
    }

    fn matches(&self, prefix: &[u8]) -> bool {
        prefix.starts_with(&self.bytes)
    }
}

/// Byte regex over the first KiB. Anchoring is up to the pattern.
#[derive(Debug, Clone)]
pub struct PatternRule {
    regex: regex::bytes::Regex,
}

impl PatternRule {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: regex::bytes::Regex::new(pattern)?,
        })
    }
}

impl MatchingRule for PatternRule {
    fn window(&self) -> usize {
        PATTERN_WINDOW
    }

    fn matches(&self, prefix: &[u8]) -> bool {
        self.regex.is_match(prefix)
    }
}

/// Heuristic for base64 text: only alphabet, padding and line breaks, at
/// least 16 symbols, and the leading quads decode.
#[derive(Debug, Default, Clone, Copy)]
pub struct Base64Rule;

impl Base64Rule {
    const WINDOW: usize = 256;
    const MIN_SYMBOLS: usize = 16;
}

impl MatchingRule for Base64Rule {
    fn window(&self) -> usize {
        Self::WINDOW
    }

    fn matches(&self, prefix: &[u8]) -> bool {
        let mut symbols = Vec::with_capacity(prefix.len());
        for &b in prefix {
            match b {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'+' | b'/' | b'=' => symbols.push(b),
                b'\r' | b'\n' => {}
                _ => return false,
            }
        }
        if symbols.len() < Self::MIN_SYMBOLS {
            return false;
        }
        // A stream shorter than the window was seen whole and must be
        // made of complete quads.
        let whole = prefix.len() < Self::WINDOW;
        if whole && symbols.len() % 4 != 0 {
            return false;
        }
        let quads = symbols.len() - symbols.len() % 4;
        STANDARD.decode(&symbols[..quads]).is_ok()
    }
}

/// Gzip member header with the deflate method byte.
#[derive(Debug, Default, Clone, Copy)]
pub struct GzipRule;

impl MatchingRule for GzipRule {
    fn window(&self) -> usize {
        3
    }

    fn matches(&self, prefix: &[u8]) -> bool {
        prefix.starts_with(&[0x1f, 0x8b, 0x08])
    }
}

/// Local file header, empty archive or spanned archive marker.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipRule;

impl MatchingRule for ZipRule {
    fn window(&self) -> usize {
        4
    }

    fn matches(&self, prefix: &[u8]) -> bool {
        [b"PK\x03\x04", b"PK\x05\x06", b"PK\x07\x08"]
            .iter()
            .any(|magic| prefix.starts_with(*magic))
    }
}

/// Factory function type that creates plugin rules.
pub type RuleFactory = fn() -> Box<dyn MatchingRule>;

const PLUGINS: &[(&str, RuleFactory)] = &[
    ("base64", base64_rule),
    ("gzip", gzip_rule),
    ("zip", zip_rule),
];

fn base64_rule() -> Box<dyn MatchingRule> {
    Box::new(Base64Rule)
}

fn gzip_rule() -> Box<dyn MatchingRule> {
    Box::new(GzipRule)
}

fn zip_rule() -> Box<dyn MatchingRule> {
    Box::new(ZipRule)
}

fn plugin(name: &str) -> Option<Box<dyn MatchingRule>> {
    PLUGINS
        .iter()
        .find(|(plugin, _)| plugin.eq_ignore_ascii_case(name))
        .map(|(_, factory)| factory())
}

struct Module {
    tag: FormatTag,
    rule: Box<dyn MatchingRule>,
}

/// Ordered table of configured modules.
pub struct ModuleRegistry {
    modules: Vec<Module>,
}

impl ModuleRegistry {
    /// Parse a module table. Fails on the first bad line.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut modules = Vec::new();
        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            modules.push(parse_line(raw.trim_start(), line)?);
        }
        Ok(Self { modules })
    }

    pub fn from_path(path: &Path) -> CoreResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| CoreError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let registry = Self::parse(&text)?;
        tracing::debug!(path = %path.display(), modules = registry.len(), "loaded module table");
        Ok(registry)
    }

    /// The table compiled into the crate.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::parse(BUILTIN_MODULES)
    }

    /// Register a rule after the configured ones.
    pub fn push(&mut self, tag: impl Into<FormatTag>, rule: Box<dyn MatchingRule>) {
        self.modules.push(Module {
            tag: tag.into(),
            rule,
        });
    }

    /// Format tags in table order; a tag may appear more than once.
    pub fn tags(&self) -> impl Iterator<Item = &FormatTag> {
        self.modules.iter().map(|m| &m.tag)
    }

    pub fn declared_formats(&self) -> FormatSet {
        self.tags().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.tags()).finish()
    }
}

fn parse_line(text: &str, line: usize) -> Result<Module, ConfigError> {
    let malformed = |message: &str| ConfigError::MalformedModuleLine {
        line,
        message: message.to_string(),
    };
    let (tag, rest) = text
        .split_once('=')
        .ok_or_else(|| malformed("expected tag=mode:params"))?;
    let tag = tag.trim();
    if tag.is_empty() {
        return Err(malformed("missing format tag"));
    }
    let (mode, params) = rest
        .split_once(':')
        .ok_or_else(|| malformed("expected mode:params after '='"))?;

    let rule: Box<dyn MatchingRule> = match mode.trim().to_ascii_lowercase().as_str() {
        "string" => Box::new(LiteralRule::parse(params).map_err(|e| malformed(&e))?),
        "regexp" => Box::new(PatternRule::new(params).map_err(|e| ConfigError::InvalidRegex {
            line,
            message: e.to_string(),
        })?),
        "class" => plugin(params.trim()).ok_or_else(|| ConfigError::UnknownModule {
            line,
            name: params.trim().to_string(),
        })?,
        _ => {
            return Err(ConfigError::UnsupportedStrategy {
                line,
                token: mode.trim().to_string(),
            });
        }
    };
    Ok(Module {
        tag: FormatTag::new(tag),
        rule,
    })
}

/// Detector over a [`ModuleRegistry`].
///
/// Reads one prefix wide enough for every enabled module, then reports the
/// first module in table order whose rule matches.
#[derive(Debug, Clone)]
pub struct ModuleDetector {
    registry: Arc<ModuleRegistry>,
    declared: FormatSet,
}

impl ModuleDetector {
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        let declared = registry.declared_formats();
        Self { registry, declared }
    }
}

impl Detector for ModuleDetector {
    fn detect(
        &self,
        enabled: &FormatSet,
        stream: &mut dyn ResettableStream,
    ) -> anyhow::Result<FormatId> {
        let candidates: Vec<&Module> = self
            .registry
            .modules
            .iter()
            .filter(|m| enabled.contains(&m.tag))
            .collect();
        let Some(window) = candidates.iter().map(|m| m.rule.window()).max() else {
            return Ok(FormatId::unknown());
        };
        let prefix = read_prefix(stream, Some(window)).context("reading module window")?;
        let found = candidates.into_iter().find(|m| {
            let end = m.rule.window().min(prefix.len());
            m.rule.matches(&prefix[..end])
        });
        if let Some(module) = found {
            tracing::trace!(format = %module.tag, "module matched");
        }
        Ok(found.map_or_else(FormatId::unknown, |m| FormatId::tag_only(m.tag.clone())))
    }

    fn declared_formats(&self) -> &FormatSet {
        &self.declared
    }
}
