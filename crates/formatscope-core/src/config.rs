//! Engine configuration (`.formatscope.toml`).

use std::path::{Path, PathBuf};

use anyhow::Context;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::detection::DEFAULT_MAX_RECURSION;
use crate::diagnostics::ConfigError;
use crate::format::{FormatSet, FormatTag};
use crate::source::DEFAULT_MAX_FILE_SIZE;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".formatscope.toml";

/// Upper bound accepted for `max_recursion`.
pub const MAX_RECURSION_LIMIT: usize = 64;

/// Smallest accepted `read_limit`: the widest built-in module window.
pub const MIN_READ_LIMIT: usize = 1024;

/// Configuration for identification and layered detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct ScopeConfig {
    #[schemars(description = "Layers detected beyond the first before detection stops (0-64)")]
    max_recursion: usize,

    #[schemars(
        description = "Bytes a detector may inspect per layer; unset means the whole stream"
    )]
    read_limit: Option<usize>,

    #[schemars(description = "Files larger than this many bytes are refused")]
    max_file_size: u64,

    #[schemars(
        description = "Format tags to detect (e.g., [\"zip\", \"base64\"]); empty enables every declared format"
    )]
    enabled_formats: Vec<String>,

    #[schemars(
        description = "Signature library (.toml, .json, .yaml or .yml); unset uses the built-in library"
    )]
    signature_file: Option<PathBuf>,

    #[schemars(description = "Detector module table; unset uses the built-in table")]
    modules_file: Option<PathBuf>,

    #[schemars(
        description = "Detector names to disable (e.g., [\"ModuleDetector\"])"
    )]
    disabled_detectors: Vec<String>,

    #[schemars(description = "Format tags whose decoders are disabled (e.g., [\"gzip\"])")]
    disabled_decoders: Vec<String>,

    #[schemars(
        description = "Glob patterns for paths to skip when walking directories (e.g., [\"target/**\"])"
    )]
    exclude: Vec<String>,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            max_recursion: DEFAULT_MAX_RECURSION,
            read_limit: None,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            enabled_formats: Vec::new(),
            signature_file: None,
            modules_file: None,
            disabled_detectors: Vec::new(),
            disabled_decoders: Vec::new(),
            exclude: vec![".git/**".to_string(), "target/**".to_string()],
        }
    }
}

impl ScopeConfig {
    pub fn builder() -> ScopeConfigBuilder {
        ScopeConfigBuilder::new()
    }

    /// Load config from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load config or fall back to the default, returning any load error as
    /// a warning message.
    pub fn load_or_default(path: Option<&Path>) -> (Self, Option<String>) {
        match path {
            Some(p) => match Self::load(p) {
                Ok(config) => (config, None),
                Err(e) => {
                    let warning = format!(
                        "Failed to load config {}: {e:#}. Using defaults.",
                        p.display()
                    );
                    (Self::default(), Some(warning))
                }
            },
            None => (Self::default(), None),
        }
    }

    /// Check value ranges and glob syntax.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_recursion > MAX_RECURSION_LIMIT {
            return Err(ConfigError::ValueOutOfRange {
                field: "max_recursion".to_string(),
                message: format!(
                    "{} exceeds the limit of {MAX_RECURSION_LIMIT}",
                    self.max_recursion
                ),
            });
        }
        if let Some(limit) = self.read_limit
            && limit < MIN_READ_LIMIT
        {
            return Err(ConfigError::ValueOutOfRange {
                field: "read_limit".to_string(),
                message: format!("{limit} is below the minimum of {MIN_READ_LIMIT} bytes"),
            });
        }
        if self.max_file_size == 0 {
            return Err(ConfigError::ValueOutOfRange {
                field: "max_file_size".to_string(),
                message: "must be at least 1 byte".to_string(),
            });
        }
        self.exclude_rules()?;
        Ok(())
    }

    /// Compile the `exclude` globs.
    pub(crate) fn exclude_rules(&self) -> Result<Vec<ExcludeRule>, ConfigError> {
        self.exclude.iter().map(|p| ExcludeRule::compile(p)).collect()
    }

    #[inline]
    pub fn max_recursion(&self) -> usize {
        self.max_recursion
    }

    #[inline]
    pub fn read_limit(&self) -> Option<usize> {
        self.read_limit
    }

    #[inline]
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn enabled_formats(&self) -> &[String] {
        &self.enabled_formats
    }

    pub fn signature_file(&self) -> Option<&Path> {
        self.signature_file.as_deref()
    }

    pub fn modules_file(&self) -> Option<&Path> {
        self.modules_file.as_deref()
    }

    pub fn disabled_detectors(&self) -> &[String] {
        &self.disabled_detectors
    }

    pub fn disabled_decoders(&self) -> &[String] {
        &self.disabled_decoders
    }

    pub fn exclude(&self) -> &[String] {
        &self.exclude
    }

    /// The formats to detect: the configured tags, or all of `declared`
    /// when none are configured.
    pub fn enabled_format_set(&self, declared: &FormatSet) -> FormatSet {
        if self.enabled_formats.is_empty() {
            declared.clone()
        } else {
            self.enabled_formats.iter().map(FormatTag::new).collect()
        }
    }

    pub fn set_max_recursion(&mut self, max_recursion: usize) {
        self.max_recursion = max_recursion;
    }

    pub fn set_signature_file(&mut self, path: Option<PathBuf>) {
        self.signature_file = path;
    }

    pub fn set_modules_file(&mut self, path: Option<PathBuf>) {
        self.modules_file = path;
    }

    pub fn set_enabled_formats(&mut self, formats: Vec<String>) {
        self.enabled_formats = formats;
    }
}

/// Builder for [`ScopeConfig`]; unset fields take their defaults.
#[derive(Debug, Default)]
pub struct ScopeConfigBuilder {
    max_recursion: Option<usize>,
    read_limit: Option<Option<usize>>,
    max_file_size: Option<u64>,
    enabled_formats: Vec<String>,
    signature_file: Option<PathBuf>,
    modules_file: Option<PathBuf>,
    disabled_detectors: Vec<String>,
    disabled_decoders: Vec<String>,
    exclude: Option<Vec<String>>,
}

impl ScopeConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_recursion(&mut self, max_recursion: usize) -> &mut Self {
        self.max_recursion = Some(max_recursion);
        self
    }

    pub fn read_limit(&mut self, read_limit: Option<usize>) -> &mut Self {
        self.read_limit = Some(read_limit);
        self
    }

    pub fn max_file_size(&mut self, bytes: u64) -> &mut Self {
        self.max_file_size = Some(bytes);
        self
    }

    /// Add a format tag to the enabled set.
    pub fn enable_format(&mut self, tag: impl Into<String>) -> &mut Self {
        self.enabled_formats.push(tag.into());
        self
    }

    pub fn signature_file(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.signature_file = Some(path.into());
        self
    }

    pub fn modules_file(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.modules_file = Some(path.into());
        self
    }

    pub fn disable_detector(&mut self, name: impl Into<String>) -> &mut Self {
        self.disabled_detectors.push(name.into());
        self
    }

    pub fn disable_decoder(&mut self, tag: impl Into<String>) -> &mut Self {
        self.disabled_decoders.push(tag.into());
        self
    }

    /// Replace the exclude patterns.
    pub fn exclude(&mut self, patterns: Vec<String>) -> &mut Self {
        self.exclude = Some(patterns);
        self
    }

    /// Build the config and validate it.
    pub fn build(&mut self) -> Result<ScopeConfig, ConfigError> {
        let config = self.build_inner();
        config.validate()?;
        Ok(config)
    }

    fn build_inner(&mut self) -> ScopeConfig {
        let defaults = ScopeConfig::default();
        ScopeConfig {
            max_recursion: self.max_recursion.take().unwrap_or(defaults.max_recursion),
            read_limit: self.read_limit.take().unwrap_or(defaults.read_limit),
            max_file_size: self.max_file_size.take().unwrap_or(defaults.max_file_size),
            enabled_formats: std::mem::take(&mut self.enabled_formats),
            signature_file: self.signature_file.take(),
            modules_file: self.modules_file.take(),
            disabled_detectors: std::mem::take(&mut self.disabled_detectors),
            disabled_decoders: std::mem::take(&mut self.disabled_decoders),
            exclude: self.exclude.take().unwrap_or(defaults.exclude),
        }
    }
}

/// One compiled `exclude` glob, matched against `/`-separated paths
/// relative to the walk root.
///
/// A trailing `/` makes the rule directory-only: `build/` skips everything
/// under `build` but not a file named `build`.
#[derive(Debug, Clone)]
pub(crate) struct ExcludeRule {
    glob: glob::Pattern,
    dir_only: Option<String>,
    recursive: bool,
}

/// File name that cannot occur in a walk, used to ask whether a rule
/// covers the inside of a directory.
const PLACEHOLDER_ENTRY: &str = "__formatscope_placeholder__";

impl ExcludeRule {
    pub(crate) fn compile(pattern: &str) -> Result<Self, ConfigError> {
        let normalized = pattern.replace('\\', "/");
        let (source, dir_only) = match normalized.strip_suffix('/') {
            Some(prefix) => (format!("{prefix}/**"), Some(prefix.to_string())),
            None => (normalized, None),
        };
        let glob = glob::Pattern::new(&source).map_err(|e| ConfigError::InvalidGlobPattern {
            pattern: pattern.to_string(),
            error: e.to_string(),
        })?;
        Ok(Self {
            recursive: dir_only.is_some() || source.contains("**"),
            glob,
            dir_only,
        })
    }

    /// Whether a walk can skip the directory `rel_dir` without visiting it.
    /// The walk root (an empty path) is never pruned.
    #[cfg_attr(not(feature = "filesystem"), allow(dead_code))]
    pub(crate) fn prunes_dir(&self, rel_dir: &str) -> bool {
        if rel_dir.is_empty() {
            return false;
        }
        if self.glob.matches(rel_dir) {
            return true;
        }
        self.recursive
            && self
                .glob
                .matches(&format!("{}/{PLACEHOLDER_ENTRY}", rel_dir.trim_end_matches('/')))
    }

    #[cfg_attr(not(feature = "filesystem"), allow(dead_code))]
    pub(crate) fn excludes_file(&self, rel_path: &str) -> bool {
        self.glob.matches(rel_path) && self.dir_only.as_deref() != Some(rel_path)
    }
}

/// Generate the JSON Schema for `.formatscope.toml`.
///
/// ```
/// use formatscope_core::config::generate_schema;
///
/// let schema = generate_schema();
/// let json = serde_json::to_string_pretty(&schema).unwrap();
/// assert!(json.contains("max_recursion"));
/// ```
pub fn generate_schema() -> schemars::Schema {
    schemars::schema_for!(ScopeConfig)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ScopeConfig::default();
        assert_eq!(config.max_recursion(), 8);
        assert_eq!(config.read_limit(), None);
        assert_eq!(config.max_file_size(), 256 * 1024 * 1024);
        assert!(config.enabled_formats().is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml_keeps_defaults() {
        let config: ScopeConfig = toml::from_str(
            r#"
max_recursion = 3
enabled_formats = ["ZIP", "base64"]
disabled_decoders = ["gzip"]
"#,
        )
        .unwrap();
        assert_eq!(config.max_recursion(), 3);
        assert_eq!(config.disabled_decoders(), ["gzip"]);
        assert_eq!(config.max_file_size(), DEFAULT_MAX_FILE_SIZE);

        let enabled = config.enabled_format_set(&FormatSet::new());
        let expected: FormatSet = ["zip", "base64"].into_iter().collect();
        assert_eq!(enabled, expected);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(toml::from_str::<ScopeConfig>("max_recursoin = 3").is_err());
    }

    #[test]
    fn test_empty_enabled_formats_means_all_declared() {
        let declared: FormatSet = ["zip", "pdf"].into_iter().collect();
        assert_eq!(ScopeConfig::default().enabled_format_set(&declared), declared);
    }

    #[test]
    fn test_builder_validates_recursion_bound() {
        let err = ScopeConfig::builder().max_recursion(65).build().unwrap_err();
        assert!(matches!(err, ConfigError::ValueOutOfRange { ref field, .. } if field == "max_recursion"));
        assert!(ScopeConfig::builder().max_recursion(64).build().is_ok());
    }

    #[test]
    fn test_builder_validates_globs() {
        let err = ScopeConfig::builder()
            .exclude(vec!["[unclosed".to_string()])
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidGlobPattern { .. }));
    }

    fn rules(list: &[&str]) -> Vec<ExcludeRule> {
        list.iter().map(|p| ExcludeRule::compile(p).unwrap()).collect()
    }

    fn prunes(rules: &[ExcludeRule], dir: &str) -> bool {
        rules.iter().any(|r| r.prunes_dir(dir))
    }

    #[test]
    fn test_recursive_rules_prune_directories() {
        let rules = rules(&["target/**", "**/target/**"]);
        assert!(prunes(&rules, "target"));
        assert!(prunes(&rules, "sub/target"));
        assert!(!prunes(&rules, "src"));
    }

    #[test]
    fn test_bare_rule_prunes_only_top_level() {
        let rules = rules(&["target"]);
        assert!(prunes(&rules, "target"));
        assert!(!prunes(&rules, "sub/target"));
    }

    #[test]
    fn test_walk_root_is_never_pruned() {
        assert!(!prunes(&rules(&["**"]), ""));
    }

    #[test]
    fn test_dir_only_rule() {
        let rule = ExcludeRule::compile("build/").unwrap();
        assert!(rule.prunes_dir("build"));
        assert!(rule.excludes_file("build/out.bin"));
        assert!(!rule.excludes_file("build"));
    }

    #[test]
    fn test_rule_backslashes_are_normalized() {
        assert!(ExcludeRule::compile("vendor\\**").unwrap().prunes_dir("vendor"));
    }

    #[test]
    fn test_validate_and_exclude_rules_agree() {
        let mut config = ScopeConfig::default();
        config.exclude = vec!["ok/**".to_string(), "[".to_string()];
        let err = config.validate().unwrap_err();
        assert_eq!(config.exclude_rules().unwrap_err(), err);
        assert_eq!(
            err,
            ConfigError::InvalidGlobPattern {
                pattern: "[".to_string(),
                error: glob::Pattern::new("[").unwrap_err().to_string(),
            }
        );
    }

    #[test]
    fn test_builder_rejects_zero_limits() {
        assert!(ScopeConfig::builder().read_limit(Some(0)).build().is_err());
        assert!(ScopeConfig::builder().read_limit(Some(512)).build().is_err());
        assert!(ScopeConfig::builder().read_limit(Some(MIN_READ_LIMIT)).build().is_ok());
        assert!(ScopeConfig::builder().max_file_size(0).build().is_err());
    }

    #[test]
    fn test_builder_sets_fields() {
        let config = ScopeConfig::builder()
            .read_limit(Some(4096))
            .enable_format("gzip")
            .signature_file("lib.toml")
            .disable_detector("ModuleDetector")
            .build()
            .unwrap();
        assert_eq!(config.read_limit(), Some(4096));
        assert_eq!(config.enabled_formats(), ["gzip"]);
        assert_eq!(config.signature_file(), Some(Path::new("lib.toml")));
        assert_eq!(config.disabled_detectors(), ["ModuleDetector"]);
    }

    #[test]
    fn test_load_and_load_or_default() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.toml");
        std::fs::write(&good, "max_recursion = 2\n").unwrap();
        assert_eq!(ScopeConfig::load(&good).unwrap().max_recursion(), 2);

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "max_recursion = 100\n").unwrap();
        let (config, warning) = ScopeConfig::load_or_default(Some(&bad));
        assert_eq!(config, ScopeConfig::default());
        assert!(warning.unwrap().contains("max_recursion"));

        let (config, warning) = ScopeConfig::load_or_default(None);
        assert_eq!(config, ScopeConfig::default());
        assert!(warning.is_none());
    }

    #[test]
    fn test_schema_lists_fields() {
        let json = serde_json::to_string(&generate_schema()).unwrap();
        for field in ["max_recursion", "read_limit", "enabled_formats", "exclude"] {
            assert!(json.contains(field), "{field}");
        }
    }
}
