//! Shared configuration loader for the gfm toolchain.
//!
//! `defaults/gfm.default.toml` is embedded into every binary so that docs and
//! runtime behavior stay in sync. Applications layer user-specific files and
//! `GFM_` environment variables on top of those defaults via [`Loader`] before
//! deserializing into [`GfmConfig`].

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat, Map, ValueKind};
use gfm_babel::{ParserOptions, SerializerOptions};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

const DEFAULT_TOML: &str = include_str!("../defaults/gfm.default.toml");

/// Prefix of the environment variables read by [`Loader::with_env`].
/// `GFM_SERIALIZER__BULLET=-` sets `serializer.bullet`.
pub const ENV_PREFIX: &str = "GFM";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),
    #[error("invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

/// Top-level configuration consumed by gfm applications.
#[derive(Debug, Clone, Deserialize)]
pub struct GfmConfig {
    pub parser: ParserConfig,
    pub serializer: SerializerConfig,
    pub inspect: InspectConfig,
    pub convert: ConvertConfig,
}

/// GFM extensions and limits of the parser.
#[derive(Debug, Clone, Deserialize)]
pub struct ParserConfig {
    pub tables: bool,
    pub strikethrough: bool,
    pub autolinks: bool,
    pub task_lists: bool,
    pub footnotes: bool,
    pub multiline_blockquotes: bool,
    pub frontmatter: bool,
    pub max_nesting: usize,
}

impl From<&ParserConfig> for ParserOptions {
    fn from(config: &ParserConfig) -> Self {
        ParserOptions {
            tables: config.tables,
            strikethrough: config.strikethrough,
            autolinks: config.autolinks,
            task_lists: config.task_lists,
            footnotes: config.footnotes,
            multiline_blockquotes: config.multiline_blockquotes,
            frontmatter: config.frontmatter,
            max_nesting: config.max_nesting,
        }
    }
}

/// Syntax choices for regenerated Markdown.
#[derive(Debug, Clone, Deserialize)]
pub struct SerializerConfig {
    pub passthrough: bool,
    pub bullet: char,
    pub emphasis: String,
    pub strong: String,
    pub fence: String,
    pub horizontal_rule: String,
}

impl SerializerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let checks: [(&str, bool, &str); 5] = [
            ("serializer.bullet", matches!(self.bullet, '*' | '-' | '+'), "expected *, - or +"),
            ("serializer.emphasis", matches!(self.emphasis.as_str(), "_" | "*"), "expected _ or *"),
            ("serializer.strong", matches!(self.strong.as_str(), "**" | "__"), "expected ** or __"),
            (
                "serializer.fence",
                is_run_of(&self.fence, '`') || is_run_of(&self.fence, '~'),
                "expected three or more backticks or tildes",
            ),
            (
                "serializer.horizontal_rule",
                ["---", "***", "___"].contains(&self.horizontal_rule.as_str()),
                "expected ---, *** or ___",
            ),
        ];
        match checks.into_iter().find(|(_, ok, _)| !ok) {
            Some((key, _, message)) => Err(ConfigError::Invalid {
                key: key.to_string(),
                message: message.to_string(),
            }),
            None => Ok(()),
        }
    }
}

fn is_run_of(value: &str, marker: char) -> bool {
    value.chars().count() >= 3 && value.chars().all(|c| c == marker)
}

impl From<&SerializerConfig> for SerializerOptions {
    fn from(config: &SerializerConfig) -> Self {
        SerializerOptions {
            bullet: config.bullet,
            emphasis: config.emphasis.clone(),
            strong: config.strong.clone(),
            fence: config.fence.clone(),
            horizontal_rule: config.horizontal_rule.clone(),
            passthrough: config.passthrough,
        }
    }
}

/// Controls inspect output.
#[derive(Debug, Clone, Deserialize)]
pub struct InspectConfig {
    pub treeviz: TreevizConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TreevizConfig {
    pub ast_full: bool,
    pub show_source: bool,
}

impl TreevizConfig {
    /// Parameters in the shape the treeviz format reads
    pub fn to_params(&self) -> HashMap<String, String> {
        HashMap::from([
            ("ast-full".to_string(), self.ast_full.to_string()),
            ("show-source".to_string(), self.show_source.to_string()),
        ])
    }
}

/// Format-specific conversion knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct ConvertConfig {
    pub html: HtmlConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HtmlConfig {
    pub standalone: bool,
}

/// Helper for layering user overrides over the built-in defaults.
#[derive(Debug, Clone)]
pub struct Loader {
    builder: ConfigBuilder<DefaultState>,
}

impl Loader {
    /// Start a loader seeded with the embedded defaults.
    pub fn new() -> Self {
        let builder = Config::builder().add_source(File::from_str(DEFAULT_TOML, FileFormat::Toml));
        Self { builder }
    }

    /// Layer a configuration file. Missing files trigger an error.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(true);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Layer an optional configuration file (ignored if the file is absent).
    pub fn with_optional_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(false);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Layer `GFM_`-prefixed environment variables.
    pub fn with_env(self) -> Self {
        self.with_env_source(None)
    }

    fn with_env_source(mut self, vars: Option<Map<String, String>>) -> Self {
        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(vars);
        self.builder = self.builder.add_source(environment);
        self
    }

    /// Apply a single key/value override (useful for CLI settings).
    pub fn set_override<I>(mut self, key: &str, value: I) -> Result<Self, ConfigError>
    where
        I: Into<ValueKind>,
    {
        self.builder = self.builder.set_override(key, value)?;
        Ok(self)
    }

    /// Finalize the builder, deserialize and check the resulting configuration.
    pub fn build(self) -> Result<GfmConfig, ConfigError> {
        let config: GfmConfig = self.builder.build()?.try_deserialize()?;
        config.serializer.validate()?;
        Ok(config)
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience helper for callers that only need the defaults.
pub fn load_defaults() -> Result<GfmConfig, ConfigError> {
    Loader::new().build()
}
