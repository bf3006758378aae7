use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const DEFAULT_HISTORY_LEN: usize = 10;

/// Engine settings. Every field has a default, so a config file only needs
/// the keys it overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory inside the asset bundle holding the lexicon and glyphs.
    pub assets_dir: String,
    /// Lexicon file stem; the member read is `<assets_dir>/<lexicon_file>.xml`.
    pub lexicon_file: String,
    /// Host that glyph image URLs resolve against.
    pub asset_host: String,
    /// Prefix for cross-reference links (`<link_base>/entry/entry/<form>`).
    pub link_base: String,
    pub page_size: usize,
    pub history_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            assets_dir: "assets".to_string(),
            lexicon_file: "dingfubao".to_string(),
            asset_host: "localhost".to_string(),
            link_base: String::new(),
            page_size: DEFAULT_PAGE_SIZE,
            history_len: DEFAULT_HISTORY_LEN,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be at least 1".into()));
        }
        if self.lexicon_file.trim().is_empty() {
            return Err(ConfigError::Invalid("lexicon_file cannot be empty".into()));
        }
        Ok(())
    }

    pub fn lexicon_path(&self) -> String {
        format!("{}/{}.xml", self.assets_dir, self.lexicon_file)
    }

    pub fn glyph_path(&self, id: &str) -> String {
        format!("{}/gaiji/{id}.png", self.assets_dir)
    }

    /// Prefix that glyph placeholders are rewritten to when rendering.
    pub fn glyph_url_prefix(&self) -> String {
        format!("https://{}/{}/gaiji", self.asset_host, self.assets_dir)
    }

    pub fn entry_link(&self, form: &str) -> String {
        format!("{}/entry/entry/{form}", self.link_base)
    }
}
