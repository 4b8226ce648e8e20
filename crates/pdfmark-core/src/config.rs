//! Editor configuration
//!
//! TOML-based settings for rendering, burned selection styling and the
//! upload endpoint. Every field has a default, so an empty file is valid.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::annotation::TextStyle;
use crate::burn::{
    BurnOptions, DEFAULT_LABEL_FONT_SIZE, DEFAULT_LABEL_INSET, DEFAULT_SELECTION_OPACITY,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorConfig {
    /// Screen pixels per PDF point (default: 1.5)
    #[serde(default = "default_render_scale")]
    pub render_scale: f64,
    /// Vertical gap between rendered pages in pixels (default: 16)
    #[serde(default = "default_page_gap")]
    pub page_gap: f64,
    /// Style applied to new text fields
    #[serde(default)]
    pub text: TextStyle,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            render_scale: default_render_scale(),
            page_gap: default_page_gap(),
            text: TextStyle::default(),
            selection: SelectionConfig::default(),
            upload: UploadConfig::default(),
        }
    }
}

impl EditorConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the TOML is malformed
    ///
    /// # Example
    ///
    /// ```no_run
    /// use pdfmark_core::config::EditorConfig;
    ///
    /// # fn example() -> anyhow::Result<()> {
    /// let config = EditorConfig::from_file("pdfmark.toml")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string
    ///
    /// # Example
    ///
    /// ```
    /// use pdfmark_core::config::EditorConfig;
    ///
    /// # fn example() -> anyhow::Result<()> {
    /// let config = EditorConfig::from_str(r#"
    ///     render_scale = 2.0
    ///
    ///     [upload]
    ///     base_url = "https://api.example.com"
    /// "#)?;
    /// assert_eq!(config.page_gap, 16.0);
    /// # Ok(())
    /// # }
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        toml::from_str(s).context("Failed to parse TOML configuration")
    }

    pub fn burn_options(&self) -> BurnOptions {
        BurnOptions {
            selection_opacity: self.selection.opacity,
            label_font_size: self.selection.label_font_size,
            label_inset: self.selection.label_inset,
        }
    }
}

fn default_render_scale() -> f64 {
    1.5
}

fn default_page_gap() -> f64 {
    16.0
}

/// How burned selection highlights look
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Fill opacity, 0-1 (default: 0.35)
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    /// Label size in points (default: 8)
    #[serde(default = "default_label_font_size")]
    pub label_font_size: f64,
    /// Label offset from the highlight's bottom-left corner in points (default: 2)
    #[serde(default = "default_label_inset")]
    pub label_inset: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            opacity: default_opacity(),
            label_font_size: default_label_font_size(),
            label_inset: default_label_inset(),
        }
    }
}

fn default_opacity() -> f32 {
    DEFAULT_SELECTION_OPACITY
}

fn default_label_font_size() -> f64 {
    DEFAULT_LABEL_FONT_SIZE
}

fn default_label_inset() -> f64 {
    DEFAULT_LABEL_INSET
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadConfig {
    /// API root; uploads go to `{base_url}/documents/{id}/save-edit`
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl UploadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}
