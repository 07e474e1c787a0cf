//! Process-wide plot theme
//!
//! Set once at startup from the `[plot]` config section. Renderers read it
//! through [`get`]; nothing mutates it afterwards.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::config::PlotConfig;

/// Figure geometry, palette and advertised interactive tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotTheme {
    pub width: u32,
    pub height: u32,
    pub panel_height: u32,
    pub line_color: String,
    pub peak_color: String,
    pub tools: Vec<String>,
}

impl From<&PlotConfig> for PlotTheme {
    fn from(cfg: &PlotConfig) -> Self {
        Self {
            width: cfg.width,
            height: cfg.height,
            panel_height: cfg.panel_height,
            line_color: cfg.line_color.clone(),
            peak_color: cfg.peak_color.clone(),
            tools: cfg.tools.clone(),
        }
    }
}

impl Default for PlotTheme {
    fn default() -> Self {
        Self::from(&PlotConfig::default())
    }
}

static THEME: OnceLock<PlotTheme> = OnceLock::new();

/// Install the theme. Later calls are ignored with a warning.
pub fn init(theme: PlotTheme) {
    if THEME.set(theme).is_err() {
        tracing::warn!("plot::theme::init() called more than once, ignoring");
    }
}

/// The installed theme, or one derived from the global config when
/// [`init`] never ran.
pub fn get() -> &'static PlotTheme {
    THEME.get_or_init(|| PlotTheme::from(&crate::config::get().plot))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_theme_matches_config_defaults() {
        let theme = PlotTheme::default();
        assert_eq!(theme.width, 700);
        assert_eq!(theme.height, 400);
        assert_eq!(theme.panel_height, 300);
        assert_eq!(theme.tools, vec!["hover", "box_zoom", "reset", "save"]);
    }
}
