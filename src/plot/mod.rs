//! Plot artifacts
//!
//! Backends build a [`Figure`] through [`charts`] and hand it to
//! [`PlotArtifact::render`], which produces the HTML page and the JSON form
//! the materializer persists.

pub mod charts;
pub mod figure;
pub mod theme;

pub use figure::{Figure, Panel, Series, SeriesKind};
pub use theme::PlotTheme;

use serde::{Deserialize, Serialize};

use crate::error::EngineResult;

/// Renderable output of `generate_plot`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotArtifact {
    pub html: String,
    pub json_data: serde_json::Value,
}

impl PlotArtifact {
    pub fn render(figure: &Figure) -> EngineResult<Self> {
        Ok(Self {
            html: figure.to_html()?,
            json_data: figure.to_json()?,
        })
    }
}
