//! Colour themes.
//!
//! A theme swaps the colour of every primitive whose colour code it lists,
//! without touching the loaded model. Theme colour and ghosting compose, so
//! a themed part from an earlier step shows as a faded themed part.
//!
//! Themes come from a catalog served as JSON:
//!
//! ```json
//! { "themes": [ { "name": "ocean", "description": "Blues and teals",
//!                 "part_id_to_color": { "4": "#1E5AA8", "14": [0, 170, 164] } } ] }
//! ```

use super::presentation::refresh_material;
use crate::error::Result;
use crate::scene::{Material, Scene};
use crate::types::Color;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Emissive strength of themed materials, relative to the theme colour.
const THEME_EMISSIVE: f32 = 0.15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorTheme {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Colour code to replacement colour.
    #[serde(default, alias = "partIdToColor", alias = "colors")]
    pub part_id_to_color: HashMap<u32, Color>,
}

impl ColorTheme {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            part_id_to_color: HashMap::new(),
        }
    }

    pub fn with_color(mut self, color_id: u32, color: Color) -> Self {
        self.part_id_to_color.insert(color_id, color);
        self
    }

    pub fn color_for(&self, color_id: u32) -> Option<Color> {
        self.part_id_to_color.get(&color_id).copied()
    }

    pub fn covers(&self, color_id: u32) -> bool {
        self.part_id_to_color.contains_key(&color_id)
    }
}

/// The list of themes offered to the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThemeCatalog {
    #[serde(default)]
    pub themes: Vec<ColorTheme>,
}

impl ThemeCatalog {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn find(&self, name: &str) -> Option<&ColorTheme> {
        self.themes.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.themes.iter().map(|t| t.name.as_str())
    }
}

/// Replace colour and emissive of a material.
pub(crate) fn recolor(material: &mut Material, color: Color) {
    material.color = color;
    material.emissive = color.scaled(THEME_EMISSIVE);
}

/// Apply a theme, replacing any previous one.
pub fn apply_theme(scene: &mut Scene, theme: ColorTheme) {
    debug!("applying theme '{}'", theme.name);
    let previous = scene.theme.replace(theme);
    refresh_touched(scene, previous.as_ref());
}

/// Remove the theme; touched primitives go back to their original look
/// (ghosted if their step is already built).
pub fn revert_theme(scene: &mut Scene) {
    let previous = scene.theme.take();
    refresh_touched(scene, previous.as_ref());
}

/// Re-derive primitives covered by the old or the current theme.
fn refresh_touched(scene: &mut Scene, previous: Option<&ColorTheme>) {
    let touched: Vec<_> = scene
        .primitives()
        .filter(|&id| {
            let color_id = scene.node(id).color_id;
            previous.is_some_and(|t| t.covers(color_id))
                || scene.theme().is_some_and(|t| t.covers(color_id))
        })
        .collect();
    for id in touched {
        refresh_material(scene, id);
    }
}
