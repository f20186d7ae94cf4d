/*!
 * Story context types.
 *
 * Field names follow the JSON shape the extraction prompt asks the model for
 * (`plotPoints` in camelCase), with snake_case accepted as an alias.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of plot points kept in a story context
pub const PLOT_POINT_WINDOW: usize = 20;

/// A named character
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personality: Option<String>,
}

/// An invented or domain term and its meaning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub term: String,
    #[serde(default)]
    pub meaning: String,
}

/// A location in the story world
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setting {
    pub location: String,
    #[serde(default)]
    pub description: String,
}

/// A notable event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotPoint {
    pub point: String,
    #[serde(default)]
    pub description: String,
}

/// Context extracted from one chapter, or accumulated for a story
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedContext {
    #[serde(default)]
    pub characters: Vec<Character>,
    #[serde(default)]
    pub terms: Vec<Term>,
    #[serde(default)]
    pub settings: Vec<Setting>,
    #[serde(default, rename = "plotPoints", alias = "plot_points")]
    pub plot_points: Vec<PlotPoint>,
}

impl ExtractedContext {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
            && self.terms.is_empty()
            && self.settings.is_empty()
            && self.plot_points.is_empty()
    }

    /// Total number of entries across all four lists
    pub fn len(&self) -> usize {
        self.characters.len() + self.terms.len() + self.settings.len() + self.plot_points.len()
    }
}

/// Accumulated context of a story, versioned for optimistic writes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryContext {
    pub story_id: String,
    pub context: ExtractedContext,
    /// Starts at 1 and increases by one on every write
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

/// Normalized identity key for characters, terms and settings
pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}
