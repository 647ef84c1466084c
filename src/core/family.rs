/// Content-family descriptors: the RON files that drive round synthesis.
///
/// One descriptor covers one theme. It names the chapters to generate, the
/// records to turn into rounds, and the pools and tiers the synthesizer
/// draws from.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::spawn::SpeedTable;
use crate::core::template::ContextTemplates;

#[derive(Debug, Error)]
pub enum FamilyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid family {family}: {reason}")]
    Invalid { family: String, reason: String },
}

/// A near-miss decoy and the gloss shown when the player hits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decoy {
    pub word: String,
    pub gloss: String,
}

/// Where a generated batch lands relative to a chapter file's existing rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Placement {
    #[default]
    Replace,
    Prepend,
    Append,
}

/// One source record. Vocabulary tuples are `(word, answer, part_of_speech, level)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContentRecord {
    Vocab(String, String, String, u32),
    Trivia {
        prompt: String,
        #[serde(default = "default_prompt_type")]
        prompt_type: String,
        answers: Vec<String>,
        #[serde(default = "default_level")]
        level: u32,
        #[serde(default)]
        decoys: Vec<Decoy>,
        #[serde(default)]
        humor: Option<String>,
        #[serde(default)]
        redirect: Option<String>,
        #[serde(default)]
        context: Option<String>,
        #[serde(default)]
        ordered: bool,
    },
}

impl ContentRecord {
    pub fn level(&self) -> u32 {
        match self {
            Self::Vocab(_, _, _, level) => *level,
            Self::Trivia { level, .. } => *level,
        }
    }

    pub fn prompt(&self) -> &str {
        match self {
            Self::Vocab(word, ..) => word,
            Self::Trivia { prompt, .. } => prompt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterSpec {
    pub id: String,
    /// Overrides the family prefix for this chapter.
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub abbr: Option<String>,
    #[serde(default = "default_start_index")]
    pub start_index: u32,
    #[serde(default)]
    pub placement: Placement,
    /// Id the batch's last round points forward to.
    #[serde(default)]
    pub next_sentinel: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub records: Vec<ContentRecord>,
}

/// Points, hp and presentation by level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelTiers {
    /// Levels up to and including this one get the showcase treatment.
    pub showcase_through: u32,
    pub showcase_points: u32,
    pub standard_points: u32,
    pub distractor_points: u32,
    pub hp: u32,
    pub damage: u32,
    pub spawn_spread: f64,
    pub correct_sound: String,
    pub distractor_sound: String,
}

impl Default for LevelTiers {
    fn default() -> Self {
        Self {
            showcase_through: 1,
            showcase_points: 200,
            standard_points: 150,
            distractor_points: 100,
            hp: 1,
            damage: 1,
            spawn_spread: 0.05,
            correct_sound: "bubble_hit_soft".to_string(),
            distractor_sound: "explosion_minor".to_string(),
        }
    }
}

impl LevelTiers {
    pub fn is_showcase(&self, level: u32) -> bool {
        level <= self.showcase_through
    }

    pub fn correct_points(&self, level: u32) -> u32 {
        if self.is_showcase(level) {
            self.showcase_points
        } else {
            self.standard_points
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Palette {
    /// Base and correct colors, cycled by round index.
    pub base: Vec<String>,
    pub distractor: Vec<String>,
    pub humor: String,
}

impl Default for Palette {
    fn default() -> Self {
        let strings = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect();
        Self {
            base: strings(&[
                "#2196F3", "#4CAF50", "#F44336", "#9C27B0", "#00BCD4", "#FF9800", "#607D8B",
                "#795548", "#3F51B5", "#E91E63",
            ]),
            distractor: strings(&["#FF5722", "#9B59B6", "#E91E63", "#FF9800", "#00E676"]),
            humor: "#FFC107".to_string(),
        }
    }
}

impl Palette {
    pub fn base_color(&self, index: u32) -> &str {
        if self.base.is_empty() {
            return "#FFFFFF";
        }
        &self.base[index as usize % self.base.len()]
    }
}

/// Serialized as `meta.difficultyScaling`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DifficultyScaling {
    pub speed_multiplier_per_replay: f64,
    pub color_contrast_fade: bool,
    pub angle_variance: f64,
}

impl Default for DifficultyScaling {
    fn default() -> Self {
        Self {
            speed_multiplier_per_replay: 1.05,
            color_contrast_fade: true,
            angle_variance: 0.3,
        }
    }
}

fn default_prompt_type() -> String {
    "Question".to_string()
}

fn default_level() -> u32 {
    1
}

fn default_start_index() -> u32 {
    1
}

fn default_near_miss_count() -> usize {
    3
}

fn default_wave_duration() -> f64 {
    3.0
}

fn default_true() -> bool {
    true
}

fn default_answer_type() -> String {
    "Translation".to_string()
}

/// A RON content-family descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentFamily {
    pub universe: String,
    pub theme: String,
    pub source: String,
    pub prefix: String,
    pub chapters: Vec<ChapterSpec>,
    #[serde(default)]
    pub decoys: Vec<Decoy>,
    #[serde(default)]
    pub humor: Vec<String>,
    #[serde(default = "default_near_miss_count")]
    pub near_miss_count: usize,
    #[serde(default)]
    pub templates: ContextTemplates,
    #[serde(default)]
    pub tiers: LevelTiers,
    #[serde(default)]
    pub palette: Palette,
    #[serde(default)]
    pub speeds: SpeedTable,
    #[serde(default)]
    pub difficulty_scaling: DifficultyScaling,
    /// Tags added to every round after the chapter and level tags.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_wave_duration")]
    pub wave_duration: f64,
    /// `entry.type` of generated correct answers.
    #[serde(default = "default_answer_type")]
    pub answer_type: String,
    #[serde(default = "default_true")]
    pub link_related: bool,
}

impl ContentFamily {
    pub fn load_from_ron(path: &Path) -> Result<ContentFamily, FamilyError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<ContentFamily, FamilyError> {
        let family: ContentFamily = ron::from_str(input)?;
        family.check()?;
        Ok(family)
    }

    /// Every `.ron` descriptor in `dir`, sorted by path.
    pub fn load_dir(dir: &Path) -> Result<Vec<(PathBuf, ContentFamily)>, FamilyError> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) == Some("ron") {
                paths.push(path);
            }
        }
        paths.sort();
        paths
            .into_iter()
            .map(|path| {
                let family = Self::load_from_ron(&path)?;
                Ok((path, family))
            })
            .collect()
    }

    fn invalid(&self, reason: impl Into<String>) -> FamilyError {
        FamilyError::Invalid {
            family: self.theme.clone(),
            reason: reason.into(),
        }
    }

    fn check(&self) -> Result<(), FamilyError> {
        if self.prefix.is_empty() {
            return Err(self.invalid("prefix is empty"));
        }
        if self.theme.is_empty() || self.universe.is_empty() {
            return Err(self.invalid("universe and theme are required"));
        }
        let mut seen = FxHashSet::default();
        for chapter in &self.chapters {
            if !seen.insert(chapter.id.as_str()) {
                return Err(self.invalid(format!("chapter {} listed twice", chapter.id)));
            }
            for record in &chapter.records {
                if record.level() == 0 {
                    return Err(self.invalid(format!(
                        "record {:?} in {} has level 0",
                        record.prompt(),
                        chapter.id
                    )));
                }
                if let ContentRecord::Trivia { answers, prompt, .. } = record {
                    if answers.is_empty() {
                        return Err(self.invalid(format!("trivia {prompt:?} has no answers")));
                    }
                }
            }
        }
        Ok(())
    }

    /// `(word, answer)` pairs from every vocabulary record, in file order.
    /// Used as the near-miss pool when the family lists no decoys.
    pub fn vocabulary(&self) -> Vec<(&str, &str)> {
        self.chapters
            .iter()
            .flat_map(|c| c.records.iter())
            .filter_map(|r| match r {
                ContentRecord::Vocab(word, answer, _, _) => Some((word.as_str(), answer.as_str())),
                ContentRecord::Trivia { .. } => None,
            })
            .collect()
    }
}
