use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

fn default_available() -> bool {
    true
}

/// A language-scoped grouping of themes (`content/universe.{id}.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Universe {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_primary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_accent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default = "default_available")]
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Universe {
    /// `meta.created`, when the manifest records one.
    pub fn created(&self) -> Option<&str> {
        self.meta.as_ref()?.get("created")?.as_str()
    }
}

/// Per-chapter overrides inside a theme manifest.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_gradient: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawn_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wave_duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub particle_effect: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Title used when a chapter config has none: the key with underscores
/// replaced by spaces.
pub fn default_chapter_title(chapter_id: &str) -> String {
    chapter_id.replace('_', " ")
}

/// Chapter configs keyed by chapter id, kept in file order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChapterMap(pub Vec<(String, ChapterConfig)>);

impl ChapterMap {
    pub fn get(&self, id: &str) -> Option<&ChapterConfig> {
        self.0.iter().find(|(key, _)| key == id).map(|(_, c)| c)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ChapterConfig)> {
        self.0.iter().map(|(k, c)| (k, c))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut ChapterConfig)> {
        self.0.iter_mut().map(|(k, c)| (&*k, c))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for ChapterMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, config) in &self.0 {
            map.serialize_entry(key, config)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ChapterMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ChapterMapVisitor;

        impl<'de> Visitor<'de> for ChapterMapVisitor {
            type Value = ChapterMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of chapter id to chapter config")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<ChapterMap, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, config)) = access.next_entry::<String, ChapterConfig>()? {
                    entries.push((key, config));
                }
                Ok(ChapterMap(entries))
            }
        }

        deserializer.deserialize_map(ChapterMapVisitor)
    }
}

/// A theme manifest (`content/{universe}/themes.{id}.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeManifest {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_primary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_accent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_gradient: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub laser_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub particle_effect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(default)]
    pub chapters: ChapterMap,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ThemeManifest {
    /// `meta.created`, when the manifest records one.
    pub fn created(&self) -> Option<&str> {
        self.meta.as_ref()?.get("created")?.as_str()
    }

    /// The store keeps music as JSONB; a bare filename becomes `{"theme": name}`.
    pub fn music_object(&self) -> Option<Value> {
        match self.music.as_ref()? {
            Value::String(name) if name.is_empty() => None,
            Value::String(name) => Some(serde_json::json!({ "theme": name })),
            Value::Null => None,
            other => Some(other.clone()),
        }
    }

    /// Title for a chapter, falling back to the key-derived default.
    pub fn chapter_title(&self, chapter_id: &str) -> String {
        self.chapters
            .get(chapter_id)
            .and_then(|c| c.title.clone())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| default_chapter_title(chapter_id))
    }
}
