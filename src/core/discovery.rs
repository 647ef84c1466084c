/// Content tree discovery.
///
/// Layout under the content root:
/// - `universe.{id}.json`: universe manifests
/// - `{universe}/themes.{theme}.json`: theme manifests
/// - `{universe}/{theme}/{chapter}.json`: chapter round arrays
/// - `{universe}/{theme}/{chapter}.{n}.json`: per-level variants, never exported

use log::warn;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("content root not found: {}", .0.display())]
    MissingRoot(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentKind {
    UniverseManifest {
        universe: String,
    },
    ThemeManifest {
        universe: String,
        theme: String,
    },
    Chapter {
        universe: String,
        theme: String,
        chapter: String,
    },
    LevelVariant {
        universe: String,
        theme: String,
        chapter: String,
        level: u32,
    },
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFile {
    pub path: PathBuf,
    pub kind: ContentKind,
}

/// Classify a path relative to the content root.
pub fn classify(relative: &Path) -> ContentKind {
    let parts: Vec<&str> = relative.iter().filter_map(|p| p.to_str()).collect();
    if parts.len() != relative.iter().count() {
        return ContentKind::Other;
    }
    let Some(file) = parts.last() else {
        return ContentKind::Other;
    };
    let Some(stem) = file.strip_suffix(".json") else {
        return ContentKind::Other;
    };
    if stem.is_empty() || stem.starts_with('.') {
        return ContentKind::Other;
    }

    match parts.as_slice() {
        [_] => match stem.strip_prefix("universe.") {
            Some(id) if !id.is_empty() => ContentKind::UniverseManifest {
                universe: id.to_string(),
            },
            _ => ContentKind::Other,
        },
        [universe, _] => match stem.strip_prefix("themes.") {
            Some(id) if !id.is_empty() => ContentKind::ThemeManifest {
                universe: universe.to_string(),
                theme: id.to_string(),
            },
            _ => ContentKind::Other,
        },
        [universe, theme, _] => {
            if stem.starts_with("themes.") {
                return ContentKind::Other;
            }
            let (universe, theme) = (universe.to_string(), theme.to_string());
            match stem.rsplit_once('.') {
                Some((chapter, level))
                    if !chapter.is_empty()
                        && !level.is_empty()
                        && level.bytes().all(|b| b.is_ascii_digit()) =>
                {
                    ContentKind::LevelVariant {
                        universe,
                        theme,
                        chapter: chapter.to_string(),
                        level: level.parse().unwrap_or(0),
                    }
                }
                _ => ContentKind::Chapter {
                    universe,
                    theme,
                    chapter: stem.to_string(),
                },
            }
        }
        _ => ContentKind::Other,
    }
}

/// Every classified file under `root`, sorted by path.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub root: PathBuf,
    pub files: Vec<ContentFile>,
}

impl Discovery {
    pub fn scan(root: &Path) -> Result<Discovery, DiscoveryError> {
        if !root.is_dir() {
            return Err(DiscoveryError::MissingRoot(root.to_path_buf()));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(root).min_depth(1).max_depth(3).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("skipping unreadable entry under {}: {e}", root.display());
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.into_path();
            let kind = match path.strip_prefix(root) {
                Ok(relative) => classify(relative),
                Err(_) => ContentKind::Other,
            };
            files.push(ContentFile { path, kind });
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(Discovery {
            root: root.to_path_buf(),
            files,
        })
    }

    pub fn level_variants(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.kind, ContentKind::LevelVariant { .. }))
            .count()
    }

    /// Path a chapter file would have, whether or not it exists yet.
    pub fn chapter_path(root: &Path, universe: &str, theme: &str, chapter: &str) -> PathBuf {
        root.join(universe).join(theme).join(format!("{chapter}.json"))
    }
}
