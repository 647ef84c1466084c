/// Loading and saving the JSON content tree.
///
/// Malformed files are skipped with a warning, as are records missing a
/// required key. Nothing is fabricated to fill a gap.

use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::discovery::{ContentKind, Discovery, DiscoveryError};
use crate::schema::round::Round;
use crate::schema::theme::{ThemeManifest, Universe};

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("JSON error in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("{} does not hold a JSON array of rounds", path.display())]
    NotAnArray { path: PathBuf },
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

/// A skipped file or record.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadWarning {
    pub path: PathBuf,
    pub message: String,
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

#[derive(Debug, Clone)]
pub struct ChapterFile {
    pub path: PathBuf,
    pub universe: String,
    pub theme: String,
    pub chapter: String,
    pub rounds: Vec<Round>,
}

#[derive(Debug, Clone)]
pub struct ThemeFile {
    pub path: PathBuf,
    pub universe: String,
    pub manifest: ThemeManifest,
}

#[derive(Debug, Clone)]
pub struct UniverseFile {
    pub path: PathBuf,
    pub manifest: Universe,
}

/// Everything loaded from one content root.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub root: PathBuf,
    pub universes: Vec<UniverseFile>,
    pub themes: Vec<ThemeFile>,
    pub chapters: Vec<ChapterFile>,
    pub warnings: Vec<LoadWarning>,
    pub files_scanned: usize,
    pub level_variants_skipped: usize,
}

fn read_json(path: &Path) -> Result<Value, ContentError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ContentError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| ContentError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Pretty JSON with two-space indent and a trailing newline.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ContentError> {
    let mut text = serde_json::to_string_pretty(value).map_err(|source| ContentError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    text.push('\n');
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ContentError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, text).map_err(|source| ContentError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Rounds in one chapter file, plus a warning per skipped record.
///
/// Errors only when the file as a whole is unusable.
pub fn load_chapter_file(path: &Path) -> Result<(Vec<Round>, Vec<LoadWarning>), ContentError> {
    let Value::Array(items) = read_json(path)? else {
        return Err(ContentError::NotAnArray {
            path: path.to_path_buf(),
        });
    };

    let mut rounds = Vec::with_capacity(items.len());
    let mut warnings = Vec::new();
    for (i, item) in items.into_iter().enumerate() {
        let id = item
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        let Some(id) = id else {
            warnings.push(LoadWarning {
                path: path.to_path_buf(),
                message: format!("record {i} has no id, skipped"),
            });
            continue;
        };
        match serde_json::from_value::<Round>(item) {
            Ok(round) => rounds.push(round),
            Err(e) => warnings.push(LoadWarning {
                path: path.to_path_buf(),
                message: format!("round {id} skipped: {e}"),
            }),
        }
    }
    Ok((rounds, warnings))
}

/// Rounds in a chapter file, or an empty list when it does not exist yet.
pub fn load_chapter_or_empty(path: &Path) -> Result<Vec<Round>, ContentError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let (rounds, warnings) = load_chapter_file(path)?;
    for w in &warnings {
        warn!("{w}");
    }
    Ok(rounds)
}

impl Corpus {
    pub fn load(root: &Path) -> Result<Corpus, ContentError> {
        let discovery = Discovery::scan(root)?;
        let mut corpus = Corpus {
            root: root.to_path_buf(),
            level_variants_skipped: discovery.level_variants(),
            ..Corpus::default()
        };

        for file in &discovery.files {
            match &file.kind {
                ContentKind::UniverseManifest { .. } => {
                    corpus.files_scanned += 1;
                    if let Some(manifest) = corpus.load_manifest::<Universe>(&file.path) {
                        corpus.universes.push(UniverseFile {
                            path: file.path.clone(),
                            manifest,
                        });
                    }
                }
                ContentKind::ThemeManifest { universe, .. } => {
                    corpus.files_scanned += 1;
                    if let Some(manifest) = corpus.load_manifest::<ThemeManifest>(&file.path) {
                        corpus.themes.push(ThemeFile {
                            path: file.path.clone(),
                            universe: universe.clone(),
                            manifest,
                        });
                    }
                }
                ContentKind::Chapter {
                    universe,
                    theme,
                    chapter,
                } => {
                    corpus.files_scanned += 1;
                    match load_chapter_file(&file.path) {
                        Ok((rounds, warnings)) => {
                            debug!("{}: {} rounds", file.path.display(), rounds.len());
                            corpus.record_warnings(warnings);
                            corpus.chapters.push(ChapterFile {
                                path: file.path.clone(),
                                universe: universe.clone(),
                                theme: theme.clone(),
                                chapter: chapter.clone(),
                                rounds,
                            });
                        }
                        Err(e) => corpus.warn_file(&file.path, e.to_string()),
                    }
                }
                ContentKind::LevelVariant { .. } => {
                    debug!("skipping level variant {}", file.path.display());
                }
                ContentKind::Other => {}
            }
        }

        Ok(corpus)
    }

    fn warn_file(&mut self, path: &Path, message: String) {
        let warning = LoadWarning {
            path: path.to_path_buf(),
            message,
        };
        warn!("{warning}");
        self.warnings.push(warning);
    }

    fn record_warnings(&mut self, warnings: Vec<LoadWarning>) {
        for w in warnings {
            warn!("{w}");
            self.warnings.push(w);
        }
    }

    fn load_manifest<T: serde::de::DeserializeOwned>(&mut self, path: &Path) -> Option<T> {
        let value = match read_json(path) {
            Ok(value) => value,
            Err(e) => {
                self.warn_file(path, e.to_string());
                return None;
            }
        };
        let has_id = value
            .get("id")
            .and_then(Value::as_str)
            .is_some_and(|id| !id.is_empty());
        if !has_id {
            self.warn_file(path, "manifest has no id, skipped".to_string());
            return None;
        }
        match serde_json::from_value(value) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                self.warn_file(path, format!("manifest skipped: {e}"));
                None
            }
        }
    }

    pub fn rounds(&self) -> impl Iterator<Item = &Round> {
        self.chapters.iter().flat_map(|c| c.rounds.iter())
    }

    pub fn round_count(&self) -> usize {
        self.chapters.iter().map(|c| c.rounds.len()).sum()
    }

}
