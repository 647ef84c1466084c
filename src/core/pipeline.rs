/// The content pipeline: synthesis, validation, repair and export over one
/// content tree.
///
/// Built via `ContentPipeline::builder()`, optionally seeded from a
/// `pipeline.ron` configuration file.

use chrono::NaiveDate;
use log::{info, warn};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::discovery::Discovery;
use crate::core::export::{
    export_corpus, ExportError, ExportOptions, ExportSummary, UniverseUuids,
};
use crate::core::family::{ContentFamily, FamilyError, Placement};
use crate::core::ids::{append_batch, prepend_batch, IdError};
use crate::core::loader::{load_chapter_or_empty, write_json, ContentError, Corpus};
use crate::core::repair::{repair_corpus, RepairOptions, RepairSummary};
use crate::core::spawn::{SpawnAllocator, SpawnError};
use crate::core::synth::{ChapterBatch, RoundSynthesizer, SynthError};
use crate::core::validate::{check_round, validate, Severity, ValidationReport};

/// Configuration file read by the tools from the working directory.
pub const CONFIG_FILE: &str = "pipeline.ron";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("content error: {0}")]
    Content(#[from] ContentError),
    #[error("family error: {0}")]
    Family(#[from] FamilyError),
    #[error("synthesis error: {0}")]
    Synth(#[from] SynthError),
    #[error("export error: {0}")]
    Export(#[from] ExportError),
    #[error("id error: {0}")]
    Id(#[from] IdError),
    #[error("spawn error: {0}")]
    Spawn(#[from] SpawnError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid export date {0:?}, expected YYYY-MM-DD")]
    ExportDate(String),
    #[error("validation failed with {} errors", .report.errors().count())]
    Validation { report: ValidationReport },
}

/// Pipeline settings. Every field has a default, so an empty `()` config
/// file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub content_dir: PathBuf,
    pub output_dir: PathBuf,
    pub families_dir: PathBuf,
    pub seed: u64,
    /// `YYYY-MM-DD`; today when unset.
    pub export_date: Option<String>,
    pub delimiter: char,
    /// Refuse to export when validation reports errors.
    pub strict: bool,
    pub randomize_themes: Vec<String>,
    /// JSON object mapping universe slugs to store UUIDs for `themes.universe_id`.
    pub universe_uuid_mapping: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            content_dir: PathBuf::from("content"),
            output_dir: PathBuf::from("export"),
            families_dir: PathBuf::from("families"),
            seed: 42,
            export_date: None,
            delimiter: ',',
            strict: true,
            randomize_themes: Vec::new(),
            universe_uuid_mapping: None,
        }
    }
}

impl PipelineConfig {
    pub fn load_from_ron(path: &Path) -> Result<PipelineConfig, PipelineError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<PipelineConfig, PipelineError> {
        let config: PipelineConfig = ron::from_str(input)?;
        config.export_date()?;
        Ok(config)
    }

    /// The config at `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<PipelineConfig, PipelineError> {
        if path.exists() {
            info!("reading {}", path.display());
            Self::load_from_ron(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn export_date(&self) -> Result<Option<NaiveDate>, PipelineError> {
        self.export_date
            .as_deref()
            .map(|s| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map_err(|_| PipelineError::ExportDate(s.to_string()))
            })
            .transpose()
    }
}

/// What a synthesis run produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynthesisSummary {
    pub families: usize,
    pub rounds_generated: usize,
    pub chapters_written: Vec<PathBuf>,
}

impl fmt::Display for SynthesisSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "families: {}", self.families)?;
        writeln!(f, "rounds generated: {}", self.rounds_generated)?;
        writeln!(f, "chapter files written: {}", self.chapters_written.len())?;
        for path in &self.chapters_written {
            writeln!(f, "  {}", path.display())?;
        }
        Ok(())
    }
}

pub struct ContentPipeline {
    config: PipelineConfig,
    export_date: Option<NaiveDate>,
    spawn: SpawnAllocator,
    families: Option<Vec<ContentFamily>>,
}

pub struct ContentPipelineBuilder {
    config: PipelineConfig,
    export_date: Option<NaiveDate>,
    spawn: Option<SpawnAllocator>,
    /// Directly provided families (for testing without files).
    families: Option<Vec<ContentFamily>>,
}

impl ContentPipelineBuilder {
    /// Start from a loaded configuration; later setters override it.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn content_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.content_dir = path.into();
        self
    }

    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_dir = path.into();
        self
    }

    pub fn families_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.families_dir = path.into();
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn export_date(mut self, date: NaiveDate) -> Self {
        self.export_date = Some(date);
        self
    }

    pub fn delimiter(mut self, delimiter: char) -> Self {
        self.config.delimiter = delimiter;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.config.strict = strict;
        self
    }

    pub fn randomize_theme(mut self, theme: &str) -> Self {
        self.config.randomize_themes.push(theme.to_string());
        self
    }

    pub fn universe_uuid_mapping(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.universe_uuid_mapping = Some(path.into());
        self
    }

    /// Provide families directly instead of reading `families_dir`.
    pub fn with_families(mut self, families: Vec<ContentFamily>) -> Self {
        self.families = Some(families);
        self
    }

    /// Provide the allocator used by the randomize pass.
    pub fn with_spawn(mut self, spawn: SpawnAllocator) -> Self {
        self.spawn = Some(spawn);
        self
    }

    pub fn build(self) -> Result<ContentPipeline, PipelineError> {
        let export_date = match self.export_date {
            Some(date) => Some(date),
            None => self.config.export_date()?,
        };
        let spawn = match self.spawn {
            Some(spawn) => spawn,
            None => SpawnAllocator::new(Default::default(), Default::default())?,
        };
        Ok(ContentPipeline {
            config: self.config,
            export_date,
            spawn,
            families: self.families,
        })
    }
}

impl ContentPipeline {
    pub fn builder() -> ContentPipelineBuilder {
        ContentPipelineBuilder {
            config: PipelineConfig::default(),
            export_date: None,
            spawn: None,
            families: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn families(&self) -> Result<Vec<ContentFamily>, PipelineError> {
        if let Some(families) = &self.families {
            return Ok(families.clone());
        }
        let loaded = ContentFamily::load_dir(&self.config.families_dir)?;
        for (path, family) in &loaded {
            info!("family {} from {}", family.theme, path.display());
        }
        Ok(loaded.into_iter().map(|(_, family)| family).collect())
    }

    /// Generate every family's chapters and splice them into the content tree.
    pub fn synthesize(&self) -> Result<SynthesisSummary, PipelineError> {
        let families = self.families()?;
        let mut summary = SynthesisSummary {
            families: families.len(),
            ..SynthesisSummary::default()
        };

        for family in &families {
            let synth = RoundSynthesizer::builder(family)
                .seed(self.config.seed)
                .build()?;
            for batch in synth.generate()? {
                check_batch(&batch)?;
                summary.rounds_generated += batch.rounds.len();
                let path = self.splice(batch)?;
                summary.chapters_written.push(path);
            }
        }

        info!(
            "synthesized {} rounds into {} chapter files",
            summary.rounds_generated,
            summary.chapters_written.len()
        );
        Ok(summary)
    }

    /// Merge a batch into its chapter file and write it back.
    ///
    /// Rounds already in the file under one of the batch's ids are the
    /// output of an earlier run and are regenerated, not duplicated.
    fn splice(&self, batch: ChapterBatch) -> Result<PathBuf, PipelineError> {
        let path = Discovery::chapter_path(
            &self.config.content_dir,
            &batch.universe,
            &batch.theme,
            &batch.chapter,
        );
        let rounds = match batch.placement {
            Placement::Replace => batch.rounds,
            Placement::Prepend | Placement::Append => {
                let ids: FxHashSet<String> = batch.rounds.iter().map(|r| r.id.clone()).collect();
                let mut existing = load_chapter_or_empty(&path)?;
                existing.retain(|r| !ids.contains(&r.id));
                if batch.placement == Placement::Prepend {
                    prepend_batch(&mut existing, batch.rounds)?;
                } else {
                    append_batch(&mut existing, batch.rounds)?;
                }
                existing
            }
        };
        write_json(&path, &rounds)?;
        info!("{} rounds -> {}", rounds.len(), path.display());
        Ok(path)
    }

    pub fn load(&self) -> Result<Corpus, PipelineError> {
        Ok(Corpus::load(&self.config.content_dir)?)
    }

    /// Load the content tree and run every validation check.
    pub fn validate(&self) -> Result<(Corpus, ValidationReport), PipelineError> {
        let corpus = self.load()?;
        let report = validate(corpus.rounds());
        info!(
            "validated {} rounds: {} errors, {} warnings",
            report.rounds_checked,
            report.errors().count(),
            report.warnings().count()
        );
        Ok((corpus, report))
    }

    /// Validate, then write the relational tables.
    ///
    /// In strict mode any validation error aborts before a file is written.
    pub fn export(&self) -> Result<ExportSummary, PipelineError> {
        let (corpus, report) = self.validate()?;
        if report.has_errors() {
            if self.config.strict {
                return Err(PipelineError::Validation { report });
            }
            warn!(
                "exporting despite {} validation errors",
                report.errors().count()
            );
        }
        let mut options = ExportOptions::new(self.config.delimiter, self.export_date);
        if let Some(path) = &self.config.universe_uuid_mapping {
            let uuids = UniverseUuids::load(path)?;
            if uuids.is_empty() {
                warn!("{} maps no universes", path.display());
            }
            info!("{} universe uuids from {}", uuids.len(), path.display());
            options = options.with_universe_uuids(uuids);
        }
        Ok(export_corpus(&corpus, &self.config.output_dir, &options)?)
    }

    /// Run the repair passes and save the files they changed.
    pub fn repair(&self) -> Result<RepairSummary, PipelineError> {
        let mut corpus = self.load()?;
        let options = RepairOptions {
            seed: self.config.seed,
            randomize_themes: self.config.randomize_themes.clone(),
            ..RepairOptions::default()
        };
        let summary = repair_corpus(&mut corpus, &self.spawn, &options);
        for &i in &summary.changed_themes {
            let theme = &corpus.themes[i];
            write_json(&theme.path, &theme.manifest)?;
        }
        for &i in &summary.changed_chapters {
            let chapter = &corpus.chapters[i];
            write_json(&chapter.path, &chapter.rounds)?;
        }
        Ok(summary)
    }
}

/// Each generated round has to pass the single-round checks.
fn check_batch(batch: &ChapterBatch) -> Result<(), PipelineError> {
    let issues: Vec<_> = batch.rounds.iter().flat_map(check_round).collect();
    for issue in &issues {
        warn!("generated {}: {issue}", batch.chapter);
    }
    if issues.iter().any(|i| i.severity() == Severity::Error) {
        return Err(PipelineError::Validation {
            report: ValidationReport {
                rounds_checked: batch.rounds.len(),
                issues,
            },
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_is_all_defaults() {
        let config = PipelineConfig::parse_ron("()").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.seed, 42);
        assert!(config.strict);
        assert_eq!(config.export_date().unwrap(), None);
    }

    #[test]
    fn config_overrides() {
        let config = PipelineConfig::parse_ron(
            r#"(
                content_dir: "public/content/themes",
                seed: 7,
                export_date: Some("2025-01-15"),
                delimiter: ';',
                randomize_themes: ["weimarer_republik"],
                universe_uuid_mapping: Some("universe_uuid_mapping.json"),
            )"#,
        )
        .unwrap();
        assert_eq!(config.content_dir, PathBuf::from("public/content/themes"));
        assert_eq!(config.output_dir, PathBuf::from("export"));
        assert_eq!(config.delimiter, ';');
        assert_eq!(
            config.universe_uuid_mapping,
            Some(PathBuf::from("universe_uuid_mapping.json"))
        );
        assert_eq!(
            config.export_date().unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 15)
        );
    }

    #[test]
    fn bad_export_date_is_rejected() {
        let result = PipelineConfig::parse_ron(r#"(export_date: Some("15.01.2025"))"#);
        assert!(matches!(result, Err(PipelineError::ExportDate(_))));
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::load_or_default(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn builder_setters_override_config() {
        let pipeline = ContentPipeline::builder()
            .config(PipelineConfig::default())
            .seed(9)
            .strict(false)
            .randomize_theme("brainrot")
            .build()
            .unwrap();
        assert_eq!(pipeline.config().seed, 9);
        assert!(!pipeline.config().strict);
        assert_eq!(pipeline.config().randomize_themes, vec!["brainrot"]);
    }
}
