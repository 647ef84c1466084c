/// Relational export: one delimited file per table.
///
/// Rows are derived from a loaded [`Corpus`] and fully regenerated on each
/// run. Level variants never reach this module; the loader drops them.

use chrono::NaiveDate;
use log::{debug, info, warn};
use rustc_hash::FxHashMap;
use serde_json::{json, Map, Value};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::encode::{Cell, EncodeError, TableWriter};
use crate::core::flatten::ObjectRow;
use crate::core::loader::{ChapterFile, Corpus};
use crate::schema::round::{ObjectType, Round};
use crate::schema::theme::ChapterConfig;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("encoding {table}: {source}")]
    Encode { table: Table, source: EncodeError },
    #[error("cannot read universe mapping {}: {source}", path.display())]
    MappingIo {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid universe mapping {}: {source}", path.display())]
    Mapping {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Target tables, in the order they are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Universes,
    Themes,
    Chapters,
    Rounds,
    RoundObjects,
}

impl Table {
    pub const ALL: [Table; 5] = [
        Table::Universes,
        Table::Themes,
        Table::Chapters,
        Table::Rounds,
        Table::RoundObjects,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::Universes => "universes",
            Table::Themes => "themes",
            Table::Chapters => "chapters",
            Table::Rounds => "rounds",
            Table::RoundObjects => "round_objects",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.csv", self.name())
    }

    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Table::Universes => &[
                "id",
                "name",
                "description",
                "color_primary",
                "color_accent",
                "icon",
                "available",
                "language",
                "created_at",
                "updated_at",
            ],
            Table::Themes => &[
                "id",
                "universe_id",
                "name",
                "description",
                "color_primary",
                "color_accent",
                "background_gradient",
                "laser_color",
                "icon",
                "music",
                "particle_effect",
                "created_at",
                "updated_at",
            ],
            Table::Chapters => &[
                "id",
                "themes_uuid",
                "title",
                "description",
                "backgroundimage",
                "background_gradient",
                "meta",
                "created_at",
                "updated_at",
            ],
            Table::Rounds => &[
                "id",
                "chapter_id",
                "level",
                "published",
                "wave_duration",
                "meta_source",
                "meta_tags",
                "meta_related",
                "meta_difficulty_scaling",
                "created_at",
                "updated_at",
            ],
            Table::RoundObjects => &[
                "id",
                "round_id",
                "theme_id",
                "object_type",
                "order_index",
                "word",
                "entry_type",
                "image",
                "visual",
                "spawn_position",
                "spawn_spread",
                "spawn_delay",
                "speed",
                "points",
                "hp",
                "pattern",
                "collection_order",
                "damage",
                "behavior",
                "redirect",
                "context",
                "sound",
                "created_at",
                "updated_at",
            ],
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Universe slug to the store's universe UUID.
///
/// Read from a JSON object such as `{"englisch": "3f2c..."}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniverseUuids(FxHashMap<String, String>);

impl UniverseUuids {
    pub fn load(path: &Path) -> Result<Self, ExportError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ExportError::MappingIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents).map_err(|source| ExportError::Mapping {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(input: &str) -> Result<Self, serde_json::Error> {
        let map: FxHashMap<String, String> = serde_json::from_str(input)?;
        Ok(Self(
            map.into_iter()
                .map(|(id, uuid)| (id.trim().to_string(), uuid.trim().to_string()))
                .filter(|(id, uuid)| !id.is_empty() && !uuid.is_empty())
                .collect(),
        ))
    }

    pub fn resolve(&self, universe: &str) -> Option<&str> {
        self.0.get(universe).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for UniverseUuids {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub delimiter: char,
    /// `updated_at` for every row, and `created_at` where the content has none.
    pub export_date: NaiveDate,
    /// When set, `themes.universe_id` holds the universe's UUID instead of
    /// its slug. Unmapped universes export as NULL.
    pub universe_uuids: Option<UniverseUuids>,
}

impl ExportOptions {
    /// Falls back to today's local date.
    pub fn new(delimiter: char, export_date: Option<NaiveDate>) -> Self {
        Self {
            delimiter,
            export_date: export_date.unwrap_or_else(|| chrono::Local::now().date_naive()),
            universe_uuids: None,
        }
    }

    pub fn with_universe_uuids(mut self, uuids: UniverseUuids) -> Self {
        self.universe_uuids = Some(uuids);
        self
    }

    fn universe_cell(&self, theme_id: &str, universe: &str) -> Cell {
        let Some(uuids) = &self.universe_uuids else {
            return Cell::text(universe);
        };
        match uuids.resolve(universe) {
            Some(uuid) => Cell::text(uuid),
            None => {
                warn!("theme {theme_id}: no uuid for universe {universe}");
                Cell::Null
            }
        }
    }

    fn date(&self) -> String {
        self.export_date.format("%Y-%m-%d").to_string()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExportSummary {
    pub files_scanned: usize,
    pub level_variants_skipped: usize,
    pub rows: FxHashMap<Table, usize>,
    pub objects_by_type: FxHashMap<ObjectType, usize>,
    /// Universes with themes but no entry in the UUID mapping.
    pub unmapped_universes: Vec<String>,
    pub written: Vec<PathBuf>,
}

impl ExportSummary {
    pub fn rows_in(&self, table: Table) -> usize {
        self.rows.get(&table).copied().unwrap_or(0)
    }
}

impl fmt::Display for ExportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "files scanned: {}", self.files_scanned)?;
        writeln!(f, "level variants skipped: {}", self.level_variants_skipped)?;
        for table in Table::ALL {
            writeln!(f, "{:<14} {:>6} rows", table, self.rows_in(table))?;
        }
        for kind in [ObjectType::Base, ObjectType::Correct, ObjectType::Distractor] {
            let n = self.objects_by_type.get(&kind).copied().unwrap_or(0);
            writeln!(f, "  {:<12} {:>6}", kind.as_str(), n)?;
        }
        if !self.unmapped_universes.is_empty() {
            writeln!(f, "unmapped universes: {}", self.unmapped_universes.join(", "))?;
        }
        Ok(())
    }
}

/// Write all five tables into `out_dir`.
pub fn export_corpus(
    corpus: &Corpus,
    out_dir: &Path,
    options: &ExportOptions,
) -> Result<ExportSummary, ExportError> {
    std::fs::create_dir_all(out_dir).map_err(|source| ExportError::Io {
        path: out_dir.to_path_buf(),
        source,
    })?;

    let mut summary = ExportSummary {
        files_scanned: corpus.files_scanned,
        level_variants_skipped: corpus.level_variants_skipped,
        ..ExportSummary::default()
    };

    for table in Table::ALL {
        let path = out_dir.join(table.file_name());
        let file = File::create(&path).map_err(|source| ExportError::Io {
            path: path.clone(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        let rows = write_table(table, corpus, options, &mut writer)?;
        writer.flush().map_err(|source| ExportError::Io {
            path: path.clone(),
            source,
        })?;
        info!("wrote {rows} rows to {}", path.display());
        summary.rows.insert(table, rows);
        summary.written.push(path);
    }

    for chapter in &corpus.chapters {
        for round in &chapter.rounds {
            for (_, object) in round.objects() {
                *summary.objects_by_type.entry(object.object_type()).or_insert(0) += 1;
            }
        }
    }

    if let Some(uuids) = &options.universe_uuids {
        let mut unmapped: Vec<String> = corpus
            .themes
            .iter()
            .filter(|t| uuids.resolve(&t.universe).is_none())
            .map(|t| t.universe.clone())
            .collect();
        unmapped.sort();
        unmapped.dedup();
        summary.unmapped_universes = unmapped;
    }

    Ok(summary)
}

/// Encode one table into any writer. Returns the record count.
pub fn write_table<W: Write>(
    table: Table,
    corpus: &Corpus,
    options: &ExportOptions,
    out: W,
) -> Result<usize, ExportError> {
    let encode = |source| ExportError::Encode { table, source };
    let mut writer = TableWriter::new(out, table.columns(), options.delimiter).map_err(encode)?;
    for record in records(table, corpus, options) {
        writer.write_record(&record).map_err(encode)?;
    }
    let count = writer.records();
    writer.finish().map_err(encode)?;
    Ok(count)
}

fn records(table: Table, corpus: &Corpus, options: &ExportOptions) -> Vec<Vec<Cell>> {
    let today = options.date();
    match table {
        Table::Universes => corpus
            .universes
            .iter()
            .map(|u| {
                let m = &u.manifest;
                vec![
                    Cell::text(&m.id),
                    Cell::text(&m.name),
                    Cell::opt_text(m.description.as_deref()),
                    Cell::opt_text(m.color_primary.as_deref()),
                    Cell::opt_text(m.color_accent.as_deref()),
                    Cell::opt_text(m.icon.as_deref()),
                    Cell::Bool(m.available),
                    Cell::opt_text(m.language.as_deref()),
                    Cell::text(m.created().unwrap_or(today.as_str())),
                    Cell::text(&today),
                ]
            })
            .collect(),
        Table::Themes => corpus
            .themes
            .iter()
            .map(|t| {
                let m = &t.manifest;
                vec![
                    Cell::text(&m.id),
                    options.universe_cell(&m.id, &t.universe),
                    Cell::text(&m.name),
                    Cell::opt_text(m.description.as_deref()),
                    Cell::opt_text(m.color_primary.as_deref()),
                    Cell::opt_text(m.color_accent.as_deref()),
                    Cell::opt_json(m.background_gradient.clone()),
                    Cell::opt_text(m.laser_color.as_deref()),
                    Cell::opt_text(m.icon.as_deref()),
                    Cell::opt_json(m.music_object()),
                    Cell::opt_text(m.particle_effect.as_deref()),
                    Cell::text(m.created().unwrap_or(today.as_str())),
                    Cell::text(&today),
                ]
            })
            .collect(),
        Table::Chapters => corpus
            .themes
            .iter()
            .flat_map(|t| {
                let created = t.manifest.created().unwrap_or(today.as_str()).to_string();
                let today = &today;
                t.manifest.chapters.iter().map(move |(id, config)| {
                    vec![
                        Cell::text(id),
                        Cell::text(&t.manifest.id),
                        Cell::text(t.manifest.chapter_title(id)),
                        Cell::Null,
                        Cell::opt_text(config.background_image.as_deref()),
                        Cell::Json(config.background_gradient.clone().unwrap_or_else(|| json!([]))),
                        Cell::opt_json(chapter_meta(config)),
                        Cell::text(&created),
                        Cell::text(today),
                    ]
                })
            })
            .collect(),
        Table::Rounds => corpus
            .chapters
            .iter()
            .flat_map(|chapter| {
                let fallback = chapter_created(chapter, &today);
                let today = &today;
                chapter.rounds.iter().map(move |round| round_record(round, &fallback, today))
            })
            .collect(),
        Table::RoundObjects => corpus
            .chapters
            .iter()
            .flat_map(|chapter| {
                let fallback = chapter_created(chapter, &today);
                let today = &today;
                chapter.rounds.iter().flat_map(move |round| {
                    let created = round.meta.created.clone().unwrap_or_else(|| fallback.clone());
                    round.objects().map(move |(i, object)| {
                        object_record(&ObjectRow::from_object(round, i, object), &created, today)
                    })
                })
            })
            .collect(),
    }
}

/// First round's `meta.created`, else the export date.
fn chapter_created(chapter: &ChapterFile, today: &str) -> String {
    let created = chapter
        .rounds
        .first()
        .and_then(|r| r.meta.created.clone())
        .unwrap_or_else(|| today.to_string());
    debug!("{}: created_at {created}", chapter.path.display());
    created
}

fn chapter_meta(config: &ChapterConfig) -> Option<Value> {
    let mut meta = Map::new();
    if let Some(rate) = config.spawn_rate {
        meta.insert("spawnRate".to_string(), json!(rate));
    }
    if let Some(duration) = config.wave_duration {
        meta.insert("waveDuration".to_string(), json!(duration));
    }
    if let Some(music) = &config.music {
        meta.insert("music".to_string(), music.clone());
    }
    if let Some(effect) = &config.particle_effect {
        meta.insert("particleEffect".to_string(), json!(effect));
    }
    (!meta.is_empty()).then_some(Value::Object(meta))
}

fn round_record(round: &Round, fallback_created: &str, today: &str) -> Vec<Cell> {
    let related = &round.meta.related;
    vec![
        Cell::text(&round.id),
        Cell::text(&round.chapter),
        Cell::Int(i64::from(round.level)),
        Cell::Bool(round.published.unwrap_or(true)),
        Cell::opt_float(round.wave_duration),
        Cell::opt_text(round.meta.source.as_deref()),
        Cell::array(round.meta.tags.iter().cloned()),
        Cell::Array(vec![related.previous.clone(), related.next.clone()]),
        Cell::opt_json(round.meta.difficulty_scaling.clone()),
        Cell::text(round.meta.created.as_deref().unwrap_or(fallback_created)),
        Cell::text(today),
    ]
}

fn object_record(row: &ObjectRow, created: &str, today: &str) -> Vec<Cell> {
    vec![
        // Assigned by the store.
        Cell::Null,
        Cell::text(&row.round_id),
        Cell::text(&row.theme_id),
        Cell::opt_text(row.object_type.map(|t| t.as_str())),
        Cell::Int(row.order_index as i64),
        Cell::opt_text(row.word.as_deref()),
        Cell::opt_text(row.entry_type.as_deref()),
        Cell::opt_text(row.image.as_deref()),
        Cell::opt_json(row.visual.clone().map(Value::Object)),
        Cell::opt_float(row.spawn_position),
        Cell::opt_float(row.spawn_spread),
        Cell::opt_float(row.spawn_delay),
        Cell::opt_float(row.speed),
        Cell::opt_int(row.points),
        Cell::opt_int(row.hp),
        Cell::opt_text(row.pattern.as_ref().map(|m| m.as_str())),
        Cell::opt_int(row.collection_order),
        Cell::opt_int(row.damage),
        Cell::opt_text(row.behavior.as_ref().map(|m| m.as_str())),
        Cell::opt_text(row.redirect.as_deref()),
        Cell::opt_text(row.context.as_deref()),
        Cell::opt_text(row.sound.as_deref()),
        Cell::text(created),
        Cell::text(today),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loader::{ThemeFile, UniverseFile};
    use crate::schema::round::{BaseObject, CorrectObject, DistractorObject, Entry, Motion};
    use crate::schema::theme::{ChapterMap, ThemeManifest, Universe};

    fn options() -> ExportOptions {
        ExportOptions::new(',', NaiveDate::from_ymd_opt(2025, 1, 15))
    }

    fn round() -> Round {
        let mut round = Round {
            id: "BR_IT_001".to_string(),
            theme: "brainrot".to_string(),
            chapter: "Italian".to_string(),
            level: 1,
            published: None,
            wave_duration: Some(3.0),
            base: BaseObject {
                entry: Entry::word("Tralalero", "Meme"),
                ..Default::default()
            },
            correct: vec![CorrectObject {
                entry: Entry::word("Tralala", "Translation"),
                spawn_position: 0.4,
                spawn_spread: Some(0.05),
                spawn_delay: None,
                speed: 1.0,
                points: Some(200),
                pattern: Some(Motion::Zigzag),
                hp: Some(1),
                collection_order: Some(1),
                context: Some("Tralalero = Tralala".to_string()),
                visual: Default::default(),
                sound: None,
                extra: Default::default(),
            }],
            distractors: vec![DistractorObject {
                entry: Entry::word("Bombardiro", "Wrong"),
                spawn_position: 0.8,
                spawn_spread: None,
                spawn_delay: None,
                speed: 1.12,
                points: Some(100),
                hp: Some(1),
                damage: Some(1),
                behavior: None,
                context: Some(String::new()),
                visual: Default::default(),
                sound: None,
                redirect: Some("Tralala".to_string()),
                extra: Default::default(),
            }],
            meta: Default::default(),
            extra: Default::default(),
        };
        round.meta.tags = vec!["brainrot".into(), "italian".into(), "memes".into()];
        round.meta.related.next = Some("BR_IT_002".to_string());
        round
    }

    fn corpus() -> Corpus {
        let theme: ThemeManifest = serde_json::from_value(json!({
            "id": "brainrot", "name": "Brainrot",
            "meta": {"created": "2024-11-02"},
            "music": "meme_loop",
            "chapters": {"Italian": {"spawnRate": 1.5}, "Memes_Classic": {}}
        }))
        .unwrap();
        let universe: Universe =
            serde_json::from_value(json!({"id": "italienisch", "name": "Italienisch"})).unwrap();
        Corpus {
            root: PathBuf::from("content"),
            universes: vec![UniverseFile {
                path: PathBuf::from("content/universe.italienisch.json"),
                manifest: universe,
            }],
            themes: vec![ThemeFile {
                path: PathBuf::from("content/italienisch/themes.brainrot.json"),
                universe: "italienisch".to_string(),
                manifest: theme,
            }],
            chapters: vec![ChapterFile {
                path: PathBuf::from("content/italienisch/brainrot/Italian.json"),
                universe: "italienisch".to_string(),
                theme: "brainrot".to_string(),
                chapter: "Italian".to_string(),
                rounds: vec![round()],
            }],
            files_scanned: 3,
            ..Corpus::default()
        }
    }

    fn table(table: Table) -> String {
        let mut out = Vec::new();
        write_table(table, &corpus(), &options(), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn rounds_table() {
        let text = table(Table::Rounds);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], Table::Rounds.columns().join(","));
        assert_eq!(
            lines[1],
            "BR_IT_001,Italian,1,true,3.0,,\"{brainrot,italian,memes}\",\"{NULL,BR_IT_002}\",,2025-01-15,2025-01-15"
        );
    }

    #[test]
    fn round_objects_table() {
        let text = table(Table::RoundObjects);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with(",BR_IT_001,brainrot,base,0,Tralalero,Meme,,{},"));
        assert!(lines[2].contains(",correct,0,Tralala,Translation,"));
        assert!(lines[2].contains(",0.4,0.05,,1.0,200,1,zigzag,1,,,,"));
        // Empty context stays distinct from a missing one.
        assert!(lines[3].contains(",Tralala,\"\",,2025-01-15,2025-01-15"));
    }

    #[test]
    fn chapters_table_fills_titles_and_meta() {
        let text = table(Table::Chapters);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[1],
            "Italian,brainrot,Italian,,,[],\"{\"\"spawnRate\"\":1.5}\",2024-11-02,2025-01-15"
        );
        assert_eq!(
            lines[2],
            "Memes_Classic,brainrot,Memes Classic,,,[],,2024-11-02,2025-01-15"
        );
    }

    #[test]
    fn themes_and_universes() {
        let themes = table(Table::Themes);
        assert!(themes
            .lines()
            .nth(1)
            .unwrap()
            .starts_with("brainrot,italienisch,Brainrot,"));
        assert!(themes.contains("\"{\"\"theme\"\":\"\"meme_loop\"\"}\""));

        let universes = table(Table::Universes);
        assert_eq!(
            universes.lines().nth(1).unwrap(),
            "italienisch,Italienisch,,,,,true,,2025-01-15,2025-01-15"
        );
    }

    #[test]
    fn theme_universe_resolves_through_mapping() {
        let uuids = UniverseUuids::parse(r#"{"italienisch": " 9b1e-44 ", "": "x"}"#).unwrap();
        assert_eq!(uuids.len(), 1);
        let options = options().with_universe_uuids(uuids);
        let mut out = Vec::new();
        write_table(Table::Themes, &corpus(), &options, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.lines().nth(1).unwrap().starts_with("brainrot,9b1e-44,Brainrot,"));

        // Chapters keep pointing at the theme slug.
        let mut out = Vec::new();
        write_table(Table::Chapters, &corpus(), &options, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("\nItalian,brainrot,"));
    }

    #[test]
    fn unmapped_universe_exports_null() {
        let uuids: UniverseUuids = [("englisch".to_string(), "a1".to_string())].into_iter().collect();
        let options = options().with_universe_uuids(uuids);
        let dir = tempfile::tempdir().unwrap();
        let summary = export_corpus(&corpus(), dir.path(), &options).unwrap();
        assert_eq!(summary.unmapped_universes, vec!["italienisch"]);
        assert!(summary.to_string().contains("unmapped universes: italienisch"));
        let themes = std::fs::read_to_string(dir.path().join("themes.csv")).unwrap();
        assert!(themes.lines().nth(1).unwrap().starts_with("brainrot,,Brainrot,"));
    }

    #[test]
    fn malformed_mapping_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("universe_uuid_mapping.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(
            UniverseUuids::load(&path),
            Err(ExportError::Mapping { .. })
        ));
        assert!(matches!(
            UniverseUuids::load(&dir.path().join("missing.json")),
            Err(ExportError::MappingIo { .. })
        ));
    }

    #[test]
    fn export_writes_every_table() {
        let dir = tempfile::tempdir().unwrap();
        let summary = export_corpus(&corpus(), dir.path(), &options()).unwrap();
        assert_eq!(summary.written.len(), 5);
        assert_eq!(summary.rows_in(Table::Rounds), 1);
        assert_eq!(summary.rows_in(Table::RoundObjects), 3);
        assert_eq!(summary.rows_in(Table::Chapters), 2);
        assert_eq!(summary.objects_by_type[&ObjectType::Distractor], 1);
        assert!(dir.path().join("round_objects.csv").exists());
        assert!(summary.to_string().contains("round_objects"));
    }
}
