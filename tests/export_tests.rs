//! Export integration tests: the five tables written from the fixture tree,
//! plus flattening properties over synthesized rounds.

mod common;

use common::{pipeline, read, workspace, FIXTURES};
use proptest::prelude::*;
use std::path::Path;
use wordrush_content::core::export::Table;
use wordrush_content::core::family::ContentFamily;
use wordrush_content::core::flatten::{count_by_type, flatten, nest};
use wordrush_content::core::synth::RoundSynthesizer;
use wordrush_content::schema::round::{ObjectType, Round};

fn table(root: &Path, table: Table) -> Vec<String> {
    read(root.join("export").join(table.file_name()))
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn writes_all_five_tables() {
    let dir = workspace();
    let summary = pipeline(dir.path()).export().unwrap();

    assert_eq!(summary.files_scanned, 6);
    assert_eq!(summary.level_variants_skipped, 1);
    assert_eq!(summary.rows_in(Table::Universes), 2);
    assert_eq!(summary.rows_in(Table::Themes), 2);
    assert_eq!(summary.rows_in(Table::Chapters), 3);
    assert_eq!(summary.rows_in(Table::Rounds), 3);
    assert_eq!(summary.rows_in(Table::RoundObjects), 9);
    assert_eq!(summary.objects_by_type[&ObjectType::Base], 3);
    assert_eq!(summary.objects_by_type[&ObjectType::Correct], 3);
    assert_eq!(summary.objects_by_type[&ObjectType::Distractor], 3);

    for t in Table::ALL {
        let lines = table(dir.path(), t);
        assert_eq!(lines[0], t.columns().join(","));
        assert_eq!(lines.len(), summary.rows_in(t) + 1);
    }
}

#[test]
fn rounds_rows() {
    let dir = workspace();
    pipeline(dir.path()).export().unwrap();
    let rounds = table(dir.path(), Table::Rounds);

    assert_eq!(
        rounds[1],
        "BC_004,Business_Communication,2,true,3.0,Business English,\
         \"{business_communication,level2}\",\"{NULL,BC_005}\",,2024-11-20,2025-01-15"
    );
    // No created date of its own: falls back to the file's first round.
    assert_eq!(
        rounds[2],
        "BC_005,Business_Communication,2,true,,Business English,\
         \"{business_communication,level2}\",\"{BC_004,NULL}\",,2024-11-20,2025-01-15"
    );
    assert!(rounds[3].starts_with(
        "BR_IT_001,Italian,1,false,3.5,Italian Brainrot,\"{brainrot,italian,memes}\",\"{NULL,NULL}\","
    ));
    assert!(rounds[3].contains("\"\"speedMultiplierPerReplay\"\":1.05"));
    // The level variant's duplicate BC_004 never reaches the table.
    assert_eq!(rounds.iter().filter(|l| l.starts_with("BC_004,")).count(), 1);
}

#[test]
fn round_object_rows() {
    let dir = workspace();
    pipeline(dir.path()).export().unwrap();
    let objects = table(dir.path(), Table::RoundObjects);

    let brainrot: Vec<&String> = objects
        .iter()
        .filter(|l| l.starts_with(",BR_IT_001,"))
        .collect();
    assert_eq!(brainrot.len(), 3);
    assert!(brainrot[0].starts_with(
        ",BR_IT_001,brainrot,base,0,Tralalero Tralala,Meme,/memes/tralalero.png,{},"
    ));
    assert!(brainrot[1].contains(",correct,0,Hai mit Turnschuhen,Description,,{},0.4,,,1.0,,,seek_center,1,"));
    // Unknown motions pass through; empty context stays `""`.
    assert!(brainrot[2].contains(",spiral,Hai mit Turnschuhen,\"\",,2025-01-15,2025-01-15"));
}

#[test]
fn manifest_rows() {
    let dir = workspace();
    pipeline(dir.path()).export().unwrap();

    let chapters = table(dir.path(), Table::Chapters);
    assert_eq!(
        chapters[1],
        "Business_Communication,business_english,Business Communication,,/images/office.jpg,\
         [],\"{\"\"spawnRate\"\":1.2}\",2024-10-05,2025-01-15"
    );
    assert_eq!(
        chapters[2],
        "Finance,business_english,Finance & Budget,,,[],\"{\"\"waveDuration\"\":4.0}\",2024-10-05,2025-01-15"
    );
    assert_eq!(chapters[3], "Italian,brainrot,Italian,,,[],,2025-01-15,2025-01-15");

    let themes = table(dir.path(), Table::Themes);
    assert!(themes[1].starts_with(
        "business_english,englisch,Business English,\"Meetings, mails and money\",#3F51B5,#00BCD4,"
    ));
    assert!(themes[1].contains("\"{\"\"theme\"\":\"\"office_groove\"\"}\""));
    assert!(themes[2].starts_with("brainrot,italienisch,Italian Brainrot,"));

    let universes = table(dir.path(), Table::Universes);
    assert!(universes[1].starts_with("englisch,Englisch,"));
    assert!(universes[1].ends_with(",true,en,2024-10-01,2025-01-15"));
    assert_eq!(
        universes[2],
        "italienisch,Italienisch,,,,,false,,2025-01-15,2025-01-15"
    );
}

#[test]
fn synthesize_then_export_is_deterministic() {
    let a = workspace();
    let b = workspace();
    for dir in [&a, &b] {
        let pipeline = pipeline(dir.path());
        pipeline.synthesize().unwrap();
        pipeline.export().unwrap();
    }
    for t in Table::ALL {
        assert_eq!(table(a.path(), t), table(b.path(), t), "{t} differs");
    }
    assert_eq!(table(a.path(), Table::Rounds).len(), 10);
}

#[test]
fn semicolon_delimiter() {
    let dir = workspace();
    let pipeline = wordrush_content::core::pipeline::ContentPipeline::builder()
        .config(pipeline(dir.path()).config().clone())
        .export_date(common::export_date())
        .delimiter(';')
        .build()
        .unwrap();
    pipeline.export().unwrap();
    let themes = table(dir.path(), Table::Themes);
    assert!(themes[0].starts_with("id;universe_id;name;"));
    // Commas no longer force quoting.
    assert!(themes[1].contains(";Meetings, mails and money;"));
}

#[test]
fn universe_uuids_from_mapping_file() {
    let dir = workspace();
    let pipeline = wordrush_content::core::pipeline::ContentPipeline::builder()
        .config(pipeline(dir.path()).config().clone())
        .export_date(common::export_date())
        .universe_uuid_mapping(dir.path().join("universe_uuid_mapping.json"))
        .build()
        .unwrap();
    let summary = pipeline.export().unwrap();
    assert_eq!(summary.unmapped_universes, vec!["italienisch"]);

    let themes = table(dir.path(), Table::Themes);
    assert!(themes[1].starts_with(
        "business_english,5d0c6f1e-7a3b-4c2d-9e8f-1a2b3c4d5e6f,Business English,"
    ));
    assert!(themes[2].starts_with("brainrot,,Italian Brainrot,"));
    // Chapters still reference the theme by slug.
    assert!(table(dir.path(), Table::Chapters)[1].starts_with("Business_Communication,business_english,"));
}

fn fixture_family() -> ContentFamily {
    ContentFamily::load_from_ron(&Path::new(FIXTURES).join("families/business_english.ron"))
        .unwrap()
}

fn synthesized(family: &ContentFamily, seed: u64) -> Vec<Round> {
    RoundSynthesizer::builder(family)
        .seed(seed)
        .build()
        .unwrap()
        .generate()
        .unwrap()
        .into_iter()
        .flat_map(|batch| batch.rounds)
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn flatten_then_nest_reproduces_rounds(seed in any::<u64>(), rotate in 0usize..64) {
        let family = fixture_family();
        let rounds = synthesized(&family, seed);
        let mut rows = flatten(&rounds);
        let n = rows.len();
        rows.rotate_left(rotate % n);

        let counts = count_by_type(&rows);
        prop_assert_eq!(counts[&ObjectType::Base], rounds.len());

        let mut nested = nest(&rows).unwrap();
        nested.sort_by(|a, b| a.round_id.cmp(&b.round_id));
        let mut expected: Vec<&Round> = rounds.iter().collect();
        expected.sort_by(|a, b| a.id.cmp(&b.id));
        prop_assert_eq!(nested.len(), expected.len());
        for (got, want) in nested.iter().zip(expected) {
            prop_assert_eq!(&got.base, &want.base);
            prop_assert_eq!(&got.correct, &want.correct);
            prop_assert_eq!(&got.distractors, &want.distractors);
        }
    }

    #[test]
    fn generated_positions_are_in_domain_and_distinct(seed in any::<u64>()) {
        let family = fixture_family();
        for round in synthesized(&family, seed) {
            let positions: Vec<f64> = round
                .correct
                .iter()
                .map(|c| c.spawn_position)
                .chain(round.distractors.iter().map(|d| d.spawn_position))
                .collect();
            for (i, p) in positions.iter().enumerate() {
                prop_assert!((0.1..=0.9).contains(p), "{} at {}", round.id, p);
                prop_assert!(positions[..i].iter().all(|q| (p - q).abs() > 1e-9));
            }
        }
    }

    #[test]
    fn correct_and_distractor_speeds_share_a_range(seed in any::<u64>()) {
        let family = fixture_family();
        for round in synthesized(&family, seed) {
            let range = family.speeds.range(round.level);
            let speeds = round
                .correct
                .iter()
                .map(|c| c.speed)
                .chain(round.distractors.iter().map(|d| d.speed));
            for speed in speeds {
                prop_assert!(speed >= range.min - 1e-9 && speed <= range.max + 1e-9);
            }
        }
    }
}
