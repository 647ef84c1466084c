/// Round synthesis: content-family records in, complete rounds out.
///
/// One synthesizer serves every family. Per-family differences (decoy
/// pools, templates, tiers, palette) live in the descriptor, and all
/// randomness flows through an explicitly seeded `StdRng`.

use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use thiserror::Error;

use crate::core::family::{ChapterSpec, ContentFamily, ContentRecord, Decoy, Placement};
use crate::core::ids::{self, IdError};
use crate::core::spawn::{RoundSpawner, SpawnAllocator, SpawnError};
use crate::core::template::{TemplateError, TemplateVars};
use crate::schema::round::{
    BaseObject, CorrectObject, DistractorObject, Entry, Meta, Round, Visual,
};

const CORRECT_VARIANTS: [&str; 4] = ["hexagon", "star", "bubble", "spike"];
const DISTRACTOR_VARIANTS: [&str; 3] = ["spike", "square", "hexagon"];
const HUMOR_VARIANTS: [&str; 2] = ["hexagon", "bubble"];
const WRONG_TYPE: &str = "Wrong";
/// Near-miss decoys needed before a humor decoy joins the round.
const HUMOR_THRESHOLD: usize = 3;

#[derive(Debug, Error)]
pub enum SynthError {
    #[error("template error: {0}")]
    Template(#[from] TemplateError),
    #[error("id error: {0}")]
    Id(#[from] IdError),
    #[error("spawn error: {0}")]
    Spawn(#[from] SpawnError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The rounds generated for one chapter, with their splice instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterBatch {
    pub universe: String,
    pub theme: String,
    pub chapter: String,
    pub placement: Placement,
    pub rounds: Vec<Round>,
}

/// Builds rounds for one content family. Built via `RoundSynthesizer::builder()`.
pub struct RoundSynthesizer<'f> {
    family: &'f ContentFamily,
    spawn: SpawnAllocator,
    seed: u64,
}

pub struct RoundSynthesizerBuilder<'f> {
    family: &'f ContentFamily,
    spawn: Option<SpawnAllocator>,
    seed: u64,
}

impl<'f> RoundSynthesizerBuilder<'f> {
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Provide an allocator directly instead of deriving one from the family.
    pub fn with_spawn(mut self, spawn: SpawnAllocator) -> Self {
        self.spawn = Some(spawn);
        self
    }

    pub fn build(self) -> Result<RoundSynthesizer<'f>, SynthError> {
        let spawn = match self.spawn {
            Some(spawn) => spawn,
            None => SpawnAllocator::new(self.family.speeds.clone(), self.family.speeds.clone())?,
        };
        Ok(RoundSynthesizer {
            family: self.family,
            spawn,
            seed: self.seed,
        })
    }
}

fn visual(value: Value) -> Visual {
    match value {
        Value::Object(map) => map,
        _ => Visual::new(),
    }
}

fn pick<'a, R: Rng>(options: &[&'a str], rng: &mut R) -> &'a str {
    options.choose(rng).copied().unwrap_or_default()
}

fn same_word(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// What a single round is built from, independent of record kind.
struct RoundInput<'r> {
    prompt: &'r str,
    prompt_type: &'r str,
    answers: Vec<&'r str>,
    level: u32,
    decoys: Option<&'r [Decoy]>,
    humor: Option<&'r str>,
    redirect: Option<&'r str>,
    context: Option<&'r str>,
    ordered: bool,
}

impl<'r> RoundInput<'r> {
    fn from_record(record: &'r ContentRecord) -> Self {
        match record {
            ContentRecord::Vocab(word, answer, part_of_speech, level) => Self {
                prompt: word,
                prompt_type: part_of_speech,
                answers: vec![answer.as_str()],
                level: *level,
                decoys: None,
                humor: None,
                redirect: None,
                context: None,
                ordered: false,
            },
            ContentRecord::Trivia {
                prompt,
                prompt_type,
                answers,
                level,
                decoys,
                humor,
                redirect,
                context,
                ordered,
            } => Self {
                prompt,
                prompt_type,
                answers: answers.iter().map(String::as_str).collect(),
                level: *level,
                decoys: (!decoys.is_empty()).then_some(decoys.as_slice()),
                humor: humor.as_deref(),
                redirect: redirect.as_deref(),
                context: context.as_deref(),
                ordered: *ordered,
            },
        }
    }

    fn excludes(&self, decoy: &Decoy) -> bool {
        let hits = |s: &str| same_word(s, self.prompt) || self.answers.iter().any(|a| same_word(s, a));
        hits(decoy.word.as_str()) || hits(decoy.gloss.as_str())
    }
}

impl<'f> RoundSynthesizer<'f> {
    pub fn builder(family: &'f ContentFamily) -> RoundSynthesizerBuilder<'f> {
        RoundSynthesizerBuilder {
            family,
            spawn: None,
            seed: 0,
        }
    }

    /// Generate every chapter in descriptor order.
    pub fn generate(&self) -> Result<Vec<ChapterBatch>, SynthError> {
        self.family
            .chapters
            .iter()
            .enumerate()
            .map(|(i, chapter)| {
                // Prime offset per chapter index.
                let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(i as u64 * 7919));
                self.synthesize_chapter(chapter, &mut rng)
            })
            .collect()
    }

    pub fn synthesize_chapter<R: Rng>(
        &self,
        chapter: &ChapterSpec,
        rng: &mut R,
    ) -> Result<ChapterBatch, SynthError> {
        let prefix = ids::compose_prefix(
            chapter.prefix.as_deref().unwrap_or(&self.family.prefix),
            chapter.abbr.as_deref(),
        );
        let id_list = ids::allocate(&prefix, chapter.start_index, chapter.records.len())?;

        let mut rounds = Vec::with_capacity(chapter.records.len());
        for (offset, (id, record)) in id_list.into_iter().zip(&chapter.records).enumerate() {
            let index = ids::index_at(&prefix, chapter.start_index, offset)?;
            rounds.push(self.synthesize_round(chapter, id, index, record, rng)?);
        }

        if self.family.link_related {
            ids::link_batch(&mut rounds, chapter.next_sentinel.as_deref());
        }

        debug!(
            "synthesized {} rounds for {}/{}",
            rounds.len(),
            self.family.theme,
            chapter.id
        );

        Ok(ChapterBatch {
            universe: self.family.universe.clone(),
            theme: self.family.theme.clone(),
            chapter: chapter.id.clone(),
            placement: chapter.placement,
            rounds,
        })
    }

    /// Build one round. `index` is the numeric id suffix and picks the color.
    pub fn synthesize_round<R: Rng>(
        &self,
        chapter: &ChapterSpec,
        id: String,
        index: u32,
        record: &ContentRecord,
        rng: &mut R,
    ) -> Result<Round, SynthError> {
        let input = RoundInput::from_record(record);
        let tiers = &self.family.tiers;
        let showcase = tiers.is_showcase(input.level);
        let color = self.family.palette.base_color(index);
        let tier = if showcase { 2 } else { 1 };
        let appearance = if showcase { "bold" } else { "normal" };

        let base = BaseObject {
            entry: Entry::word(input.prompt, input.prompt_type),
            context: None,
            visual: visual(json!({
                "tier": tier,
                "size": 1,
                "appearance": appearance,
                "color": color,
                "glow": showcase,
                "pulsate": showcase,
            })),
            extra: Default::default(),
        };

        let mut spawner = self.spawn.begin_round(input.level, rng);
        let correct = self.correct_objects(&input, color, showcase, &mut spawner, rng)?;
        let distractors = self.distractor_objects(&input, &mut spawner, rng)?;

        let mut tags = vec![
            chapter.id.to_lowercase().replace('_', ""),
            format!("level{}", input.level),
        ];
        tags.extend(chapter.tags.iter().cloned());
        tags.extend(self.family.tags.iter().cloned());

        Ok(Round {
            id,
            theme: self.family.theme.clone(),
            chapter: chapter.id.clone(),
            level: input.level,
            published: None,
            wave_duration: Some(self.family.wave_duration),
            base,
            correct,
            distractors,
            meta: Meta {
                source: Some(self.family.source.clone()),
                tags,
                difficulty_scaling: Some(serde_json::to_value(&self.family.difficulty_scaling)?),
                ..Meta::default()
            },
            extra: Default::default(),
        })
    }

    fn correct_objects<R: Rng>(
        &self,
        input: &RoundInput<'_>,
        color: &str,
        showcase: bool,
        spawner: &mut RoundSpawner<'_>,
        rng: &mut R,
    ) -> Result<Vec<CorrectObject>, SynthError> {
        let tiers = &self.family.tiers;
        let single = input.answers.len() == 1;
        let font_size = if showcase { 1.1 } else { 1.0 };
        let mut correct = Vec::with_capacity(input.answers.len());

        for (i, answer) in input.answers.iter().enumerate() {
            let kin = spawner.next_correct(rng);
            let context = match input.context {
                Some(text) => text.to_string(),
                None => self.family.templates.correct.render(&TemplateVars {
                    prompt: Some(input.prompt),
                    answer: Some(*answer),
                    ..Default::default()
                })?,
            };
            let collection_order = if input.ordered {
                Some(i as u32 + 1)
            } else if single && showcase {
                Some(1)
            } else {
                None
            };

            correct.push(CorrectObject {
                entry: Entry::word(*answer, self.family.answer_type.as_str()),
                spawn_position: kin.spawn_position,
                spawn_spread: Some(tiers.spawn_spread),
                spawn_delay: None,
                speed: kin.speed,
                points: Some(tiers.correct_points(input.level)),
                pattern: kin.motion,
                hp: Some(tiers.hp),
                collection_order,
                context: Some(context),
                visual: visual(json!({
                    "color": color,
                    "variant": pick(&CORRECT_VARIANTS, rng),
                    "pulsate": showcase,
                    "fontSize": font_size,
                })),
                sound: Some(tiers.correct_sound.clone()),
                extra: Default::default(),
            });
        }

        Ok(correct)
    }

    fn near_miss_pool(&self, input: &RoundInput<'_>) -> Vec<Decoy> {
        let pool: Vec<Decoy> = match input.decoys {
            Some(decoys) => decoys.to_vec(),
            None if !self.family.decoys.is_empty() => self.family.decoys.clone(),
            None => self
                .family
                .vocabulary()
                .into_iter()
                .map(|(word, answer)| Decoy {
                    word: answer.to_string(),
                    gloss: word.to_string(),
                })
                .collect(),
        };
        pool.into_iter().filter(|d| !input.excludes(d)).collect()
    }

    fn distractor_objects<R: Rng>(
        &self,
        input: &RoundInput<'_>,
        spawner: &mut RoundSpawner<'_>,
        rng: &mut R,
    ) -> Result<Vec<DistractorObject>, SynthError> {
        let tiers = &self.family.tiers;
        let palette = &self.family.palette;
        let answer = input.answers.first().copied().unwrap_or_default();
        let redirect = input.redirect.unwrap_or(answer).to_string();

        let pool = self.near_miss_pool(input);
        let chosen: Vec<&Decoy> = pool
            .choose_multiple(rng, self.family.near_miss_count)
            .collect();
        if chosen.len() < self.family.near_miss_count {
            debug!(
                "only {} near-miss decoys available for {:?}",
                chosen.len(),
                input.prompt
            );
        }

        let mut distractors = Vec::with_capacity(chosen.len() + 1);
        for decoy in &chosen {
            let kin = spawner.next_distractor(rng);
            let context = self.family.templates.near_miss.render(&TemplateVars {
                prompt: Some(input.prompt),
                answer: Some(answer),
                decoy: Some(decoy.word.as_str()),
                gloss: Some(decoy.gloss.as_str()),
            })?;
            let distractor_colors: Vec<&str> = palette.distractor.iter().map(String::as_str).collect();
            distractors.push(DistractorObject {
                entry: Entry::word(decoy.word.as_str(), WRONG_TYPE),
                spawn_position: kin.spawn_position,
                spawn_spread: Some(tiers.spawn_spread),
                spawn_delay: None,
                speed: kin.speed,
                points: Some(tiers.distractor_points),
                hp: Some(tiers.hp),
                damage: Some(tiers.damage),
                behavior: kin.motion,
                context: Some(context),
                visual: visual(json!({
                    "color": pick(&distractor_colors, rng),
                    "variant": pick(&DISTRACTOR_VARIANTS, rng),
                    "pulsate": rng.gen_bool(0.5),
                    "shake": false,
                    "fontSize": 1,
                })),
                sound: Some(tiers.distractor_sound.clone()),
                redirect: Some(redirect.clone()),
                extra: Default::default(),
            });
        }

        if chosen.len() >= HUMOR_THRESHOLD {
            if let Some(humor) = self.humor_word(input, rng) {
                let kin = spawner.next_humor(rng);
                let context = self.family.templates.humor.render(&TemplateVars {
                    prompt: Some(input.prompt),
                    answer: Some(answer),
                    decoy: Some(humor),
                    gloss: None,
                })?;
                distractors.push(DistractorObject {
                    entry: Entry::word(humor, WRONG_TYPE),
                    spawn_position: kin.spawn_position,
                    spawn_spread: Some(tiers.spawn_spread),
                    spawn_delay: None,
                    speed: kin.speed,
                    points: Some(tiers.distractor_points),
                    hp: Some(tiers.hp),
                    damage: Some(tiers.damage),
                    behavior: kin.motion,
                    context: Some(context),
                    visual: visual(json!({
                        "color": palette.humor,
                        "variant": pick(&HUMOR_VARIANTS, rng),
                        "pulsate": true,
                        "shake": true,
                        "fontSize": 1,
                    })),
                    sound: Some(tiers.distractor_sound.clone()),
                    redirect: Some(redirect.clone()),
                    extra: Default::default(),
                });
            }
        }

        Ok(distractors)
    }

    fn humor_word<'a, R: Rng>(&'a self, input: &RoundInput<'a>, rng: &mut R) -> Option<&'a str> {
        if let Some(word) = input.humor {
            return Some(word);
        }
        let candidates: Vec<&str> = self
            .family
            .humor
            .iter()
            .map(String::as_str)
            .filter(|w| !input.answers.iter().any(|a| same_word(w, a)))
            .collect();
        candidates.choose(rng).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::validate::{check_round, Severity};
    use crate::schema::round::Motion;

    fn family() -> ContentFamily {
        ContentFamily::parse_ron(
            r#"(
            universe: "englisch",
            theme: "business_english",
            source: "Business English",
            prefix: "BC",
            chapters: [
                (
                    id: "Business_Communication",
                    records: [
                        Vocab("meeting", "Besprechung", "Noun", 1),
                        Vocab("deadline", "Frist", "Noun", 1),
                        Vocab("client", "Kunde", "Noun", 2),
                    ],
                ),
                (
                    id: "Quiz",
                    abbr: Some("QZ"),
                    records: [
                        Trivia(
                            prompt: "Primary colors of light",
                            answers: ["Red", "Green", "Blue"],
                            ordered: true,
                            decoys: [
                                (word: "Yellow", gloss: "paint primary"),
                                (word: "Purple", gloss: "mixed"),
                            ],
                        ),
                    ],
                ),
            ],
            decoys: [
                (word: "Brief", gloss: "letter"),
                (word: "Nachricht", gloss: "message"),
                (word: "Telefon", gloss: "telephone"),
                (word: "Besprechung", gloss: "meeting"),
                (word: "Kalender", gloss: "calendar"),
            ],
            humor: ["Kaffeepause", "Feierabend"],
        )"#,
        )
        .unwrap()
    }

    fn first_round(family: &ContentFamily, seed: u64) -> Round {
        let synth = RoundSynthesizer::builder(family).seed(seed).build().unwrap();
        synth.generate().unwrap().remove(0).rounds.remove(0)
    }

    #[test]
    fn meeting_scenario() {
        let family = family();
        let round = first_round(&family, 42);
        assert_eq!(round.id, "BC_001");
        assert_eq!(round.level, 1);
        assert_eq!(round.correct.len(), 1);
        assert_eq!(round.correct[0].entry.word.as_deref(), Some("Besprechung"));
        assert_eq!(
            round.correct[0].context.as_deref(),
            Some("meeting = Besprechung")
        );
        assert_eq!(round.correct[0].points, Some(200));
        assert_eq!(round.correct[0].collection_order, Some(1));
        assert_eq!(round.base.visual.get("glow"), Some(&Value::Bool(true)));

        assert_eq!(round.distractors.len(), 4);
        let nicht = round
            .distractors
            .iter()
            .filter(|d| {
                d.context
                    .as_deref()
                    .is_some_and(|c| c.contains("nicht Besprechung"))
            })
            .count();
        assert_eq!(nicht, 1);
        assert!(round
            .distractors
            .iter()
            .all(|d| d.redirect.as_deref() == Some("Besprechung")));
    }

    #[test]
    fn near_miss_excludes_current_word() {
        let family = family();
        for seed in 0..20 {
            let round = first_round(&family, seed);
            assert!(round
                .distractors
                .iter()
                .all(|d| d.entry.word.as_deref() != Some("Besprechung")));
        }
    }

    #[test]
    fn humor_decoy_sits_in_tail_and_shakes() {
        let family = family();
        let round = first_round(&family, 9);
        let humor = round.distractors.last().unwrap();
        assert!(humor.spawn_position >= 0.7 && humor.spawn_position <= 0.9);
        assert_eq!(humor.visual.get("shake"), Some(&Value::Bool(true)));
        assert_eq!(humor.visual.get("color"), Some(&json!("#FFC107")));
    }

    #[test]
    fn later_levels_use_standard_tier() {
        let family = family();
        let synth = RoundSynthesizer::builder(&family).seed(1).build().unwrap();
        let batch = synth.generate().unwrap().remove(0);
        let client = &batch.rounds[2];
        assert_eq!(client.correct[0].points, Some(150));
        assert_eq!(client.correct[0].collection_order, None);
        assert_eq!(client.base.visual.get("tier"), Some(&json!(1)));
        assert_eq!(client.meta.tags, vec!["businesscommunication", "level2"]);
    }

    #[test]
    fn chapter_is_linked() {
        let family = family();
        let synth = RoundSynthesizer::builder(&family).seed(1).build().unwrap();
        let batch = synth.generate().unwrap().remove(0);
        let related: Vec<(Option<&str>, Option<&str>)> = batch
            .rounds
            .iter()
            .map(|r| {
                (
                    r.meta.related.previous.as_deref(),
                    r.meta.related.next.as_deref(),
                )
            })
            .collect();
        assert_eq!(
            related,
            vec![
                (None, Some("BC_002")),
                (Some("BC_001"), Some("BC_003")),
                (Some("BC_002"), None),
            ]
        );
    }

    #[test]
    fn trivia_with_ordered_answers() {
        let family = family();
        let synth = RoundSynthesizer::builder(&family).seed(5).build().unwrap();
        let batch = synth.generate().unwrap().remove(1);
        let round = &batch.rounds[0];
        assert_eq!(round.id, "BC_QZ_001");
        let orders: Vec<Option<u32>> = round.correct.iter().map(|c| c.collection_order).collect();
        assert_eq!(orders, vec![Some(1), Some(2), Some(3)]);
        // Two record decoys are below the humor threshold.
        assert_eq!(round.distractors.len(), 2);
        assert!(round
            .distractors
            .iter()
            .all(|d| d.redirect.as_deref() == Some("Red")));
    }

    #[test]
    fn same_seed_same_rounds() {
        let family = family();
        let a = RoundSynthesizer::builder(&family).seed(42).build().unwrap();
        let b = RoundSynthesizer::builder(&family).seed(42).build().unwrap();
        assert_eq!(a.generate().unwrap(), b.generate().unwrap());
    }

    #[test]
    fn motions_come_from_the_generator_set() {
        let family = family();
        let round = first_round(&family, 3);
        for d in &round.distractors {
            assert!(d.behavior.as_ref().is_some_and(|m| Motion::ALL.contains(m)));
        }
    }

    fn sparse_family(decoys: &str, humor: &str, records: &str) -> ContentFamily {
        ContentFamily::parse_ron(&format!(
            r#"(
            universe: "englisch",
            theme: "business_english",
            source: "Business English",
            prefix: "BC",
            chapters: [(id: "Sparse", records: [{records}])],
            decoys: [{decoys}],
            humor: [{humor}],
        )"#
        ))
        .unwrap()
    }

    fn assert_valid(round: &Round) {
        let errors: Vec<_> = check_round(round)
            .into_iter()
            .filter(|i| i.severity() == Severity::Error)
            .collect();
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn no_humor_pool_means_no_humor_decoy() {
        let family = sparse_family(
            r#"(word: "Brief", gloss: "letter"), (word: "Nachricht", gloss: "message"),
               (word: "Telefon", gloss: "telephone"), (word: "Kalender", gloss: "calendar")"#,
            "",
            r#"Vocab("meeting", "Besprechung", "Noun", 1)"#,
        );
        for seed in 0..10 {
            let round = first_round(&family, seed);
            assert_eq!(round.distractors.len(), 3);
            assert!(round.distractors.iter().all(|d| {
                d.visual.get("shake") == Some(&Value::Bool(false))
                    && !d.context.as_deref().unwrap_or_default().contains("nicht")
            }));
            assert_valid(&round);
        }
    }

    #[test]
    fn empty_decoy_pool_yields_a_round_without_distractors() {
        let family = sparse_family("", r#""Kaffeepause""#, r#"Vocab("meeting", "Besprechung", "Noun", 1)"#);
        let round = first_round(&family, 42);
        assert_eq!(round.id, "BC_001");
        assert_eq!(round.correct.len(), 1);
        // The only vocabulary entry is the round's own word.
        assert!(round.distractors.is_empty());
        assert_valid(&round);
    }

    #[test]
    fn start_index_overflow_is_an_error() {
        let family = ContentFamily::parse_ron(
            r#"(
            universe: "englisch",
            theme: "business_english",
            source: "Business English",
            prefix: "BC",
            chapters: [(
                id: "Late",
                start_index: 4294967295,
                records: [Vocab("a", "b", "Noun", 1), Vocab("c", "d", "Noun", 1)],
            )],
        )"#,
        )
        .unwrap();
        let synth = RoundSynthesizer::builder(&family).build().unwrap();
        assert!(matches!(
            synth.generate(),
            Err(SynthError::Id(IdError::Overflow { .. }))
        ));
    }
}
