/// In-place repair passes over a loaded corpus.
///
/// Each pass only fills what is missing or rebuilds what is provably
/// broken, so running a pass twice changes nothing the second time.
/// Randomization is the exception: it re-samples every object, but from a
/// per-file seed, so repeated runs write the same values.

use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;

use crate::core::ids::{link_batch, parse_id};
use crate::core::loader::Corpus;
use crate::core::spawn::SpawnAllocator;
use crate::schema::round::Round;
use crate::schema::theme::{default_chapter_title, ThemeManifest};

#[derive(Debug, Clone)]
pub struct RepairOptions {
    pub seed: u64,
    /// Written into distractors that carry no `damage`.
    pub damage: u32,
    /// Themes whose kinematics are re-sampled.
    pub randomize_themes: Vec<String>,
    pub drop_behavior: bool,
}

impl Default for RepairOptions {
    fn default() -> Self {
        Self {
            seed: 42,
            damage: 1,
            randomize_themes: Vec::new(),
            drop_behavior: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepairSummary {
    pub titles_filled: usize,
    pub damage_filled: usize,
    pub objects_randomized: usize,
    pub chains_relinked: usize,
    /// Indexes into `Corpus::themes` that need saving.
    pub changed_themes: Vec<usize>,
    /// Indexes into `Corpus::chapters` that need saving.
    pub changed_chapters: Vec<usize>,
}

impl RepairSummary {
    pub fn is_clean(&self) -> bool {
        self.changed_themes.is_empty() && self.changed_chapters.is_empty()
    }
}

impl fmt::Display for RepairSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "chapter titles filled: {}", self.titles_filled)?;
        writeln!(f, "distractor damage filled: {}", self.damage_filled)?;
        writeln!(f, "objects randomized: {}", self.objects_randomized)?;
        writeln!(f, "chains relinked: {}", self.chains_relinked)?;
        write!(
            f,
            "files changed: {} themes, {} chapters",
            self.changed_themes.len(),
            self.changed_chapters.len()
        )
    }
}

/// Give every untitled chapter its default title.
pub fn fill_chapter_titles(manifest: &mut ThemeManifest) -> usize {
    let mut filled = 0;
    for (id, config) in manifest.chapters.iter_mut() {
        if config.title.as_deref().is_some_and(|t| !t.is_empty()) {
            continue;
        }
        config.title = Some(default_chapter_title(id));
        filled += 1;
    }
    filled
}

/// Set `damage` on distractors that have none. Existing values are kept.
pub fn fill_distractor_damage(rounds: &mut [Round], damage: u32) -> usize {
    let mut filled = 0;
    for distractor in rounds.iter_mut().flat_map(|r| r.distractors.iter_mut()) {
        if distractor.damage.is_none() {
            distractor.damage = Some(damage);
            filled += 1;
        }
    }
    filled
}

/// Re-sample position, speed and motion of every object.
pub fn randomize_rounds(
    rounds: &mut [Round],
    allocator: &SpawnAllocator,
    drop_behavior: bool,
    rng: &mut StdRng,
) -> usize {
    rounds
        .iter_mut()
        .map(|round| allocator.remediate(round, drop_behavior, rng))
        .sum()
}

/// True when every id shares one prefix and the numbers run upward by one
/// in file order, i.e. the file is a single generator batch.
pub fn is_contiguous_batch(rounds: &[Round]) -> bool {
    let mut expected: Option<(&str, u32)> = None;
    for round in rounds {
        let Some((prefix, n)) = parse_id(&round.id) else {
            return false;
        };
        if let Some((p, next)) = expected {
            if p != prefix || n != next {
                return false;
            }
        }
        expected = Some((prefix, n + 1));
    }
    !rounds.is_empty()
}

/// Rebuild the `related` chain of a contiguous batch.
///
/// The first round's `previous` and the last round's `next` are kept when
/// they point outside the file, since they join neighbouring batches.
/// Returns whether anything changed.
pub fn relink_chapter(rounds: &mut [Round]) -> bool {
    if !is_contiguous_batch(rounds) {
        return false;
    }
    let inside = |id: &String| rounds.iter().any(|r| r.id == *id);
    let (Some(first), Some(last)) = (rounds.first(), rounds.last()) else {
        return false;
    };
    let head = first.meta.related.previous.clone().filter(|p| !inside(p));
    let tail = last.meta.related.next.clone().filter(|n| !inside(n));

    let mut relinked = rounds.to_vec();
    link_batch(&mut relinked, tail.as_deref());
    if let Some(first) = relinked.first_mut() {
        first.meta.related.previous = head;
    }

    let changed = relinked
        .iter()
        .zip(rounds.iter())
        .any(|(a, b)| a.meta.related != b.meta.related);
    if changed {
        for (round, fixed) in rounds.iter_mut().zip(relinked) {
            round.meta.related = fixed.meta.related;
        }
    }
    changed
}

/// Run every pass over the corpus, recording which files changed.
pub fn repair_corpus(
    corpus: &mut Corpus,
    allocator: &SpawnAllocator,
    options: &RepairOptions,
) -> RepairSummary {
    let mut summary = RepairSummary::default();

    for (i, theme) in corpus.themes.iter_mut().enumerate() {
        let filled = fill_chapter_titles(&mut theme.manifest);
        if filled > 0 {
            debug!("{}: {filled} chapter titles", theme.path.display());
            summary.titles_filled += filled;
            summary.changed_themes.push(i);
        }
    }

    for (i, chapter) in corpus.chapters.iter_mut().enumerate() {
        let mut changed = false;

        let filled = fill_distractor_damage(&mut chapter.rounds, options.damage);
        summary.damage_filled += filled;
        changed |= filled > 0;

        if options.randomize_themes.iter().any(|t| *t == chapter.theme) {
            // Prime offset per chapter index.
            let mut rng = StdRng::seed_from_u64(options.seed.wrapping_add(i as u64 * 7919));
            let n = randomize_rounds(
                &mut chapter.rounds,
                allocator,
                options.drop_behavior,
                &mut rng,
            );
            debug!("{}: {n} objects randomized", chapter.path.display());
            summary.objects_randomized += n;
            changed |= n > 0;
        }

        if relink_chapter(&mut chapter.rounds) {
            debug!("{}: chain relinked", chapter.path.display());
            summary.chains_relinked += 1;
            changed = true;
        }

        if changed {
            summary.changed_chapters.push(i);
        }
    }

    info!(
        "repair: {} titles, {} damage, {} randomized, {} relinked",
        summary.titles_filled,
        summary.damage_filled,
        summary.objects_randomized,
        summary.chains_relinked
    );
    summary
}
