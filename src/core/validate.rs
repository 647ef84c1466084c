/// Referential and domain checks over a set of rounds.
///
/// Errors block export. Warnings are reported and otherwise ignored.

use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;

use crate::core::ids;
use crate::schema::round::Round;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => f.pad("warning"),
            Self::Error => f.pad("error"),
        }
    }
}

/// What a finding is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Check {
    DuplicateId,
    IdFormat,
    DanglingRelated,
    AsymmetricRelated,
    UnresolvedRedirect,
    CollectionOrder,
    EmptyCorrect,
    SpawnDomain,
    SharedPosition,
    Level,
}

impl Check {
    pub fn severity(&self) -> Severity {
        match self {
            Self::IdFormat | Self::SharedPosition => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub check: Check,
    pub round_id: String,
    pub message: String,
}

impl Issue {
    fn new(check: Check, round_id: &str, message: impl Into<String>) -> Self {
        Self {
            check,
            round_id: round_id.to_string(),
            message: message.into(),
        }
    }

    pub fn severity(&self) -> Severity {
        self.check.severity()
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<7} {}: {}", self.severity(), self.round_id, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub rounds_checked: usize,
    pub issues: Vec<Issue>,
}

impl ValidationReport {
    pub fn errors(&self) -> impl Iterator<Item = &Issue> {
        self.issues
            .iter()
            .filter(|i| i.severity() == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Issue> {
        self.issues
            .iter()
            .filter(|i| i.severity() == Severity::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn count(&self, check: Check) -> usize {
        self.issues.iter().filter(|i| i.check == check).count()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} rounds checked: {} errors, {} warnings",
            self.rounds_checked,
            self.errors().count(),
            self.warnings().count()
        )?;
        for issue in &self.issues {
            writeln!(f, "  {issue}")?;
        }
        Ok(())
    }
}

/// Checks that need nothing beyond the round itself.
pub fn check_round(round: &Round) -> Vec<Issue> {
    let mut issues = Vec::new();
    let id = round.id.as_str();

    if ids::parse_id(id).is_none() {
        issues.push(Issue::new(
            Check::IdFormat,
            id,
            "id does not end in a zero-padded numeric suffix",
        ));
    }
    if round.level < 1 {
        issues.push(Issue::new(Check::Level, id, "level must be at least 1"));
    }
    if round.correct.is_empty() {
        issues.push(Issue::new(Check::EmptyCorrect, id, "round has no correct answer"));
    }

    let mut positions: Vec<(String, f64)> = Vec::new();
    for (i, c) in round.correct.iter().enumerate() {
        positions.push((format!("correct[{i}]"), c.spawn_position));
    }
    for (i, d) in round.distractors.iter().enumerate() {
        positions.push((format!("distractors[{i}]"), d.spawn_position));
    }
    for (label, p) in &positions {
        if !(0.0..=1.0).contains(p) {
            issues.push(Issue::new(
                Check::SpawnDomain,
                id,
                format!("{label}.spawnPosition {p} outside [0, 1]"),
            ));
        }
    }
    for (i, (label, p)) in positions.iter().enumerate() {
        if let Some((other, _)) = positions[..i].iter().find(|(_, q)| (p - q).abs() < 1e-9) {
            issues.push(Issue::new(
                Check::SharedPosition,
                id,
                format!("{label} shares spawnPosition {p} with {other}"),
            ));
        }
    }

    let mut orders: Vec<u32> = round
        .correct
        .iter()
        .filter_map(|c| c.collection_order)
        .collect();
    if !orders.is_empty() {
        orders.sort_unstable();
        let contiguous = orders.iter().zip(1u32..).all(|(o, expected)| *o == expected);
        if !contiguous {
            issues.push(Issue::new(
                Check::CollectionOrder,
                id,
                format!("collectionOrder {orders:?} is not contiguous from 1"),
            ));
        }
    }

    issues
}

/// Symmetry and existence of `meta.related` pointers.
pub fn check_chain(rounds: &[&Round]) -> Vec<Issue> {
    let mut by_id: FxHashMap<&str, &Round> = FxHashMap::default();
    for round in rounds {
        by_id.entry(round.id.as_str()).or_insert(*round);
    }

    let mut issues = Vec::new();
    for round in rounds {
        let id = round.id.as_str();
        let related = &round.meta.related;

        if let Some(next) = related.next.as_deref() {
            match by_id.get(next) {
                None => issues.push(Issue::new(
                    Check::DanglingRelated,
                    id,
                    format!("related next {next} does not exist"),
                )),
                Some(target) if target.meta.related.previous.as_deref() != Some(id) => {
                    issues.push(Issue::new(
                        Check::AsymmetricRelated,
                        id,
                        format!(
                            "related next {next} points back to {:?}",
                            target.meta.related.previous
                        ),
                    ))
                }
                Some(_) => {}
            }
        }

        if let Some(previous) = related.previous.as_deref() {
            match by_id.get(previous) {
                None => issues.push(Issue::new(
                    Check::DanglingRelated,
                    id,
                    format!("related previous {previous} does not exist"),
                )),
                Some(target) if target.meta.related.next.as_deref() != Some(id) => {
                    issues.push(Issue::new(
                        Check::AsymmetricRelated,
                        id,
                        format!(
                            "related previous {previous} points forward to {:?}",
                            target.meta.related.next
                        ),
                    ))
                }
                Some(_) => {}
            }
        }
    }
    issues
}

/// Every check over a corpus-wide set of rounds.
pub fn validate<'a, I>(rounds: I) -> ValidationReport
where
    I: IntoIterator<Item = &'a Round>,
{
    let rounds: Vec<&Round> = rounds.into_iter().collect();
    let mut issues = Vec::new();

    let mut seen = FxHashSet::default();
    for round in &rounds {
        if !seen.insert(round.id.as_str()) {
            issues.push(Issue::new(Check::DuplicateId, &round.id, "duplicate round id"));
        }
    }

    let answers: FxHashSet<&str> = rounds
        .iter()
        .flat_map(|r| r.correct.iter())
        .filter_map(|c| c.entry.word.as_deref())
        .collect();

    for round in &rounds {
        issues.extend(check_round(round));
        for (i, d) in round.distractors.iter().enumerate() {
            if let Some(redirect) = d.redirect.as_deref() {
                if !answers.contains(redirect) {
                    issues.push(Issue::new(
                        Check::UnresolvedRedirect,
                        &round.id,
                        format!("distractors[{i}].redirect {redirect:?} names no correct answer"),
                    ));
                }
            }
        }
    }

    issues.extend(check_chain(&rounds));

    ValidationReport {
        rounds_checked: rounds.len(),
        issues,
    }
}
