/// Round id allocation and `meta.related` chain splicing.
///
/// Ids look like `PREFIX[_ABBR]_NNN`. A batch is a contiguous run of rounds
/// whose previous/next pointers form a doubly-linked list.

use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::schema::round::{RelatedPair, Round};

#[derive(Debug, Error, PartialEq)]
pub enum IdError {
    #[error("id prefix must not be empty")]
    EmptyPrefix,
    #[error("round id {0} already exists in the target chapter")]
    Collision(String),
    #[error("{count} ids from {prefix}_{start:03} overflow the numeric suffix")]
    Overflow {
        prefix: String,
        start: u32,
        count: usize,
    },
}

/// The suffix `offset` places after `start`, or `Overflow`.
pub fn index_at(prefix: &str, start: u32, offset: usize) -> Result<u32, IdError> {
    u32::try_from(offset)
        .ok()
        .and_then(|o| start.checked_add(o))
        .ok_or_else(|| IdError::Overflow {
            prefix: prefix.to_string(),
            start,
            count: offset.saturating_add(1),
        })
}

/// Join a family prefix and an optional chapter abbreviation: `BR` + `IT` → `BR_IT`.
pub fn compose_prefix(prefix: &str, abbr: Option<&str>) -> String {
    match abbr.filter(|a| !a.is_empty()) {
        Some(abbr) => [prefix, abbr].join("_"),
        None => prefix.to_string(),
    }
}

/// Format a single id with a three-digit zero-padded suffix.
pub fn format_id(prefix: &str, index: u32) -> String {
    format!("{prefix}_{index:03}")
}

/// `n` consecutive ids starting at `start`.
pub fn allocate(prefix: &str, start: u32, n: usize) -> Result<Vec<String>, IdError> {
    if prefix.is_empty() {
        return Err(IdError::EmptyPrefix);
    }
    (0..n)
        .map(|i| index_at(prefix, start, i).map(|index| format_id(prefix, index)))
        .collect()
}

/// Split an id into its prefix and numeric suffix.
///
/// Returns `None` unless the id ends in `_` followed by at least three digits.
pub fn parse_id(id: &str) -> Option<(&str, u32)> {
    let (prefix, digits) = id.rsplit_once('_')?;
    if prefix.is_empty() || digits.len() < 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((prefix, digits.parse().ok()?))
}

/// Set each round's related pair so the slice forms one chain.
///
/// The first round has no previous; the last points at `next_sentinel`.
pub fn link_batch(rounds: &mut [Round], next_sentinel: Option<&str>) {
    let ids: Vec<String> = rounds.iter().map(|r| r.id.clone()).collect();
    for (i, round) in rounds.iter_mut().enumerate() {
        let previous = i.checked_sub(1).map(|p| ids[p].clone());
        let next = match ids.get(i + 1) {
            Some(id) => Some(id.clone()),
            None => next_sentinel.map(str::to_string),
        };
        round.meta.related = RelatedPair::new(previous, next);
    }
}

fn check_collisions(existing: &[Round], batch: &[Round]) -> Result<(), IdError> {
    let taken: FxHashSet<&str> = existing.iter().map(|r| r.id.as_str()).collect();
    match batch.iter().find(|r| taken.contains(r.id.as_str())) {
        Some(dup) => Err(IdError::Collision(dup.id.clone())),
        None => Ok(()),
    }
}

/// Put a linked batch in front of `existing`, patching the seam.
///
/// The batch's last round points forward to the old first round, and the
/// old first round points back to the batch's last.
pub fn prepend_batch(existing: &mut Vec<Round>, mut batch: Vec<Round>) -> Result<(), IdError> {
    check_collisions(existing, &batch)?;
    if let (Some(last), Some(old_first)) = (batch.last_mut(), existing.first_mut()) {
        last.meta.related.next = Some(old_first.id.clone());
        old_first.meta.related.previous = Some(last.id.clone());
    }
    batch.append(existing);
    *existing = batch;
    Ok(())
}

/// Put a linked batch after `existing`, patching the seam symmetrically.
pub fn append_batch(existing: &mut Vec<Round>, mut batch: Vec<Round>) -> Result<(), IdError> {
    check_collisions(existing, &batch)?;
    if let (Some(old_last), Some(first)) = (existing.last_mut(), batch.first_mut()) {
        old_last.meta.related.next = Some(first.id.clone());
        first.meta.related.previous = Some(old_last.id.clone());
    }
    existing.append(&mut batch);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::round::{BaseObject, Entry, Meta};

    fn round(id: &str) -> Round {
        Round {
            id: id.to_string(),
            theme: "business_english".to_string(),
            chapter: "Business_Communication".to_string(),
            level: 1,
            published: None,
            wave_duration: None,
            base: BaseObject {
                entry: Entry::word("meeting", "Noun"),
                ..Default::default()
            },
            correct: Vec::new(),
            distractors: Vec::new(),
            meta: Meta::default(),
            extra: Default::default(),
        }
    }

    fn related(r: &Round) -> (Option<&str>, Option<&str>) {
        (
            r.meta.related.previous.as_deref(),
            r.meta.related.next.as_deref(),
        )
    }

    #[test]
    fn allocate_pads_to_three_digits() {
        let ids = allocate("BC", 1, 3).unwrap();
        assert_eq!(ids, vec!["BC_001", "BC_002", "BC_003"]);
        assert_eq!(allocate("BC", 999, 2).unwrap()[1], "BC_1000");
        assert!(allocate("BC", 1, 0).unwrap().is_empty());
        assert_eq!(allocate("", 1, 1), Err(IdError::EmptyPrefix));
    }

    #[test]
    fn allocate_rejects_suffix_overflow() {
        assert_eq!(allocate("BC", u32::MAX, 1).unwrap(), vec![format!("BC_{}", u32::MAX)]);
        assert!(matches!(
            allocate("BC", u32::MAX - 1, 3),
            Err(IdError::Overflow { count: 3, .. })
        ));
        assert_eq!(index_at("BC", 7, 2), Ok(9));
    }

    #[test]
    fn compose_prefix_with_abbr() {
        assert_eq!(compose_prefix("BR", Some("IT")), "BR_IT");
        assert_eq!(compose_prefix("BC", None), "BC");
        assert_eq!(compose_prefix("BC", Some("")), "BC");
    }

    #[test]
    fn parse_id_splits_suffix() {
        assert_eq!(parse_id("BR_IT_012"), Some(("BR_IT", 12)));
        assert_eq!(parse_id("BC_1000"), Some(("BC", 1000)));
        assert_eq!(parse_id("BC_12"), None);
        assert_eq!(parse_id("meeting"), None);
        assert_eq!(parse_id("_001"), None);
    }

    #[test]
    fn link_batch_builds_chain() {
        let mut rounds = vec![round("BC_001"), round("BC_002"), round("BC_003")];
        link_batch(&mut rounds, Some("BC_100"));
        assert_eq!(related(&rounds[0]), (None, Some("BC_002")));
        assert_eq!(related(&rounds[1]), (Some("BC_001"), Some("BC_003")));
        assert_eq!(related(&rounds[2]), (Some("BC_002"), Some("BC_100")));
    }

    #[test]
    fn single_round_batch() {
        let mut rounds = vec![round("BC_001")];
        link_batch(&mut rounds, None);
        assert_eq!(rounds[0].meta.related, RelatedPair::default());
    }

    #[test]
    fn prepend_patches_old_first() {
        let mut existing = vec![round("BC_010"), round("BC_011")];
        link_batch(&mut existing, None);
        let mut batch = vec![round("BC_001"), round("BC_002")];
        link_batch(&mut batch, None);

        prepend_batch(&mut existing, batch).unwrap();
        let ids: Vec<&str> = existing.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["BC_001", "BC_002", "BC_010", "BC_011"]);
        assert_eq!(related(&existing[1]), (Some("BC_001"), Some("BC_010")));
        assert_eq!(related(&existing[2]), (Some("BC_002"), Some("BC_011")));
    }

    #[test]
    fn append_patches_old_last() {
        let mut existing = vec![round("BC_001")];
        let mut batch = vec![round("BC_002"), round("BC_003")];
        link_batch(&mut batch, None);

        append_batch(&mut existing, batch).unwrap();
        assert_eq!(related(&existing[0]), (None, Some("BC_002")));
        assert_eq!(related(&existing[1]), (Some("BC_001"), Some("BC_003")));
    }

    #[test]
    fn splice_into_empty_is_plain_batch() {
        let mut existing = Vec::new();
        let mut batch = vec![round("BC_001"), round("BC_002")];
        link_batch(&mut batch, None);
        prepend_batch(&mut existing, batch).unwrap();
        assert_eq!(related(&existing[0]), (None, Some("BC_002")));
        assert_eq!(related(&existing[1]), (Some("BC_001"), None));
    }

    #[test]
    fn splice_rejects_colliding_ids() {
        let mut existing = vec![round("BC_001")];
        let batch = vec![round("BC_001")];
        assert_eq!(
            append_batch(&mut existing, batch),
            Err(IdError::Collision("BC_001".to_string()))
        );
        assert_eq!(existing.len(), 1);
    }
}
