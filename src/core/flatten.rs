/// Variant flattening: nested rounds to one relational row per object, and back.

use rustc_hash::FxHashMap;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::schema::round::{
    BaseObject, CorrectObject, DistractorObject, Entry, Motion, ObjectType, Round, RoundObject,
    Visual,
};

#[derive(Debug, Error, PartialEq)]
pub enum NestError {
    #[error("round {0} has no base row")]
    MissingBase(String),
    #[error("round {round_id} has more than one base row")]
    DuplicateBase { round_id: String },
    #[error("{object_type} row {order_index} of round {round_id} lacks {field}")]
    MissingField {
        round_id: String,
        object_type: ObjectType,
        order_index: usize,
        field: &'static str,
    },
}

/// One `round_objects` row. Fields a variant does not carry stay `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectRow {
    pub round_id: String,
    pub theme_id: String,
    pub object_type: Option<ObjectType>,
    pub order_index: usize,
    pub word: Option<String>,
    pub entry_type: Option<String>,
    pub image: Option<String>,
    pub visual: Option<Visual>,
    pub spawn_position: Option<f64>,
    pub spawn_spread: Option<f64>,
    pub spawn_delay: Option<f64>,
    pub speed: Option<f64>,
    pub points: Option<u32>,
    pub hp: Option<u32>,
    pub pattern: Option<Motion>,
    pub collection_order: Option<u32>,
    pub damage: Option<u32>,
    pub behavior: Option<Motion>,
    pub redirect: Option<String>,
    pub context: Option<String>,
    pub sound: Option<String>,
    /// Authored keys outside the relational columns; never exported.
    pub extra: BTreeMap<String, Value>,
}

impl ObjectRow {
    fn with_entry(round: &Round, kind: ObjectType, order_index: usize, entry: &Entry) -> Self {
        Self {
            round_id: round.id.clone(),
            theme_id: round.theme.clone(),
            object_type: Some(kind),
            order_index,
            word: entry.word.clone(),
            entry_type: Some(entry.kind.clone()),
            image: entry.image.clone(),
            ..Self::default()
        }
    }

    pub fn from_object(round: &Round, order_index: usize, object: RoundObject<'_>) -> Self {
        match object {
            RoundObject::Base(base) => Self {
                visual: Some(base.visual.clone()),
                context: base.context.clone(),
                extra: base.extra.clone(),
                ..Self::with_entry(round, ObjectType::Base, order_index, &base.entry)
            },
            RoundObject::Correct(c) => Self {
                visual: Some(c.visual.clone()),
                spawn_position: Some(c.spawn_position),
                spawn_spread: c.spawn_spread,
                spawn_delay: c.spawn_delay,
                speed: Some(c.speed),
                points: c.points,
                hp: c.hp,
                pattern: c.pattern.clone(),
                collection_order: c.collection_order,
                context: c.context.clone(),
                sound: c.sound.clone(),
                extra: c.extra.clone(),
                ..Self::with_entry(round, ObjectType::Correct, order_index, &c.entry)
            },
            RoundObject::Distractor(d) => Self {
                visual: Some(d.visual.clone()),
                spawn_position: Some(d.spawn_position),
                spawn_spread: d.spawn_spread,
                spawn_delay: d.spawn_delay,
                speed: Some(d.speed),
                points: d.points,
                hp: d.hp,
                damage: d.damage,
                behavior: d.behavior.clone(),
                redirect: d.redirect.clone(),
                context: d.context.clone(),
                sound: d.sound.clone(),
                extra: d.extra.clone(),
                ..Self::with_entry(round, ObjectType::Distractor, order_index, &d.entry)
            },
        }
    }

    fn entry(&self) -> Entry {
        Entry {
            word: self.word.clone(),
            kind: self.entry_type.clone().unwrap_or_default(),
            image: self.image.clone(),
        }
    }

    fn require<T: Clone>(&self, value: &Option<T>, field: &'static str) -> Result<T, NestError> {
        value.clone().ok_or_else(|| NestError::MissingField {
            round_id: self.round_id.clone(),
            object_type: self.object_type.unwrap_or(ObjectType::Base),
            order_index: self.order_index,
            field,
        })
    }
}

/// Rows for every object of every round, in round order then
/// base/correct/distractor order.
pub fn flatten(rounds: &[Round]) -> Vec<ObjectRow> {
    rounds
        .iter()
        .flat_map(|round| {
            round
                .objects()
                .map(move |(i, object)| ObjectRow::from_object(round, i, object))
        })
        .collect()
}

/// The object lists of one round, rebuilt from rows.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedObjects {
    pub round_id: String,
    pub base: BaseObject,
    pub correct: Vec<CorrectObject>,
    pub distractors: Vec<DistractorObject>,
}

#[derive(Default)]
struct Group<'a> {
    base: Vec<&'a ObjectRow>,
    correct: Vec<&'a ObjectRow>,
    distractors: Vec<&'a ObjectRow>,
}

/// Regroup rows by `(round_id, object_type)`, order each group by
/// `order_index`, and rebuild the nested objects. Rounds come back in
/// first-seen order.
pub fn nest(rows: &[ObjectRow]) -> Result<Vec<NestedObjects>, NestError> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: FxHashMap<&str, Group<'_>> = FxHashMap::default();

    for row in rows {
        let group = groups.entry(row.round_id.as_str()).or_insert_with(|| {
            order.push(row.round_id.as_str());
            Group::default()
        });
        match row.object_type {
            Some(ObjectType::Correct) => group.correct.push(row),
            Some(ObjectType::Distractor) => group.distractors.push(row),
            Some(ObjectType::Base) | None => group.base.push(row),
        }
    }

    let mut nested = Vec::with_capacity(order.len());
    for round_id in order {
        let Some(mut group) = groups.remove(round_id) else {
            continue;
        };
        group.correct.sort_by_key(|r| r.order_index);
        group.distractors.sort_by_key(|r| r.order_index);

        let base_row = match group.base.as_slice() {
            [] => return Err(NestError::MissingBase(round_id.to_string())),
            [row] => *row,
            _ => {
                return Err(NestError::DuplicateBase {
                    round_id: round_id.to_string(),
                })
            }
        };

        let base = BaseObject {
            entry: base_row.entry(),
            context: base_row.context.clone(),
            visual: base_row.visual.clone().unwrap_or_default(),
            extra: base_row.extra.clone(),
        };

        let correct = group
            .correct
            .iter()
            .map(|row| {
                Ok(CorrectObject {
                    entry: row.entry(),
                    spawn_position: row.require(&row.spawn_position, "spawn_position")?,
                    spawn_spread: row.spawn_spread,
                    spawn_delay: row.spawn_delay,
                    speed: row.require(&row.speed, "speed")?,
                    points: row.points,
                    pattern: row.pattern.clone(),
                    hp: row.hp,
                    collection_order: row.collection_order,
                    context: row.context.clone(),
                    visual: row.visual.clone().unwrap_or_default(),
                    sound: row.sound.clone(),
                    extra: row.extra.clone(),
                })
            })
            .collect::<Result<Vec<_>, NestError>>()?;

        let distractors = group
            .distractors
            .iter()
            .map(|row| {
                Ok(DistractorObject {
                    entry: row.entry(),
                    spawn_position: row.require(&row.spawn_position, "spawn_position")?,
                    spawn_spread: row.spawn_spread,
                    spawn_delay: row.spawn_delay,
                    speed: row.require(&row.speed, "speed")?,
                    points: row.points,
                    hp: row.hp,
                    damage: row.damage,
                    behavior: row.behavior.clone(),
                    context: row.context.clone(),
                    visual: row.visual.clone().unwrap_or_default(),
                    sound: row.sound.clone(),
                    redirect: row.redirect.clone(),
                    extra: row.extra.clone(),
                })
            })
            .collect::<Result<Vec<_>, NestError>>()?;

        nested.push(NestedObjects {
            round_id: round_id.to_string(),
            base,
            correct,
            distractors,
        });
    }

    Ok(nested)
}

/// Row counts by object type.
pub fn count_by_type(rows: &[ObjectRow]) -> FxHashMap<ObjectType, usize> {
    let mut counts = FxHashMap::default();
    for row in rows {
        if let Some(kind) = row.object_type {
            *counts.entry(kind).or_insert(0) += 1;
        }
    }
    counts
}
