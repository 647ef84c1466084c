use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Free-form visual configuration (color, variant, glow, ...). Stored as a
/// JSON object and exported as a single JSONB cell.
pub type Visual = serde_json::Map<String, Value>;

/// Movement descriptor shared by correct `pattern` and distractor `behavior`.
///
/// Motion names outside the generator's set are carried through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Motion {
    LinearInward,
    Zigzag,
    Wave,
    SeekCenter,
    Other(String),
}

impl Motion {
    /// The motion set the spawn allocator draws from.
    pub const ALL: [Motion; 4] = [
        Motion::LinearInward,
        Motion::Zigzag,
        Motion::Wave,
        Motion::SeekCenter,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::LinearInward => "linear_inward",
            Self::Zigzag => "zigzag",
            Self::Wave => "wave",
            Self::SeekCenter => "seek_center",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for Motion {
    fn from(name: String) -> Self {
        match name.as_str() {
            "linear_inward" => Self::LinearInward,
            "zigzag" => Self::Zigzag,
            "wave" => Self::Wave,
            "seek_center" => Self::SeekCenter,
            _ => Self::Other(name),
        }
    }
}

impl From<Motion> for String {
    fn from(motion: Motion) -> Self {
        motion.as_str().to_string()
    }
}

impl fmt::Display for Motion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The word/type/image triple every object carries.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Entry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Entry {
    pub fn word(word: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            word: Some(word.into()),
            kind: kind.into(),
            image: None,
        }
    }
}

/// The prompt shown to the player. Carries no kinematics.
///
/// In the authoring format the entry fields sit directly on the object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BaseObject {
    #[serde(flatten)]
    pub entry: Entry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub visual: Visual,
    /// Authored keys the pipeline does not model (`uuid`, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectObject {
    pub entry: Entry,
    pub spawn_position: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawn_spread: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawn_delay: Option<f64>,
    pub speed: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Motion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hp: Option<u32>,
    /// `None` means "no required order"; serialized as an explicit null.
    #[serde(default)]
    pub collection_order: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub visual: Visual,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistractorObject {
    pub entry: Entry,
    pub spawn_position: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawn_spread: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawn_delay: Option<f64>,
    pub speed: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hp: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior: Option<Motion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub visual: Visual,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    /// The word the player should have chosen instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// The `meta.related` previous/next pointer pair.
///
/// Legacy files sometimes carry `[]`; those read as two nulls and are always
/// written back as a two-element array.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RelatedPair {
    pub previous: Option<String>,
    pub next: Option<String>,
}

impl RelatedPair {
    pub fn new(previous: Option<String>, next: Option<String>) -> Self {
        Self { previous, next }
    }
}

impl Serialize for RelatedPair {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.previous)?;
        tuple.serialize_element(&self.next)?;
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for RelatedPair {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PairVisitor;

        impl<'de> Visitor<'de> for PairVisitor {
            type Value = RelatedPair;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an array of at most two round ids or nulls")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<RelatedPair, A::Error> {
                let previous = seq.next_element::<Option<String>>()?.flatten();
                let next = seq.next_element::<Option<String>>()?.flatten();
                if seq.next_element::<de::IgnoredAny>()?.is_some() {
                    return Err(de::Error::invalid_length(3, &self));
                }
                Ok(RelatedPair { previous, next })
            }

            fn visit_unit<E: de::Error>(self) -> Result<RelatedPair, E> {
                Ok(RelatedPair::default())
            }
        }

        deserializer.deserialize_any(PairVisitor)
    }
}

/// Provenance and linkage for a round.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub related: RelatedPair,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty_scaling: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn default_level() -> u32 {
    1
}

/// One self-contained quiz unit: a prompt, its answers and its decoys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub id: String,
    pub theme: String,
    pub chapter: String,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wave_duration: Option<f64>,
    pub base: BaseObject,
    #[serde(default)]
    pub correct: Vec<CorrectObject>,
    #[serde(default)]
    pub distractors: Vec<DistractorObject>,
    #[serde(default)]
    pub meta: Meta,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// The `base | correct | distractor` discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Base,
    Correct,
    Distractor,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Correct => "correct",
            Self::Distractor => "distractor",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A borrowed view of one object in a round, tagged by variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RoundObject<'a> {
    Base(&'a BaseObject),
    Correct(&'a CorrectObject),
    Distractor(&'a DistractorObject),
}

impl RoundObject<'_> {
    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Base(_) => ObjectType::Base,
            Self::Correct(_) => ObjectType::Correct,
            Self::Distractor(_) => ObjectType::Distractor,
        }
    }
}

impl Round {
    /// All objects in export order: base, then correct, then distractors,
    /// each paired with its index inside its own list.
    pub fn objects(&self) -> impl Iterator<Item = (usize, RoundObject<'_>)> {
        std::iter::once((0, RoundObject::Base(&self.base)))
            .chain(
                self.correct
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (i, RoundObject::Correct(c))),
            )
            .chain(
                self.distractors
                    .iter()
                    .enumerate()
                    .map(|(i, d)| (i, RoundObject::Distractor(d))),
            )
    }
}
