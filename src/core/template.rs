/// Context-string templates: `{prompt} = {answer}` and friends.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TemplateError {
    #[error("template parse error: {0}")]
    Parse(String),
    #[error("unknown placeholder {{{0}}}")]
    UnknownPlaceholder(String),
    #[error("placeholder {{{0}}} has no value")]
    Unbound(&'static str),
}

/// The values a context template can interpolate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placeholder {
    /// The base prompt word.
    Prompt,
    /// The round's primary correct answer.
    Answer,
    /// The distractor's own word.
    Decoy,
    /// The distractor's word, lowercased.
    DecoyLower,
    /// A translation or explanation of the decoy.
    Gloss,
}

impl Placeholder {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "prompt" => Some(Self::Prompt),
            "answer" => Some(Self::Answer),
            "decoy" => Some(Self::Decoy),
            "decoy_lower" => Some(Self::DecoyLower),
            "gloss" => Some(Self::Gloss),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::Answer => "answer",
            Self::Decoy => "decoy",
            Self::DecoyLower => "decoy_lower",
            Self::Gloss => "gloss",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TemplateSegment {
    Literal(String),
    Slot(Placeholder),
}

/// Bindings supplied at render time.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateVars<'a> {
    pub prompt: Option<&'a str>,
    pub answer: Option<&'a str>,
    pub decoy: Option<&'a str>,
    pub gloss: Option<&'a str>,
}

/// A parsed context template.
///
/// Stored in descriptors as its source text and parsed on load, so a
/// malformed template fails the descriptor rather than the first round.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    source: String,
    pub segments: Vec<TemplateSegment>,
}

impl Template {
    /// Parse a template. `{name}` is a placeholder, `{{` and `}}` are
    /// literal braces.
    pub fn parse(input: &str) -> Result<Template, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = input.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') => {
                                return Err(TemplateError::Parse(
                                    "nested braces are not allowed".to_string(),
                                ))
                            }
                            Some(ch) => name.push(ch),
                            None => {
                                return Err(TemplateError::Parse("unclosed brace".to_string()))
                            }
                        }
                    }
                    if name.is_empty() {
                        return Err(TemplateError::Parse("empty braces".to_string()));
                    }
                    let slot = Placeholder::from_name(&name)
                        .ok_or(TemplateError::UnknownPlaceholder(name))?;
                    if !literal.is_empty() {
                        segments.push(TemplateSegment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(TemplateSegment::Slot(slot));
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => {
                    return Err(TemplateError::Parse(
                        "unmatched closing brace".to_string(),
                    ))
                }
                _ => literal.push(c),
            }
        }

        if !literal.is_empty() {
            segments.push(TemplateSegment::Literal(literal));
        }

        Ok(Template {
            source: input.to_string(),
            segments,
        })
    }

    pub fn render(&self, vars: &TemplateVars<'_>) -> Result<String, TemplateError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                TemplateSegment::Literal(text) => out.push_str(text),
                TemplateSegment::Slot(slot) => {
                    let value = match slot {
                        Placeholder::Prompt => vars.prompt.map(str::to_string),
                        Placeholder::Answer => vars.answer.map(str::to_string),
                        Placeholder::Decoy => vars.decoy.map(str::to_string),
                        Placeholder::DecoyLower => vars.decoy.map(str::to_lowercase),
                        Placeholder::Gloss => vars.gloss.map(str::to_string),
                    };
                    out.push_str(&value.ok_or(TemplateError::Unbound(slot.name()))?);
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Serialize for Template {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for Template {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Template::parse(&source).map_err(serde::de::Error::custom)
    }
}

/// The three context templates a content family uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextTemplates {
    pub correct: Template,
    pub near_miss: Template,
    pub humor: Template,
}

impl Default for ContextTemplates {
    fn default() -> Self {
        // Built from literals known to parse.
        let parse = |s: &str| Template::parse(s).unwrap_or_else(|_| Template {
            source: s.to_string(),
            segments: vec![TemplateSegment::Literal(s.to_string())],
        });
        Self {
            correct: parse("{prompt} = {answer}"),
            near_miss: parse("{decoy} = {gloss}"),
            humor: parse("{decoy} = {decoy_lower} (humorvoller Distraktor - nicht {answer}!)"),
        }
    }
}
