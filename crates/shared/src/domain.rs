use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    #[serde(rename = "AI", alias = "ai", alias = "Neura")]
    Ai,
    #[serde(rename = "Reference", alias = "reference", alias = "Oxford")]
    Reference,
}

impl Condition {
    pub fn label(self) -> &'static str {
        match self {
            Condition::Ai => "AI",
            Condition::Reference => "Reference",
        }
    }

    pub fn shows_assistant(self) -> bool {
        matches!(self, Condition::Ai)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether the participant found the resource helpful for one answer section.
///
/// Serialised as `"Yes"`, `"No"` or `null` so saved records match what the
/// participant page submits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HelpfulRating {
    Yes,
    No,
    #[default]
    Unset,
}

impl Serialize for HelpfulRating {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            HelpfulRating::Yes => serializer.serialize_str("Yes"),
            HelpfulRating::No => serializer.serialize_str("No"),
            HelpfulRating::Unset => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for HelpfulRating {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(HelpfulRating::Unset),
            Some(value) if value.eq_ignore_ascii_case("yes") => Ok(HelpfulRating::Yes),
            Some(value) if value.eq_ignore_ascii_case("no") => Ok(HelpfulRating::No),
            Some(other) => Err(de::Error::custom(format!(
                "helpful rating must be \"Yes\", \"No\" or null, got \"{other}\""
            ))),
        }
    }
}

/// Answers for the case currently on screen. Every field may be blank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerBuffer {
    pub section_a: String,
    pub helpful_a: HelpfulRating,
    pub section_b: String,
    pub helpful_b: HelpfulRating,
    pub section_c: String,
    pub helpful_c: HelpfulRating,
}

impl AnswerBuffer {
    pub fn is_blank(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Case {
    pub index: usize,
    pub source_file: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}
