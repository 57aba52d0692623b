use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{OptionId, QuestionId, TopicId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question stem cannot be empty")]
    EmptyStem,

    #[error("choice questions need at least one choice")]
    NoChoices,

    #[error("duplicate choice id: {0}")]
    DuplicateChoice(OptionId),

    #[error("choice id cannot be empty")]
    EmptyChoiceId,

    #[error("answer key references unknown choice: {0}")]
    UnknownKeyOption(OptionId),

    #[error("multi-select key needs at least one correct option")]
    EmptyMultiKey,

    #[error("short-answer key needs at least one non-blank key point")]
    EmptyKeyPoints,

    #[error("invalid question kind: {0}")]
    InvalidKind(String),

    #[error("invalid difficulty: {0}")]
    InvalidDifficulty(String),
}

//
// ─── KIND & DIFFICULTY ─────────────────────────────────────────────────────────
//

/// Question type, which also decides the grading rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    /// Exactly one correct option.
    Single,
    /// A set of correct options, graded with partial credit.
    Multi,
    /// Free text graded by key-point containment.
    Short,
}

impl QuestionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionKind::Single => "single",
            QuestionKind::Multi => "multi",
            QuestionKind::Short => "short",
        }
    }
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionKind {
    type Err = QuestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(Self::Single),
            "multi" => Ok(Self::Multi),
            "short" => Ok(Self::Short),
            other => Err(QuestionError::InvalidKind(other.to_owned())),
        }
    }
}

/// Difficulty tag used when sampling a global assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }
}

impl FromStr for Difficulty {
    type Err = QuestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beginner" => Ok(Self::Beginner),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            other => Err(QuestionError::InvalidDifficulty(other.to_owned())),
        }
    }
}

/// Pool filter for global selection: one difficulty or the whole pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyFilter {
    #[default]
    Mixed,
    Only(Difficulty),
}

impl DifficultyFilter {
    /// Returns true when a question tagged `difficulty` belongs to this pool.
    #[must_use]
    pub fn admits(self, difficulty: Difficulty) -> bool {
        match self {
            DifficultyFilter::Mixed => true,
            DifficultyFilter::Only(wanted) => wanted == difficulty,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DifficultyFilter::Mixed => "mixed",
            DifficultyFilter::Only(d) => d.as_str(),
        }
    }
}

impl FromStr for DifficultyFilter {
    type Err = QuestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "mixed" {
            return Ok(Self::Mixed);
        }
        s.parse().map(Self::Only)
    }
}

//
// ─── CHOICES & ANSWER KEYS ─────────────────────────────────────────────────────
//

/// One selectable option of a choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: OptionId,
    pub label: String,
}

impl Choice {
    #[must_use]
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: OptionId::new(id),
            label: label.into(),
        }
    }
}

/// Type-specific grading data.
///
/// The variant fixes the question kind, so a key can never disagree with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerKey {
    Single { correct: OptionId },
    Multi { correct: BTreeSet<OptionId> },
    Short { key_points: Vec<String> },
}

impl AnswerKey {
    #[must_use]
    pub fn kind(&self) -> QuestionKind {
        match self {
            AnswerKey::Single { .. } => QuestionKind::Single,
            AnswerKey::Multi { .. } => QuestionKind::Multi,
            AnswerKey::Short { .. } => QuestionKind::Short,
        }
    }

    /// Human-readable correct answer, in the same form answers travel on the wire.
    #[must_use]
    pub fn display_answer(&self) -> String {
        match self {
            AnswerKey::Single { correct } => correct.to_string(),
            AnswerKey::Multi { correct } => correct
                .iter()
                .map(OptionId::as_str)
                .collect::<Vec<_>>()
                .join(","),
            AnswerKey::Short { key_points } => key_points.join(", "),
        }
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A question as stored in the bank.
///
/// Sessions never hold these directly; they hold `Item` snapshots taken at start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: QuestionId,
    topic_ids: Vec<TopicId>,
    order_no: u32,
    stem: String,
    choices: Vec<Choice>,
    key: AnswerKey,
    explanation: Option<String>,
    difficulty: Difficulty,
    is_active: bool,
}

impl Question {
    /// Builds a validated, active question.
    ///
    /// Key points of short-answer keys are trimmed and blank ones dropped.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` when the stem is blank, choices are missing or
    /// duplicated, or the key does not fit the choices.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: QuestionId,
        topic_ids: Vec<TopicId>,
        order_no: u32,
        stem: impl Into<String>,
        choices: Vec<Choice>,
        key: AnswerKey,
        explanation: Option<String>,
        difficulty: Difficulty,
    ) -> Result<Self, QuestionError> {
        let stem = stem.into();
        if stem.trim().is_empty() {
            return Err(QuestionError::EmptyStem);
        }

        let key = normalize_key(key)?;
        validate_choices(&choices, &key)?;

        let mut topic_ids = topic_ids;
        topic_ids.sort_unstable();
        topic_ids.dedup();

        Ok(Self {
            id,
            topic_ids,
            order_no,
            stem,
            choices,
            key,
            explanation: explanation.filter(|e| !e.trim().is_empty()),
            difficulty,
            is_active: true,
        })
    }

    /// Marks the question active or retired. Retired questions are never selected.
    #[must_use]
    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn topic_ids(&self) -> &[TopicId] {
        &self.topic_ids
    }

    #[must_use]
    pub fn order_no(&self) -> u32 {
        self.order_no
    }

    #[must_use]
    pub fn kind(&self) -> QuestionKind {
        self.key.kind()
    }

    #[must_use]
    pub fn stem(&self) -> &str {
        &self.stem
    }

    #[must_use]
    pub fn choices(&self) -> &[Choice] {
        &self.choices
    }

    #[must_use]
    pub fn key(&self) -> &AnswerKey {
        &self.key
    }

    #[must_use]
    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }

    #[must_use]
    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }
}

fn normalize_key(key: AnswerKey) -> Result<AnswerKey, QuestionError> {
    match key {
        AnswerKey::Single { correct } => {
            if correct.is_empty() {
                return Err(QuestionError::EmptyChoiceId);
            }
            Ok(AnswerKey::Single { correct })
        }
        AnswerKey::Multi { correct } => {
            if correct.is_empty() {
                return Err(QuestionError::EmptyMultiKey);
            }
            Ok(AnswerKey::Multi { correct })
        }
        AnswerKey::Short { key_points } => {
            let key_points: Vec<String> = key_points
                .into_iter()
                .map(|k| k.trim().to_owned())
                .filter(|k| !k.is_empty())
                .collect();
            if key_points.is_empty() {
                return Err(QuestionError::EmptyKeyPoints);
            }
            Ok(AnswerKey::Short { key_points })
        }
    }
}

fn validate_choices(choices: &[Choice], key: &AnswerKey) -> Result<(), QuestionError> {
    let mut seen = HashSet::with_capacity(choices.len());
    for choice in choices {
        if choice.id.is_empty() {
            return Err(QuestionError::EmptyChoiceId);
        }
        if !seen.insert(&choice.id) {
            return Err(QuestionError::DuplicateChoice(choice.id.clone()));
        }
    }

    let correct: Vec<&OptionId> = match key {
        AnswerKey::Single { correct } => vec![correct],
        AnswerKey::Multi { correct } => correct.iter().collect(),
        AnswerKey::Short { .. } => return Ok(()),
    };

    if choices.is_empty() {
        return Err(QuestionError::NoChoices);
    }
    match correct.into_iter().find(|id| !seen.contains(id)) {
        Some(unknown) => Err(QuestionError::UnknownKeyOption(unknown.clone())),
        None => Ok(()),
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn abcd() -> Vec<Choice> {
        vec![
            Choice::new("A", "Alpha"),
            Choice::new("B", "Beta"),
            Choice::new("C", "Gamma"),
            Choice::new("D", "Delta"),
        ]
    }

    #[test]
    fn blank_stem_is_rejected() {
        let err = Question::new(
            QuestionId::new(1),
            vec![],
            1,
            "   ",
            abcd(),
            AnswerKey::Single {
                correct: "A".into(),
            },
            None,
            Difficulty::Beginner,
        )
        .unwrap_err();
        assert_eq!(err, QuestionError::EmptyStem);
    }

    #[test]
    fn key_must_reference_existing_choice() {
        let err = Question::new(
            QuestionId::new(1),
            vec![],
            1,
            "Pick",
            abcd(),
            AnswerKey::Multi {
                correct: ["A".into(), "Z".into()].into_iter().collect(),
            },
            None,
            Difficulty::Beginner,
        )
        .unwrap_err();
        assert_eq!(err, QuestionError::UnknownKeyOption(OptionId::new("Z")));
    }

    #[test]
    fn duplicate_choices_are_rejected() {
        let mut choices = abcd();
        choices.push(Choice::new("A", "again"));
        let err = Question::new(
            QuestionId::new(1),
            vec![],
            1,
            "Pick",
            choices,
            AnswerKey::Single {
                correct: "A".into(),
            },
            None,
            Difficulty::Beginner,
        )
        .unwrap_err();
        assert_eq!(err, QuestionError::DuplicateChoice(OptionId::new("A")));
    }

    #[test]
    fn short_key_points_are_trimmed() {
        let q = Question::new(
            QuestionId::new(7),
            vec![TopicId::new(2), TopicId::new(1), TopicId::new(2)],
            3,
            "Explain the board's duties",
            Vec::new(),
            AnswerKey::Short {
                key_points: vec![" roles ".into(), "".into(), "impact".into()],
            },
            Some("  ".into()),
            Difficulty::Advanced,
        )
        .unwrap();

        assert_eq!(q.kind(), QuestionKind::Short);
        assert_eq!(
            q.key(),
            &AnswerKey::Short {
                key_points: vec!["roles".into(), "impact".into()]
            }
        );
        assert_eq!(q.topic_ids(), &[TopicId::new(1), TopicId::new(2)]);
        assert_eq!(q.explanation(), None);
        assert!(q.is_active());
    }

    #[test]
    fn difficulty_filter_parses_mixed_and_levels() {
        assert_eq!(
            "mixed".parse::<DifficultyFilter>().unwrap(),
            DifficultyFilter::Mixed
        );
        let only: DifficultyFilter = "advanced".parse().unwrap();
        assert!(only.admits(Difficulty::Advanced));
        assert!(!only.admits(Difficulty::Beginner));
        assert!("expert".parse::<DifficultyFilter>().is_err());
    }

    #[test]
    fn multi_key_displays_sorted() {
        let key = AnswerKey::Multi {
            correct: ["C".into(), "A".into()].into_iter().collect(),
        };
        assert_eq!(key.display_answer(), "A,C");
    }
}
