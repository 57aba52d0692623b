use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::model::ids::{ItemId, OptionId, SessionId};
use crate::model::question::QuestionKind;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnswerError {
    #[error("answer is for a {found} question but the item is {expected}")]
    KindMismatch {
        expected: QuestionKind,
        found: QuestionKind,
    },

    #[error("option {0} is not offered by this item")]
    UnknownOption(OptionId),

    #[error("single-choice answers take exactly one option, got {0}")]
    TooManyOptions(usize),
}

//
// ─── ANSWER VALUE ──────────────────────────────────────────────────────────────
//

/// A learner's answer, shaped by question kind.
///
/// On the wire every answer is a plain string (comma-joined for multi-select);
/// conversion happens only in `parse` and `to_wire`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AnswerValue {
    Single(OptionId),
    /// Canonical form: sorted, de-duplicated option ids.
    Multi(BTreeSet<OptionId>),
    Short(String),
}

impl AnswerValue {
    /// Parse a wire value for a question of the given kind.
    ///
    /// Multi-select input is split on commas, trimmed, and collected into a set,
    /// so `"C, A,A"` and `"A,C"` are the same answer.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError::TooManyOptions` if a single-choice value lists
    /// more than one option.
    pub fn parse(kind: QuestionKind, raw: &str) -> Result<Self, AnswerError> {
        match kind {
            QuestionKind::Single => {
                let parts = split_options(raw);
                if parts.len() > 1 {
                    return Err(AnswerError::TooManyOptions(parts.len()));
                }
                Ok(Self::Single(parts.into_iter().next().unwrap_or_else(|| OptionId::new(""))))
            }
            QuestionKind::Multi => Ok(Self::Multi(split_options(raw))),
            QuestionKind::Short => Ok(Self::Short(raw.trim().to_owned())),
        }
    }

    #[must_use]
    pub fn kind(&self) -> QuestionKind {
        match self {
            AnswerValue::Single(_) => QuestionKind::Single,
            AnswerValue::Multi(_) => QuestionKind::Multi,
            AnswerValue::Short(_) => QuestionKind::Short,
        }
    }

    /// True when the learner has not actually answered anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            AnswerValue::Single(option) => option.is_empty(),
            AnswerValue::Multi(options) => options.is_empty(),
            AnswerValue::Short(text) => text.trim().is_empty(),
        }
    }

    /// Serialize back to the wire string.
    #[must_use]
    pub fn to_wire(&self) -> String {
        match self {
            AnswerValue::Single(option) => option.to_string(),
            AnswerValue::Multi(options) => options
                .iter()
                .map(OptionId::as_str)
                .collect::<Vec<_>>()
                .join(","),
            AnswerValue::Short(text) => text.clone(),
        }
    }
}

fn split_options(raw: &str) -> BTreeSet<OptionId> {
    raw.split(',')
        .map(OptionId::new)
        .filter(|o| !o.is_empty())
        .collect()
}

//
// ─── ANSWER ────────────────────────────────────────────────────────────────────
//

/// Latest saved answer for one item of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub session_id: SessionId,
    pub item_id: ItemId,
    pub value: AnswerValue,
    pub saved_at: DateTime<Utc>,
}

impl Answer {
    #[must_use]
    pub fn new(
        session_id: SessionId,
        item_id: ItemId,
        value: AnswerValue,
        saved_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            item_id,
            value,
            saved_at,
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_values_are_canonicalized() {
        let a = AnswerValue::parse(QuestionKind::Multi, "C, A,A").unwrap();
        let b = AnswerValue::parse(QuestionKind::Multi, "A,C").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_wire(), "A,C");
    }

    #[test]
    fn single_rejects_several_options() {
        let err = AnswerValue::parse(QuestionKind::Single, "A,B").unwrap_err();
        assert_eq!(err, AnswerError::TooManyOptions(2));
    }

    #[test]
    fn blank_inputs_are_empty_answers() {
        assert!(AnswerValue::parse(QuestionKind::Single, " ").unwrap().is_empty());
        assert!(AnswerValue::parse(QuestionKind::Multi, ",, ").unwrap().is_empty());
        assert!(AnswerValue::parse(QuestionKind::Short, "\n").unwrap().is_empty());
        assert!(!AnswerValue::parse(QuestionKind::Short, "roles").unwrap().is_empty());
    }

    #[test]
    fn short_text_keeps_inner_content() {
        let v = AnswerValue::parse(QuestionKind::Short, "  Roles, impact  ").unwrap();
        assert_eq!(v, AnswerValue::Short("Roles, impact".into()));
        assert_eq!(v.kind(), QuestionKind::Short);
    }
}
