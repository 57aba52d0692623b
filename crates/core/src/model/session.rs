use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{ItemId, OwnerId, SessionId, TopicId};
use crate::model::item::Item;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionStateError {
    #[error("cannot move session from {from} to {to}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },

    #[error("item order must run 1..=N without gaps (found {found} at position {position})")]
    InvalidItemOrder { position: usize, found: u32 },

    #[error("submitted_at is before created_at")]
    InvalidTimeRange,

    #[error("invalid session state: {0}")]
    UnknownState(String),

    #[error("invalid scope: {0}")]
    InvalidScope(String),

    #[error("persisted state {state} is inconsistent with its timestamps")]
    InconsistentTimestamps { state: SessionState },
}

//
// ─── SCOPE ─────────────────────────────────────────────────────────────────────
//

/// The context an attempt belongs to. At most one unfinished session may exist
/// per owner and scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "topic_id", rename_all = "snake_case")]
pub enum Scope {
    Topic(TopicId),
    Global,
}

impl Scope {
    /// Stable string key, e.g. `topic:7` or `global`.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Scope::Topic(topic) => format!("topic:{topic}"),
            Scope::Global => "global".to_owned(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for Scope {
    type Err = SessionStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "global" {
            return Ok(Scope::Global);
        }
        s.strip_prefix("topic:")
            .and_then(|raw| raw.parse::<TopicId>().ok())
            .map(Scope::Topic)
            .ok_or_else(|| SessionStateError::InvalidScope(s.to_owned()))
    }
}

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

/// Session lifecycle. Transitions only move forward:
/// `Pending → InProgress → Submitted`, or any non-terminal state `→ Discarded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Pending,
    InProgress,
    Submitted,
    Discarded,
}

impl SessionState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Pending => "pending",
            SessionState::InProgress => "in_progress",
            SessionState::Submitted => "submitted",
            SessionState::Discarded => "discarded",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Submitted | SessionState::Discarded)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionState {
    type Err = SessionStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "submitted" => Ok(Self::Submitted),
            "discarded" => Ok(Self::Discarded),
            other => Err(SessionStateError::UnknownState(other.to_owned())),
        }
    }
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One knowledge-check attempt and its frozen item list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    id: SessionId,
    owner_id: OwnerId,
    scope: Scope,
    state: SessionState,
    items: Vec<Item>,
    created_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    discarded_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Create a pending session over `items`.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::InvalidItemOrder` unless items are numbered
    /// `1..=N` in order.
    pub fn new(
        id: SessionId,
        owner_id: OwnerId,
        scope: Scope,
        items: Vec<Item>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, SessionStateError> {
        check_item_order(&items)?;
        Ok(Self {
            id,
            owner_id,
            scope,
            state: SessionState::Pending,
            items,
            created_at,
            submitted_at: None,
            discarded_at: None,
        })
    }

    /// Rehydrate a session from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError` if items are out of order or timestamps
    /// disagree with the state.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: SessionId,
        owner_id: OwnerId,
        scope: Scope,
        state: SessionState,
        items: Vec<Item>,
        created_at: DateTime<Utc>,
        submitted_at: Option<DateTime<Utc>>,
        discarded_at: Option<DateTime<Utc>>,
    ) -> Result<Self, SessionStateError> {
        check_item_order(&items)?;
        let consistent = match state {
            SessionState::Pending | SessionState::InProgress => {
                submitted_at.is_none() && discarded_at.is_none()
            }
            SessionState::Submitted => submitted_at.is_some() && discarded_at.is_none(),
            SessionState::Discarded => submitted_at.is_none() && discarded_at.is_some(),
        };
        if !consistent {
            return Err(SessionStateError::InconsistentTimestamps { state });
        }
        if submitted_at.is_some_and(|at| at < created_at) {
            return Err(SessionStateError::InvalidTimeRange);
        }

        Ok(Self {
            id,
            owner_id,
            scope,
            state,
            items,
            created_at,
            submitted_at,
            discarded_at,
        })
    }

    /// `Pending → InProgress`.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::InvalidTransition` from any other state.
    pub fn begin(&mut self) -> Result<(), SessionStateError> {
        self.transition(SessionState::Pending, SessionState::InProgress)
    }

    /// `InProgress → Submitted`, stamping `submitted_at`.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::InvalidTransition` unless in progress, or
    /// `InvalidTimeRange` if `at` precedes creation.
    pub fn submit(&mut self, at: DateTime<Utc>) -> Result<(), SessionStateError> {
        if at < self.created_at {
            return Err(SessionStateError::InvalidTimeRange);
        }
        self.transition(SessionState::InProgress, SessionState::Submitted)?;
        self.submitted_at = Some(at);
        Ok(())
    }

    /// Any non-terminal state `→ Discarded`.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::InvalidTransition` if already terminal.
    pub fn discard(&mut self, at: DateTime<Utc>) -> Result<(), SessionStateError> {
        if self.state.is_terminal() {
            return Err(SessionStateError::InvalidTransition {
                from: self.state,
                to: SessionState::Discarded,
            });
        }
        self.state = SessionState::Discarded;
        self.discarded_at = Some(at);
        Ok(())
    }

    fn transition(
        &mut self,
        expected: SessionState,
        next: SessionState,
    ) -> Result<(), SessionStateError> {
        if self.state != expected {
            return Err(SessionStateError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    #[must_use]
    pub fn scope(&self) -> Scope {
        self.scope
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    #[must_use]
    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    #[must_use]
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    #[must_use]
    pub fn discarded_at(&self) -> Option<DateTime<Utc>> {
        self.discarded_at
    }
}

fn check_item_order(items: &[Item]) -> Result<(), SessionStateError> {
    for (position, item) in items.iter().enumerate() {
        let expected = u32::try_from(position + 1).unwrap_or(u32::MAX);
        if item.order_no != expected {
            return Err(SessionStateError::InvalidItemOrder {
                position,
                found: item.order_no,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnswerKey, Choice, Difficulty, Question, QuestionId};
    use crate::time::fixed_now;

    fn item(order_no: u32) -> Item {
        let q = Question::new(
            QuestionId::new(u64::from(order_no)),
            vec![],
            order_no,
            format!("Q{order_no}"),
            vec![Choice::new("A", "a"), Choice::new("B", "b")],
            AnswerKey::Single {
                correct: "A".into(),
            },
            None,
            Difficulty::Beginner,
        )
        .unwrap();
        Item::snapshot(ItemId::generate(), order_no, &q)
    }

    fn session() -> Session {
        Session::new(
            SessionId::generate(),
            OwnerId::new(1),
            Scope::Global,
            vec![item(1), item(2)],
            fixed_now(),
        )
        .unwrap()
    }

    #[test]
    fn scope_key_roundtrip() {
        let topic = Scope::Topic(TopicId::new(7));
        assert_eq!(topic.key(), "topic:7");
        assert_eq!("topic:7".parse::<Scope>().unwrap(), topic);
        assert_eq!("global".parse::<Scope>().unwrap(), Scope::Global);
        assert!("topic:x".parse::<Scope>().is_err());
    }

    #[test]
    fn lifecycle_moves_forward_only() {
        let mut s = session();
        assert_eq!(s.state(), SessionState::Pending);
        s.begin().unwrap();
        assert_eq!(s.state(), SessionState::InProgress);
        assert!(s.begin().is_err());

        s.submit(fixed_now()).unwrap();
        assert_eq!(s.state(), SessionState::Submitted);
        assert_eq!(s.submitted_at(), Some(fixed_now()));

        let err = s.submit(fixed_now()).unwrap_err();
        assert_eq!(
            err,
            SessionStateError::InvalidTransition {
                from: SessionState::Submitted,
                to: SessionState::Submitted,
            }
        );
        assert!(s.discard(fixed_now()).is_err());
    }

    #[test]
    fn pending_or_running_sessions_can_be_discarded() {
        let mut pending = session();
        pending.discard(fixed_now()).unwrap();
        assert_eq!(pending.state(), SessionState::Discarded);
        assert!(pending.begin().is_err());

        let mut running = session();
        running.begin().unwrap();
        running.discard(fixed_now()).unwrap();
        assert!(running.state().is_terminal());
    }

    #[test]
    fn item_order_gaps_are_rejected() {
        let err = Session::new(
            SessionId::generate(),
            OwnerId::new(1),
            Scope::Global,
            vec![item(1), item(3)],
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            SessionStateError::InvalidItemOrder {
                position: 1,
                found: 3
            }
        );
    }

    #[test]
    fn persisted_state_must_match_timestamps() {
        let err = Session::from_persisted(
            SessionId::generate(),
            OwnerId::new(1),
            Scope::Global,
            SessionState::Submitted,
            vec![item(1)],
            fixed_now(),
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SessionStateError::InconsistentTimestamps { .. }
        ));
    }
}
