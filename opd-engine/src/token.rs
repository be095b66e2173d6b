//! Token lifecycle: states, legal transitions, and the token record itself.
//!
//! A token is only ever mutated through [`Token::transition`], which enforces
//! the transition table below. Identity fields (id, class, resource, creation
//! sequence) have no setters.
//!
//! ```text
//!  Pending ──► Occupying ──► Fulfilled | Cancelled | NoShow
//!     │          ▲   │
//!     │          │   ▼ (preempted)
//!     └────────► Waiting ──► Cancelled
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AllocError, Result};
use crate::priority::PriorityClass;
use crate::store::ResourceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(u64);

impl TokenId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TokenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Creation order assigned by the token store. Strictly increasing, never equal
/// for two tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sequence(u64);

impl Sequence {
    pub fn new(seq: u64) -> Self {
        Self(seq)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    /// Only exists mid-admission, before the token is written.
    Pending,
    Occupying,
    Waiting,
    Fulfilled,
    Cancelled,
    NoShow,
}

impl TokenState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Fulfilled | Self::Cancelled | Self::NoShow)
    }

    pub fn can_transition(self, to: TokenState) -> bool {
        use TokenState::*;
        matches!(
            (self, to),
            (Pending, Occupying)
                | (Pending, Waiting)
                | (Occupying, Fulfilled)
                | (Occupying, Cancelled)
                | (Occupying, NoShow)
                | (Occupying, Waiting)
                | (Waiting, Occupying)
                | (Waiting, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Occupying => "occupying",
            Self::Waiting => "waiting",
            Self::Fulfilled => "fulfilled",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no_show",
        }
    }
}

impl std::fmt::Display for TokenState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a token is in `Waiting`. Observability only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitReason {
    /// Queued at admission because the slot was full.
    Queued,
    /// Demoted from `Occupying` by an emergency preemption.
    Displaced,
}

/// Terminal outcome supplied by the application when releasing a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Fulfilled,
    Cancelled,
    NoShow,
}

impl Outcome {
    pub fn state(self) -> TokenState {
        match self {
            Self::Fulfilled => TokenState::Fulfilled,
            Self::Cancelled => TokenState::Cancelled,
            Self::NoShow => TokenState::NoShow,
        }
    }

    /// Whether releasing an occupant with this outcome promotes from the
    /// waitlist. `NoShow` vacates the unit without promoting anyone, so the
    /// next submission can take it ahead of the waitlist.
    pub fn triggers_backfill(self) -> bool {
        matches!(self, Self::Fulfilled | Self::Cancelled)
    }
}

/// Booking details carried alongside a token. Never inspected by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id_number: Option<String>,
}

impl RequestMetadata {
    pub fn patient(name: impl Into<String>) -> Self {
        Self {
            patient_name: Some(name.into()),
            ..Self::default()
        }
    }
}

/// A token that has been decided but not yet written to a store.
#[derive(Debug, Clone)]
pub struct TokenDraft {
    resource_id: ResourceId,
    priority_class: PriorityClass,
    state: TokenState,
    metadata: RequestMetadata,
    submitted_at: DateTime<Utc>,
}

impl TokenDraft {
    pub fn new(
        resource_id: ResourceId,
        priority_class: PriorityClass,
        metadata: RequestMetadata,
    ) -> Self {
        Self {
            resource_id,
            priority_class,
            state: TokenState::Pending,
            metadata,
            submitted_at: Utc::now(),
        }
    }

    pub(crate) fn admit(mut self, state: TokenState) -> Result<Self> {
        if !self.state.can_transition(state) {
            return Err(AllocError::InvalidTransition {
                from: self.state,
                to: state,
            });
        }
        self.state = state;
        Ok(self)
    }

    pub fn resource_id(&self) -> ResourceId {
        self.resource_id
    }

    pub fn priority_class(&self) -> PriorityClass {
        self.priority_class
    }

    pub fn state(&self) -> TokenState {
        self.state
    }

    /// Materialize the draft once the store has assigned identity.
    pub fn into_token(self, id: TokenId, created_at: Sequence) -> Token {
        let wait_reason = (self.state == TokenState::Waiting).then_some(WaitReason::Queued);
        Token {
            id,
            priority_class: self.priority_class,
            state: self.state,
            wait_reason,
            resource_id: self.resource_id,
            created_at,
            submitted_at: self.submitted_at,
            completed_at: None,
            metadata: self.metadata,
        }
    }
}

/// A single allocation request bound to one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    id: TokenId,
    priority_class: PriorityClass,
    state: TokenState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    wait_reason: Option<WaitReason>,
    resource_id: ResourceId,
    created_at: Sequence,
    submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    metadata: RequestMetadata,
}

impl Token {
    pub fn id(&self) -> TokenId {
        self.id
    }

    pub fn priority_class(&self) -> PriorityClass {
        self.priority_class
    }

    pub fn priority_rank(&self) -> u8 {
        self.priority_class.rank()
    }

    pub fn state(&self) -> TokenState {
        self.state
    }

    pub fn wait_reason(&self) -> Option<WaitReason> {
        self.wait_reason
    }

    pub fn resource_id(&self) -> ResourceId {
        self.resource_id
    }

    pub fn created_at(&self) -> Sequence {
        self.created_at
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn metadata(&self) -> &RequestMetadata {
        &self.metadata
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Move to `to` if the transition table allows it.
    ///
    /// Entering `Waiting` from `Occupying` tags the token as displaced;
    /// entering `Fulfilled` stamps `completed_at`.
    pub(crate) fn transition(&mut self, to: TokenState) -> Result<()> {
        if !self.state.can_transition(to) {
            return Err(AllocError::InvalidTransition {
                from: self.state,
                to,
            });
        }

        self.wait_reason = match (self.state, to) {
            (TokenState::Occupying, TokenState::Waiting) => Some(WaitReason::Displaced),
            (TokenState::Pending, TokenState::Waiting) => Some(WaitReason::Queued),
            _ => None,
        };
        if to == TokenState::Fulfilled {
            self.completed_at = Some(Utc::now());
        }
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn token(id: u64, class: PriorityClass, state: TokenState) -> Token {
        let draft = TokenDraft::new(ResourceId::new(1), class, RequestMetadata::default())
            .admit(state)
            .unwrap();
        draft.into_token(TokenId::new(id), Sequence::new(id))
    }

    #[test]
    fn terminal_states() {
        assert!(!TokenState::Pending.is_terminal());
        assert!(!TokenState::Occupying.is_terminal());
        assert!(!TokenState::Waiting.is_terminal());
        assert!(TokenState::Fulfilled.is_terminal());
        assert!(TokenState::Cancelled.is_terminal());
        assert!(TokenState::NoShow.is_terminal());
    }

    #[test]
    fn nothing_leaves_a_terminal_state() {
        let all = [
            TokenState::Pending,
            TokenState::Occupying,
            TokenState::Waiting,
            TokenState::Fulfilled,
            TokenState::Cancelled,
            TokenState::NoShow,
        ];
        for from in all.iter().filter(|s| s.is_terminal()) {
            for to in all {
                assert!(!from.can_transition(to), "{from} -> {to} must be illegal");
            }
        }
    }

    #[test]
    fn nothing_returns_to_pending() {
        assert!(!TokenState::Occupying.can_transition(TokenState::Pending));
        assert!(!TokenState::Waiting.can_transition(TokenState::Pending));
    }

    #[test]
    fn waiting_only_cancels_or_promotes() {
        assert!(TokenState::Waiting.can_transition(TokenState::Occupying));
        assert!(TokenState::Waiting.can_transition(TokenState::Cancelled));
        assert!(!TokenState::Waiting.can_transition(TokenState::Fulfilled));
        assert!(!TokenState::Waiting.can_transition(TokenState::NoShow));
    }

    #[test]
    fn draft_starts_pending_and_admits_once() {
        let draft = TokenDraft::new(
            ResourceId::new(3),
            PriorityClass::Paid,
            RequestMetadata::patient("Patient A"),
        );
        assert_eq!(draft.state(), TokenState::Pending);

        let draft = draft.admit(TokenState::Occupying).unwrap();
        assert_eq!(draft.state(), TokenState::Occupying);

        let t = draft.into_token(TokenId::new(1), Sequence::new(1));
        assert_eq!(t.resource_id(), ResourceId::new(3));
        assert_eq!(t.metadata().patient_name.as_deref(), Some("Patient A"));
    }

    #[test]
    fn draft_cannot_be_admitted_as_terminal() {
        let draft = TokenDraft::new(
            ResourceId::new(3),
            PriorityClass::Paid,
            RequestMetadata::default(),
        );
        assert_eq!(
            draft.admit(TokenState::Cancelled).unwrap_err(),
            AllocError::InvalidTransition {
                from: TokenState::Pending,
                to: TokenState::Cancelled,
            }
        );
    }

    #[test]
    fn queued_token_is_tagged() {
        let t = token(1, PriorityClass::WalkIn, TokenState::Waiting);
        assert_eq!(t.wait_reason(), Some(WaitReason::Queued));
    }

    #[test]
    fn preempted_token_is_tagged_displaced() {
        let mut t = token(1, PriorityClass::WalkIn, TokenState::Occupying);
        assert_eq!(t.wait_reason(), None);

        t.transition(TokenState::Waiting).unwrap();
        assert_eq!(t.state(), TokenState::Waiting);
        assert_eq!(t.wait_reason(), Some(WaitReason::Displaced));

        t.transition(TokenState::Occupying).unwrap();
        assert_eq!(t.wait_reason(), None);
    }

    #[test]
    fn fulfilled_stamps_completed_at() {
        let mut t = token(1, PriorityClass::Online, TokenState::Occupying);
        assert!(t.completed_at().is_none());

        t.transition(TokenState::Fulfilled).unwrap();
        assert!(t.completed_at().is_some());
        assert!(t.is_terminal());
    }

    #[test]
    fn cancelled_does_not_stamp_completed_at() {
        let mut t = token(1, PriorityClass::Online, TokenState::Occupying);
        t.transition(TokenState::Cancelled).unwrap();
        assert!(t.completed_at().is_none());
    }

    #[test]
    fn transition_out_of_terminal_fails() {
        let mut t = token(1, PriorityClass::Online, TokenState::Occupying);
        t.transition(TokenState::NoShow).unwrap();

        let err = t.transition(TokenState::Occupying).unwrap_err();
        assert_eq!(
            err,
            AllocError::InvalidTransition {
                from: TokenState::NoShow,
                to: TokenState::Occupying,
            }
        );
        assert_eq!(t.state(), TokenState::NoShow);
    }

    #[test]
    fn rank_is_derived_from_class() {
        let t = token(1, PriorityClass::FollowUp, TokenState::Occupying);
        assert_eq!(t.priority_rank(), 3);
    }

    #[test]
    fn outcome_maps_to_terminal_state() {
        assert_eq!(Outcome::Fulfilled.state(), TokenState::Fulfilled);
        assert_eq!(Outcome::Cancelled.state(), TokenState::Cancelled);
        assert_eq!(Outcome::NoShow.state(), TokenState::NoShow);
        assert!(Outcome::Fulfilled.triggers_backfill());
        assert!(Outcome::Cancelled.triggers_backfill());
        assert!(!Outcome::NoShow.triggers_backfill());
    }

    #[test]
    fn token_serializes_without_empty_fields() {
        let t = token(7, PriorityClass::WalkIn, TokenState::Waiting);
        let mut json = serde_json::to_value(&t).unwrap();
        json["submitted_at"] = serde_json::json!("[timestamp]");
        insta::assert_json_snapshot!(json, @r#"
        {
          "created_at": 7,
          "id": 7,
          "metadata": {},
          "priority_class": "WALK_IN",
          "resource_id": 1,
          "state": "waiting",
          "submitted_at": "[timestamp]",
          "wait_reason": "queued"
        }
        "#);
    }
}
