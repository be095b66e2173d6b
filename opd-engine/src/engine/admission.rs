//! Admission of newly submitted tokens.

use serde::Serialize;

use super::select_victim;
use crate::error::{AllocError, Result};
use crate::priority::PriorityClass;
use crate::store::TokenStore;
use crate::token::{Token, TokenDraft, TokenId, TokenState};

/// What to do with a new submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A unit is free.
    Occupy,
    /// Full, and either not an emergency or every occupant is an emergency.
    Wait,
    /// Full; demote `victim` and seat the new token in its place.
    Preempt { victim: TokenId },
}

/// Result of a submission.
#[derive(Debug, Clone, Serialize)]
pub struct Admitted {
    pub token: Token,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preempted: Option<TokenId>,
}

impl Admitted {
    pub fn token_id(&self) -> TokenId {
        self.token.id()
    }

    pub fn state(&self) -> TokenState {
        self.token.state()
    }
}

/// Pure admission decision.
///
/// `victim` is the result of [`select_victim`] over the current occupants and
/// is only consulted when the slot is full and `class` is top priority.
pub fn decide(
    class: PriorityClass,
    capacity: usize,
    active: usize,
    victim: Option<&Token>,
) -> Admission {
    if active < capacity {
        return Admission::Occupy;
    }
    if !class.is_top() {
        return Admission::Wait;
    }
    match victim {
        Some(v) if !v.priority_class().is_top() => Admission::Preempt { victim: v.id() },
        _ => Admission::Wait,
    }
}

/// Admit `draft` against a resource of `capacity`.
///
/// On preemption the victim is written back as `Waiting` before the new
/// occupant is created, so the occupying count never exceeds capacity.
pub(crate) async fn admit(
    tokens: &dyn TokenStore,
    capacity: usize,
    draft: TokenDraft,
) -> Result<Admitted> {
    let resource = draft.resource_id();
    let class = draft.priority_class();

    let active = tokens
        .count_by_resource_and_state(resource, TokenState::Occupying)
        .await?;

    let victim = if active >= capacity && class.is_top() {
        let occupants = tokens
            .list_by_resource_and_state(resource, TokenState::Occupying)
            .await?;
        select_victim(&occupants).cloned()
    } else {
        None
    };

    match decide(class, capacity, active, victim.as_ref()) {
        Admission::Occupy => {
            let token = tokens.create(draft.admit(TokenState::Occupying)?).await?;
            tracing::info!(
                %resource,
                token = %token.id(),
                class = %class,
                active = active + 1,
                capacity,
                "Token admitted"
            );
            Ok(Admitted {
                token,
                preempted: None,
            })
        }
        Admission::Wait => {
            let token = tokens.create(draft.admit(TokenState::Waiting)?).await?;
            if class.is_top() {
                tracing::warn!(
                    %resource,
                    token = %token.id(),
                    capacity,
                    "Slot saturated with emergencies, emergency waitlisted"
                );
            } else {
                tracing::info!(
                    %resource,
                    token = %token.id(),
                    class = %class,
                    "Slot full, token waitlisted"
                );
            }
            Ok(Admitted {
                token,
                preempted: None,
            })
        }
        Admission::Preempt { victim: victim_id } => {
            let mut victim = tokens
                .get(victim_id)
                .await?
                .ok_or(AllocError::TokenNotFound(victim_id))?;
            victim.transition(TokenState::Waiting)?;
            tokens.update(&victim).await?;

            let token = tokens.create(draft.admit(TokenState::Occupying)?).await?;
            tracing::info!(
                %resource,
                token = %token.id(),
                victim = %victim_id,
                victim_class = %victim.priority_class(),
                "Emergency preempted occupant"
            );
            Ok(Admitted {
                token,
                preempted: Some(victim_id),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryTokenStore, ResourceId};
    use crate::token::tests::token;
    use crate::token::{RequestMetadata, WaitReason};

    fn submission(class: PriorityClass) -> TokenDraft {
        TokenDraft::new(ResourceId::new(1), class, RequestMetadata::default())
    }

    #[test]
    fn decide_occupies_when_free() {
        for class in PriorityClass::ALL {
            assert_eq!(decide(class, 2, 1, None), Admission::Occupy);
        }
    }

    #[test]
    fn decide_waits_when_full_and_not_top() {
        let occupant = token(1, PriorityClass::WalkIn, TokenState::Occupying);
        assert_eq!(
            decide(PriorityClass::Paid, 1, 1, Some(&occupant)),
            Admission::Wait
        );
    }

    #[test]
    fn decide_preempts_for_emergency() {
        let occupant = token(4, PriorityClass::Paid, TokenState::Occupying);
        assert_eq!(
            decide(PriorityClass::Emergency, 1, 1, Some(&occupant)),
            Admission::Preempt {
                victim: TokenId::new(4)
            }
        );
    }

    #[test]
    fn decide_waits_when_saturated_with_emergencies() {
        let occupant = token(4, PriorityClass::Emergency, TokenState::Occupying);
        assert_eq!(
            decide(PriorityClass::Emergency, 1, 1, Some(&occupant)),
            Admission::Wait
        );
    }

    #[tokio::test]
    async fn admit_fills_then_waitlists() {
        let store = InMemoryTokenStore::new();

        let a = admit(&store, 2, submission(PriorityClass::WalkIn)).await.unwrap();
        let b = admit(&store, 2, submission(PriorityClass::WalkIn)).await.unwrap();
        let c = admit(&store, 2, submission(PriorityClass::WalkIn)).await.unwrap();

        assert_eq!(a.state(), TokenState::Occupying);
        assert_eq!(b.state(), TokenState::Occupying);
        assert_eq!(c.state(), TokenState::Waiting);
        assert_eq!(c.token.wait_reason(), Some(WaitReason::Queued));
        assert!(c.preempted.is_none());
    }

    #[tokio::test]
    async fn admit_emergency_demotes_oldest_least_urgent() {
        let store = InMemoryTokenStore::new();
        let a = admit(&store, 2, submission(PriorityClass::WalkIn)).await.unwrap();
        let b = admit(&store, 2, submission(PriorityClass::WalkIn)).await.unwrap();

        let d = admit(&store, 2, submission(PriorityClass::Emergency))
            .await
            .unwrap();

        assert_eq!(d.state(), TokenState::Occupying);
        assert_eq!(d.preempted, Some(a.token_id()));

        let a = store.get(a.token_id()).await.unwrap().unwrap();
        assert_eq!(a.state(), TokenState::Waiting);
        assert_eq!(a.wait_reason(), Some(WaitReason::Displaced));

        let b = store.get(b.token_id()).await.unwrap().unwrap();
        assert_eq!(b.state(), TokenState::Occupying);

        let active = store
            .count_by_resource_and_state(ResourceId::new(1), TokenState::Occupying)
            .await
            .unwrap();
        assert_eq!(active, 2);
    }

    #[tokio::test]
    async fn admit_emergency_prefers_least_urgent_over_oldest() {
        let store = InMemoryTokenStore::new();
        let _paid = admit(&store, 2, submission(PriorityClass::Paid)).await.unwrap();
        let online = admit(&store, 2, submission(PriorityClass::Online)).await.unwrap();

        let e = admit(&store, 2, submission(PriorityClass::Emergency))
            .await
            .unwrap();
        assert_eq!(e.preempted, Some(online.token_id()));
    }

    #[tokio::test]
    async fn admit_emergency_saturation_changes_nothing() {
        let store = InMemoryTokenStore::new();
        let e1 = admit(&store, 2, submission(PriorityClass::Emergency))
            .await
            .unwrap();
        let e2 = admit(&store, 2, submission(PriorityClass::Emergency))
            .await
            .unwrap();

        let e3 = admit(&store, 2, submission(PriorityClass::Emergency))
            .await
            .unwrap();

        assert_eq!(e3.state(), TokenState::Waiting);
        assert!(e3.preempted.is_none());
        for id in [e1.token_id(), e2.token_id()] {
            let t = store.get(id).await.unwrap().unwrap();
            assert_eq!(t.state(), TokenState::Occupying);
        }
    }
}
