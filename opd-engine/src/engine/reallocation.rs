//! Waitlist backfill after an occupant frees its unit.

use crate::error::Result;
use crate::store::{ResourceId, TokenStore};
use crate::token::{Token, TokenId, TokenState};

/// The waiting token to promote next: most urgent, then earliest created.
pub fn select_promotion(waiting: &[Token]) -> Option<&Token> {
    waiting
        .iter()
        .min_by_key(|t| (t.priority_rank(), t.created_at()))
}

/// Promote at most one waiting token into a freed unit.
///
/// Returns `None` when the slot is already full again or nobody is waiting.
/// Both are steady-state outcomes, not errors.
pub(crate) async fn reallocate(
    tokens: &dyn TokenStore,
    resource: ResourceId,
    capacity: usize,
) -> Result<Option<TokenId>> {
    let active = tokens
        .count_by_resource_and_state(resource, TokenState::Occupying)
        .await?;
    if active >= capacity {
        tracing::debug!(%resource, active, capacity, "Freed unit already reclaimed");
        return Ok(None);
    }

    let waiting = tokens
        .list_by_resource_and_state(resource, TokenState::Waiting)
        .await?;
    let Some(candidate) = select_promotion(&waiting) else {
        tracing::debug!(%resource, "Waitlist empty, nothing to promote");
        return Ok(None);
    };

    let mut promoted = candidate.clone();
    promoted.transition(TokenState::Occupying)?;
    tokens.update(&promoted).await?;

    tracing::info!(
        %resource,
        token = %promoted.id(),
        class = %promoted.priority_class(),
        waiting = waiting.len() - 1,
        "Promoted token from waitlist"
    );
    Ok(Some(promoted.id()))
}
