//! Admission and reallocation decisions.
//!
//! Both engines assume the caller holds the resource's exclusive guard for the
//! whole call; see [`crate::coordinator`].

mod admission;
mod reallocation;

use std::cmp::Reverse;

use crate::token::Token;

pub(crate) use admission::admit;
pub use admission::{Admission, Admitted, decide};
pub(crate) use reallocation::reallocate;
pub use reallocation::select_promotion;

/// The occupant an emergency would displace: least urgent first, oldest
/// created among equals.
pub fn select_victim(occupants: &[Token]) -> Option<&Token> {
    occupants
        .iter()
        .max_by_key(|t| (t.priority_rank(), Reverse(t.created_at())))
}

/// Sort waiting tokens into promotion order: most urgent first, FIFO within a
/// class.
pub fn promotion_order(tokens: &mut [Token]) {
    tokens.sort_by_key(|t| (t.priority_rank(), t.created_at()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priority::PriorityClass;
    use crate::token::TokenState;
    use crate::token::tests::token;

    #[test]
    fn victim_is_least_urgent() {
        let occupants = vec![
            token(1, PriorityClass::Paid, TokenState::Occupying),
            token(2, PriorityClass::WalkIn, TokenState::Occupying),
            token(3, PriorityClass::Online, TokenState::Occupying),
        ];
        assert_eq!(select_victim(&occupants).unwrap().id().get(), 2);
    }

    #[test]
    fn victim_tie_breaks_on_earliest_created() {
        let occupants = vec![
            token(4, PriorityClass::WalkIn, TokenState::Occupying),
            token(2, PriorityClass::WalkIn, TokenState::Occupying),
            token(9, PriorityClass::Emergency, TokenState::Occupying),
            token(3, PriorityClass::WalkIn, TokenState::Occupying),
        ];
        assert_eq!(select_victim(&occupants).unwrap().id().get(), 2);
    }

    #[test]
    fn victim_of_empty_set_is_none() {
        assert!(select_victim(&[]).is_none());
    }

    #[test]
    fn promotion_order_is_rank_then_fifo() {
        let mut waiting = vec![
            token(5, PriorityClass::WalkIn, TokenState::Waiting),
            token(3, PriorityClass::WalkIn, TokenState::Waiting),
            token(7, PriorityClass::FollowUp, TokenState::Waiting),
            token(6, PriorityClass::Emergency, TokenState::Waiting),
        ];
        promotion_order(&mut waiting);
        let ids: Vec<u64> = waiting.iter().map(|t| t.id().get()).collect();
        assert_eq!(ids, vec![6, 7, 3, 5]);
    }
}
