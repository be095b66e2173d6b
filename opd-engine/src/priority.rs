//! Priority classes and their urgency ranks.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AllocError;

/// Source category of a booking. Lower rank = more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriorityClass {
    Emergency,
    Paid,
    FollowUp,
    Online,
    WalkIn,
}

impl PriorityClass {
    /// The only class allowed to preempt an occupant.
    pub const TOP: PriorityClass = PriorityClass::Emergency;

    pub const ALL: [PriorityClass; 5] = [
        PriorityClass::Emergency,
        PriorityClass::Paid,
        PriorityClass::FollowUp,
        PriorityClass::Online,
        PriorityClass::WalkIn,
    ];

    pub fn rank(self) -> u8 {
        match self {
            Self::Emergency => 1,
            Self::Paid => 2,
            Self::FollowUp => 3,
            Self::Online => 4,
            Self::WalkIn => 5,
        }
    }

    pub fn from_rank(rank: u8) -> Result<Self, AllocError> {
        Self::ALL
            .into_iter()
            .find(|class| class.rank() == rank)
            .ok_or_else(|| AllocError::InvalidCategory(rank.to_string()))
    }

    pub fn is_top(self) -> bool {
        self == Self::TOP
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Emergency => "EMERGENCY",
            Self::Paid => "PAID",
            Self::FollowUp => "FOLLOW_UP",
            Self::Online => "ONLINE",
            Self::WalkIn => "WALK_IN",
        }
    }
}

impl std::fmt::Display for PriorityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriorityClass {
    type Err = AllocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|class| class.as_str() == normalized)
            .ok_or_else(|| AllocError::InvalidCategory(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_follow_urgency_order() {
        let ranks: Vec<u8> = PriorityClass::ALL.iter().map(|c| c.rank()).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn enum_order_matches_rank_order() {
        assert!(PriorityClass::Emergency < PriorityClass::Paid);
        assert!(PriorityClass::Online < PriorityClass::WalkIn);
    }

    #[test]
    fn from_rank_round_trips() {
        for class in PriorityClass::ALL {
            assert_eq!(PriorityClass::from_rank(class.rank()).unwrap(), class);
        }
    }

    #[test]
    fn from_rank_rejects_out_of_range() {
        assert_eq!(
            PriorityClass::from_rank(0),
            Err(AllocError::InvalidCategory("0".to_string()))
        );
        assert!(matches!(
            PriorityClass::from_rank(6),
            Err(AllocError::InvalidCategory(_))
        ));
    }

    #[test]
    fn only_emergency_is_top() {
        assert!(PriorityClass::Emergency.is_top());
        assert!(!PriorityClass::Paid.is_top());
        assert!(!PriorityClass::WalkIn.is_top());
    }

    #[test]
    fn parses_loose_spellings() {
        assert_eq!("walk-in".parse::<PriorityClass>().unwrap(), PriorityClass::WalkIn);
        assert_eq!("FOLLOW_UP".parse::<PriorityClass>().unwrap(), PriorityClass::FollowUp);
        assert_eq!(" emergency ".parse::<PriorityClass>().unwrap(), PriorityClass::Emergency);
        assert!(matches!(
            "vip".parse::<PriorityClass>(),
            Err(AllocError::InvalidCategory(s)) if s == "vip"
        ));
    }

    #[test]
    fn serializes_screaming_snake_case() {
        insta::assert_json_snapshot!(PriorityClass::ALL, @r#"
        [
          "EMERGENCY",
          "PAID",
          "FOLLOW_UP",
          "ONLINE",
          "WALK_IN"
        ]
        "#);
    }
}
