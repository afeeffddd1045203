//! Contestants: the unit that scores and ranks.
//!
//! Every robot belongs to exactly one contestant, either itself
//! ([`Contestant::Solo`]) or its team ([`Contestant::Team`]).

use serde::{Deserialize, Serialize};

use super::{RobotId, TeamId};

/// A team of robots competing as one contestant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamPeer {
    /// Team ID
    pub id: TeamId,
    /// Unique display name
    pub name: String,
    /// Members in declaration order
    pub members: Vec<RobotId>,
    /// Team leader (the first member)
    pub leader: RobotId,
}

/// The scoring unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Contestant {
    /// A robot without a team.
    Solo(RobotId),
    /// A team of robots.
    Team(TeamPeer),
}

impl Contestant {
    /// Robots scored under this contestant.
    #[must_use]
    pub fn members(&self) -> &[RobotId] {
        match self {
            Self::Solo(id) => std::slice::from_ref(id),
            Self::Team(team) => &team.members,
        }
    }

    /// Robot whose identity represents the contestant in results.
    #[must_use]
    pub fn representative(&self) -> RobotId {
        match self {
            Self::Solo(id) => *id,
            Self::Team(team) => team.leader,
        }
    }

    /// Team ID for team contestants.
    #[must_use]
    pub fn team_id(&self) -> Option<TeamId> {
        match self {
            Self::Solo(_) => None,
            Self::Team(team) => Some(team.id),
        }
    }

    /// True when `robot` is scored under this contestant.
    #[must_use]
    pub fn contains(&self, robot: RobotId) -> bool {
        self.members().contains(&robot)
    }
}
