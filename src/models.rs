//! Domain types shared by the services and the HTTP layer

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BoardError;
use crate::voter_set::VoterSet;

/// Name shown for a voter id with no recorded identity
pub const UNKNOWN_VOTER: &str = "Unknown";

/// A submitted question with its current voters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedbackItem {
    pub id: i64,
    pub question: String,
    pub description: Option<String>,
    pub author_name: String,
    pub author_id: Option<String>,
    pub created_at: String,
    pub voter_ids: VoterSet,
    /// Always `voter_ids.len()`
    pub vote_count: usize,
}

impl FeedbackItem {
    pub fn has_voted(&self, voter_id: &str) -> bool {
        self.voter_ids.contains(voter_id)
    }
}

/// Listing entry: an item plus its voters' display names, in voter order
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackView {
    #[serde(flatten)]
    pub item: FeedbackItem,
    pub voter_names: Vec<String>,
}

/// Vote direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl FromStr for Direction {
    type Err = BoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            other => Err(BoardError::Validation(format!(
                "Unknown vote direction '{}', expected 'up' or 'down'",
                other
            ))),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// Listing order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListOrder {
    /// Most votes first; ties broken by most recent
    #[default]
    Votes,
    /// Most recent first
    Recent,
}

impl FromStr for ListOrder {
    type Err = BoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "votes" => Ok(ListOrder::Votes),
            "recent" => Ok(ListOrder::Recent),
            other => Err(BoardError::Validation(format!("Unknown list order '{}'", other))),
        }
    }
}

/// Result of applying a vote
#[derive(Debug, Clone, Serialize)]
pub struct VoteOutcome {
    pub item: FeedbackItem,
    /// False when the vote was a no-op (repeat upvote, downvote without upvote)
    pub changed: bool,
}
