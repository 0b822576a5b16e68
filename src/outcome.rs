//! Head-to-head match resolution from graded results
//!
//! Grading never calls this; match layers use it to turn two verdicts into a
//! winner.

use serde::{Deserialize, Serialize};

use crate::core::Verdict;

/// One player's graded result in a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    /// Failed test cases
    pub errors: usize,
    /// Time taken to submit, in milliseconds
    pub elapsed_ms: u64,
}

impl Standing {
    pub fn new(errors: usize, elapsed_ms: u64) -> Self {
        Self { errors, elapsed_ms }
    }

    pub fn from_verdict(verdict: &Verdict, elapsed_ms: u64) -> Self {
        Self::new(verdict.errors, elapsed_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Player1,
    Player2,
}

/// Fewer errors wins, then less time. An exact tie goes to player 2.
pub fn decide_winner(player1: Standing, player2: Standing) -> Winner {
    if player1.errors != player2.errors {
        return if player1.errors < player2.errors {
            Winner::Player1
        } else {
            Winner::Player2
        };
    }
    if player1.elapsed_ms < player2.elapsed_ms {
        Winner::Player1
    } else {
        Winner::Player2
    }
}
