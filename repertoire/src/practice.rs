//! Practice session documents and the move vocabulary they record.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{require, ValidationError};
use crate::fen;
use crate::ids::{empty_as_none, OpeningId, RepertoireId, SessionId, UserId};
use crate::model::Color;
use crate::stats::Stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PracticeMode {
    /// Drill the opening named by `opening_id`.
    Specific,
    /// The client picks openings from the whole repertoire.
    Random,
}

impl PracticeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PracticeMode::Specific => "specific",
            PracticeMode::Random => "random",
        }
    }
}

impl FromStr for PracticeMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "specific" => Ok(PracticeMode::Specific),
            "random" => Ok(PracticeMode::Random),
            other => Err(ValidationError::OutOfRange {
                field: "mode",
                reason: format!("unknown practice mode {other:?}"),
            }),
        }
    }
}

/// Client-side drill settings, stored verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PracticeConfig {
    pub max_moves: u32,
    pub difficulty: String,
    pub allow_variations: bool,
}

impl Default for PracticeConfig {
    fn default() -> Self {
        Self {
            max_moves: 30,
            difficulty: "flexible".to_string(),
            allow_variations: false,
        }
    }
}

/// Quality label attached to a played move by the client.
///
/// `Repertoire` comes from the newer two-label scheme and aggregates
/// together with `Book`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveCategory {
    Book,
    Best,
    Good,
    Inaccuracy,
    Mistake,
    Blunder,
    Repertoire,
}

impl MoveCategory {
    pub const ALL: [MoveCategory; 7] = [
        MoveCategory::Book,
        MoveCategory::Best,
        MoveCategory::Good,
        MoveCategory::Inaccuracy,
        MoveCategory::Mistake,
        MoveCategory::Blunder,
        MoveCategory::Repertoire,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MoveCategory::Book => "book",
            MoveCategory::Best => "best",
            MoveCategory::Good => "good",
            MoveCategory::Inaccuracy => "inaccuracy",
            MoveCategory::Mistake => "mistake",
            MoveCategory::Blunder => "blunder",
            MoveCategory::Repertoire => "repertoire",
        }
    }

    /// Counts towards accuracy.
    pub fn is_correct(self) -> bool {
        matches!(
            self,
            MoveCategory::Book | MoveCategory::Repertoire | MoveCategory::Best | MoveCategory::Good
        )
    }
}

impl fmt::Display for MoveCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MoveCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MoveCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ValidationError::OutOfRange {
                field: "category",
                reason: format!("unknown move category {s:?}"),
            })
    }
}

/// One recorded half-move of a practice session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PracticeMove {
    pub ply: u32,
    pub fen_before: String,
    pub fen_after: String,
    pub user_move: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_move: Option<String>,
    pub category: MoveCategory,
    pub eval_before: i32,
    pub eval_after: i32,
    pub centipawn_loss: i32,
}

/// Body of a submit-move request. The ply is assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveSubmission {
    pub fen_before: String,
    pub fen_after: String,
    pub user_move: String,
    #[serde(default)]
    pub expected_move: Option<String>,
    pub category: MoveCategory,
    #[serde(default)]
    pub eval_before: i32,
    #[serde(default)]
    pub eval_after: i32,
    #[serde(default)]
    pub centipawn_loss: i32,
}

impl MoveSubmission {
    pub fn new(
        fen_before: impl Into<String>,
        fen_after: impl Into<String>,
        user_move: impl Into<String>,
        category: MoveCategory,
    ) -> Self {
        Self {
            fen_before: fen_before.into(),
            fen_after: fen_after.into(),
            user_move: user_move.into(),
            expected_move: None,
            category,
            eval_before: 0,
            eval_after: 0,
            centipawn_loss: 0,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require(&self.fen_before, "fen_before")?;
        require(&self.fen_after, "fen_after")?;
        require(&self.user_move, "user_move")?;
        fen::check_format(&self.fen_before)?;
        fen::check_format(&self.fen_after)?;
        Ok(())
    }

    pub fn into_move(self, ply: u32) -> PracticeMove {
        PracticeMove {
            ply,
            fen_before: self.fen_before,
            fen_after: self.fen_after,
            user_move: self.user_move.trim().to_string(),
            expected_move: self
                .expected_move
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty()),
            category: self.category,
            eval_before: self.eval_before,
            eval_after: self.eval_after,
            centipawn_loss: self.centipawn_loss,
        }
    }
}

/// Lifecycle position derived from the stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Started, nothing recorded yet.
    Created,
    Active,
    Ended,
}

impl SessionState {
    pub fn accepts_moves(self) -> bool {
        !matches!(self, SessionState::Ended)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticeSession {
    pub id: SessionId,
    pub user_id: UserId,
    pub repertoire_id: RepertoireId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opening_id: Option<OpeningId>,
    pub mode: PracticeMode,
    pub color: Color,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub moves: Vec<PracticeMove>,
    #[serde(default)]
    pub stats: Stats,
    #[serde(default)]
    pub config: PracticeConfig,
}

impl PracticeSession {
    /// A fresh session with no moves and zeroed stats.
    pub fn start(
        user_id: UserId,
        repertoire_id: RepertoireId,
        opening_id: Option<OpeningId>,
        mode: PracticeMode,
        color: Color,
        config: Option<PracticeConfig>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SessionId::new(),
            user_id,
            repertoire_id,
            opening_id,
            mode,
            color,
            started_at: now,
            ended_at: None,
            moves: Vec::new(),
            stats: Stats::default(),
            config: config.unwrap_or_default(),
        }
    }

    pub fn state(&self) -> SessionState {
        if self.ended_at.is_some() {
            SessionState::Ended
        } else if self.moves.is_empty() {
            SessionState::Created
        } else {
            SessionState::Active
        }
    }

    pub fn next_ply(&self) -> u32 {
        self.moves.len() as u32 + 1
    }

    pub fn find_move(&self, ply: u32) -> Option<&PracticeMove> {
        self.moves.iter().find(|m| m.ply == ply)
    }
}

/// Body of a start-session request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartPractice {
    pub repertoire_id: RepertoireId,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub opening_id: Option<OpeningId>,
    pub mode: PracticeMode,
    #[serde(default)]
    pub config: Option<PracticeConfig>,
}
