//! Repertoire and opening documents.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{require, ValidationError};
use crate::fen::{self, STARTING_FEN};
use crate::ids::{OpeningId, RepertoireId, UserId};
use crate::tree::MoveTree;

/// Side a repertoire is prepared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn as_str(self) -> &'static str {
        match self {
            Color::White => "white",
            Color::Black => "black",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Color {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "white" | "w" => Ok(Color::White),
            "black" | "b" => Ok(Color::Black),
            other => Err(ValidationError::OutOfRange {
                field: "color",
                reason: format!("expected white or black, got {other:?}"),
            }),
        }
    }
}

/// A user's named, color-scoped collection of openings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repertoire {
    pub id: RepertoireId,
    pub user_id: UserId,
    pub name: String,
    pub color: Color,
    #[serde(default)]
    pub openings: Vec<Opening>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    version: i64,
}

impl Repertoire {
    pub fn new(user_id: UserId, name: impl Into<String>, color: Color, now: DateTime<Utc>) -> Self {
        Self {
            id: RepertoireId::new(),
            user_id,
            name: name.into(),
            color,
            openings: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn opening(&self, id: OpeningId) -> Option<&Opening> {
        self.openings.iter().find(|o| o.id == id)
    }

    pub fn opening_mut(&mut self, id: OpeningId) -> Option<&mut Opening> {
        self.openings.iter_mut().find(|o| o.id == id)
    }

    /// Storage revision this document was read at.
    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require(&self.name, "name")?;
        self.openings.iter().try_for_each(Opening::validate)
    }
}

/// A starting position plus the prepared continuations from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opening {
    pub id: OpeningId,
    pub name: String,
    #[serde(default)]
    pub eco: Option<String>,
    pub starting_fen: String,
    #[serde(default)]
    pub moves: MoveTree,
}

impl Opening {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_opening(&self.name, &self.starting_fen, &self.moves)
    }

    /// Main line in move-number notation, e.g. `1. e4 c5 2. Nf3`.
    ///
    /// Falls back to numbering from move 1 with white to play when the
    /// starting FEN cannot be read.
    pub fn main_line_pgn(&self) -> String {
        let (mut number, mut white) = fen::move_clock(&self.starting_fen).unwrap_or((1, true));
        let mut out = String::new();
        for (i, node) in self.moves.main_line().into_iter().enumerate() {
            if !out.is_empty() {
                out.push(' ');
            }
            if white {
                out.push_str(&format!("{number}. "));
            } else if i == 0 {
                out.push_str(&format!("{number}... "));
            }
            out.push_str(&node.san);
            if !white {
                number += 1;
            }
            white = !white;
        }
        out
    }
}

/// Caller-supplied opening body; identity is assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOpening {
    pub name: String,
    #[serde(default)]
    pub eco: Option<String>,
    #[serde(default)]
    pub starting_fen: String,
    #[serde(default)]
    pub moves: MoveTree,
}

impl NewOpening {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            eco: None,
            starting_fen: String::new(),
            moves: MoveTree::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_opening(&self.name, self.effective_fen(), &self.moves)
    }

    pub fn into_opening(self, id: OpeningId) -> Opening {
        let starting_fen = self.effective_fen().to_string();
        Opening {
            id,
            name: self.name.trim().to_string(),
            eco: self
                .eco
                .map(|eco| eco.trim().to_string())
                .filter(|eco| !eco.is_empty()),
            starting_fen,
            moves: self.moves,
        }
    }

    fn effective_fen(&self) -> &str {
        match self.starting_fen.trim() {
            "" => STARTING_FEN,
            fen => fen,
        }
    }
}

fn validate_opening(name: &str, starting_fen: &str, moves: &MoveTree) -> Result<(), ValidationError> {
    require(name, "name")?;
    fen::check_format(starting_fen)?;
    for item in moves.walk() {
        fen::check_format(&item.node.fen)?;
        require(&item.node.san, "move")?;
        if item.depth == 0 && item.node.fen == starting_fen {
            return Err(ValidationError::OutOfRange {
                field: "moves",
                reason: format!("move {} does not leave the starting position", item.node.san),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::MoveNode;

    const E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1";
    const E4_C5: &str = "rnbqkbnr/pp1ppppp/8/2p5/4P3/8/PPPP1PPP/RNBQKBNR w KQkq c6 0 2";
    const E4_C5_NF3: &str = "rnbqkbnr/pp1ppppp/8/2p5/4P3/5N2/PPPP1PPP/RNBQKB1R b KQkq - 1 2";

    fn sicilian() -> NewOpening {
        let mut opening = NewOpening::new("Sicilian Defense");
        opening.eco = Some("B20".into());
        let e4 = opening
            .moves
            .insert(None, MoveNode::new("e4", "e2e4", E4).main_line())
            .unwrap();
        let c5 = opening
            .moves
            .insert(Some(e4), MoveNode::new("c5", "c7c5", E4_C5).main_line())
            .unwrap();
        opening
            .moves
            .insert(Some(c5), MoveNode::new("Nf3", "g1f3", E4_C5_NF3))
            .unwrap();
        opening
    }

    #[test]
    fn blank_starting_fen_defaults_to_initial_position() {
        let opening = sicilian().into_opening(OpeningId::new());
        assert_eq!(opening.starting_fen, STARTING_FEN);
        assert!(opening.validate().is_ok());
    }

    #[test]
    fn pgn_numbers_from_the_starting_position() {
        let opening = sicilian().into_opening(OpeningId::new());
        assert_eq!(opening.main_line_pgn(), "1. e4 c5 2. Nf3");
    }

    #[test]
    fn pgn_starting_with_black_uses_ellipsis() {
        let mut opening = NewOpening::new("Sicilian from e4");
        opening.starting_fen = E4.into();
        let c5 = opening
            .moves
            .insert(None, MoveNode::new("c5", "c7c5", E4_C5))
            .unwrap();
        opening
            .moves
            .insert(Some(c5), MoveNode::new("Nf3", "g1f3", E4_C5_NF3))
            .unwrap();
        let opening = opening.into_opening(OpeningId::new());
        assert_eq!(opening.main_line_pgn(), "1... c5 2. Nf3");
    }

    #[test]
    fn rejects_blank_name_and_bad_fens() {
        let mut opening = sicilian();
        opening.name = "  ".into();
        assert_eq!(opening.validate(), Err(ValidationError::Missing("name")));

        let mut opening = sicilian();
        opening.starting_fen = "nonsense".into();
        assert!(matches!(opening.validate(), Err(ValidationError::Fen(_))));
    }

    #[test]
    fn top_level_move_must_leave_start() {
        let mut opening = NewOpening::new("Null");
        opening
            .moves
            .insert(None, MoveNode::new("--", "0000", STARTING_FEN))
            .unwrap();
        assert!(matches!(
            opening.validate(),
            Err(ValidationError::OutOfRange { field: "moves", .. })
        ));
    }

    #[test]
    fn color_parses_loosely_and_serializes_lowercase() {
        assert_eq!("White".parse::<Color>().unwrap(), Color::White);
        assert_eq!("b".parse::<Color>().unwrap(), Color::Black);
        assert!("green".parse::<Color>().is_err());
        assert_eq!(serde_json::to_string(&Color::Black).unwrap(), "\"black\"");
    }

    #[test]
    fn version_is_not_on_the_wire() {
        let repertoire = Repertoire::new(UserId::new(), "Main", Color::White, Utc::now()).with_version(7);
        let json = serde_json::to_value(&repertoire).unwrap();
        assert!(json.get("version").is_none());
        let back: Repertoire = serde_json::from_value(json).unwrap();
        assert_eq!(back.version(), 0);
    }

    #[test]
    fn missing_eco_serializes_as_null() {
        let mut opening = sicilian();
        opening.eco = Some("  ".into());
        let opening = opening.into_opening(OpeningId::new());
        let json = serde_json::to_value(&opening).unwrap();
        assert!(json["eco"].is_null());
        assert!(json.as_object().unwrap().contains_key("eco"));
    }
}
