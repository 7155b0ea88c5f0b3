//! Position lookup over a repertoire.
//!
//! Every node of every opening is indexed under the FEN it is played *from*,
//! so transpositions between openings merge into one entry.

use std::collections::HashMap;

use serde::Serialize;

use crate::ids::OpeningId;
use crate::model::{Opening, Repertoire};

/// A prepared move from some position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Continuation {
    #[serde(rename = "move")]
    pub san: String,
    pub uci: String,
    /// Position after the move.
    pub fen: String,
    pub is_main_line: bool,
    pub opening_id: OpeningId,
}

#[derive(Debug, Clone, Default)]
pub struct PositionIndex {
    positions: HashMap<String, Vec<Continuation>>,
}

impl PositionIndex {
    pub fn from_repertoire(repertoire: &Repertoire) -> Self {
        let mut index = Self::default();
        for opening in &repertoire.openings {
            index.add_opening(opening);
        }
        index
    }

    pub fn from_opening(opening: &Opening) -> Self {
        let mut index = Self::default();
        index.add_opening(opening);
        index
    }

    fn add_opening(&mut self, opening: &Opening) {
        let tree = &opening.moves;
        for item in tree.walk() {
            let from = match tree.parent(item.id) {
                Ok(Some(parent)) => match tree.find(parent) {
                    Ok(node) => node.fen.as_str(),
                    Err(_) => continue,
                },
                Ok(None) => opening.starting_fen.as_str(),
                Err(_) => continue,
            };
            let entry = self.positions.entry(from.to_string()).or_default();
            // Same move reached through another line.
            if entry.iter().any(|c| c.uci == item.node.uci) {
                continue;
            }
            entry.push(Continuation {
                san: item.node.san.clone(),
                uci: item.node.uci.clone(),
                fen: item.node.fen.clone(),
                is_main_line: item.node.is_main_line,
                opening_id: opening.id,
            });
        }
    }

    /// Every prepared continuation from `fen`, in tree order.
    pub fn expected_moves(&self, fen: &str) -> &[Continuation] {
        self.positions.get(fen).map(Vec::as_slice).unwrap_or_default()
    }

    /// Whether `played` (SAN or UCI) is prepared from `fen`.
    pub fn is_repertoire_move(&self, fen: &str, played: &str) -> bool {
        let played = played.trim();
        self.expected_moves(fen)
            .iter()
            .any(|c| c.san == played || c.uci == played)
    }

    /// The reply to play from `fen`: the main-line continuation, else the first.
    pub fn main_reply(&self, fen: &str) -> Option<&Continuation> {
        let moves = self.expected_moves(fen);
        moves.iter().find(|c| c.is_main_line).or_else(|| moves.first())
    }

    pub fn contains(&self, fen: &str) -> bool {
        self.positions.contains_key(fen)
    }

    pub fn positions(&self) -> impl Iterator<Item = &str> {
        self.positions.keys().map(String::as_str)
    }

    /// Number of distinct positions with at least one continuation.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
