use cozy_chess::{Board, Color};

/// The standard initial position, used when an opening omits its start FEN.
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FenError {
    #[error("FEN is empty")]
    Empty,
    #[error("Invalid FEN format: {0:?}")]
    InvalidFormat(String),
}

/// Check that a FEN string is well formed.
///
/// Positions are otherwise opaque to this crate: nothing beyond parsing and
/// string equality is ever done with them.
pub fn check_format(fen: &str) -> Result<(), FenError> {
    parse_fen(fen).map(|_| ())
}

/// Full-move number and whether white is to move, as encoded in the FEN.
pub fn move_clock(fen: &str) -> Result<(u32, bool), FenError> {
    let board = parse_fen(fen)?;
    Ok((
        u32::from(board.fullmove_number()),
        board.side_to_move() == Color::White,
    ))
}

fn parse_fen(fen: &str) -> Result<Board, FenError> {
    let fen = fen.trim();
    if fen.is_empty() {
        return Err(FenError::Empty);
    }
    fen.parse()
        .map_err(|_| FenError::InvalidFormat(fen.to_string()))
}
