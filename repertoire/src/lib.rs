pub mod error;
pub mod fen;
pub mod ids;
pub mod model;
pub mod navigator;
pub mod practice;
pub mod stats;
pub mod tree;

pub use error::ValidationError;
pub use fen::{FenError, STARTING_FEN};
pub use ids::{IdParseError, OpeningId, RepertoireId, SessionId, UserId};
pub use model::{Color, NewOpening, Opening, Repertoire};
pub use navigator::{Continuation, PositionIndex};
pub use practice::{
    MoveCategory, MoveSubmission, PracticeConfig, PracticeMode, PracticeMove, PracticeSession,
    SessionState, StartPractice,
};
pub use stats::{reduce, Stats};
pub use tree::{MoveNode, MoveNodeRecord, MoveTree, NodeId, TreeError, Walk, WalkItem};
