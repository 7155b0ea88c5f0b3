use crate::fen::FenError;
use crate::ids::IdParseError;
use crate::tree::TreeError;

/// Rejection of caller-supplied data before anything is persisted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{field} is out of range: {reason}")]
    OutOfRange {
        field: &'static str,
        reason: String,
    },
    #[error(transparent)]
    Fen(#[from] FenError),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Id(#[from] IdParseError),
}

/// Fail with [`ValidationError::Missing`] when `value` is blank.
pub(crate) fn require(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::Missing(field))
    } else {
        Ok(())
    }
}
