use repertoire::{MoveSubmission, PracticeMove, PracticeSession, UserId};
use tokio::sync::oneshot;

use crate::error::ServiceError;

/// Commands sent to a practice session actor. Each embeds a oneshot for the reply.
pub enum PracticeCommand {
    SubmitMove {
        owner: UserId,
        submission: MoveSubmission,
        reply: oneshot::Sender<Result<PracticeMove, ServiceError>>,
    },
    End {
        owner: UserId,
        reply: oneshot::Sender<Result<PracticeSession, ServiceError>>,
    },
    Shutdown,
}
