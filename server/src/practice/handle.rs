use repertoire::{MoveSubmission, PracticeMove, PracticeSession, SessionId, UserId};
use tokio::sync::{mpsc, oneshot};

use super::commands::PracticeCommand;
use crate::error::ServiceError;

/// Cheap, cloneable handle to a practice session actor.
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    cmd_tx: mpsc::Sender<PracticeCommand>,
}

impl SessionHandle {
    pub(crate) fn new(id: SessionId, cmd_tx: mpsc::Sender<PracticeCommand>) -> Self {
        Self { id, cmd_tx }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The actor has exited and will accept no more commands.
    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }

    pub(crate) fn same_actor(&self, other: &SessionHandle) -> bool {
        self.cmd_tx.same_channel(&other.cmd_tx)
    }

    pub async fn submit_move(
        &self,
        owner: UserId,
        submission: MoveSubmission,
    ) -> Result<PracticeMove, ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.send(PracticeCommand::SubmitMove {
            owner,
            submission,
            reply: tx,
        })
        .await?;
        // A dropped reply means the actor quit before running the command.
        rx.await.map_err(|_| ServiceError::WorkerGone)?
    }

    pub async fn end(&self, owner: UserId) -> Result<PracticeSession, ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.send(PracticeCommand::End { owner, reply: tx }).await?;
        rx.await.map_err(|_| ServiceError::WorkerGone)?
    }

    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(PracticeCommand::Shutdown).await;
    }

    async fn send(&self, cmd: PracticeCommand) -> Result<(), ServiceError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| ServiceError::WorkerGone)
    }
}
