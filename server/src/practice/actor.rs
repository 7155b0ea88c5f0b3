use std::sync::Arc;
use std::time::Duration;

use repertoire::{reduce, MoveSubmission, PracticeMove, PracticeSession, SessionId, UserId};
use tokio::sync::mpsc;
use tracing::Instrument;

use super::commands::PracticeCommand;
use crate::error::{ErrorKind, ServiceError};
use crate::persistence::{bounded, now, PersistenceError, PracticeSessionRepository};

/// Everything one actor needs to write to its session.
pub(crate) struct ActorContext<P> {
    pub session_id: SessionId,
    pub store: Arc<P>,
    pub timeout: Duration,
    /// The actor exits after this long without a command.
    pub idle: Duration,
}

/// Single writer for one session: submits and ends run strictly one after
/// another, in arrival order.
pub(crate) async fn run_practice_actor<P: PracticeSessionRepository>(
    ctx: ActorContext<P>,
    cmd_rx: mpsc::Receiver<PracticeCommand>,
) {
    let session_id = ctx.session_id;
    run_practice_actor_inner(ctx, cmd_rx)
        .instrument(tracing::info_span!("practice_session", id = %session_id))
        .await;
}

async fn run_practice_actor_inner<P: PracticeSessionRepository>(
    ctx: ActorContext<P>,
    mut cmd_rx: mpsc::Receiver<PracticeCommand>,
) {
    tracing::debug!("Practice actor started");

    loop {
        let cmd = tokio::select! {
            cmd = cmd_rx.recv() => cmd,
            _ = tokio::time::sleep(ctx.idle) => {
                tracing::debug!(idle = ?ctx.idle, "Practice actor idle");
                break;
            }
        };
        let finished = match cmd {
            Some(PracticeCommand::Shutdown) | None => {
                tracing::info!("Practice actor shutting down");
                break;
            }
            Some(PracticeCommand::SubmitMove {
                owner,
                submission,
                reply,
            }) => {
                let result = submit(&ctx, owner, &submission).await;
                let finished = is_terminal(&result);
                let _ = reply.send(result);
                finished
            }
            Some(PracticeCommand::End { owner, reply }) => {
                let result = end(&ctx, owner).await;
                let finished = result.is_ok() || is_terminal(&result);
                let _ = reply.send(result);
                finished
            }
        };
        if finished {
            break;
        }
    }

    tracing::debug!("Practice actor exited");
}

/// No further write can succeed through this actor.
pub(crate) fn is_terminal<T>(result: &Result<T, ServiceError>) -> bool {
    matches!(
        result.as_ref().map_err(ServiceError::kind),
        Err(ErrorKind::NotFound | ErrorKind::InvalidState)
    )
}

async fn submit<P: PracticeSessionRepository>(
    ctx: &ActorContext<P>,
    owner: UserId,
    submission: &MoveSubmission,
) -> Result<PracticeMove, ServiceError> {
    let mv = bounded(
        ctx.timeout,
        ctx.store.append_move(ctx.session_id, owner, submission),
    )
    .await?;
    tracing::debug!(ply = mv.ply, category = %mv.category, "Move recorded");
    Ok(mv)
}

async fn end<P: PracticeSessionRepository>(
    ctx: &ActorContext<P>,
    owner: UserId,
) -> Result<PracticeSession, ServiceError> {
    let mut session = bounded(ctx.timeout, ctx.store.load_session(ctx.session_id, owner))
        .await?
        .ok_or(ServiceError::NotFound("practice session"))?;
    if !session.state().accepts_moves() {
        return Err(PersistenceError::SessionEnded.into());
    }

    let stats = reduce(&session.moves);
    let ended_at = now();
    bounded(
        ctx.timeout,
        ctx.store.finalize_session(
            ctx.session_id,
            owner,
            session.moves.len() as u32,
            ended_at,
            &stats,
        ),
    )
    .await?;

    session.ended_at = Some(ended_at);
    session.stats = stats;
    tracing::info!(
        moves = stats.total_moves,
        accuracy = stats.accuracy_percentage,
        "Practice session ended"
    );
    Ok(session)
}
