//! Practice session lifecycle.
//!
//! Reads go straight to the store. Writes to one session (submitting a move,
//! ending it) are funnelled through a per-session actor spawned on first use,
//! so they run one at a time and `end` sees exactly the moves stored before it.

mod actor;
mod commands;
mod handle;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use repertoire::{
    MoveSubmission, PracticeMove, PracticeSession, RepertoireId, SessionId, StartPractice, UserId,
};
use tokio::sync::{mpsc, RwLock};

use crate::error::ServiceError;
use crate::persistence::{bounded, now, PracticeSessionRepository, RepertoireRepository};
use actor::{is_terminal, run_practice_actor, ActorContext};
pub use handle::SessionHandle;

/// How long an actor waits for its next command before exiting.
pub const DEFAULT_ACTOR_IDLE: Duration = Duration::from_secs(300);

/// Manages practice sessions. Spawns an actor task per session being written.
pub struct PracticeManager<P, R> {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    store: Arc<P>,
    repertoires: Arc<R>,
    timeout: Duration,
    idle: Duration,
    history_limit: u32,
}

impl<P, R> PracticeManager<P, R>
where
    P: PracticeSessionRepository,
    R: RepertoireRepository,
{
    pub fn new(store: Arc<P>, repertoires: Arc<R>, timeout: Duration, history_limit: u32) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            store,
            repertoires,
            timeout,
            idle: DEFAULT_ACTOR_IDLE,
            history_limit,
        }
    }

    pub fn with_idle_timeout(mut self, idle: Duration) -> Self {
        self.idle = idle;
        self
    }

    pub async fn start(
        &self,
        owner: UserId,
        request: StartPractice,
    ) -> Result<PracticeSession, ServiceError> {
        let repertoire = bounded(
            self.timeout,
            self.repertoires.load_owned(request.repertoire_id, owner),
        )
        .await?
        .ok_or(ServiceError::NotFound("repertoire"))?;
        if let Some(opening_id) = request.opening_id {
            if repertoire.opening(opening_id).is_none() {
                return Err(ServiceError::NotFound("opening"));
            }
        }

        let session = PracticeSession::start(
            owner,
            repertoire.id,
            request.opening_id,
            request.mode,
            repertoire.color,
            request.config,
            now(),
        );
        bounded(self.timeout, self.store.create_session(&session)).await?;
        tracing::info!(
            session_id = %session.id,
            owner = %owner,
            repertoire_id = %repertoire.id,
            mode = session.mode.as_str(),
            "Practice session started"
        );
        Ok(session)
    }

    pub async fn submit_move(
        &self,
        id: SessionId,
        owner: UserId,
        submission: MoveSubmission,
    ) -> Result<PracticeMove, ServiceError> {
        submission.validate()?;
        let handle = self.handle_for(id).await;
        let (handle, result) = match handle.submit_move(owner, submission.clone()).await {
            Err(ServiceError::WorkerGone) => {
                self.forget(&handle).await;
                let retry = self.handle_for(id).await;
                let result = retry.submit_move(owner, submission).await;
                (retry, result)
            }
            result => (handle, result),
        };
        if is_terminal(&result) || matches!(result, Err(ServiceError::WorkerGone)) {
            self.forget(&handle).await;
        }
        result
    }

    pub async fn end(&self, id: SessionId, owner: UserId) -> Result<PracticeSession, ServiceError> {
        let handle = self.handle_for(id).await;
        let (handle, result) = match handle.end(owner).await {
            Err(ServiceError::WorkerGone) => {
                self.forget(&handle).await;
                let retry = self.handle_for(id).await;
                let result = retry.end(owner).await;
                (retry, result)
            }
            result => (handle, result),
        };
        // The actor exits after any of these, so its entry is dead weight.
        if result.is_ok() || is_terminal(&result) || matches!(result, Err(ServiceError::WorkerGone)) {
            self.forget(&handle).await;
        }
        result
    }

    pub async fn get(&self, id: SessionId, owner: UserId) -> Result<PracticeSession, ServiceError> {
        bounded(self.timeout, self.store.load_session(id, owner))
            .await?
            .ok_or(ServiceError::NotFound("practice session"))
    }

    /// Most recent sessions first. `None` uses the configured default limit.
    pub async fn history(
        &self,
        owner: UserId,
        limit: Option<u32>,
    ) -> Result<Vec<PracticeSession>, ServiceError> {
        let limit = limit.unwrap_or(self.history_limit);
        Ok(bounded(self.timeout, self.store.history(owner, limit)).await?)
    }

    pub async fn history_for_repertoire(
        &self,
        owner: UserId,
        repertoire_id: RepertoireId,
    ) -> Result<Vec<PracticeSession>, ServiceError> {
        Ok(bounded(
            self.timeout,
            self.store.history_for_repertoire(owner, repertoire_id),
        )
        .await?)
    }

    /// Number of sessions with a live writer.
    pub async fn active_writers(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|h| !h.is_closed())
            .count()
    }

    #[cfg(test)]
    async fn registered(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Stop every actor. Commands already queued are still answered first.
    pub async fn shutdown(&self) {
        let handles: Vec<SessionHandle> = self.sessions.write().await.drain().map(|(_, h)| h).collect();
        for handle in &handles {
            handle.shutdown().await;
        }
        tracing::info!(count = handles.len(), "Practice actors stopped");
    }

    /// Existing live actor for `id`, or a freshly spawned one.
    async fn handle_for(&self, id: SessionId) -> SessionHandle {
        if let Some(handle) = self.sessions.read().await.get(&id) {
            if !handle.is_closed() {
                return handle.clone();
            }
        }

        let mut sessions = self.sessions.write().await;
        if let Some(handle) = sessions.get(&id) {
            if !handle.is_closed() {
                return handle.clone();
            }
        }
        // Actors that went idle have already exited.
        sessions.retain(|_, handle| !handle.is_closed());

        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let ctx = ActorContext {
            session_id: id,
            store: Arc::clone(&self.store),
            timeout: self.timeout,
            idle: self.idle,
        };
        tokio::spawn(run_practice_actor(ctx, cmd_rx));

        let handle = SessionHandle::new(id, cmd_tx);
        sessions.insert(id, handle.clone());
        handle
    }

    /// Drop `handle` from the registry unless it was already replaced.
    async fn forget(&self, handle: &SessionHandle) {
        let mut sessions = self.sessions.write().await;
        if sessions
            .get(&handle.id())
            .is_some_and(|current| current.same_actor(handle))
        {
            sessions.remove(&handle.id());
        }
    }
}
