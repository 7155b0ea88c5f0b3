//! Natural-language coaching built on stored repertoire and practice data.
//!
//! The service only gathers facts; wording is left to a [`TutorProvider`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use repertoire::{fen, Color, OpeningId, RepertoireId, SessionId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::persistence::{bounded, PracticeSessionRepository, RepertoireRepository};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningFacts {
    pub opening_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eco: Option<String>,
    pub pgn: String,
}

impl OpeningFacts {
    pub fn prompt(&self) -> String {
        let eco = self.eco.as_deref().unwrap_or("unknown");
        format!(
            "Explain the {} (ECO {eco}) to an intermediate player. \
             Main line: {}. Cover the key ideas, typical plans for both sides \
             and the most common traps.",
            self.opening_name, self.pgn
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanFacts {
    pub fen: String,
    pub opening_name: String,
    pub player_color: Color,
}

impl PlanFacts {
    pub fn prompt(&self) -> String {
        format!(
            "In this position from the {}, suggest a middlegame plan for {}.\n\
             FEN: {}\nName two or three concrete goals and the moves that work toward them.",
            self.opening_name, self.player_color, self.fen
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MistakeFacts {
    pub fen: String,
    pub played_move: String,
    pub best_move: String,
    pub centipawn_loss: i32,
}

impl MistakeFacts {
    pub fn prompt(&self) -> String {
        format!(
            "FEN: {}\nThe player chose {} instead of {}, losing {} centipawns. \
             Explain briefly why {} is better and what {} allows.",
            self.fen,
            self.played_move,
            self.best_move,
            self.centipawn_loss,
            self.best_move,
            self.played_move
        )
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TutorError {
    #[error("Tutor backend failed: {0}")]
    Backend(String),
    #[error("Tutor returned an empty answer")]
    Empty,
}

/// Produces prose from opening, plan and mistake facts.
pub trait TutorProvider: Send + Sync {
    fn explain_opening(
        &self,
        facts: &OpeningFacts,
    ) -> impl Future<Output = Result<String, TutorError>> + Send;

    fn suggest_plan(
        &self,
        facts: &PlanFacts,
    ) -> impl Future<Output = Result<String, TutorError>> + Send;

    fn analyze_mistake(
        &self,
        facts: &MistakeFacts,
    ) -> impl Future<Output = Result<String, TutorError>> + Send;
}

pub struct TeachingService<R, P, T> {
    repertoires: Arc<R>,
    sessions: Arc<P>,
    tutor: T,
    timeout: Duration,
}

impl<R, P, T> TeachingService<R, P, T>
where
    R: RepertoireRepository,
    P: PracticeSessionRepository,
    T: TutorProvider,
{
    pub fn new(repertoires: Arc<R>, sessions: Arc<P>, tutor: T, timeout: Duration) -> Self {
        Self {
            repertoires,
            sessions,
            tutor,
            timeout,
        }
    }

    pub async fn opening_facts(
        &self,
        owner: UserId,
        repertoire_id: RepertoireId,
        opening_id: OpeningId,
    ) -> Result<OpeningFacts, ServiceError> {
        let repertoire = bounded(self.timeout, self.repertoires.load_owned(repertoire_id, owner))
            .await?
            .ok_or(ServiceError::NotFound("repertoire"))?;
        let opening = repertoire
            .opening(opening_id)
            .ok_or(ServiceError::NotFound("opening"))?;
        Ok(OpeningFacts {
            opening_name: opening.name.clone(),
            eco: opening.eco.clone(),
            pgn: opening.main_line_pgn(),
        })
    }

    /// Facts for a position reached in one of the caller's repertoires. The
    /// plan is for the side the repertoire is played as.
    pub async fn plan_facts(
        &self,
        owner: UserId,
        repertoire_id: RepertoireId,
        opening_id: Option<OpeningId>,
        position: &str,
    ) -> Result<PlanFacts, ServiceError> {
        fen::check_format(position).map_err(repertoire::ValidationError::from)?;
        let repertoire = bounded(self.timeout, self.repertoires.load_owned(repertoire_id, owner))
            .await?
            .ok_or(ServiceError::NotFound("repertoire"))?;
        let opening_name = match opening_id {
            Some(id) => repertoire
                .opening(id)
                .ok_or(ServiceError::NotFound("opening"))?
                .name
                .clone(),
            None => repertoire.name.clone(),
        };
        Ok(PlanFacts {
            fen: position.trim().to_string(),
            opening_name,
            player_color: repertoire.color,
        })
    }

    /// Facts for the move recorded at `ply`. Only moves that carry an
    /// expected move can be analysed.
    pub async fn mistake_facts(
        &self,
        owner: UserId,
        session_id: SessionId,
        ply: u32,
    ) -> Result<MistakeFacts, ServiceError> {
        let session = bounded(self.timeout, self.sessions.load_session(session_id, owner))
            .await?
            .ok_or(ServiceError::NotFound("practice session"))?;
        let mv = session
            .find_move(ply)
            .ok_or(ServiceError::NotFound("practice move"))?;
        let best_move = mv
            .expected_move
            .clone()
            .ok_or_else(|| ServiceError::invalid("expected_move", "move has no expected move"))?;
        Ok(MistakeFacts {
            fen: mv.fen_before.clone(),
            played_move: mv.user_move.clone(),
            best_move,
            centipawn_loss: mv.centipawn_loss,
        })
    }

    pub async fn explain_opening(
        &self,
        owner: UserId,
        repertoire_id: RepertoireId,
        opening_id: OpeningId,
    ) -> Result<String, ServiceError> {
        let facts = self.opening_facts(owner, repertoire_id, opening_id).await?;
        self.ask(self.tutor.explain_opening(&facts)).await
    }

    pub async fn suggest_plan(
        &self,
        owner: UserId,
        repertoire_id: RepertoireId,
        opening_id: Option<OpeningId>,
        position: &str,
    ) -> Result<String, ServiceError> {
        let facts = self
            .plan_facts(owner, repertoire_id, opening_id, position)
            .await?;
        self.ask(self.tutor.suggest_plan(&facts)).await
    }

    pub async fn analyze_mistake(
        &self,
        owner: UserId,
        session_id: SessionId,
        ply: u32,
    ) -> Result<String, ServiceError> {
        let facts = self.mistake_facts(owner, session_id, ply).await?;
        self.ask(self.tutor.analyze_mistake(&facts)).await
    }

    async fn ask<F>(&self, answer: F) -> Result<String, ServiceError>
    where
        F: Future<Output = Result<String, TutorError>>,
    {
        let text = tokio::time::timeout(self.timeout, answer)
            .await
            .map_err(|_| ServiceError::Tutor(format!("no answer after {:?}", self.timeout)))?
            .map_err(|e| {
                tracing::warn!(error = %e, "Tutor request failed");
                ServiceError::Tutor(e.to_string())
            })?;
        if text.trim().is_empty() {
            return Err(ServiceError::Tutor(TutorError::Empty.to_string()));
        }
        Ok(text)
    }
}
