//! Owner-scoped repertoire operations.

use std::sync::Arc;
use std::time::Duration;

use repertoire::{
    Color, MoveNode, NewOpening, Opening, OpeningId, PositionIndex, Repertoire, RepertoireId,
    UserId, ValidationError,
};

use crate::error::ServiceError;
use crate::persistence::{bounded, now, RepertoireRepository};

pub struct RepertoireService<R> {
    repo: Arc<R>,
    timeout: Duration,
}

impl<R: RepertoireRepository> RepertoireService<R> {
    pub fn new(repo: Arc<R>, timeout: Duration) -> Self {
        Self { repo, timeout }
    }

    pub async fn create(
        &self,
        owner: UserId,
        name: &str,
        color: Color,
    ) -> Result<Repertoire, ServiceError> {
        let repertoire = Repertoire::new(owner, name.trim(), color, now());
        repertoire.validate()?;
        bounded(self.timeout, self.repo.insert_repertoire(&repertoire)).await?;
        tracing::info!(repertoire_id = %repertoire.id, owner = %owner, %color, "Repertoire created");
        Ok(repertoire)
    }

    /// Create a repertoire together with its openings in a single write.
    /// Nothing is stored when any opening is invalid.
    pub async fn import(
        &self,
        owner: UserId,
        name: &str,
        color: Color,
        openings: Vec<NewOpening>,
    ) -> Result<Repertoire, ServiceError> {
        let mut repertoire = Repertoire::new(owner, name.trim(), color, now());
        for opening in openings {
            opening.validate()?;
            repertoire.openings.push(opening.into_opening(OpeningId::new()));
        }
        repertoire.validate()?;
        bounded(self.timeout, self.repo.insert_repertoire(&repertoire)).await?;
        tracing::info!(
            repertoire_id = %repertoire.id,
            owner = %owner,
            openings = repertoire.openings.len(),
            "Repertoire imported"
        );
        Ok(repertoire)
    }

    pub async fn list_by_owner(&self, owner: UserId) -> Result<Vec<Repertoire>, ServiceError> {
        Ok(bounded(self.timeout, self.repo.list_by_owner(owner)).await?)
    }

    pub async fn list_by_color(
        &self,
        owner: UserId,
        color: Color,
    ) -> Result<Vec<Repertoire>, ServiceError> {
        Ok(bounded(self.timeout, self.repo.list_by_color(owner, color)).await?)
    }

    pub async fn get_owned(
        &self,
        id: RepertoireId,
        owner: UserId,
    ) -> Result<Repertoire, ServiceError> {
        bounded(self.timeout, self.repo.load_owned(id, owner))
            .await?
            .ok_or(ServiceError::NotFound("repertoire"))
    }

    /// Replace the stored document with `repertoire`, which must have been
    /// fetched first; a write in between fails with `Conflict`.
    pub async fn update(
        &self,
        owner: UserId,
        mut repertoire: Repertoire,
    ) -> Result<Repertoire, ServiceError> {
        if repertoire.user_id != owner {
            return Err(ServiceError::NotFound("repertoire"));
        }
        repertoire.name = repertoire.name.trim().to_string();
        repertoire.validate()?;
        repertoire.updated_at = now();
        let version = bounded(self.timeout, self.repo.save_repertoire(&repertoire)).await?;
        Ok(repertoire.with_version(version))
    }

    pub async fn delete(&self, owner: UserId, id: RepertoireId) -> Result<(), ServiceError> {
        if !bounded(self.timeout, self.repo.delete_repertoire(id, owner)).await? {
            return Err(ServiceError::NotFound("repertoire"));
        }
        tracing::info!(repertoire_id = %id, owner = %owner, "Repertoire deleted");
        Ok(())
    }

    pub async fn add_opening(
        &self,
        owner: UserId,
        repertoire_id: RepertoireId,
        opening: NewOpening,
    ) -> Result<Opening, ServiceError> {
        opening.validate()?;
        let opening = opening.into_opening(OpeningId::new());
        bounded(
            self.timeout,
            self.repo.insert_opening(repertoire_id, owner, &opening, now()),
        )
        .await?;
        tracing::debug!(%repertoire_id, opening_id = %opening.id, "Opening added");
        Ok(opening)
    }

    /// Overwrite an opening matched by id.
    ///
    /// When the repertoire holds no such opening nothing is written and the
    /// would-be opening is still returned.
    pub async fn replace_opening(
        &self,
        owner: UserId,
        repertoire_id: RepertoireId,
        opening_id: OpeningId,
        opening: NewOpening,
    ) -> Result<Opening, ServiceError> {
        opening.validate()?;
        let opening = opening.into_opening(opening_id);
        let replaced = bounded(
            self.timeout,
            self.repo.replace_opening(repertoire_id, owner, &opening, now()),
        )
        .await?;
        if !replaced {
            tracing::warn!(%repertoire_id, %opening_id, "Replace matched no opening; nothing written");
        }
        Ok(opening)
    }

    pub async fn remove_opening(
        &self,
        owner: UserId,
        repertoire_id: RepertoireId,
        opening_id: OpeningId,
    ) -> Result<Option<Opening>, ServiceError> {
        Ok(bounded(
            self.timeout,
            self.repo.delete_opening(repertoire_id, owner, opening_id, now()),
        )
        .await?)
    }

    /// Add a move under the node at `parent_path` (empty = top level).
    /// Returns the path of the new node.
    pub async fn insert_move(
        &self,
        owner: UserId,
        repertoire_id: RepertoireId,
        opening_id: OpeningId,
        parent_path: &[usize],
        node: MoveNode,
    ) -> Result<Vec<usize>, ServiceError> {
        self.edit_opening(owner, repertoire_id, opening_id, |opening| {
            let id = opening
                .moves
                .insert_at(parent_path, node)
                .map_err(ValidationError::from)?;
            Ok(opening.moves.path_of(id).map_err(ValidationError::from)?)
        })
        .await
    }

    /// Swap the move at `path`, keeping its continuations. Returns the old move.
    pub async fn replace_move(
        &self,
        owner: UserId,
        repertoire_id: RepertoireId,
        opening_id: OpeningId,
        path: &[usize],
        node: MoveNode,
    ) -> Result<MoveNode, ServiceError> {
        self.edit_opening(owner, repertoire_id, opening_id, |opening| {
            let id = opening
                .moves
                .node_at_path(path)
                .map_err(ValidationError::from)?;
            Ok(opening
                .moves
                .replace(id, node)
                .map_err(ValidationError::from)?)
        })
        .await
    }

    /// Remove the move at `path` with everything after it. Returns the
    /// number of moves removed.
    pub async fn remove_move(
        &self,
        owner: UserId,
        repertoire_id: RepertoireId,
        opening_id: OpeningId,
        path: &[usize],
    ) -> Result<usize, ServiceError> {
        self.edit_opening(owner, repertoire_id, opening_id, |opening| {
            let id = opening
                .moves
                .node_at_path(path)
                .map_err(ValidationError::from)?;
            Ok(opening.moves.remove(id).map_err(ValidationError::from)?)
        })
        .await
    }

    /// Position lookup over every opening of the repertoire.
    pub async fn position_index(
        &self,
        owner: UserId,
        repertoire_id: RepertoireId,
    ) -> Result<PositionIndex, ServiceError> {
        let repertoire = self.get_owned(repertoire_id, owner).await?;
        Ok(PositionIndex::from_repertoire(&repertoire))
    }

    /// Read-modify-write of one opening, guarded by the repertoire version.
    async fn edit_opening<T>(
        &self,
        owner: UserId,
        repertoire_id: RepertoireId,
        opening_id: OpeningId,
        edit: impl FnOnce(&mut Opening) -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let mut repertoire = self.get_owned(repertoire_id, owner).await?;
        let opening = repertoire
            .opening_mut(opening_id)
            .ok_or(ServiceError::NotFound("opening"))?;
        let out = edit(opening)?;
        opening.validate()?;

        repertoire.updated_at = now();
        bounded(self.timeout, self.repo.save_repertoire(&repertoire)).await?;
        Ok(out)
    }
}
