use super::invalidation;
use super::users::UsersRepository;
use crate::cache::NetworkingCache;
use crate::entity::session;
use crate::error::ServerError;
use chrono::Utc;
use log::info;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};

pub struct SessionsRepository<'a> {
    connection: &'a DatabaseConnection,
    cache: &'a NetworkingCache,
}

impl<'a> SessionsRepository<'a> {
    pub(super) fn new(connection: &'a DatabaseConnection, cache: &'a NetworkingCache) -> Self {
        Self { connection, cache }
    }

    fn users(&self) -> UsersRepository<'a> {
        UsersRepository::new(self.connection, self.cache)
    }

    /// Creates a session issued by the user with ID `issuer`.
    ///
    /// Nothing is written when the issuer does not exist.
    pub async fn insert(
        &self,
        name: &str,
        seed: i64,
        issuer: i64,
    ) -> Result<session::Model, ServerError> {
        let issuer = self.users().require(issuer).await?;

        let session = session::ActiveModel {
            name: Set(name.to_string()),
            seed: Set(seed),
            issuer: Set(issuer.id),
            started: Set(false),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(self.connection)
        .await?;

        info!("Created session {} ({}) for {}", session.id, session.name, issuer.name);
        invalidation::session_changed(self.cache, session.id, &issuer.name).await;
        Ok(session)
    }

    pub async fn set_started(&self, id: i64, started: bool) -> Result<session::Model, ServerError> {
        let existing = self
            .get_by_id(id)
            .await?
            .ok_or(ServerError::SessionNotFound(id))?;
        let issuer = self.users().require(existing.issuer).await?;

        let mut active = existing.into_active_model();
        active.started = Set(started);
        let session = active.update(self.connection).await?;

        invalidation::session_changed(self.cache, session.id, &issuer.name).await;
        Ok(session)
    }

    /// Deletes a session together with its lobbies and drops the live state of
    /// its players. Returns whether a row was removed.
    pub async fn delete(&self, id: i64) -> Result<bool, ServerError> {
        let Some(existing) = self.get_by_id(id).await? else {
            return Ok(false);
        };
        let issuer = self.users().require(existing.issuer).await?;

        let result = session::Entity::delete_by_id(id).exec(self.connection).await?;

        invalidation::session_changed(self.cache, id, &issuer.name).await;
        invalidation::lobby_changed(self.cache, id).await;
        invalidation::session_removed(self.cache, id, &existing.name).await;
        Ok(result.rows_affected > 0)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<session::Model>, ServerError> {
        Ok(session::Entity::find_by_id(id).one(self.connection).await?)
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<session::Model>, ServerError> {
        Ok(session::Entity::find()
            .filter(session::Column::Name.eq(name))
            .one(self.connection)
            .await?)
    }

    /// Sessions issued by `issuer`, oldest first.
    pub async fn get_by_issuer(&self, issuer: i64) -> Result<Vec<session::Model>, ServerError> {
        Ok(session::Entity::find()
            .filter(session::Column::Issuer.eq(issuer))
            .order_by_asc(session::Column::CreatedAt)
            .order_by_asc(session::Column::Id)
            .all(self.connection)
            .await?)
    }

    pub async fn count(&self) -> Result<u64, ServerError> {
        Ok(session::Entity::find().count(self.connection).await?)
    }
}
