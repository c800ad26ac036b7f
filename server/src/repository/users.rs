use super::invalidation;
use crate::cache::NetworkingCache;
use crate::entity::user;
use crate::error::ServerError;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set,
};

pub struct UsersRepository<'a> {
    connection: &'a DatabaseConnection,
    cache: &'a NetworkingCache,
}

impl<'a> UsersRepository<'a> {
    pub(super) fn new(connection: &'a DatabaseConnection, cache: &'a NetworkingCache) -> Self {
        Self { connection, cache }
    }

    pub async fn insert(&self, name: &str) -> Result<user::Model, ServerError> {
        let user = user::ActiveModel {
            name: Set(name.to_string()),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(self.connection)
        .await?;

        invalidation::user_loaded(self.cache, &user).await;
        Ok(user)
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<user::Model>, ServerError> {
        let user = user::Entity::find()
            .filter(user::Column::Name.eq(name))
            .one(self.connection)
            .await?;

        if let Some(user) = &user {
            invalidation::user_loaded(self.cache, user).await;
        }
        Ok(user)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<user::Model>, ServerError> {
        let user = user::Entity::find_by_id(id).one(self.connection).await?;

        if let Some(user) = &user {
            invalidation::user_loaded(self.cache, user).await;
        }
        Ok(user)
    }

    /// Like [`get_by_id`](Self::get_by_id) but treats a missing row as an error.
    pub async fn require(&self, id: i64) -> Result<user::Model, ServerError> {
        self.get_by_id(id)
            .await?
            .ok_or(ServerError::UserIdNotFound(id))
    }

    pub async fn exists_by_name(&self, name: &str) -> Result<bool, ServerError> {
        let count = user::Entity::find()
            .filter(user::Column::Name.eq(name))
            .count(self.connection)
            .await?;
        Ok(count > 0)
    }

    pub async fn count(&self) -> Result<u64, ServerError> {
        Ok(user::Entity::find().count(self.connection).await?)
    }
}
