use super::users::UsersRepository;
use crate::cache::NetworkingCache;
use crate::entity::message;
use crate::error::ServerError;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

pub struct MessagesRepository<'a> {
    connection: &'a DatabaseConnection,
    cache: &'a NetworkingCache,
}

impl<'a> MessagesRepository<'a> {
    pub(super) fn new(connection: &'a DatabaseConnection, cache: &'a NetworkingCache) -> Self {
        Self { connection, cache }
    }

    pub async fn insert(&self, content: &str, issuer: i64) -> Result<message::Model, ServerError> {
        let issuer = UsersRepository::new(self.connection, self.cache)
            .require(issuer)
            .await?;

        Ok(message::ActiveModel {
            content: Set(content.to_string()),
            issuer: Set(issuer.id),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(self.connection)
        .await?)
    }

    pub async fn get_by_issuer(&self, issuer: i64) -> Result<Vec<message::Model>, ServerError> {
        Ok(message::Entity::find()
            .filter(message::Column::Issuer.eq(issuer))
            .order_by_asc(message::Column::Id)
            .all(self.connection)
            .await?)
    }
}
