//! Game sessions.
//!
//! The `seed` drives item generation for every participant, and `issuer` is
//! the ID of the user who created the session.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "sessions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub name: String,
    pub seed: i64,
    pub issuer: i64,
    pub started: bool,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::Issuer",
        to = "super::user::Column::Id"
    )]
    User,
    #[sea_orm(has_many = "super::lobby::Entity")]
    Lobby,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::lobby::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lobby.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
