use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "venues")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub address: String,
    pub website: String,
    pub suburb: String,
    pub state: String,
    pub postcode: i32,
    pub image_url: String,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::gig::Entity")]
    Gig,
}

impl Related<super::gig::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Gig.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
