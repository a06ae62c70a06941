//! MockResponse entity: a canned answer for one (method, path) pair

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "mock_responses")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Uppercase HTTP verb (unique together with `path`)
    pub method: String,

    pub path: String,

    pub status: i32,

    /// JSON-encoded header object
    #[sea_orm(column_type = "Text")]
    pub headers: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub body: Option<String>,

    /// Delay before answering, in seconds
    pub delay: i64,

    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
