//! RequestLog entity: one captured inbound request and, once answered, its response

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "request_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Uppercase HTTP verb
    pub method: String,

    /// Request path, always with a leading slash and without the query string
    pub path: String,

    /// Raw query string, if the request carried one
    #[sea_orm(column_type = "Text", nullable)]
    pub query: Option<String>,

    /// JSON-encoded header object (lowercase names)
    #[sea_orm(column_type = "Text")]
    pub headers: String,

    /// Request body, lossily decoded as UTF-8
    #[sea_orm(column_type = "Text", nullable)]
    pub body: Option<String>,

    /// Arrival time
    pub timestamp: ChronoDateTimeUtc,

    pub client_ip: Option<String>,
    pub origin: Option<String>,

    pub response_status: Option<i32>,

    /// JSON-encoded response header object
    #[sea_orm(column_type = "Text", nullable)]
    pub response_headers: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub response_body: Option<String>,

    pub response_time_ms: Option<i64>,
}

impl Model {
    /// Whether the response half of this entry has been written yet
    pub fn is_answered(&self) -> bool {
        self.response_status.is_some()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
