//! Record store: the storage contract used by the capture path and the control API
//!
//! `RecordStore` covers request logs and mock responses, `UserStore` covers
//! operator accounts. `DbStore` implements both on top of SeaORM.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, SqlErr,
};
use thiserror::Error;
use tracing::debug;

use crate::entities::{mock_response, request_log, user};

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Request log {0} not found")]
    RequestLogNotFound(i64),

    #[error("Mock response for {method} {path} not found after upsert")]
    MockResponseMissing { method: String, path: String },

    #[error("User '{0}' already exists")]
    UserExists(String),
}

/// Fields captured when a request arrives
#[derive(Debug, Clone, PartialEq)]
pub struct NewRequestLog {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    /// JSON-encoded header object
    pub headers: String,
    pub body: Option<String>,
    pub client_ip: Option<String>,
    pub origin: Option<String>,
}

/// Fields written once the response is known
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseRecord {
    pub status: u16,
    /// JSON-encoded header object
    pub headers: String,
    pub body: String,
    pub response_time_ms: i64,
}

/// A validated mock response ready to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct MockResponseInput {
    pub method: String,
    pub path: String,
    pub status: u16,
    /// JSON-encoded header object
    pub headers: String,
    pub body: String,
    pub delay_secs: u64,
}

/// Storage for request logs and mock responses
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a new, unanswered request log and return it with its assigned id
    async fn create_request_log(
        &self,
        entry: NewRequestLog,
    ) -> Result<request_log::Model, StoreError>;

    /// Fill the response fields of an existing request log
    async fn record_response(&self, id: i64, response: ResponseRecord) -> Result<(), StoreError>;

    /// Most recent request logs first
    async fn latest_request_logs(&self, limit: u64)
        -> Result<Vec<request_log::Model>, StoreError>;

    /// Insert or overwrite the mock response for `(method, path)`
    async fn upsert_mock_response(
        &self,
        input: MockResponseInput,
    ) -> Result<mock_response::Model, StoreError>;

    /// Every stored mock response
    async fn mock_responses(&self) -> Result<Vec<mock_response::Model>, StoreError>;
}

/// Storage for control API operators
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, username: &str) -> Result<Option<user::Model>, StoreError>;

    /// Create a user; fails with `StoreError::UserExists` on a duplicate username
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<user::Model, StoreError>;
}

/// SeaORM-backed store
#[derive(Clone)]
pub struct DbStore {
    db: DatabaseConnection,
}

impl DbStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RecordStore for DbStore {
    async fn create_request_log(
        &self,
        entry: NewRequestLog,
    ) -> Result<request_log::Model, StoreError> {
        let log = request_log::ActiveModel {
            method: Set(entry.method),
            path: Set(entry.path),
            query: Set(entry.query),
            headers: Set(entry.headers),
            body: Set(entry.body),
            timestamp: Set(Utc::now()),
            client_ip: Set(entry.client_ip),
            origin: Set(entry.origin),
            response_status: Set(None),
            response_headers: Set(None),
            response_body: Set(None),
            response_time_ms: Set(None),
            ..Default::default()
        };

        let inserted = log.insert(&self.db).await?;
        debug!(id = inserted.id, "Request log created");
        Ok(inserted)
    }

    async fn record_response(&self, id: i64, response: ResponseRecord) -> Result<(), StoreError> {
        let result = request_log::Entity::update_many()
            .col_expr(
                request_log::Column::ResponseStatus,
                Expr::value(response.status as i32),
            )
            .col_expr(
                request_log::Column::ResponseHeaders,
                Expr::value(response.headers),
            )
            .col_expr(request_log::Column::ResponseBody, Expr::value(response.body))
            .col_expr(
                request_log::Column::ResponseTimeMs,
                Expr::value(response.response_time_ms),
            )
            .filter(request_log::Column::Id.eq(id))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(StoreError::RequestLogNotFound(id));
        }

        Ok(())
    }

    async fn latest_request_logs(
        &self,
        limit: u64,
    ) -> Result<Vec<request_log::Model>, StoreError> {
        let logs = request_log::Entity::find()
            .order_by_desc(request_log::Column::Timestamp)
            .order_by_desc(request_log::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await?;

        Ok(logs)
    }

    async fn upsert_mock_response(
        &self,
        input: MockResponseInput,
    ) -> Result<mock_response::Model, StoreError> {
        let now = Utc::now();
        let active = mock_response::ActiveModel {
            method: Set(input.method.clone()),
            path: Set(input.path.clone()),
            status: Set(input.status as i32),
            headers: Set(input.headers),
            body: Set(Some(input.body)),
            delay: Set(input.delay_secs as i64),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        // Single statement so concurrent upserts on the same key resolve last-write-wins
        mock_response::Entity::insert(active)
            .on_conflict(
                OnConflict::columns([mock_response::Column::Method, mock_response::Column::Path])
                    .update_columns([
                        mock_response::Column::Status,
                        mock_response::Column::Headers,
                        mock_response::Column::Body,
                        mock_response::Column::Delay,
                        mock_response::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        mock_response::Entity::find()
            .filter(mock_response::Column::Method.eq(input.method.as_str()))
            .filter(mock_response::Column::Path.eq(input.path.as_str()))
            .one(&self.db)
            .await?
            .ok_or(StoreError::MockResponseMissing {
                method: input.method,
                path: input.path,
            })
    }

    async fn mock_responses(&self) -> Result<Vec<mock_response::Model>, StoreError> {
        let mocks = mock_response::Entity::find()
            .order_by_asc(mock_response::Column::Id)
            .all(&self.db)
            .await?;

        Ok(mocks)
    }
}

#[async_trait]
impl UserStore for DbStore {
    async fn find_user(&self, username: &str) -> Result<Option<user::Model>, StoreError> {
        let found = user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(&self.db)
            .await?;

        Ok(found)
    }

    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<user::Model, StoreError> {
        if self.find_user(username).await?.is_some() {
            return Err(StoreError::UserExists(username.to_string()));
        }

        let new_user = user::ActiveModel {
            username: Set(username.to_string()),
            password_hash: Set(password_hash.to_string()),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        // The unique index still guards against a concurrent insert of the same name
        new_user.insert(&self.db).await.map_err(|e| match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                StoreError::UserExists(username.to_string())
            }
            _ => StoreError::Database(e),
        })
    }
}
