//! Initial schema: request logs, mock responses and users

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ============================================================
        // 1. request_logs
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(RequestLog::Table)
                    .if_not_exists()
                    .col(
                        big_integer(RequestLog::Id)
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(string(RequestLog::Method))
                    .col(string(RequestLog::Path))
                    .col(text_null(RequestLog::Query))
                    .col(text(RequestLog::Headers))
                    .col(text_null(RequestLog::Body))
                    .col(timestamp_with_time_zone(RequestLog::Timestamp))
                    .col(string_len_null(RequestLog::ClientIp, 64))
                    .col(string_null(RequestLog::Origin))
                    // Unanswered until the outcome is recorded
                    .col(integer_null(RequestLog::ResponseStatus))
                    .col(text_null(RequestLog::ResponseHeaders))
                    .col(text_null(RequestLog::ResponseBody))
                    .col(big_integer_null(RequestLog::ResponseTimeMs))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_request_logs_timestamp")
                    .table(RequestLog::Table)
                    .col(RequestLog::Timestamp)
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 2. mock_responses, one row per (method, path)
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(MockResponse::Table)
                    .if_not_exists()
                    .col(
                        big_integer(MockResponse::Id)
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(string_len(MockResponse::Method, 16).not_null())
                    .col(string(MockResponse::Path).not_null())
                    .col(integer(MockResponse::Status).not_null().default(200))
                    .col(text(MockResponse::Headers).not_null().default("{}"))
                    .col(text_null(MockResponse::Body))
                    .col(big_integer(MockResponse::Delay).not_null().default(0))
                    .col(
                        timestamp_with_time_zone(MockResponse::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(MockResponse::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_mock_responses_method_path")
                    .table(MockResponse::Table)
                    .col(MockResponse::Method)
                    .col(MockResponse::Path)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 3. users
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(User::Table)
                    .if_not_exists()
                    .col(
                        big_integer(User::Id)
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(string_len(User::Username, 255).not_null().unique_key())
                    .col(string_len(User::PasswordHash, 255).not_null())
                    .col(
                        timestamp_with_time_zone(User::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(User::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(MockResponse::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(RequestLog::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum RequestLog {
    #[sea_orm(iden = "request_logs")]
    Table,
    Id,
    Method,
    Path,
    Query,
    Headers,
    Body,
    Timestamp,
    ClientIp,
    Origin,
    ResponseStatus,
    ResponseHeaders,
    ResponseBody,
    ResponseTimeMs,
}

#[derive(DeriveIden)]
enum MockResponse {
    #[sea_orm(iden = "mock_responses")]
    Table,
    Id,
    Method,
    Path,
    Status,
    Headers,
    Body,
    Delay,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum User {
    #[sea_orm(iden = "users")]
    Table,
    Id,
    Username,
    PasswordHash,
    CreatedAt,
}
