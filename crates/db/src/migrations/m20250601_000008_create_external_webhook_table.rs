//! Create external_webhook table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ExternalWebhook::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ExternalWebhook::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ExternalWebhook::UserId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ExternalWebhook::Url).text().not_null())
                    .col(
                        ColumnDef::new(ExternalWebhook::Secret)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExternalWebhook::Events)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExternalWebhook::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(ExternalWebhook::LastTriggeredAt)
                            .timestamp_with_time_zone(),
                    )
                    .col(
                        ColumnDef::new(ExternalWebhook::FailureCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(ExternalWebhook::LastError).text())
                    .col(
                        ColumnDef::new(ExternalWebhook::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(ExternalWebhook::UpdatedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_external_webhook_user")
                            .from(ExternalWebhook::Table, ExternalWebhook::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: user_id (for delivery lookups)
        manager
            .create_index(
                Index::create()
                    .name("idx_external_webhook_user_id")
                    .table(ExternalWebhook::Table)
                    .col(ExternalWebhook::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ExternalWebhook::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum ExternalWebhook {
    Table,
    Id,
    UserId,
    Url,
    Secret,
    Events,
    IsActive,
    LastTriggeredAt,
    FailureCount,
    LastError,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
