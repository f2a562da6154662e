use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ========================================
        // EMAIL_LOGS TABLE
        // ========================================
        manager
            .create_table(
                Table::create()
                    .table(EmailLogs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(EmailLogs::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(EmailLogs::TenantId).integer().null())
                    .col(
                        ColumnDef::new(EmailLogs::ToAddress)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailLogs::FromAddress)
                            .string_len(255)
                            .null(),
                    )
                    .col(ColumnDef::new(EmailLogs::ReplyTo).string_len(255).null())
                    .col(ColumnDef::new(EmailLogs::Subject).text().not_null())
                    .col(ColumnDef::new(EmailLogs::Template).string_len(255).null())
                    .col(ColumnDef::new(EmailLogs::Data).json_binary().not_null())
                    .col(ColumnDef::new(EmailLogs::HtmlBody).text().null())
                    .col(ColumnDef::new(EmailLogs::TextBody).text().null())
                    .col(
                        ColumnDef::new(EmailLogs::Status)
                            .string_len(50)
                            .not_null()
                            .default("queued"),
                    )
                    .col(
                        ColumnDef::new(EmailLogs::ProviderMessageId)
                            .string_len(255)
                            .null(),
                    )
                    .col(ColumnDef::new(EmailLogs::ErrorMessage).text().null())
                    .col(
                        ColumnDef::new(EmailLogs::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(EmailLogs::SentAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(EmailLogs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(EmailLogs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_email_logs_tenant")
                            .from(EmailLogs::Table, EmailLogs::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_email_logs_status")
                    .table(EmailLogs::Table)
                    .col(EmailLogs::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_email_logs_tenant_id")
                    .table(EmailLogs::Table)
                    .col(EmailLogs::TenantId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_email_logs_provider_message_id")
                    .table(EmailLogs::Table)
                    .col(EmailLogs::ProviderMessageId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_email_logs_created_at")
                    .table(EmailLogs::Table)
                    .col(EmailLogs::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // ========================================
        // EMAIL_MESSAGE_IDS TABLE
        // ========================================
        manager
            .create_table(
                Table::create()
                    .table(EmailMessageIds::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EmailMessageIds::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(EmailMessageIds::TenantId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailMessageIds::TicketId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailMessageIds::MessageId)
                            .string_len(998)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailMessageIds::CommentId)
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(EmailMessageIds::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_email_message_ids_tenant")
                            .from(EmailMessageIds::Table, EmailMessageIds::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Lookups are always scoped to a tenant; the index is not unique
        // because duplicate Message-IDs are allowed (find-first semantics)
        manager
            .create_index(
                Index::create()
                    .name("idx_email_message_ids_tenant_message")
                    .table(EmailMessageIds::Table)
                    .col(EmailMessageIds::TenantId)
                    .col(EmailMessageIds::MessageId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EmailMessageIds::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(EmailLogs::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum EmailLogs {
    Table,
    Id,
    TenantId,
    ToAddress,
    FromAddress,
    ReplyTo,
    Subject,
    Template,
    Data,
    HtmlBody,
    TextBody,
    Status,
    ProviderMessageId,
    ErrorMessage,
    Attempts,
    SentAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum EmailMessageIds {
    Table,
    Id,
    TenantId,
    TicketId,
    MessageId,
    CommentId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Tenants {
    Table,
    Id,
}
