use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ========================================
        // TENANTS TABLE
        // ========================================
        manager
            .create_table(
                Table::create()
                    .table(Tenants::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Tenants::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Tenants::Name).string_len(255).not_null())
                    .col(
                        ColumnDef::new(Tenants::Subdomain)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Tenants::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Tenants::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tenants_subdomain")
                    .table(Tenants::Table)
                    .col(Tenants::Subdomain)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // ========================================
        // EMAIL_TEMPLATES TABLE
        // ========================================
        manager
            .create_table(
                Table::create()
                    .table(EmailTemplates::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EmailTemplates::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(EmailTemplates::TenantId).integer().null())
                    .col(
                        ColumnDef::new(EmailTemplates::Name)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(ColumnDef::new(EmailTemplates::Subject).text().not_null())
                    .col(ColumnDef::new(EmailTemplates::HtmlBody).text().not_null())
                    .col(ColumnDef::new(EmailTemplates::TextBody).text().null())
                    .col(
                        ColumnDef::new(EmailTemplates::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(EmailTemplates::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_email_templates_tenant")
                            .from(EmailTemplates::Table, EmailTemplates::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_email_templates_tenant_name")
                    .table(EmailTemplates::Table)
                    .col(EmailTemplates::TenantId)
                    .col(EmailTemplates::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // ========================================
        // TENANT_EMAIL_DOMAINS TABLE
        // ========================================
        manager
            .create_table(
                Table::create()
                    .table(TenantEmailDomains::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TenantEmailDomains::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(TenantEmailDomains::TenantId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TenantEmailDomains::Domain)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TenantEmailDomains::Status)
                            .string_len(50)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(TenantEmailDomains::SpfRecordName)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TenantEmailDomains::SpfRecordValue)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TenantEmailDomains::DkimSelector)
                            .string_len(100)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TenantEmailDomains::DkimRecordName)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TenantEmailDomains::DkimRecordValue)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TenantEmailDomains::MxRecordName)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TenantEmailDomains::MxRecordValue)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TenantEmailDomains::MxRecordPriority)
                            .small_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TenantEmailDomains::ProviderIdentityId)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TenantEmailDomains::DnsRecordIds)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TenantEmailDomains::LastVerifiedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TenantEmailDomains::VerificationError)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TenantEmailDomains::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(TenantEmailDomains::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tenant_email_domains_tenant")
                            .from(TenantEmailDomains::Table, TenantEmailDomains::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tenant_email_domains_tenant_domain")
                    .table(TenantEmailDomains::Table)
                    .col(TenantEmailDomains::TenantId)
                    .col(TenantEmailDomains::Domain)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tenant_email_domains_status")
                    .table(TenantEmailDomains::Table)
                    .col(TenantEmailDomains::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TenantEmailDomains::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(EmailTemplates::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Tenants::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Tenants {
    Table,
    Id,
    Name,
    Subdomain,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum EmailTemplates {
    Table,
    Id,
    TenantId,
    Name,
    Subject,
    HtmlBody,
    TextBody,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum TenantEmailDomains {
    Table,
    Id,
    TenantId,
    Domain,
    Status,
    SpfRecordName,
    SpfRecordValue,
    DkimSelector,
    DkimRecordName,
    DkimRecordValue,
    MxRecordName,
    MxRecordValue,
    MxRecordPriority,
    ProviderIdentityId,
    DnsRecordIds,
    LastVerifiedAt,
    VerificationError,
    CreatedAt,
    UpdatedAt,
}
