use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Venues::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Venues::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Venues::Name).string_len(255).not_null())
                    .col(ColumnDef::new(Venues::Description).text().not_null())
                    .col(ColumnDef::new(Venues::Address).string_len(255).not_null())
                    .col(ColumnDef::new(Venues::Website).string_len(512).not_null())
                    .col(ColumnDef::new(Venues::Suburb).string_len(128).not_null())
                    .col(ColumnDef::new(Venues::State).string_len(64).not_null())
                    .col(ColumnDef::new(Venues::Postcode).integer().not_null())
                    .col(ColumnDef::new(Venues::ImageUrl).string_len(512).not_null())
                    .col(
                        ColumnDef::new(Venues::CreatedAt)
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
                    .name("idx_venues_name")
                    .table(Venues::Table)
                    .col(Venues::Name)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Venues::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Venues {
    Table,
    Id,
    Name,
    Description,
    Address,
    Website,
    Suburb,
    State,
    Postcode,
    ImageUrl,
    CreatedAt,
}
