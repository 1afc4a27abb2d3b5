use sea_orm_migration::prelude::*;

use super::m20240101_000001_create_artists::Artists;
use super::m20240101_000002_create_venues::Venues;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Gigs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Gigs::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Gigs::ArtistId).integer().not_null())
                    .col(ColumnDef::new(Gigs::VenueId).integer().not_null())
                    .col(ColumnDef::new(Gigs::Date).timestamp_with_time_zone().not_null())
                    .col(
                        ColumnDef::new(Gigs::TicketPrice)
                            .decimal_len(10, 2)
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Gigs::TicketWebsite).string_len(512).null())
                    .col(
                        ColumnDef::new(Gigs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_gigs_artist_id")
                            .from(Gigs::Table, Gigs::ArtistId)
                            .to(Artists::Table, Artists::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_gigs_venue_id")
                            .from(Gigs::Table, Gigs::VenueId)
                            .to(Venues::Table, Venues::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_gigs_date")
                    .table(Gigs::Table)
                    .col(Gigs::Date)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Gigs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Gigs {
    Table,
    Id,
    ArtistId,
    VenueId,
    Date,
    TicketPrice,
    TicketWebsite,
    CreatedAt,
}
