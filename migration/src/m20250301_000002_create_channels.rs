use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(Channels::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Channels::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(Channels::Name).string().not_null())
          .col(ColumnDef::new(Channels::ChatId).string().null())
          .col(ColumnDef::new(Channels::Description).text().null())
          .col(ColumnDef::new(Channels::Plan).string().not_null())
          .col(
            ColumnDef::new(Channels::Active).boolean().not_null().default(true),
          )
          .col(
            ColumnDef::new(Channels::Ordering).integer().not_null().default(0),
          )
          .col(
            ColumnDef::new(Channels::CreatesJoinRequest)
              .boolean()
              .not_null()
              .default(false),
          )
          .col(ColumnDef::new(Channels::CreatedAt).date_time().not_null())
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager.drop_table(Table::drop().table(Channels::Table).to_owned()).await
  }
}

#[derive(DeriveIden)]
pub enum Channels {
  Table,
  Id,
  Name,
  ChatId,
  Description,
  Plan,
  Active,
  Ordering,
  CreatesJoinRequest,
  CreatedAt,
}
