use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(Subscribers::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Subscribers::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(Subscribers::Name).string().not_null())
          .col(
            ColumnDef::new(Subscribers::Email).string().not_null().unique_key(),
          )
          .col(
            ColumnDef::new(Subscribers::Phone).string().not_null().default(""),
          )
          .col(ColumnDef::new(Subscribers::Plans).text().not_null().default(""))
          .col(
            ColumnDef::new(Subscribers::Status)
              .string()
              .not_null()
              .default("active"),
          )
          .col(
            ColumnDef::new(Subscribers::Origin)
              .string()
              .not_null()
              .default("manual"),
          )
          .col(ColumnDef::new(Subscribers::CreatedAt).date_time().not_null())
          .col(ColumnDef::new(Subscribers::UpdatedAt).date_time().not_null())
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_subscribers_status")
          .table(Subscribers::Table)
          .col(Subscribers::Status)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager.drop_table(Table::drop().table(Subscribers::Table).to_owned()).await
  }
}

#[derive(DeriveIden)]
pub enum Subscribers {
  Table,
  Id,
  Name,
  Email,
  Phone,
  Plans,
  Status,
  Origin,
  CreatedAt,
  UpdatedAt,
}
