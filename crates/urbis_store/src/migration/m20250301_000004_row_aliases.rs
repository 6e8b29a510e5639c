use sea_orm_migration::prelude::*;

use super::{cascade, ref_col, text_col};
use crate::db::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ids a client read through an attached scenario, mapped to the rows it owns now
        manager
            .create_table(
                Table::create()
                    .table(ScenarioRowAliases::Table)
                    .if_not_exists()
                    .col(ref_col(ScenarioRowAliases::ScenarioId, false))
                    .col(text_col(ScenarioRowAliases::Kind, false))
                    .col(ref_col(ScenarioRowAliases::OldId, false))
                    .col(ref_col(ScenarioRowAliases::NewId, false))
                    .primary_key(
                        Index::create()
                            .name("pk_scenario_row_aliases")
                            .col(ScenarioRowAliases::ScenarioId)
                            .col(ScenarioRowAliases::Kind)
                            .col(ScenarioRowAliases::OldId),
                    )
                    .foreign_key(&mut cascade(
                        "fk_scenario_row_aliases_scenario",
                        (ScenarioRowAliases::Table, ScenarioRowAliases::ScenarioId),
                        (Scenarios::Table, Scenarios::ScenarioId),
                    ))
                    .to_owned(),
            )
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(ScenarioRowAliases::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await
    }
}
