use sea_orm_migration::prelude::*;

use super::{cascade, millis_col, pk_col, ref_col, text_col};
use crate::db::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();

        manager
            .create_table(
                Table::create()
                    .table(Indicators::Table)
                    .if_not_exists()
                    .col(pk_col(backend, Indicators::IndicatorId))
                    .col(ref_col(Indicators::ParentId, true))
                    .col(text_col(Indicators::NameFull, false))
                    .col(text_col(Indicators::NameShort, false))
                    .col(text_col(Indicators::MeasurementUnit, true))
                    .col(ColumnDef::new(Indicators::Level).integer().not_null())
                    .col(text_col(Indicators::ListLabel, false))
                    .col(ref_col(Indicators::ServiceTypeId, true))
                    .col(ref_col(Indicators::PhysicalObjectTypeId, true))
                    .foreign_key(&mut cascade(
                        "fk_indicators_parent",
                        (Indicators::Table, Indicators::ParentId),
                        (Indicators::Table, Indicators::IndicatorId),
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(IndicatorValues::Table)
                    .if_not_exists()
                    .col(pk_col(backend, IndicatorValues::IndicatorValueId))
                    .col(ref_col(IndicatorValues::IndicatorId, false))
                    .col(ref_col(IndicatorValues::TerritoryId, false))
                    .col(text_col(IndicatorValues::DateType, false))
                    .col(text_col(IndicatorValues::DateValue, false))
                    .col(text_col(IndicatorValues::ValueType, false))
                    .col(text_col(IndicatorValues::InformationSource, false))
                    .col(ColumnDef::new(IndicatorValues::Value).double().not_null())
                    .col(millis_col(IndicatorValues::CreatedAt))
                    .col(millis_col(IndicatorValues::UpdatedAt))
                    .foreign_key(&mut cascade(
                        "fk_indicator_values_indicator",
                        (IndicatorValues::Table, IndicatorValues::IndicatorId),
                        (Indicators::Table, Indicators::IndicatorId),
                    ))
                    .foreign_key(&mut cascade(
                        "fk_indicator_values_territory",
                        (IndicatorValues::Table, IndicatorValues::TerritoryId),
                        (Territories::Table, Territories::TerritoryId),
                    ))
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_indicator_values_key")
                    .table(IndicatorValues::Table)
                    .col(IndicatorValues::IndicatorId)
                    .col(IndicatorValues::TerritoryId)
                    .col(IndicatorValues::DateType)
                    .col(IndicatorValues::DateValue)
                    .col(IndicatorValues::ValueType)
                    .col(IndicatorValues::InformationSource)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TerritoryIndicatorBinds::Table)
                    .if_not_exists()
                    .col(ref_col(TerritoryIndicatorBinds::IndicatorId, false))
                    .col(ref_col(TerritoryIndicatorBinds::TerritoryId, false))
                    .col(
                        ColumnDef::new(TerritoryIndicatorBinds::Level)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(TerritoryIndicatorBinds::MinValue).double().null())
                    .col(ColumnDef::new(TerritoryIndicatorBinds::MaxValue).double().null())
                    .primary_key(
                        Index::create()
                            .name("pk_territory_indicator_binds")
                            .col(TerritoryIndicatorBinds::IndicatorId)
                            .col(TerritoryIndicatorBinds::TerritoryId)
                            .col(TerritoryIndicatorBinds::Level),
                    )
                    .foreign_key(&mut cascade(
                        "fk_territory_indicator_binds_indicator",
                        (
                            TerritoryIndicatorBinds::Table,
                            TerritoryIndicatorBinds::IndicatorId,
                        ),
                        (Indicators::Table, Indicators::IndicatorId),
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ScenarioIndicatorValues::Table)
                    .if_not_exists()
                    .col(pk_col(backend, ScenarioIndicatorValues::IndicatorValueId))
                    .col(ref_col(ScenarioIndicatorValues::IndicatorId, false))
                    .col(ref_col(ScenarioIndicatorValues::ScenarioId, false))
                    .col(ref_col(ScenarioIndicatorValues::TerritoryId, true))
                    .col(ColumnDef::new(ScenarioIndicatorValues::Value).double().not_null())
                    .col(text_col(ScenarioIndicatorValues::ValueType, false))
                    .col(text_col(ScenarioIndicatorValues::InformationSource, false))
                    .col(text_col(ScenarioIndicatorValues::Properties, false))
                    .col(millis_col(ScenarioIndicatorValues::CreatedAt))
                    .col(millis_col(ScenarioIndicatorValues::UpdatedAt))
                    .foreign_key(&mut cascade(
                        "fk_scenario_indicator_values_scenario",
                        (
                            ScenarioIndicatorValues::Table,
                            ScenarioIndicatorValues::ScenarioId,
                        ),
                        (Scenarios::Table, Scenarios::ScenarioId),
                    ))
                    .foreign_key(&mut cascade(
                        "fk_scenario_indicator_values_indicator",
                        (
                            ScenarioIndicatorValues::Table,
                            ScenarioIndicatorValues::IndicatorId,
                        ),
                        (Indicators::Table, Indicators::IndicatorId),
                    ))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in [
            ScenarioIndicatorValues::Table.into_iden(),
            TerritoryIndicatorBinds::Table.into_iden(),
            IndicatorValues::Table.into_iden(),
            Indicators::Table.into_iden(),
        ] {
            manager
                .drop_table(Table::drop().table(table).if_exists().to_owned())
                .await?;
        }
        Ok(())
    }
}
