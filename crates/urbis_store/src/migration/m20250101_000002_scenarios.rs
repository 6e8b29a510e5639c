use sea_orm_migration::prelude::*;

use super::{cascade, flag_col, millis_col, pk_col, ref_col, restrict, text_col};
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
                    .table(Projects::Table)
                    .if_not_exists()
                    .col(pk_col(backend, Projects::ProjectId))
                    .col(text_col(Projects::UserId, false))
                    .col(text_col(Projects::Name, false))
                    .col(ref_col(Projects::RegionId, false))
                    .col(flag_col(Projects::IsRegional))
                    .col(flag_col(Projects::IsPublic))
                    .col(text_col(Projects::ContextTerritories, false))
                    .col(millis_col(Projects::CreatedAt))
                    .col(millis_col(Projects::UpdatedAt))
                    .foreign_key(&mut restrict(
                        "fk_projects_region",
                        (Projects::Table, Projects::RegionId),
                        (Territories::Table, Territories::TerritoryId),
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ProjectTerritories::Table)
                    .if_not_exists()
                    .col(
                        ref_col(ProjectTerritories::ProjectId, false)
                            .primary_key()
                            .to_owned(),
                    )
                    .col(text_col(ProjectTerritories::Geometry, false))
                    .col(text_col(ProjectTerritories::CentrePoint, false))
                    .foreign_key(&mut cascade(
                        "fk_project_territories_project",
                        (ProjectTerritories::Table, ProjectTerritories::ProjectId),
                        (Projects::Table, Projects::ProjectId),
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Scenarios::Table)
                    .if_not_exists()
                    .col(pk_col(backend, Scenarios::ScenarioId))
                    .col(ref_col(Scenarios::ProjectId, false))
                    .col(ref_col(Scenarios::ParentId, true))
                    .col(text_col(Scenarios::Name, false))
                    .col(flag_col(Scenarios::IsBased))
                    .col(flag_col(Scenarios::IsAttached))
                    .col(millis_col(Scenarios::CreatedAt))
                    .col(millis_col(Scenarios::UpdatedAt))
                    .foreign_key(&mut cascade(
                        "fk_scenarios_project",
                        (Scenarios::Table, Scenarios::ProjectId),
                        (Projects::Table, Projects::ProjectId),
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ScenarioPhysicalObjects::Table)
                    .if_not_exists()
                    .col(pk_col(backend, PhysicalObjects::PhysicalObjectId))
                    .col(ref_col(ScenarioPhysicalObjects::ScenarioId, false))
                    .col(ref_col(ScenarioPhysicalObjects::PublicPhysicalObjectId, true))
                    .col(ref_col(PhysicalObjects::PhysicalObjectTypeId, false))
                    .col(text_col(PhysicalObjects::Name, true))
                    .col(text_col(PhysicalObjects::Properties, false))
                    .col(millis_col(PhysicalObjects::CreatedAt))
                    .col(millis_col(PhysicalObjects::UpdatedAt))
                    .foreign_key(&mut cascade(
                        "fk_scenario_physical_objects_scenario",
                        (
                            ScenarioPhysicalObjects::Table,
                            ScenarioPhysicalObjects::ScenarioId,
                        ),
                        (Scenarios::Table, Scenarios::ScenarioId),
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ScenarioObjectGeometries::Table)
                    .if_not_exists()
                    .col(pk_col(backend, ObjectGeometries::ObjectGeometryId))
                    .col(ref_col(ScenarioObjectGeometries::ScenarioId, false))
                    .col(ref_col(
                        ScenarioObjectGeometries::PublicObjectGeometryId,
                        true,
                    ))
                    .col(ref_col(ObjectGeometries::TerritoryId, false))
                    .col(text_col(ObjectGeometries::Geometry, false))
                    .col(text_col(ObjectGeometries::CentrePoint, false))
                    .col(text_col(ObjectGeometries::Address, true))
                    .col(flag_col(ScenarioObjectGeometries::IsCut))
                    .col(millis_col(ObjectGeometries::CreatedAt))
                    .col(millis_col(ObjectGeometries::UpdatedAt))
                    .foreign_key(&mut cascade(
                        "fk_scenario_object_geometries_scenario",
                        (
                            ScenarioObjectGeometries::Table,
                            ScenarioObjectGeometries::ScenarioId,
                        ),
                        (Scenarios::Table, Scenarios::ScenarioId),
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ScenarioServices::Table)
                    .if_not_exists()
                    .col(pk_col(backend, Services::ServiceId))
                    .col(ref_col(ScenarioServices::ScenarioId, false))
                    .col(ref_col(ScenarioServices::PublicServiceId, true))
                    .col(ref_col(Services::ServiceTypeId, false))
                    .col(text_col(Services::Name, true))
                    .col(ColumnDef::new(Services::Capacity).big_integer().null())
                    .col(text_col(Services::Properties, false))
                    .col(millis_col(Services::CreatedAt))
                    .col(millis_col(Services::UpdatedAt))
                    .foreign_key(&mut cascade(
                        "fk_scenario_services_scenario",
                        (ScenarioServices::Table, ScenarioServices::ScenarioId),
                        (Scenarios::Table, Scenarios::ScenarioId),
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ScenarioUrbanObjects::Table)
                    .if_not_exists()
                    .col(pk_col(backend, ScenarioUrbanObjects::UrbanObjectId))
                    .col(ref_col(ScenarioUrbanObjects::ScenarioId, false))
                    .col(ref_col(ScenarioUrbanObjects::PublicUrbanObjectId, true))
                    .col(ref_col(ScenarioUrbanObjects::PhysicalObjectId, true))
                    .col(ref_col(ScenarioUrbanObjects::PublicPhysicalObjectId, true))
                    .col(ref_col(ScenarioUrbanObjects::ObjectGeometryId, true))
                    .col(ref_col(ScenarioUrbanObjects::PublicObjectGeometryId, true))
                    .col(ref_col(ScenarioUrbanObjects::ServiceId, true))
                    .col(ref_col(ScenarioUrbanObjects::PublicServiceId, true))
                    .foreign_key(&mut cascade(
                        "fk_scenario_urban_objects_scenario",
                        (ScenarioUrbanObjects::Table, ScenarioUrbanObjects::ScenarioId),
                        (Scenarios::Table, Scenarios::ScenarioId),
                    ))
                    .foreign_key(&mut restrict(
                        "fk_scenario_urban_objects_public",
                        (
                            ScenarioUrbanObjects::Table,
                            ScenarioUrbanObjects::PublicUrbanObjectId,
                        ),
                        (UrbanObjects::Table, UrbanObjects::UrbanObjectId),
                    ))
                    .to_owned(),
            )
            .await?;
        // one link per (scenario, base identity)
        manager
            .create_index(
                Index::create()
                    .name("idx_scenario_urban_objects_public")
                    .table(ScenarioUrbanObjects::Table)
                    .col(ScenarioUrbanObjects::ScenarioId)
                    .col(ScenarioUrbanObjects::PublicUrbanObjectId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ScenarioBuffers::Table)
                    .if_not_exists()
                    .col(ref_col(ScenarioBuffers::BufferTypeId, false))
                    .col(ref_col(ScenarioBuffers::UrbanObjectId, false))
                    .col(text_col(ScenarioBuffers::Geometry, false))
                    .col(flag_col(ScenarioBuffers::IsCustom))
                    .col(flag_col(ScenarioBuffers::IsCut))
                    .primary_key(
                        Index::create()
                            .name("pk_scenario_buffers")
                            .col(ScenarioBuffers::BufferTypeId)
                            .col(ScenarioBuffers::UrbanObjectId),
                    )
                    .foreign_key(&mut cascade(
                        "fk_scenario_buffers_urban_object",
                        (ScenarioBuffers::Table, ScenarioBuffers::UrbanObjectId),
                        (ScenarioUrbanObjects::Table, ScenarioUrbanObjects::UrbanObjectId),
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ScenarioFunctionalZones::Table)
                    .if_not_exists()
                    .col(pk_col(backend, FunctionalZones::FunctionalZoneId))
                    .col(ref_col(ScenarioFunctionalZones::ScenarioId, false))
                    .col(ref_col(FunctionalZones::FunctionalZoneTypeId, false))
                    .col(text_col(FunctionalZones::Name, true))
                    .col(ref_col(FunctionalZones::TerritoryId, true))
                    .col(text_col(FunctionalZones::Geometry, false))
                    .col(ColumnDef::new(FunctionalZones::Year).integer().not_null())
                    .col(text_col(FunctionalZones::Source, false))
                    .col(text_col(FunctionalZones::Properties, false))
                    .col(millis_col(FunctionalZones::CreatedAt))
                    .col(millis_col(FunctionalZones::UpdatedAt))
                    .foreign_key(&mut cascade(
                        "fk_scenario_functional_zones_scenario",
                        (
                            ScenarioFunctionalZones::Table,
                            ScenarioFunctionalZones::ScenarioId,
                        ),
                        (Scenarios::Table, Scenarios::ScenarioId),
                    ))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in [
            ScenarioFunctionalZones::Table.into_iden(),
            ScenarioBuffers::Table.into_iden(),
            ScenarioUrbanObjects::Table.into_iden(),
            ScenarioServices::Table.into_iden(),
            ScenarioObjectGeometries::Table.into_iden(),
            ScenarioPhysicalObjects::Table.into_iden(),
            Scenarios::Table.into_iden(),
            ProjectTerritories::Table.into_iden(),
            Projects::Table.into_iden(),
        ] {
            manager
                .drop_table(Table::drop().table(table).if_exists().to_owned())
                .await?;
        }
        Ok(())
    }
}
