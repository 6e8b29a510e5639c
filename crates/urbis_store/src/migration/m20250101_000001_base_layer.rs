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
                    .table(Territories::Table)
                    .if_not_exists()
                    .col(pk_col(backend, Territories::TerritoryId))
                    .col(ref_col(Territories::ParentId, true))
                    .col(text_col(Territories::Name, false))
                    .col(ColumnDef::new(Territories::Level).integer().not_null())
                    .col(text_col(Territories::Geometry, false))
                    .col(text_col(Territories::CentrePoint, false))
                    .col(flag_col(Territories::IsCity))
                    .foreign_key(&mut cascade(
                        "fk_territories_parent",
                        (Territories::Table, Territories::ParentId),
                        (Territories::Table, Territories::TerritoryId),
                    ))
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_territories_parent")
                    .table(Territories::Table)
                    .col(Territories::ParentId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PhysicalObjectFunctions::Table)
                    .if_not_exists()
                    .col(pk_col(backend, PhysicalObjectFunctions::FunctionId))
                    .col(text_col(PhysicalObjectFunctions::Name, false))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PhysicalObjectTypes::Table)
                    .if_not_exists()
                    .col(pk_col(backend, PhysicalObjectTypes::PhysicalObjectTypeId))
                    .col(ref_col(PhysicalObjectTypes::FunctionId, false))
                    .col(text_col(PhysicalObjectTypes::Name, false))
                    .foreign_key(&mut restrict(
                        "fk_physical_object_types_function",
                        (PhysicalObjectTypes::Table, PhysicalObjectTypes::FunctionId),
                        (
                            PhysicalObjectFunctions::Table,
                            PhysicalObjectFunctions::FunctionId,
                        ),
                    ))
                    .to_owned(),
            )
            .await?;

        for (table, id) in [
            (ServiceTypes::Table.into_iden(), ServiceTypes::ServiceTypeId.into_iden()),
            (
                FunctionalZoneTypes::Table.into_iden(),
                FunctionalZoneTypes::FunctionalZoneTypeId.into_iden(),
            ),
            (BufferTypes::Table.into_iden(), BufferTypes::BufferTypeId.into_iden()),
        ] {
            manager
                .create_table(
                    Table::create()
                        .table(table)
                        .if_not_exists()
                        .col(pk_col(backend, id))
                        .col(text_col(ServiceTypes::Name, false))
                        .to_owned(),
                )
                .await?;
        }

        manager
            .create_table(
                Table::create()
                    .table(DefaultBufferValues::Table)
                    .if_not_exists()
                    .col(pk_col(backend, DefaultBufferValues::DefaultBufferValueId))
                    .col(ref_col(DefaultBufferValues::BufferTypeId, false))
                    .col(ref_col(DefaultBufferValues::PhysicalObjectTypeId, true))
                    .col(ref_col(DefaultBufferValues::ServiceTypeId, true))
                    .col(
                        ColumnDef::new(DefaultBufferValues::BufferValue)
                            .double()
                            .not_null(),
                    )
                    .foreign_key(&mut cascade(
                        "fk_default_buffer_values_type",
                        (DefaultBufferValues::Table, DefaultBufferValues::BufferTypeId),
                        (BufferTypes::Table, BufferTypes::BufferTypeId),
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PhysicalObjects::Table)
                    .if_not_exists()
                    .col(pk_col(backend, PhysicalObjects::PhysicalObjectId))
                    .col(ref_col(PhysicalObjects::PhysicalObjectTypeId, false))
                    .col(text_col(PhysicalObjects::Name, true))
                    .col(text_col(PhysicalObjects::Properties, false))
                    .col(millis_col(PhysicalObjects::CreatedAt))
                    .col(millis_col(PhysicalObjects::UpdatedAt))
                    .foreign_key(&mut restrict(
                        "fk_physical_objects_type",
                        (PhysicalObjects::Table, PhysicalObjects::PhysicalObjectTypeId),
                        (
                            PhysicalObjectTypes::Table,
                            PhysicalObjectTypes::PhysicalObjectTypeId,
                        ),
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ObjectGeometries::Table)
                    .if_not_exists()
                    .col(pk_col(backend, ObjectGeometries::ObjectGeometryId))
                    .col(ref_col(ObjectGeometries::TerritoryId, false))
                    .col(text_col(ObjectGeometries::Geometry, false))
                    .col(text_col(ObjectGeometries::CentrePoint, false))
                    .col(text_col(ObjectGeometries::Address, true))
                    .col(millis_col(ObjectGeometries::CreatedAt))
                    .col(millis_col(ObjectGeometries::UpdatedAt))
                    .foreign_key(&mut restrict(
                        "fk_object_geometries_territory",
                        (ObjectGeometries::Table, ObjectGeometries::TerritoryId),
                        (Territories::Table, Territories::TerritoryId),
                    ))
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_object_geometries_territory")
                    .table(ObjectGeometries::Table)
                    .col(ObjectGeometries::TerritoryId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Services::Table)
                    .if_not_exists()
                    .col(pk_col(backend, Services::ServiceId))
                    .col(ref_col(Services::ServiceTypeId, false))
                    .col(text_col(Services::Name, true))
                    .col(ColumnDef::new(Services::Capacity).big_integer().null())
                    .col(text_col(Services::Properties, false))
                    .col(millis_col(Services::CreatedAt))
                    .col(millis_col(Services::UpdatedAt))
                    .foreign_key(&mut restrict(
                        "fk_services_type",
                        (Services::Table, Services::ServiceTypeId),
                        (ServiceTypes::Table, ServiceTypes::ServiceTypeId),
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UrbanObjects::Table)
                    .if_not_exists()
                    .col(pk_col(backend, UrbanObjects::UrbanObjectId))
                    .col(ref_col(UrbanObjects::PhysicalObjectId, false))
                    .col(ref_col(UrbanObjects::ObjectGeometryId, false))
                    .col(ref_col(UrbanObjects::ServiceId, true))
                    .foreign_key(&mut cascade(
                        "fk_urban_objects_physical_object",
                        (UrbanObjects::Table, UrbanObjects::PhysicalObjectId),
                        (PhysicalObjects::Table, PhysicalObjects::PhysicalObjectId),
                    ))
                    .foreign_key(&mut cascade(
                        "fk_urban_objects_geometry",
                        (UrbanObjects::Table, UrbanObjects::ObjectGeometryId),
                        (ObjectGeometries::Table, ObjectGeometries::ObjectGeometryId),
                    ))
                    .foreign_key(&mut cascade(
                        "fk_urban_objects_service",
                        (UrbanObjects::Table, UrbanObjects::ServiceId),
                        (Services::Table, Services::ServiceId),
                    ))
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_urban_objects_triple")
                    .table(UrbanObjects::Table)
                    .col(UrbanObjects::PhysicalObjectId)
                    .col(UrbanObjects::ObjectGeometryId)
                    .col(UrbanObjects::ServiceId)
                    .unique()
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_urban_objects_geometry")
                    .table(UrbanObjects::Table)
                    .col(UrbanObjects::ObjectGeometryId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Buffers::Table)
                    .if_not_exists()
                    .col(ref_col(Buffers::BufferTypeId, false))
                    .col(ref_col(Buffers::UrbanObjectId, false))
                    .col(text_col(Buffers::Geometry, false))
                    .col(flag_col(Buffers::IsCustom))
                    .primary_key(
                        Index::create()
                            .name("pk_buffers")
                            .col(Buffers::BufferTypeId)
                            .col(Buffers::UrbanObjectId),
                    )
                    .foreign_key(&mut cascade(
                        "fk_buffers_urban_object",
                        (Buffers::Table, Buffers::UrbanObjectId),
                        (UrbanObjects::Table, UrbanObjects::UrbanObjectId),
                    ))
                    .foreign_key(&mut cascade(
                        "fk_buffers_type",
                        (Buffers::Table, Buffers::BufferTypeId),
                        (BufferTypes::Table, BufferTypes::BufferTypeId),
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FunctionalZones::Table)
                    .if_not_exists()
                    .col(pk_col(backend, FunctionalZones::FunctionalZoneId))
                    .col(ref_col(FunctionalZones::FunctionalZoneTypeId, false))
                    .col(text_col(FunctionalZones::Name, true))
                    .col(ref_col(FunctionalZones::TerritoryId, true))
                    .col(text_col(FunctionalZones::Geometry, false))
                    .col(ColumnDef::new(FunctionalZones::Year).integer().not_null())
                    .col(text_col(FunctionalZones::Source, false))
                    .col(text_col(FunctionalZones::Properties, false))
                    .col(millis_col(FunctionalZones::CreatedAt))
                    .col(millis_col(FunctionalZones::UpdatedAt))
                    .foreign_key(&mut restrict(
                        "fk_functional_zones_type",
                        (FunctionalZones::Table, FunctionalZones::FunctionalZoneTypeId),
                        (
                            FunctionalZoneTypes::Table,
                            FunctionalZoneTypes::FunctionalZoneTypeId,
                        ),
                    ))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in [
            FunctionalZones::Table.into_iden(),
            Buffers::Table.into_iden(),
            UrbanObjects::Table.into_iden(),
            Services::Table.into_iden(),
            ObjectGeometries::Table.into_iden(),
            PhysicalObjects::Table.into_iden(),
            DefaultBufferValues::Table.into_iden(),
            BufferTypes::Table.into_iden(),
            FunctionalZoneTypes::Table.into_iden(),
            ServiceTypes::Table.into_iden(),
            PhysicalObjectTypes::Table.into_iden(),
            PhysicalObjectFunctions::Table.into_iden(),
            Territories::Table.into_iden(),
        ] {
            manager
                .drop_table(Table::drop().table(table).if_exists().to_owned())
                .await?;
        }
        Ok(())
    }
}
