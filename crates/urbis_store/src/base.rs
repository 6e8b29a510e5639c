use async_trait::async_trait;
use sea_orm::sea_query::{Expr, ExprTrait, OnConflict, Query};
use sea_orm::{ConnectionTrait, TransactionTrait};

use crate::db::*;
use crate::geometry::Footprint;
use crate::store::{UrbisStore, col_name, exec, insert_returning_id, push_values, query_one};
use urbis_core::error::BUFFER_DEFAULT_AMBIGUOUS;
use urbis_core::events::{ChangeEvent, ChangeKind};
use urbis_core::geometry::KindRule;
use urbis_core::*;

impl UrbisStore {
    async fn insert_base_physical_object<C: ConnectionTrait>(
        &self,
        conn: &C,
        input: &PhysicalObjectInput,
        now: Timestamp,
    ) -> UrbisResult<PhysicalObject> {
        let mut insert = Query::insert();
        insert.into_table(PhysicalObjects::Table).columns([
            PhysicalObjects::PhysicalObjectTypeId,
            PhysicalObjects::Name,
            PhysicalObjects::Properties,
            PhysicalObjects::CreatedAt,
            PhysicalObjects::UpdatedAt,
        ]);
        let properties = properties_or_empty(&input.properties);
        push_values(
            &mut insert,
            vec![
                input.physical_object_type_id.0.into(),
                input.name.clone().into(),
                properties.to_string().into(),
                now.as_millis().into(),
                now.as_millis().into(),
            ],
        )?;
        let id = insert_returning_id(conn, insert, PhysicalObjects::PhysicalObjectId).await?;
        Ok(PhysicalObject {
            physical_object_id: PhysicalObjectId(id),
            physical_object_type_id: input.physical_object_type_id,
            name: input.name.clone(),
            properties,
            created_at: now,
            updated_at: now,
        })
    }

    async fn insert_base_geometry<C: ConnectionTrait>(
        &self,
        conn: &C,
        input: &ObjectGeometryInput,
        now: Timestamp,
    ) -> UrbisResult<ObjectGeometry> {
        input.geometry.validate(KindRule::Any)?;
        let centre_point = match &input.centre_point {
            Some(centre) => {
                centre.validate(KindRule::Only(GeometryKind::Point))?;
                centre.clone()
            }
            None => input
                .geometry
                .centroid()
                .ok_or_else(|| UrbisError::invalid("geometry has no centroid"))?,
        };
        let mut insert = Query::insert();
        insert.into_table(ObjectGeometries::Table).columns([
            ObjectGeometries::TerritoryId,
            ObjectGeometries::Geometry,
            ObjectGeometries::CentrePoint,
            ObjectGeometries::Address,
            ObjectGeometries::CreatedAt,
            ObjectGeometries::UpdatedAt,
        ]);
        push_values(
            &mut insert,
            vec![
                input.territory_id.0.into(),
                input.geometry.to_json()?.into(),
                centre_point.to_json()?.into(),
                input.address.clone().into(),
                now.as_millis().into(),
                now.as_millis().into(),
            ],
        )?;
        let id = insert_returning_id(conn, insert, ObjectGeometries::ObjectGeometryId).await?;
        Ok(ObjectGeometry {
            object_geometry_id: ObjectGeometryId(id),
            territory_id: input.territory_id,
            geometry: input.geometry.clone(),
            centre_point,
            address: input.address.clone(),
            is_cut: false,
            created_at: now,
            updated_at: now,
        })
    }

    async fn insert_base_service<C: ConnectionTrait>(
        &self,
        conn: &C,
        input: &ServiceInput,
        now: Timestamp,
    ) -> UrbisResult<Service> {
        let mut insert = Query::insert();
        insert.into_table(Services::Table).columns([
            Services::ServiceTypeId,
            Services::Name,
            Services::Capacity,
            Services::Properties,
            Services::CreatedAt,
            Services::UpdatedAt,
        ]);
        let properties = properties_or_empty(&input.properties);
        push_values(
            &mut insert,
            vec![
                input.service_type_id.0.into(),
                input.name.clone().into(),
                input.capacity.into(),
                properties.to_string().into(),
                now.as_millis().into(),
                now.as_millis().into(),
            ],
        )?;
        let id = insert_returning_id(conn, insert, Services::ServiceId).await?;
        Ok(Service {
            service_id: ServiceId(id),
            service_type_id: input.service_type_id,
            name: input.name.clone(),
            capacity: input.capacity,
            properties,
            created_at: now,
            updated_at: now,
        })
    }

    async fn insert_named<C: ConnectionTrait, T, I>(
        &self,
        conn: &C,
        table: T,
        id_col: I,
        name: &str,
    ) -> UrbisResult<i64>
    where
        T: sea_orm::sea_query::Iden + 'static,
        I: sea_orm::sea_query::Iden + Copy + 'static,
    {
        if name.trim().is_empty() {
            return Err(UrbisError::invalid("name must not be empty"));
        }
        let mut insert = Query::insert();
        insert.into_table(table).columns([ServiceTypes::Name]);
        push_values(&mut insert, vec![name.to_string().into()])?;
        insert_returning_id(conn, insert, id_col).await
    }
}

pub(crate) fn properties_or_empty(value: &serde_json::Value) -> serde_json::Value {
    if value.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        value.clone()
    }
}

#[async_trait]
impl BaseLayerApi for UrbisStore {
    async fn add_territory(&self, input: NewTerritory) -> UrbisResult<Territory> {
        input.geometry.validate(KindRule::Only(GeometryKind::Area))?;
        let centre_point = match &input.centre_point {
            Some(centre) => {
                centre.validate(KindRule::Only(GeometryKind::Point))?;
                centre.clone()
            }
            None => input
                .geometry
                .centroid()
                .ok_or_else(|| UrbisError::invalid("territory geometry has no centroid"))?,
        };
        let tx = self.conn.begin().await?;
        let level = match input.parent_id {
            Some(parent) => self.require_territory(&tx, parent).await?.level + 1,
            None => 1,
        };
        let mut insert = Query::insert();
        insert.into_table(Territories::Table).columns([
            Territories::ParentId,
            Territories::Name,
            Territories::Level,
            Territories::Geometry,
            Territories::CentrePoint,
            Territories::IsCity,
        ]);
        push_values(
            &mut insert,
            vec![
                input.parent_id.map(|id| id.0).into(),
                input.name.clone().into(),
                level.into(),
                input.geometry.to_json()?.into(),
                centre_point.to_json()?.into(),
                input.is_city.into(),
            ],
        )?;
        let id = TerritoryId(insert_returning_id(&tx, insert, Territories::TerritoryId).await?);
        tx.commit().await?;
        self.publish(vec![ChangeEvent::territory(id, ChangeKind::Territory, id.0)])
            .await;
        Ok(Territory {
            territory_id: id,
            parent_id: input.parent_id,
            name: input.name,
            level,
            geometry: input.geometry,
            centre_point,
            is_city: input.is_city,
        })
    }

    async fn get_territory(&self, territory_id: TerritoryId) -> UrbisResult<Territory> {
        self.require_territory(&self.conn, territory_id).await
    }

    async fn add_physical_object_function(
        &self,
        name: String,
    ) -> UrbisResult<PhysicalObjectFunction> {
        let id = self
            .insert_named(
                &self.conn,
                PhysicalObjectFunctions::Table,
                PhysicalObjectFunctions::FunctionId,
                &name,
            )
            .await?;
        Ok(PhysicalObjectFunction {
            function_id: PhysicalObjectFunctionId(id),
            name,
        })
    }

    async fn add_physical_object_type(
        &self,
        function_id: PhysicalObjectFunctionId,
        name: String,
    ) -> UrbisResult<PhysicalObjectType> {
        let function = Query::select()
            .from(PhysicalObjectFunctions::Table)
            .column(PhysicalObjectFunctions::FunctionId)
            .and_where(Expr::col(PhysicalObjectFunctions::FunctionId).eq(function_id.0))
            .to_owned();
        if query_one(&self.conn, &function).await?.is_none() {
            return Err(UrbisError::not_found_by_id(
                "physical object function",
                function_id.0,
            ));
        }
        let mut insert = Query::insert();
        insert
            .into_table(PhysicalObjectTypes::Table)
            .columns([PhysicalObjectTypes::FunctionId, PhysicalObjectTypes::Name]);
        push_values(&mut insert, vec![function_id.0.into(), name.clone().into()])?;
        let id =
            insert_returning_id(&self.conn, insert, PhysicalObjectTypes::PhysicalObjectTypeId)
                .await?;
        Ok(PhysicalObjectType {
            physical_object_type_id: PhysicalObjectTypeId(id),
            function_id,
            name,
        })
    }

    async fn add_service_type(&self, name: String) -> UrbisResult<ServiceType> {
        let id = self
            .insert_named(&self.conn, ServiceTypes::Table, ServiceTypes::ServiceTypeId, &name)
            .await?;
        Ok(ServiceType {
            service_type_id: ServiceTypeId(id),
            name,
        })
    }

    async fn add_functional_zone_type(&self, name: String) -> UrbisResult<FunctionalZoneType> {
        let id = self
            .insert_named(
                &self.conn,
                FunctionalZoneTypes::Table,
                FunctionalZoneTypes::FunctionalZoneTypeId,
                &name,
            )
            .await?;
        Ok(FunctionalZoneType {
            functional_zone_type_id: FunctionalZoneTypeId(id),
            name,
        })
    }

    async fn add_buffer_type(&self, name: String) -> UrbisResult<BufferType> {
        let id = self
            .insert_named(&self.conn, BufferTypes::Table, BufferTypes::BufferTypeId, &name)
            .await?;
        Ok(BufferType {
            buffer_type_id: BufferTypeId(id),
            name,
        })
    }

    async fn put_default_buffer_value(
        &self,
        value: DefaultBufferValue,
    ) -> UrbisResult<DefaultBufferValue> {
        let (column, type_id) = match (value.physical_object_type_id, value.service_type_id) {
            (Some(physical), None) => (DefaultBufferValues::PhysicalObjectTypeId, physical.0),
            (None, Some(service)) => (DefaultBufferValues::ServiceTypeId, service.0),
            _ => {
                return Err(UrbisError::trigger(
                    BUFFER_DEFAULT_AMBIGUOUS,
                    "default buffer value must reference exactly one of physical object type or service type",
                ));
            }
        };
        if !(value.buffer_value.is_finite() && value.buffer_value > 0.0) {
            return Err(UrbisError::invalid(format!(
                "buffer value must be positive, got {}",
                value.buffer_value
            )));
        }
        let tx = self.conn.begin().await?;
        self.buffer_type_exists(&tx, value.buffer_type_id).await?;
        match (value.physical_object_type_id, value.service_type_id) {
            (Some(physical), _) => self.type_exists(&tx, physical).await?,
            (_, Some(service)) => self.service_type_exists(&tx, service).await?,
            _ => {}
        }
        let existing = Query::select()
            .from(DefaultBufferValues::Table)
            .column(DefaultBufferValues::DefaultBufferValueId)
            .and_where(Expr::col(DefaultBufferValues::BufferTypeId).eq(value.buffer_type_id.0))
            .and_where(Expr::col(column).eq(type_id))
            .to_owned();
        match query_one(&tx, &existing).await? {
            Some(row) => {
                let id: i64 = row.try_get("", &col_name(DefaultBufferValues::DefaultBufferValueId))?;
                let update = Query::update()
                    .table(DefaultBufferValues::Table)
                    .values([(DefaultBufferValues::BufferValue, value.buffer_value.into())])
                    .and_where(Expr::col(DefaultBufferValues::DefaultBufferValueId).eq(id))
                    .to_owned();
                exec(&tx, &update).await?;
            }
            None => {
                let mut insert = Query::insert();
                insert.into_table(DefaultBufferValues::Table).columns([
                    DefaultBufferValues::BufferTypeId,
                    DefaultBufferValues::PhysicalObjectTypeId,
                    DefaultBufferValues::ServiceTypeId,
                    DefaultBufferValues::BufferValue,
                ]);
                push_values(
                    &mut insert,
                    vec![
                        value.buffer_type_id.0.into(),
                        value.physical_object_type_id.map(|id| id.0).into(),
                        value.service_type_id.map(|id| id.0).into(),
                        value.buffer_value.into(),
                    ],
                )?;
                exec(&tx, &insert).await?;
            }
        }
        tx.commit().await?;
        Ok(value)
    }

    async fn add_urban_object(&self, input: NewUrbanObject) -> UrbisResult<UrbanObjectView> {
        let tx = self.conn.begin().await?;
        self.type_exists(&tx, input.physical_object.physical_object_type_id)
            .await?;
        self.territory_exists(&tx, input.geometry.territory_id)
            .await?;
        if let Some(service) = &input.service {
            self.service_type_exists(&tx, service.service_type_id)
                .await?;
        }
        let now = Timestamp::now();
        let physical_object = self
            .insert_base_physical_object(&tx, &input.physical_object, now)
            .await?;
        let object_geometry = self.insert_base_geometry(&tx, &input.geometry, now).await?;
        let service = match &input.service {
            Some(service) => Some(self.insert_base_service(&tx, service, now).await?),
            None => None,
        };
        let mut insert = Query::insert();
        insert.into_table(UrbanObjects::Table).columns([
            UrbanObjects::PhysicalObjectId,
            UrbanObjects::ObjectGeometryId,
            UrbanObjects::ServiceId,
        ]);
        push_values(
            &mut insert,
            vec![
                physical_object.physical_object_id.0.into(),
                object_geometry.object_geometry_id.0.into(),
                service.as_ref().map(|s| s.service_id.0).into(),
            ],
        )?;
        let urban_object_id =
            UrbanObjectId(insert_returning_id(&tx, insert, UrbanObjects::UrbanObjectId).await?);
        tx.commit().await?;
        let territory_id = object_geometry.territory_id;
        self.publish(vec![ChangeEvent::territory(
            territory_id,
            ChangeKind::UrbanObject,
            urban_object_id.0,
        )])
        .await;
        Resolved::<BaseUrbanObject, OverlayDelta>::Base(BaseUrbanObject {
            urban_object_id,
            physical_object,
            object_geometry,
            service,
        })
        .materialize()
    }

    async fn add_base_buffer(
        &self,
        urban_object_id: UrbanObjectId,
        buffer_type_id: BufferTypeId,
        geometry: Option<Geometry>,
    ) -> UrbisResult<Buffer> {
        let tx = self.conn.begin().await?;
        self.buffer_type_exists(&tx, buffer_type_id).await?;
        let base = self
            .load_base_objects(&tx, &[urban_object_id])
            .await?
            .remove(&urban_object_id)
            .ok_or_else(|| UrbisError::not_found_by_id("urban object", urban_object_id.0))?;
        let (shape, is_custom) = match geometry {
            Some(geometry) => {
                geometry.validate(KindRule::Only(GeometryKind::Area))?;
                (geometry, true)
            }
            None => {
                let footprint = Footprint {
                    geometry: &base.object_geometry.geometry,
                    physical_object_type_id: base.physical_object.physical_object_type_id,
                    service_type_id: base.service.as_ref().map(|s| s.service_type_id),
                };
                (self.derive_buffer(&tx, buffer_type_id, &footprint).await?, false)
            }
        };
        let mut insert = Query::insert();
        insert
            .into_table(Buffers::Table)
            .columns([
                Buffers::BufferTypeId,
                Buffers::UrbanObjectId,
                Buffers::Geometry,
                Buffers::IsCustom,
            ])
            .on_conflict(
                OnConflict::columns([Buffers::BufferTypeId, Buffers::UrbanObjectId])
                    .update_columns([Buffers::Geometry, Buffers::IsCustom])
                    .to_owned(),
            );
        push_values(
            &mut insert,
            vec![
                buffer_type_id.0.into(),
                urban_object_id.0.into(),
                shape.to_json()?.into(),
                is_custom.into(),
            ],
        )?;
        exec(&tx, &insert).await?;
        tx.commit().await?;
        self.publish(vec![ChangeEvent::territory(
            base.object_geometry.territory_id,
            ChangeKind::Buffer,
            urban_object_id.0,
        )])
        .await;
        Ok(Buffer {
            buffer_type_id,
            urban_object_id,
            geometry: shape,
            is_custom,
            is_cut: false,
        })
    }

    async fn add_functional_zone(&self, input: FunctionalZoneInput) -> UrbisResult<FunctionalZone> {
        input.geometry.validate(KindRule::Only(GeometryKind::Area))?;
        let tx = self.conn.begin().await?;
        self.functional_zone_type_exists(&tx, input.functional_zone_type_id)
            .await?;
        if let Some(territory) = input.territory_id {
            self.territory_exists(&tx, territory).await?;
        }
        let now = Timestamp::now();
        let properties = properties_or_empty(&input.properties);
        let mut insert = Query::insert();
        insert.into_table(FunctionalZones::Table).columns([
            FunctionalZones::FunctionalZoneTypeId,
            FunctionalZones::Name,
            FunctionalZones::TerritoryId,
            FunctionalZones::Geometry,
            FunctionalZones::Year,
            FunctionalZones::Source,
            FunctionalZones::Properties,
            FunctionalZones::CreatedAt,
            FunctionalZones::UpdatedAt,
        ]);
        push_values(
            &mut insert,
            vec![
                input.functional_zone_type_id.0.into(),
                input.name.clone().into(),
                input.territory_id.map(|id| id.0).into(),
                input.geometry.to_json()?.into(),
                input.year.into(),
                input.source.clone().into(),
                properties.to_string().into(),
                now.as_millis().into(),
                now.as_millis().into(),
            ],
        )?;
        let id = insert_returning_id(&tx, insert, FunctionalZones::FunctionalZoneId).await?;
        tx.commit().await?;
        if let Some(territory) = input.territory_id {
            self.publish(vec![ChangeEvent::territory(
                territory,
                ChangeKind::FunctionalZone,
                id,
            )])
            .await;
        }
        Ok(FunctionalZone {
            functional_zone_id: FunctionalZoneId(id),
            functional_zone_type_id: input.functional_zone_type_id,
            name: input.name,
            territory_id: input.territory_id,
            geometry: input.geometry,
            year: input.year,
            source: input.source,
            properties,
            created_at: now,
            updated_at: now,
        })
    }
}
