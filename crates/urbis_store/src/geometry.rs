use async_trait::async_trait;
use sea_orm::sea_query::{Expr, ExprTrait, OnConflict, Query};
use sea_orm::{ConnectionTrait, TransactionTrait};

use crate::db::*;
use crate::store::{
    RowKind, ScenarioContext, UrbisStore, col_name, exec, exec_count, push_values, query_all,
    query_one,
};
use urbis_core::access::Access;
use urbis_core::error::{BUFFER_GEOMETRY_MISSING, BUFFER_RADIUS_MISSING, GEOMETRY_EMPTY};
use urbis_core::events::{ChangeEvent, ChangeKind};
use urbis_core::geometry::{Clipped, KindRule, buffer_ring, clip_to};
use urbis_core::*;

#[derive(Clone, Debug)]
pub(crate) struct Footprint<'a> {
    pub geometry: &'a Geometry,
    pub physical_object_type_id: PhysicalObjectTypeId,
    pub service_type_id: Option<ServiceTypeId>,
}

impl<'a> Footprint<'a> {
    pub fn of_view(view: &'a UrbanObjectView) -> Self {
        Self {
            geometry: &view.object_geometry.item.geometry,
            physical_object_type_id: view.physical_object.item.physical_object_type_id,
            service_type_id: view.service.as_ref().map(|s| s.item.service_type_id),
        }
    }
}

impl UrbisStore {
    /// Default radius in meters; a service type row wins over a physical object type row.
    pub(crate) async fn default_radius<C: ConnectionTrait>(
        &self,
        conn: &C,
        buffer_type_id: BufferTypeId,
        footprint: &Footprint<'_>,
    ) -> UrbisResult<f64> {
        let lookup = |column: DefaultBufferValues, id: i64| {
            Query::select()
                .from(DefaultBufferValues::Table)
                .column(DefaultBufferValues::BufferValue)
                .and_where(Expr::col(DefaultBufferValues::BufferTypeId).eq(buffer_type_id.0))
                .and_where(Expr::col(column).eq(id))
                .to_owned()
        };
        if let Some(service_type) = footprint.service_type_id {
            let select = lookup(DefaultBufferValues::ServiceTypeId, service_type.0);
            if let Some(row) = query_one(conn, &select).await? {
                return Ok(row.try_get("", &col_name(DefaultBufferValues::BufferValue))?);
            }
        }
        let select = lookup(
            DefaultBufferValues::PhysicalObjectTypeId,
            footprint.physical_object_type_id.0,
        );
        match query_one(conn, &select).await? {
            Some(row) => Ok(row.try_get("", &col_name(DefaultBufferValues::BufferValue))?),
            None => Err(UrbisError::trigger(
                BUFFER_RADIUS_MISSING,
                format!(
                    "no default radius for buffer type {buffer_type_id} and physical object type {}",
                    footprint.physical_object_type_id
                ),
            )),
        }
    }

    pub(crate) async fn derive_buffer<C: ConnectionTrait>(
        &self,
        conn: &C,
        buffer_type_id: BufferTypeId,
        footprint: &Footprint<'_>,
    ) -> UrbisResult<Geometry> {
        if footprint.geometry.is_empty() {
            return Err(UrbisError::trigger(
                BUFFER_GEOMETRY_MISSING,
                "owning object has no geometry to derive a buffer from",
            ));
        }
        let meters = self.default_radius(conn, buffer_type_id, footprint).await?;
        buffer_ring(footprint.geometry, self.geometry.to_units(meters))
    }

    pub(crate) fn clip_for_project(
        &self,
        ctx: &ScenarioContext,
        geometry: &Geometry,
    ) -> UrbisResult<Clipped> {
        match ctx.boundary() {
            Some(boundary) => clip_to(geometry, &boundary),
            None => Ok(Clipped {
                geometry: geometry.clone(),
                is_cut: false,
            }),
        }
    }

    pub(crate) fn prepare_object_geometry(
        &self,
        ctx: &ScenarioContext,
        input: &ObjectGeometryInput,
        created_at: Timestamp,
    ) -> UrbisResult<ObjectGeometry> {
        input.geometry.validate(KindRule::Any)?;
        if let Some(centre) = &input.centre_point {
            centre.validate(KindRule::Only(GeometryKind::Point))?;
        }
        let clipped = if input.non_clippable {
            Clipped {
                geometry: input.geometry.clone(),
                is_cut: false,
            }
        } else {
            self.clip_for_project(ctx, &input.geometry)?
        };
        if clipped.geometry.is_empty() {
            return Err(UrbisError::invalid_with_code(
                GEOMETRY_EMPTY,
                "geometry lies outside the project territory",
            ));
        }
        let centre_point = match &input.centre_point {
            Some(centre) => centre.clone(),
            None => clipped
                .geometry
                .centroid()
                .ok_or_else(|| UrbisError::invalid("geometry has no centroid"))?,
        };
        Ok(ObjectGeometry {
            object_geometry_id: ObjectGeometryId(0),
            territory_id: input.territory_id,
            geometry: clipped.geometry,
            centre_point,
            address: input.address.clone(),
            is_cut: clipped.is_cut,
            created_at,
            updated_at: Timestamp::now(),
        })
    }

    pub(crate) async fn buffer_type_exists<C: ConnectionTrait>(
        &self,
        conn: &C,
        buffer_type_id: BufferTypeId,
    ) -> UrbisResult<()> {
        let select = Query::select()
            .from(BufferTypes::Table)
            .column(BufferTypes::BufferTypeId)
            .and_where(Expr::col(BufferTypes::BufferTypeId).eq(buffer_type_id.0))
            .to_owned();
        match query_one(conn, &select).await? {
            Some(_) => Ok(()),
            None => Err(UrbisError::not_found_by_id("buffer type", buffer_type_id.0)),
        }
    }

    pub(crate) async fn adopt_base_buffers<C: ConnectionTrait>(
        &self,
        conn: &C,
        base_id: UrbanObjectId,
        link_id: UrbanObjectId,
        except: Option<BufferTypeId>,
    ) -> UrbisResult<usize> {
        let mut select = Query::select();
        select
            .from(Buffers::Table)
            .columns([Buffers::BufferTypeId, Buffers::Geometry, Buffers::IsCustom])
            .and_where(Expr::col(Buffers::UrbanObjectId).eq(base_id.0));
        if let Some(skip) = except {
            select.and_where(Expr::col(Buffers::BufferTypeId).ne(skip.0));
        }
        let rows = query_all(conn, &select).await?;
        if rows.is_empty() {
            return Ok(0);
        }
        let mut insert = Query::insert();
        insert.into_table(ScenarioBuffers::Table).columns([
            ScenarioBuffers::BufferTypeId,
            ScenarioBuffers::UrbanObjectId,
            ScenarioBuffers::Geometry,
            ScenarioBuffers::IsCustom,
            ScenarioBuffers::IsCut,
        ]);
        for row in &rows {
            let buffer_type: i64 = row.try_get("", &col_name(Buffers::BufferTypeId))?;
            let geometry: String = row.try_get("", &col_name(Buffers::Geometry))?;
            let is_custom: bool = row.try_get("", &col_name(Buffers::IsCustom))?;
            push_values(
                &mut insert,
                vec![
                    buffer_type.into(),
                    link_id.0.into(),
                    geometry.into(),
                    is_custom.into(),
                    false.into(),
                ],
            )?;
        }
        exec(conn, &insert).await?;
        Ok(rows.len())
    }

    async fn buffer_owner<C: ConnectionTrait>(
        &self,
        conn: &C,
        ctx: &ScenarioContext,
        urban_object_id: UrbanObjectId,
        is_scenario_object: bool,
        skip_type: Option<BufferTypeId>,
    ) -> UrbisResult<UrbanObjectView> {
        let scenario_id = ctx.scenario_id();
        if is_scenario_object {
            let urban_object_id: UrbanObjectId = self
                .current_id(conn, scenario_id, RowKind::Link, urban_object_id.0)
                .await?;
            let link = self
                .load_link(conn, scenario_id, urban_object_id)
                .await?
                .ok_or_else(|| {
                    UrbisError::not_found_by_id("scenario urban object", urban_object_id.0)
                })?;
            return self.view_for_link(conn, &link).await;
        }
        let base = self
            .load_base_objects(conn, &[urban_object_id])
            .await?
            .remove(&urban_object_id)
            .ok_or_else(|| UrbisError::not_found_by_id("urban object", urban_object_id.0))?;
        if self
            .link_for_base(conn, scenario_id, urban_object_id)
            .await?
            .is_some()
        {
            return Err(UrbisError::already_edited("urban object", urban_object_id.0));
        }
        let reach = self.reach(conn, ctx, false).await?;
        if !reach.admits(&base.object_geometry) {
            return Err(UrbisError::not_found_by_id("urban object", urban_object_id.0));
        }
        let pointers = LinkPointers {
            physical_object: Pointer::Base(base.physical_object.physical_object_id),
            object_geometry: Pointer::Base(base.object_geometry.object_geometry_id),
            service: base
                .service
                .as_ref()
                .map_or(Pointer::None, |s| Pointer::Base(s.service_id)),
        };
        let link_id = self
            .claim_base_object(conn, scenario_id, urban_object_id, pointers)
            .await?;
        self.adopt_base_buffers(conn, urban_object_id, link_id, skip_type)
            .await?;
        let link = OverlayLink {
            link_id,
            scenario_id,
            base_urban_object_id: Some(urban_object_id),
            pointers,
        };
        self.view_for_link(conn, &link).await
    }
}

#[async_trait]
impl BufferApi for UrbisStore {
    async fn put_buffer(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        input: BufferInput,
    ) -> UrbisResult<BufferRecord> {
        let tx = self.conn.begin().await?;
        let mut ctx = self
            .load_context(&tx, scenario_id, Some(actor), Access::Write)
            .await?;
        ctx.require_project_scenario()?;
        self.prepare_for_write(&tx, &mut ctx).await?;
        self.buffer_type_exists(&tx, input.buffer_type_id).await?;
        let owner = self
            .buffer_owner(
                &tx,
                &ctx,
                input.urban_object_id,
                input.is_scenario_object,
                Some(input.buffer_type_id),
            )
            .await?;

        let (shape, is_custom) = match &input.geometry {
            Some(geometry) => {
                geometry.validate(KindRule::Only(GeometryKind::Area))?;
                (geometry.clone(), true)
            }
            None => {
                let footprint = Footprint::of_view(&owner);
                (
                    self.derive_buffer(&tx, input.buffer_type_id, &footprint)
                        .await?,
                    false,
                )
            }
        };
        let clipped = self.clip_for_project(&ctx, &shape)?;
        if clipped.geometry.is_empty() {
            log::warn!(
                "scenario {scenario_id}: buffer {} of urban object {} is empty after clipping",
                input.buffer_type_id,
                owner.urban_object_id
            );
        }
        let buffer = Buffer {
            buffer_type_id: input.buffer_type_id,
            urban_object_id: owner.urban_object_id,
            geometry: clipped.geometry,
            is_custom,
            is_cut: clipped.is_cut,
        };
        let mut insert = Query::insert();
        insert
            .into_table(ScenarioBuffers::Table)
            .columns([
                ScenarioBuffers::BufferTypeId,
                ScenarioBuffers::UrbanObjectId,
                ScenarioBuffers::Geometry,
                ScenarioBuffers::IsCustom,
                ScenarioBuffers::IsCut,
            ])
            .on_conflict(
                OnConflict::columns([ScenarioBuffers::BufferTypeId, ScenarioBuffers::UrbanObjectId])
                    .update_columns([
                        ScenarioBuffers::Geometry,
                        ScenarioBuffers::IsCustom,
                        ScenarioBuffers::IsCut,
                    ])
                    .to_owned(),
            );
        push_values(
            &mut insert,
            vec![
                buffer.buffer_type_id.0.into(),
                buffer.urban_object_id.0.into(),
                buffer.geometry.to_json()?.into(),
                buffer.is_custom.into(),
                buffer.is_cut.into(),
            ],
        )?;
        exec(&tx, &insert).await?;
        self.maybe_failpoint("put_buffer")?;
        tx.commit().await?;
        self.publish(vec![ChangeEvent::scenario(
            scenario_id,
            ChangeKind::Buffer,
            buffer.urban_object_id.0,
        )])
        .await;
        Ok(BufferRecord {
            buffer,
            is_scenario_object: true,
            origin: Origin::Scenario,
        })
    }

    async fn delete_buffer(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        urban_object_id: UrbanObjectId,
        is_scenario_object: bool,
        buffer_type_id: BufferTypeId,
    ) -> UrbisResult<()> {
        let tx = self.conn.begin().await?;
        let mut ctx = self
            .load_context(&tx, scenario_id, Some(actor), Access::Write)
            .await?;
        ctx.require_project_scenario()?;
        self.prepare_for_write(&tx, &mut ctx).await?;
        let owner_id = if is_scenario_object {
            let urban_object_id: UrbanObjectId = self
                .current_id(&tx, scenario_id, RowKind::Link, urban_object_id.0)
                .await?;
            let link = self
                .load_link(&tx, scenario_id, urban_object_id)
                .await?
                .ok_or_else(|| {
                    UrbisError::not_found_by_id("scenario urban object", urban_object_id.0)
                })?;
            let delete = Query::delete()
                .from_table(ScenarioBuffers::Table)
                .and_where(Expr::col(ScenarioBuffers::BufferTypeId).eq(buffer_type_id.0))
                .and_where(Expr::col(ScenarioBuffers::UrbanObjectId).eq(link.link_id.0))
                .to_owned();
            if exec_count(&tx, &delete).await? == 0 {
                return Err(UrbisError::not_found_by_params(
                    "buffer",
                    format!("buffer type {buffer_type_id}, scenario urban object {urban_object_id}"),
                ));
            }
            link.link_id
        } else {
            let select = Query::select()
                .from(Buffers::Table)
                .column(Buffers::BufferTypeId)
                .and_where(Expr::col(Buffers::BufferTypeId).eq(buffer_type_id.0))
                .and_where(Expr::col(Buffers::UrbanObjectId).eq(urban_object_id.0))
                .to_owned();
            if query_one(&tx, &select).await?.is_none() {
                return Err(UrbisError::not_found_by_params(
                    "buffer",
                    format!("buffer type {buffer_type_id}, urban object {urban_object_id}"),
                ));
            }
            let owner = self
                .buffer_owner(&tx, &ctx, urban_object_id, false, Some(buffer_type_id))
                .await?;
            owner.urban_object_id
        };
        self.maybe_failpoint("delete_buffer")?;
        tx.commit().await?;
        self.publish(vec![ChangeEvent::scenario(
            scenario_id,
            ChangeKind::Buffer,
            owner_id.0,
        )])
        .await;
        Ok(())
    }
}
