use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use sea_orm::sea_query::{Expr, ExprTrait, Query};
use sea_orm::{ConnectionTrait, TransactionTrait};

use crate::base::properties_or_empty;
use crate::db::*;
use crate::store::{RowKind, ScenarioContext, Tier, UrbisStore, exec, query_one};
use urbis_core::access::Access;
use urbis_core::error::INVALID_VALUE;
use urbis_core::events::{ChangeEvent, ChangeKind};
use urbis_core::*;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Slot {
    PhysicalObject,
    ObjectGeometry,
    Service,
}

impl Slot {
    fn label(self) -> &'static str {
        match self {
            Slot::PhysicalObject => "physical object",
            Slot::ObjectGeometry => "object geometry",
            Slot::Service => "service",
        }
    }

    fn row_kind(self) -> RowKind {
        match self {
            Slot::PhysicalObject => RowKind::PhysicalObject,
            Slot::ObjectGeometry => RowKind::ObjectGeometry,
            Slot::Service => RowKind::Service,
        }
    }

    fn base_column(self) -> UrbanObjects {
        match self {
            Slot::PhysicalObject => UrbanObjects::PhysicalObjectId,
            Slot::ObjectGeometry => UrbanObjects::ObjectGeometryId,
            Slot::Service => UrbanObjects::ServiceId,
        }
    }

    fn columns(self, pointers: &LinkPointers) -> (Option<i64>, Option<i64>) {
        match self {
            Slot::PhysicalObject => pointers.physical_object.to_columns(),
            Slot::ObjectGeometry => pointers.object_geometry.to_columns(),
            Slot::Service => pointers.service.to_columns(),
        }
    }

    fn set_local(self, pointers: &mut LinkPointers, id: i64) {
        match self {
            Slot::PhysicalObject => pointers.physical_object = Pointer::Local(PhysicalObjectId(id)),
            Slot::ObjectGeometry => pointers.object_geometry = Pointer::Local(ObjectGeometryId(id)),
            Slot::Service => pointers.service = Pointer::Local(ServiceId(id)),
        }
    }

    fn replacement_select(self, scenario_id: ScenarioId, base_id: i64) -> sea_orm::sea_query::SelectStatement {
        let mut select = Query::select();
        match self {
            Slot::PhysicalObject => select
                .from(ScenarioPhysicalObjects::Table)
                .column(PhysicalObjects::PhysicalObjectId)
                .and_where(Expr::col(ScenarioPhysicalObjects::ScenarioId).eq(scenario_id.0))
                .and_where(Expr::col(ScenarioPhysicalObjects::PublicPhysicalObjectId).eq(base_id)),
            Slot::ObjectGeometry => select
                .from(ScenarioObjectGeometries::Table)
                .column(ObjectGeometries::ObjectGeometryId)
                .and_where(Expr::col(ScenarioObjectGeometries::ScenarioId).eq(scenario_id.0))
                .and_where(Expr::col(ScenarioObjectGeometries::PublicObjectGeometryId).eq(base_id)),
            Slot::Service => select
                .from(ScenarioServices::Table)
                .column(Services::ServiceId)
                .and_where(Expr::col(ScenarioServices::ScenarioId).eq(scenario_id.0))
                .and_where(Expr::col(ScenarioServices::PublicServiceId).eq(base_id)),
        };
        select.to_owned()
    }
}

enum Target {
    Base(BaseUrbanObject),
    Link(OverlayLink),
}

fn base_pointers(base: &BaseUrbanObject) -> LinkPointers {
    LinkPointers {
        physical_object: Pointer::Base(base.physical_object.physical_object_id),
        object_geometry: Pointer::Base(base.object_geometry.object_geometry_id),
        service: base
            .service
            .as_ref()
            .map_or(Pointer::None, |s| Pointer::Base(s.service_id)),
    }
}

fn new_physical_object(input: &PhysicalObjectInput, now: Timestamp) -> PhysicalObject {
    PhysicalObject {
        physical_object_id: PhysicalObjectId(0),
        physical_object_type_id: input.physical_object_type_id,
        name: input.name.clone(),
        properties: properties_or_empty(&input.properties),
        created_at: now,
        updated_at: now,
    }
}

fn new_service(input: &ServiceInput, now: Timestamp) -> Service {
    Service {
        service_id: ServiceId(0),
        service_type_id: input.service_type_id,
        name: input.name.clone(),
        capacity: input.capacity,
        properties: properties_or_empty(&input.properties),
        created_at: now,
        updated_at: now,
    }
}

fn transition(state: LinkState, step: Transition, urban_object_id: UrbanObjectId) -> UrbisResult<LinkState> {
    state.apply(step).ok_or_else(|| {
        UrbisError::invalid(format!(
            "{step:?} does not apply to urban object {urban_object_id} in state {state:?}"
        ))
    })
}

impl UrbisStore {
    async fn check_physical_input<C: ConnectionTrait>(
        &self,
        conn: &C,
        input: &PhysicalObjectInput,
    ) -> UrbisResult<()> {
        self.type_exists(conn, input.physical_object_type_id).await
    }

    async fn check_object_input<C: ConnectionTrait>(
        &self,
        conn: &C,
        input: &NewUrbanObject,
    ) -> UrbisResult<()> {
        self.check_physical_input(conn, &input.physical_object).await?;
        self.territory_exists(conn, input.geometry.territory_id).await?;
        if let Some(service) = &input.service {
            self.service_type_exists(conn, service.service_type_id).await?;
        }
        Ok(())
    }

    async fn write_context<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario_id: ScenarioId,
        actor: &Actor,
    ) -> UrbisResult<ScenarioContext> {
        let mut ctx = self
            .load_context(conn, scenario_id, Some(actor), Access::Write)
            .await?;
        self.prepare_for_write(conn, &mut ctx).await?;
        Ok(ctx)
    }

    /// Live identity named by the caller; a base id already carried by a link is `AlreadyEdited`.
    async fn locate_identity<C: ConnectionTrait>(
        &self,
        conn: &C,
        ctx: &ScenarioContext,
        urban_object_id: UrbanObjectId,
        is_scenario_object: bool,
    ) -> UrbisResult<Target> {
        let scenario_id = ctx.scenario_id();
        if is_scenario_object {
            let urban_object_id: UrbanObjectId = self
                .current_id(conn, scenario_id, RowKind::Link, urban_object_id.0)
                .await?;
            let link = self
                .load_link(conn, scenario_id, urban_object_id)
                .await?
                .filter(|link| !matches!(link.shape(), Ok(LinkShape::Tombstone(_))))
                .ok_or_else(|| {
                    UrbisError::not_found_by_id("scenario urban object", urban_object_id.0)
                })?;
            return Ok(Target::Link(link));
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
        Ok(Target::Base(base))
    }

    async fn promote<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario_id: ScenarioId,
        base: &BaseUrbanObject,
        pointers: LinkPointers,
    ) -> UrbisResult<OverlayLink> {
        let link_id = self
            .claim_base_object(conn, scenario_id, base.urban_object_id, pointers)
            .await?;
        self.adopt_base_buffers(conn, base.urban_object_id, link_id, None)
            .await?;
        Ok(OverlayLink {
            link_id,
            scenario_id,
            base_urban_object_id: Some(base.urban_object_id),
            pointers,
        })
    }

    async fn insert_local_physical<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario_id: ScenarioId,
        public: Option<i64>,
        item: PhysicalObject,
    ) -> UrbisResult<PhysicalObject> {
        self.insert_local_physical_objects(conn, scenario_id, &[(public, item)])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| UrbisError::internal("physical object insert returned no row"))
    }

    async fn insert_local_geometry<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario_id: ScenarioId,
        public: Option<i64>,
        item: ObjectGeometry,
    ) -> UrbisResult<ObjectGeometry> {
        self.insert_local_geometries(conn, scenario_id, &[(public, item)])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| UrbisError::internal("geometry insert returned no row"))
    }

    async fn insert_local_service<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario_id: ScenarioId,
        public: Option<i64>,
        item: Service,
    ) -> UrbisResult<Service> {
        self.insert_local_services(conn, scenario_id, &[(public, item)])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| UrbisError::internal("service insert returned no row"))
    }

    async fn update_local_physical<C: ConnectionTrait>(
        &self,
        conn: &C,
        item: &PhysicalObject,
    ) -> UrbisResult<()> {
        let update = Query::update()
            .table(ScenarioPhysicalObjects::Table)
            .values([
                (PhysicalObjects::PhysicalObjectTypeId, item.physical_object_type_id.0.into()),
                (PhysicalObjects::Name, item.name.clone().into()),
                (PhysicalObjects::Properties, item.properties.to_string().into()),
                (PhysicalObjects::UpdatedAt, item.updated_at.as_millis().into()),
            ])
            .and_where(Expr::col(PhysicalObjects::PhysicalObjectId).eq(item.physical_object_id.0))
            .to_owned();
        exec(conn, &update).await
    }

    async fn update_local_geometry<C: ConnectionTrait>(
        &self,
        conn: &C,
        item: &ObjectGeometry,
    ) -> UrbisResult<()> {
        let update = Query::update()
            .table(ScenarioObjectGeometries::Table)
            .values([
                (ObjectGeometries::TerritoryId, item.territory_id.0.into()),
                (ObjectGeometries::Geometry, item.geometry.to_json()?.into()),
                (ObjectGeometries::CentrePoint, item.centre_point.to_json()?.into()),
                (ObjectGeometries::Address, item.address.clone().into()),
                (ObjectGeometries::UpdatedAt, item.updated_at.as_millis().into()),
            ])
            .value(ScenarioObjectGeometries::IsCut, item.is_cut)
            .and_where(Expr::col(ObjectGeometries::ObjectGeometryId).eq(item.object_geometry_id.0))
            .to_owned();
        exec(conn, &update).await
    }

    async fn update_local_service<C: ConnectionTrait>(
        &self,
        conn: &C,
        item: &Service,
    ) -> UrbisResult<()> {
        let update = Query::update()
            .table(ScenarioServices::Table)
            .values([
                (Services::ServiceTypeId, item.service_type_id.0.into()),
                (Services::Name, item.name.clone().into()),
                (Services::Capacity, item.capacity.into()),
                (Services::Properties, item.properties.to_string().into()),
                (Services::UpdatedAt, item.updated_at.as_millis().into()),
            ])
            .and_where(Expr::col(Services::ServiceId).eq(item.service_id.0))
            .to_owned();
        exec(conn, &update).await
    }

    async fn drop_link_buffers<C: ConnectionTrait>(
        &self,
        conn: &C,
        link_ids: &[UrbanObjectId],
    ) -> UrbisResult<()> {
        let ids: Vec<i64> = link_ids.iter().map(|id| id.0).collect();
        for chunk in ids.chunks(self.limits.max_in_params) {
            let delete = Query::delete()
                .from_table(ScenarioBuffers::Table)
                .and_where(Expr::col(ScenarioBuffers::UrbanObjectId).is_in(chunk.iter().copied()))
                .to_owned();
            exec(conn, &delete).await?;
        }
        Ok(())
    }

    async fn links_pointing_at<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario_id: ScenarioId,
        slot: Slot,
        local: bool,
        id: i64,
    ) -> UrbisResult<Vec<OverlayLink>> {
        let links = self.load_links(conn, scenario_id).await?;
        Ok(links
            .into_iter()
            .filter(|link| !matches!(link.shape(), Ok(LinkShape::Tombstone(_))))
            .filter(|link| {
                let (local_id, base_id) = slot.columns(&link.pointers);
                if local { local_id == Some(id) } else { base_id == Some(id) }
            })
            .collect())
    }

    async fn untouched_bases_with<C: ConnectionTrait>(
        &self,
        conn: &C,
        ctx: &ScenarioContext,
        slot: Slot,
        base_id: i64,
    ) -> UrbisResult<Vec<BaseUrbanObject>> {
        let candidates = self
            .base_objects_containing(conn, slot.base_column(), base_id)
            .await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let reach = self.reach(conn, ctx, false).await?;
        let mut out = Vec::new();
        for base in candidates {
            if !reach.admits(&base.object_geometry) {
                continue;
            }
            if self
                .link_for_base(conn, ctx.scenario_id(), base.urban_object_id)
                .await?
                .is_some()
            {
                continue;
            }
            out.push(base);
        }
        Ok(out)
    }

    async fn rewrite_base_slot<C, F>(
        &self,
        conn: &C,
        ctx: &ScenarioContext,
        slot: Slot,
        base_id: i64,
        apply: F,
    ) -> UrbisResult<Vec<OverlayLink>>
    where
        C: ConnectionTrait,
        F: Fn(&mut LinkPointers),
    {
        let scenario_id = ctx.scenario_id();
        let mut written = Vec::new();
        for base in self.untouched_bases_with(conn, ctx, slot, base_id).await? {
            let mut pointers = base_pointers(&base);
            apply(&mut pointers);
            written.push(self.promote(conn, scenario_id, &base, pointers).await?);
        }
        for mut link in self
            .links_pointing_at(conn, scenario_id, slot, false, base_id)
            .await?
        {
            apply(&mut link.pointers);
            self.update_link_pointers(conn, link.link_id, &link.pointers)
                .await?;
            written.push(link);
        }
        Ok(written)
    }

    async fn ensure_not_replaced<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario_id: ScenarioId,
        slot: Slot,
        base_id: i64,
    ) -> UrbisResult<()> {
        if query_one(conn, &slot.replacement_select(scenario_id, base_id))
            .await?
            .is_some()
        {
            return Err(UrbisError::already_edited(slot.label(), base_id));
        }
        Ok(())
    }

    async fn territories_of<C: ConnectionTrait>(
        &self,
        conn: &C,
        links: &[OverlayLink],
    ) -> UrbisResult<Vec<TerritoryId>> {
        let views = self.materialize_links(conn, links).await?;
        let set: BTreeSet<TerritoryId> = views
            .iter()
            .map(|view| view.object_geometry.item.territory_id)
            .collect();
        Ok(set.into_iter().collect())
    }

    async fn write_physical_object<C: ConnectionTrait>(
        &self,
        conn: &C,
        ctx: &ScenarioContext,
        physical_object_id: PhysicalObjectId,
        is_scenario_object: bool,
        input: PhysicalObjectInput,
    ) -> UrbisResult<(PhysicalObjectRecord, Vec<OverlayLink>)> {
        self.check_physical_input(conn, &input).await?;
        let scenario_id = ctx.scenario_id();
        let now = Timestamp::now();
        let (item, links) = if is_scenario_object {
            let current = self
                .owned_physical_object(conn, scenario_id, physical_object_id)
                .await?;
            let item = PhysicalObject {
                physical_object_id,
                created_at: current.created_at,
                ..new_physical_object(&input, now)
            };
            self.update_local_physical(conn, &item).await?;
            let links = self
                .links_pointing_at(conn, scenario_id, Slot::PhysicalObject, true, physical_object_id.0)
                .await?;
            (item, links)
        } else {
            self.ensure_not_replaced(conn, scenario_id, Slot::PhysicalObject, physical_object_id.0)
                .await?;
            let item = self
                .insert_local_physical(
                    conn,
                    scenario_id,
                    Some(physical_object_id.0),
                    new_physical_object(&input, now),
                )
                .await?;
            let local = item.physical_object_id.0;
            let links = self
                .rewrite_base_slot(conn, ctx, Slot::PhysicalObject, physical_object_id.0, |p| {
                    Slot::PhysicalObject.set_local(p, local)
                })
                .await?;
            if links.is_empty() {
                return Err(UrbisError::not_found_by_id(
                    "physical object",
                    physical_object_id.0,
                ));
            }
            (item, links)
        };
        let functions = self.type_functions(conn).await?;
        let record = PhysicalObjectRecord {
            function_id: functions.get(&item.physical_object_type_id).copied(),
            territories: self.territories_of(conn, &links).await?,
            physical_object: item,
            is_scenario_object: true,
            origin: Origin::Scenario,
        };
        Ok((record, links))
    }

    async fn write_service<C: ConnectionTrait>(
        &self,
        conn: &C,
        ctx: &ScenarioContext,
        service_id: ServiceId,
        is_scenario_object: bool,
        input: ServiceInput,
    ) -> UrbisResult<(ServiceRecord, Vec<OverlayLink>)> {
        self.service_type_exists(conn, input.service_type_id).await?;
        let scenario_id = ctx.scenario_id();
        let now = Timestamp::now();
        let (item, links) = if is_scenario_object {
            let current = self.owned_service(conn, scenario_id, service_id).await?;
            let item = Service {
                service_id,
                created_at: current.created_at,
                ..new_service(&input, now)
            };
            self.update_local_service(conn, &item).await?;
            let links = self
                .links_pointing_at(conn, scenario_id, Slot::Service, true, service_id.0)
                .await?;
            (item, links)
        } else {
            self.ensure_not_replaced(conn, scenario_id, Slot::Service, service_id.0)
                .await?;
            let item = self
                .insert_local_service(conn, scenario_id, Some(service_id.0), new_service(&input, now))
                .await?;
            let local = item.service_id.0;
            let links = self
                .rewrite_base_slot(conn, ctx, Slot::Service, service_id.0, |p| {
                    Slot::Service.set_local(p, local)
                })
                .await?;
            if links.is_empty() {
                return Err(UrbisError::not_found_by_id("service", service_id.0));
            }
            (item, links)
        };
        let record = ServiceRecord {
            territories: self.territories_of(conn, &links).await?,
            service: item,
            is_scenario_object: true,
            origin: Origin::Scenario,
        };
        Ok((record, links))
    }

    async fn write_object_geometry<C: ConnectionTrait>(
        &self,
        conn: &C,
        ctx: &ScenarioContext,
        object_geometry_id: ObjectGeometryId,
        is_scenario_object: bool,
        input: ObjectGeometryInput,
    ) -> UrbisResult<(GeometryRecord, Vec<OverlayLink>)> {
        self.territory_exists(conn, input.territory_id).await?;
        let scenario_id = ctx.scenario_id();
        let now = Timestamp::now();
        let (item, links) = if is_scenario_object {
            let current = self
                .owned_object_geometry(conn, scenario_id, object_geometry_id)
                .await?;
            let item = ObjectGeometry {
                object_geometry_id,
                ..self.prepare_object_geometry(ctx, &input, current.created_at)?
            };
            self.update_local_geometry(conn, &item).await?;
            let links = self
                .links_pointing_at(conn, scenario_id, Slot::ObjectGeometry, true, object_geometry_id.0)
                .await?;
            (item, links)
        } else {
            self.ensure_not_replaced(conn, scenario_id, Slot::ObjectGeometry, object_geometry_id.0)
                .await?;
            let prepared = self.prepare_object_geometry(ctx, &input, now)?;
            let item = self
                .insert_local_geometry(conn, scenario_id, Some(object_geometry_id.0), prepared)
                .await?;
            let local = item.object_geometry_id.0;
            let links = self
                .rewrite_base_slot(conn, ctx, Slot::ObjectGeometry, object_geometry_id.0, |p| {
                    Slot::ObjectGeometry.set_local(p, local)
                })
                .await?;
            if links.is_empty() {
                return Err(UrbisError::not_found_by_id(
                    "object geometry",
                    object_geometry_id.0,
                ));
            }
            (item, links)
        };
        let record = GeometryRecord {
            object_geometry: item,
            is_scenario_object: true,
            origin: Origin::Scenario,
        };
        Ok((record, links))
    }

    async fn remove_sub_object<C: ConnectionTrait>(
        &self,
        conn: &C,
        ctx: &ScenarioContext,
        slot: Slot,
        id: i64,
        is_scenario_object: bool,
    ) -> UrbisResult<Vec<UrbanObjectId>> {
        let scenario_id = ctx.scenario_id();
        let touched = if is_scenario_object {
            let id: i64 = self
                .current_id(conn, scenario_id, slot.row_kind(), id)
                .await?;
            match slot {
                Slot::PhysicalObject => {
                    self.owned_physical_object(conn, scenario_id, PhysicalObjectId(id))
                        .await?;
                }
                Slot::ObjectGeometry => {
                    self.owned_object_geometry(conn, scenario_id, ObjectGeometryId(id))
                        .await?;
                }
                Slot::Service => {
                    self.owned_service(conn, scenario_id, ServiceId(id)).await?;
                }
            }
            let links = self
                .links_pointing_at(conn, scenario_id, slot, true, id)
                .await?;
            let ids: Vec<UrbanObjectId> = links.iter().map(|link| link.link_id).collect();
            if slot == Slot::Service {
                for mut link in links {
                    link.pointers.service = Pointer::None;
                    self.update_link_pointers(conn, link.link_id, &link.pointers)
                        .await?;
                }
            } else {
                self.delete_links(conn, &ids).await?;
            }
            ids
        } else {
            self.ensure_not_replaced(conn, scenario_id, slot, id).await?;
            let links = if slot == Slot::Service {
                self.rewrite_base_slot(conn, ctx, slot, id, |p| p.service = Pointer::None)
                    .await?
            } else {
                let links = self
                    .rewrite_base_slot(conn, ctx, slot, id, |p| *p = LinkPointers::tombstone())
                    .await?;
                let ids: Vec<UrbanObjectId> = links.iter().map(|link| link.link_id).collect();
                self.drop_link_buffers(conn, &ids).await?;
                links
            };
            if links.is_empty() {
                return Err(UrbisError::not_found_by_id(slot.label(), id));
            }
            links.iter().map(|link| link.link_id).collect()
        };
        self.delete_orphan_sub_objects(conn, scenario_id).await?;
        Ok(touched)
    }

    async fn current_physical_object<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario_id: ScenarioId,
        id: PhysicalObjectId,
        is_scenario_object: bool,
    ) -> UrbisResult<PhysicalObject> {
        if is_scenario_object {
            return self.owned_physical_object(conn, scenario_id, id).await;
        }
        self.load_physical_objects(conn, Tier::Base, &[id.0])
            .await?
            .remove(&id.0)
            .ok_or_else(|| UrbisError::not_found_by_id("physical object", id.0))
    }

    async fn current_service<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario_id: ScenarioId,
        id: ServiceId,
        is_scenario_object: bool,
    ) -> UrbisResult<Service> {
        if is_scenario_object {
            return self.owned_service(conn, scenario_id, id).await;
        }
        self.load_services(conn, Tier::Base, &[id.0])
            .await?
            .remove(&id.0)
            .ok_or_else(|| UrbisError::not_found_by_id("service", id.0))
    }

    async fn current_object_geometry<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario_id: ScenarioId,
        id: ObjectGeometryId,
        is_scenario_object: bool,
    ) -> UrbisResult<ObjectGeometry> {
        if is_scenario_object {
            return self.owned_object_geometry(conn, scenario_id, id).await;
        }
        self.load_object_geometries(conn, Tier::Base, &[id.0])
            .await?
            .remove(&id.0)
            .ok_or_else(|| UrbisError::not_found_by_id("object geometry", id.0))
    }

    async fn insert_natives<C: ConnectionTrait>(
        &self,
        conn: &C,
        ctx: &ScenarioContext,
        objects: &[NewUrbanObject],
    ) -> UrbisResult<Vec<UrbanObjectView>> {
        let scenario_id = ctx.scenario_id();
        let now = Timestamp::now();
        let mut geometries = Vec::with_capacity(objects.len());
        for object in objects {
            geometries.push((None, self.prepare_object_geometry(ctx, &object.geometry, now)?));
        }
        let physical: Vec<(Option<i64>, PhysicalObject)> = objects
            .iter()
            .map(|object| (None, new_physical_object(&object.physical_object, now)))
            .collect();
        let physical = self
            .insert_local_physical_objects(conn, scenario_id, &physical)
            .await?;
        let geometries = self
            .insert_local_geometries(conn, scenario_id, &geometries)
            .await?;
        let service_rows: Vec<(Option<i64>, Service)> = objects
            .iter()
            .filter_map(|object| object.service.as_ref())
            .map(|service| (None, new_service(service, now)))
            .collect();
        let mut services = self
            .insert_local_services(conn, scenario_id, &service_rows)
            .await?
            .into_iter();

        let mut deltas = Vec::with_capacity(objects.len());
        for ((object, physical), geometry) in objects.iter().zip(physical).zip(geometries) {
            let service = match object.service {
                Some(_) => Some(
                    services
                        .next()
                        .ok_or_else(|| UrbisError::internal("service batch came back short"))?,
                ),
                None => None,
            };
            deltas.push((physical, geometry, service));
        }
        let links: Vec<(Option<UrbanObjectId>, LinkPointers)> = deltas
            .iter()
            .map(|(physical, geometry, service)| {
                (
                    None,
                    LinkPointers {
                        physical_object: Pointer::Local(physical.physical_object_id),
                        object_geometry: Pointer::Local(geometry.object_geometry_id),
                        service: service
                            .as_ref()
                            .map_or(Pointer::None, |s| Pointer::Local(s.service_id)),
                    },
                )
            })
            .collect();
        let link_ids = self.insert_links(conn, scenario_id, &links).await?;
        deltas
            .into_iter()
            .zip(link_ids)
            .map(|((physical, geometry, service), link_id)| {
                Resolved::<BaseUrbanObject, OverlayDelta>::Native(OverlayDelta {
                    link_id,
                    physical_object: Some(Tiered::local(physical)),
                    object_geometry: Some(Tiered::local(geometry)),
                    service: service.map(Tiered::local),
                })
                .materialize()
            })
            .collect()
    }
}

#[async_trait]
impl OverlayWriteApi for UrbisStore {
    async fn add_urban_object(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        input: NewUrbanObject,
    ) -> UrbisResult<UrbanObjectView> {
        let tx = self.conn.begin().await?;
        let ctx = self.write_context(&tx, scenario_id, actor).await?;
        self.check_object_input(&tx, &input).await?;
        let view = self
            .insert_natives(&tx, &ctx, std::slice::from_ref(&input))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| UrbisError::internal("urban object insert returned no row"))?;
        self.maybe_failpoint("add_urban_object")?;
        tx.commit().await?;
        self.publish(vec![ChangeEvent::scenario(
            scenario_id,
            ChangeKind::UrbanObject,
            view.urban_object_id.0,
        )])
        .await;
        Ok(view)
    }

    async fn add_existing_physical_object(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        input: ExistingPhysicalObject,
    ) -> UrbisResult<UrbanObjectView> {
        let tx = self.conn.begin().await?;
        let ctx = self.write_context(&tx, scenario_id, actor).await?;
        self.territory_exists(&tx, input.geometry.territory_id).await?;
        if let Some(service) = &input.service {
            self.service_type_exists(&tx, service.service_type_id).await?;
        }
        let physical_object = if input.is_scenario_object {
            let physical_object_id: PhysicalObjectId = self
                .current_id(
                    &tx,
                    scenario_id,
                    RowKind::PhysicalObject,
                    input.physical_object_id.0,
                )
                .await?;
            self.owned_physical_object(&tx, scenario_id, physical_object_id)
                .await?;
            Pointer::Local(physical_object_id)
        } else {
            self.current_physical_object(&tx, scenario_id, input.physical_object_id, false)
                .await?;
            Pointer::Base(input.physical_object_id)
        };
        let now = Timestamp::now();
        let geometry = self.prepare_object_geometry(&ctx, &input.geometry, now)?;
        let geometry = self
            .insert_local_geometry(&tx, scenario_id, None, geometry)
            .await?;
        let service = match &input.service {
            Some(service) => Pointer::Local(
                self.insert_local_service(&tx, scenario_id, None, new_service(service, now))
                    .await?
                    .service_id,
            ),
            None => Pointer::None,
        };
        let pointers = LinkPointers {
            physical_object,
            object_geometry: Pointer::Local(geometry.object_geometry_id),
            service,
        };
        let link_id = self
            .insert_links(&tx, scenario_id, &[(None, pointers)])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| UrbisError::internal("link insert returned no id"))?;
        let view = self
            .view_for_link(
                &tx,
                &OverlayLink {
                    link_id,
                    scenario_id,
                    base_urban_object_id: None,
                    pointers,
                },
            )
            .await?;
        self.maybe_failpoint("add_existing_physical_object")?;
        tx.commit().await?;
        self.publish(vec![ChangeEvent::scenario(
            scenario_id,
            ChangeKind::UrbanObject,
            link_id.0,
        )])
        .await;
        Ok(view)
    }

    async fn edit_urban_object(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        urban_object_id: UrbanObjectId,
        is_scenario_object: bool,
        edit: UrbanObjectEdit,
    ) -> UrbisResult<UrbanObjectView> {
        if edit.is_empty() {
            return Err(UrbisError::invalid("edit carries no payload"));
        }
        let tx = self.conn.begin().await?;
        let ctx = self.write_context(&tx, scenario_id, actor).await?;
        if let Some(physical) = &edit.physical_object {
            self.check_physical_input(&tx, physical).await?;
        }
        if let Some(geometry) = &edit.geometry {
            self.territory_exists(&tx, geometry.territory_id).await?;
        }
        if let Some(service) = &edit.service {
            self.service_type_exists(&tx, service.service_type_id).await?;
        }
        let now = Timestamp::now();
        let (link, mut pointers, base) = match self
            .locate_identity(&tx, &ctx, urban_object_id, is_scenario_object)
            .await?
        {
            Target::Base(base) => {
                transition(LinkState::Inherited, Transition::Promote, urban_object_id)?;
                let pointers = base_pointers(&base);
                (None, pointers, Some(base))
            }
            Target::Link(link) => {
                transition(LinkState::of(Some(link.shape()?)), Transition::Edit, urban_object_id)?;
                (Some(link), link.pointers, None)
            }
        };

        if let Some(input) = &edit.physical_object {
            match pointers.physical_object {
                Pointer::Local(id) => {
                    let current = self.owned_physical_object(&tx, scenario_id, id).await?;
                    let item = PhysicalObject {
                        physical_object_id: id,
                        created_at: current.created_at,
                        ..new_physical_object(input, now)
                    };
                    self.update_local_physical(&tx, &item).await?;
                }
                other => {
                    let public = match other {
                        Pointer::Base(id) => Some(id.0),
                        _ => None,
                    };
                    let item = self
                        .insert_local_physical(&tx, scenario_id, public, new_physical_object(input, now))
                        .await?;
                    pointers.physical_object = Pointer::Local(item.physical_object_id);
                }
            }
        }
        if let Some(input) = &edit.geometry {
            match pointers.object_geometry {
                Pointer::Local(id) => {
                    let current = self.owned_object_geometry(&tx, scenario_id, id).await?;
                    let item = ObjectGeometry {
                        object_geometry_id: id,
                        ..self.prepare_object_geometry(&ctx, input, current.created_at)?
                    };
                    self.update_local_geometry(&tx, &item).await?;
                }
                other => {
                    let public = match other {
                        Pointer::Base(id) => Some(id.0),
                        _ => None,
                    };
                    let prepared = self.prepare_object_geometry(&ctx, input, now)?;
                    let item = self
                        .insert_local_geometry(&tx, scenario_id, public, prepared)
                        .await?;
                    pointers.object_geometry = Pointer::Local(item.object_geometry_id);
                }
            }
        }
        if let Some(input) = &edit.service {
            match pointers.service {
                Pointer::Local(id) => {
                    let current = self.owned_service(&tx, scenario_id, id).await?;
                    let item = Service {
                        service_id: id,
                        created_at: current.created_at,
                        ..new_service(input, now)
                    };
                    self.update_local_service(&tx, &item).await?;
                }
                other => {
                    let public = match other {
                        Pointer::Base(id) => Some(id.0),
                        _ => None,
                    };
                    let item = self
                        .insert_local_service(&tx, scenario_id, public, new_service(input, now))
                        .await?;
                    pointers.service = Pointer::Local(item.service_id);
                }
            }
        }

        let link = match (link, base) {
            (Some(mut link), _) => {
                if link.pointers != pointers {
                    self.update_link_pointers(&tx, link.link_id, &pointers).await?;
                    link.pointers = pointers;
                }
                link
            }
            (None, Some(base)) => self.promote(&tx, scenario_id, &base, pointers).await?,
            (None, None) => {
                return Err(UrbisError::internal("edit target vanished"));
            }
        };
        let view = self.view_for_link(&tx, &link).await?;
        self.maybe_failpoint("edit_urban_object")?;
        tx.commit().await?;
        self.publish(vec![ChangeEvent::scenario(
            scenario_id,
            ChangeKind::UrbanObject,
            link.link_id.0,
        )])
        .await;
        Ok(view)
    }

    async fn put_physical_object(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        physical_object_id: PhysicalObjectId,
        is_scenario_object: bool,
        input: PhysicalObjectInput,
    ) -> UrbisResult<PhysicalObjectRecord> {
        let tx = self.conn.begin().await?;
        let ctx = self.write_context(&tx, scenario_id, actor).await?;
        let physical_object_id = if is_scenario_object {
            self.current_id(&tx, scenario_id, RowKind::PhysicalObject, physical_object_id.0)
                .await?
        } else {
            physical_object_id
        };
        let (record, _) = self
            .write_physical_object(&tx, &ctx, physical_object_id, is_scenario_object, input)
            .await?;
        self.maybe_failpoint("put_physical_object")?;
        tx.commit().await?;
        self.publish(vec![ChangeEvent::scenario(
            scenario_id,
            ChangeKind::PhysicalObject,
            record.physical_object.physical_object_id.0,
        )])
        .await;
        Ok(record)
    }

    async fn patch_physical_object(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        physical_object_id: PhysicalObjectId,
        is_scenario_object: bool,
        patch: PhysicalObjectPatch,
    ) -> UrbisResult<PhysicalObjectRecord> {
        let tx = self.conn.begin().await?;
        let ctx = self.write_context(&tx, scenario_id, actor).await?;
        let physical_object_id = if is_scenario_object {
            self.current_id(&tx, scenario_id, RowKind::PhysicalObject, physical_object_id.0)
                .await?
        } else {
            physical_object_id
        };
        let current = self
            .current_physical_object(&tx, scenario_id, physical_object_id, is_scenario_object)
            .await?;
        let input = PhysicalObjectInput {
            physical_object_type_id: patch
                .physical_object_type_id
                .unwrap_or(current.physical_object_type_id),
            name: patch.name.or(current.name),
            properties: patch.properties.unwrap_or(current.properties),
        };
        let (record, _) = self
            .write_physical_object(&tx, &ctx, physical_object_id, is_scenario_object, input)
            .await?;
        self.maybe_failpoint("patch_physical_object")?;
        tx.commit().await?;
        self.publish(vec![ChangeEvent::scenario(
            scenario_id,
            ChangeKind::PhysicalObject,
            record.physical_object.physical_object_id.0,
        )])
        .await;
        Ok(record)
    }

    async fn put_service(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        service_id: ServiceId,
        is_scenario_object: bool,
        input: ServiceInput,
    ) -> UrbisResult<ServiceRecord> {
        let tx = self.conn.begin().await?;
        let ctx = self.write_context(&tx, scenario_id, actor).await?;
        let service_id = if is_scenario_object {
            self.current_id(&tx, scenario_id, RowKind::Service, service_id.0)
                .await?
        } else {
            service_id
        };
        let (record, _) = self
            .write_service(&tx, &ctx, service_id, is_scenario_object, input)
            .await?;
        self.maybe_failpoint("put_service")?;
        tx.commit().await?;
        self.publish(vec![ChangeEvent::scenario(
            scenario_id,
            ChangeKind::Service,
            record.service.service_id.0,
        )])
        .await;
        Ok(record)
    }

    async fn patch_service(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        service_id: ServiceId,
        is_scenario_object: bool,
        patch: ServicePatch,
    ) -> UrbisResult<ServiceRecord> {
        let tx = self.conn.begin().await?;
        let ctx = self.write_context(&tx, scenario_id, actor).await?;
        let service_id = if is_scenario_object {
            self.current_id(&tx, scenario_id, RowKind::Service, service_id.0)
                .await?
        } else {
            service_id
        };
        let current = self
            .current_service(&tx, scenario_id, service_id, is_scenario_object)
            .await?;
        let input = ServiceInput {
            service_type_id: patch.service_type_id.unwrap_or(current.service_type_id),
            name: patch.name.or(current.name),
            capacity: patch.capacity.or(current.capacity),
            properties: patch.properties.unwrap_or(current.properties),
        };
        let (record, _) = self
            .write_service(&tx, &ctx, service_id, is_scenario_object, input)
            .await?;
        self.maybe_failpoint("patch_service")?;
        tx.commit().await?;
        self.publish(vec![ChangeEvent::scenario(
            scenario_id,
            ChangeKind::Service,
            record.service.service_id.0,
        )])
        .await;
        Ok(record)
    }

    async fn put_object_geometry(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        object_geometry_id: ObjectGeometryId,
        is_scenario_object: bool,
        input: ObjectGeometryInput,
    ) -> UrbisResult<GeometryRecord> {
        let tx = self.conn.begin().await?;
        let ctx = self.write_context(&tx, scenario_id, actor).await?;
        let object_geometry_id = if is_scenario_object {
            self.current_id(&tx, scenario_id, RowKind::ObjectGeometry, object_geometry_id.0)
                .await?
        } else {
            object_geometry_id
        };
        let (record, _) = self
            .write_object_geometry(&tx, &ctx, object_geometry_id, is_scenario_object, input)
            .await?;
        self.maybe_failpoint("put_object_geometry")?;
        tx.commit().await?;
        self.publish(vec![ChangeEvent::scenario(
            scenario_id,
            ChangeKind::ObjectGeometry,
            record.object_geometry.object_geometry_id.0,
        )])
        .await;
        Ok(record)
    }

    async fn patch_object_geometry(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        object_geometry_id: ObjectGeometryId,
        is_scenario_object: bool,
        patch: ObjectGeometryPatch,
    ) -> UrbisResult<GeometryRecord> {
        let tx = self.conn.begin().await?;
        let ctx = self.write_context(&tx, scenario_id, actor).await?;
        let object_geometry_id = if is_scenario_object {
            self.current_id(&tx, scenario_id, RowKind::ObjectGeometry, object_geometry_id.0)
                .await?
        } else {
            object_geometry_id
        };
        let current = self
            .current_object_geometry(&tx, scenario_id, object_geometry_id, is_scenario_object)
            .await?;
        // a new shape gets a fresh centroid unless one is supplied with it
        let centre_point = match (&patch.geometry, patch.centre_point) {
            (_, Some(centre)) => Some(centre),
            (Some(_), None) => None,
            (None, None) => Some(current.centre_point),
        };
        let input = ObjectGeometryInput {
            territory_id: patch.territory_id.unwrap_or(current.territory_id),
            geometry: patch.geometry.unwrap_or(current.geometry),
            centre_point,
            address: patch.address.or(current.address),
            non_clippable: patch.non_clippable,
        };
        let (record, _) = self
            .write_object_geometry(&tx, &ctx, object_geometry_id, is_scenario_object, input)
            .await?;
        self.maybe_failpoint("patch_object_geometry")?;
        tx.commit().await?;
        self.publish(vec![ChangeEvent::scenario(
            scenario_id,
            ChangeKind::ObjectGeometry,
            record.object_geometry.object_geometry_id.0,
        )])
        .await;
        Ok(record)
    }

    async fn delete_urban_object(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        urban_object_id: UrbanObjectId,
        is_scenario_object: bool,
    ) -> UrbisResult<()> {
        let tx = self.conn.begin().await?;
        let ctx = self.write_context(&tx, scenario_id, actor).await?;
        match self
            .locate_identity(&tx, &ctx, urban_object_id, is_scenario_object)
            .await?
        {
            Target::Base(base) => {
                transition(LinkState::Inherited, Transition::Hide, urban_object_id)?;
                self.claim_base_object(
                    &tx,
                    scenario_id,
                    base.urban_object_id,
                    LinkPointers::tombstone(),
                )
                .await?;
            }
            Target::Link(link) => {
                // an overridden identity is released back to its base row
                let next = transition(
                    LinkState::of(Some(link.shape()?)),
                    Transition::Delete,
                    urban_object_id,
                )?;
                log::debug!(
                    "scenario {scenario_id}: urban object {urban_object_id} -> {next:?}"
                );
                self.delete_links(&tx, &[link.link_id]).await?;
                self.delete_orphan_sub_objects(&tx, scenario_id).await?;
            }
        }
        self.maybe_failpoint("delete_urban_object")?;
        tx.commit().await?;
        self.publish(vec![ChangeEvent::scenario(
            scenario_id,
            ChangeKind::UrbanObject,
            urban_object_id.0,
        )])
        .await;
        Ok(())
    }

    async fn restore_urban_object(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        base_urban_object_id: UrbanObjectId,
    ) -> UrbisResult<()> {
        let tx = self.conn.begin().await?;
        self.write_context(&tx, scenario_id, actor).await?;
        let link = self
            .link_for_base(&tx, scenario_id, base_urban_object_id)
            .await?
            .filter(|link| matches!(link.shape(), Ok(LinkShape::Tombstone(_))))
            .ok_or_else(|| {
                UrbisError::not_found_by_params(
                    "tombstone",
                    format!("scenario {scenario_id}, urban object {base_urban_object_id}"),
                )
            })?;
        transition(LinkState::Hidden, Transition::Restore, base_urban_object_id)?;
        self.delete_links(&tx, &[link.link_id]).await?;
        self.maybe_failpoint("restore_urban_object")?;
        tx.commit().await?;
        self.publish(vec![ChangeEvent::scenario(
            scenario_id,
            ChangeKind::UrbanObject,
            base_urban_object_id.0,
        )])
        .await;
        Ok(())
    }

    async fn delete_physical_object(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        physical_object_id: PhysicalObjectId,
        is_scenario_object: bool,
    ) -> UrbisResult<()> {
        let tx = self.conn.begin().await?;
        let ctx = self.write_context(&tx, scenario_id, actor).await?;
        self.remove_sub_object(
            &tx,
            &ctx,
            Slot::PhysicalObject,
            physical_object_id.0,
            is_scenario_object,
        )
        .await?;
        self.maybe_failpoint("delete_physical_object")?;
        tx.commit().await?;
        self.publish(vec![ChangeEvent::scenario(
            scenario_id,
            ChangeKind::PhysicalObject,
            physical_object_id.0,
        )])
        .await;
        Ok(())
    }

    async fn delete_service(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        service_id: ServiceId,
        is_scenario_object: bool,
    ) -> UrbisResult<()> {
        let tx = self.conn.begin().await?;
        let ctx = self.write_context(&tx, scenario_id, actor).await?;
        self.remove_sub_object(&tx, &ctx, Slot::Service, service_id.0, is_scenario_object)
            .await?;
        self.maybe_failpoint("delete_service")?;
        tx.commit().await?;
        self.publish(vec![ChangeEvent::scenario(
            scenario_id,
            ChangeKind::Service,
            service_id.0,
        )])
        .await;
        Ok(())
    }

    async fn delete_object_geometry(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        object_geometry_id: ObjectGeometryId,
        is_scenario_object: bool,
    ) -> UrbisResult<()> {
        let tx = self.conn.begin().await?;
        let ctx = self.write_context(&tx, scenario_id, actor).await?;
        self.remove_sub_object(
            &tx,
            &ctx,
            Slot::ObjectGeometry,
            object_geometry_id.0,
            is_scenario_object,
        )
        .await?;
        self.maybe_failpoint("delete_object_geometry")?;
        tx.commit().await?;
        self.publish(vec![ChangeEvent::scenario(
            scenario_id,
            ChangeKind::ObjectGeometry,
            object_geometry_id.0,
        )])
        .await;
        Ok(())
    }

    async fn replace_objects_by_function(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        function_id: PhysicalObjectFunctionId,
        objects: Vec<NewUrbanObject>,
    ) -> UrbisResult<Vec<UrbanObjectView>> {
        let tx = self.conn.begin().await?;
        let ctx = self.write_context(&tx, scenario_id, actor).await?;
        let function = Query::select()
            .from(PhysicalObjectFunctions::Table)
            .column(PhysicalObjectFunctions::FunctionId)
            .and_where(Expr::col(PhysicalObjectFunctions::FunctionId).eq(function_id.0))
            .to_owned();
        if query_one(&tx, &function).await?.is_none() {
            return Err(UrbisError::not_found_by_id(
                "physical object function",
                function_id.0,
            ));
        }
        let functions = self.type_functions(&tx).await?;
        let mut checked_territories = BTreeSet::new();
        for object in &objects {
            let type_id = object.physical_object.physical_object_type_id;
            match functions.get(&type_id) {
                None => {
                    return Err(UrbisError::not_found_by_id("physical object type", type_id.0));
                }
                Some(found) if *found != function_id => {
                    return Err(UrbisError::invalid_with_code(
                        INVALID_VALUE,
                        format!(
                            "physical object type {type_id} belongs to function {found}, not {function_id}"
                        ),
                    ));
                }
                Some(_) => {}
            }
            if checked_territories.insert(object.geometry.territory_id) {
                self.territory_exists(&tx, object.geometry.territory_id)
                    .await?;
            }
            if let Some(service) = &object.service {
                self.service_type_exists(&tx, service.service_type_id).await?;
            }
        }

        let (views, _) = self
            .collect_views(&tx, &ctx, &ResolveQuery::new())
            .await?;
        let mut tombstones = Vec::new();
        let mut hidden_links = Vec::new();
        let mut removed_links = Vec::new();
        for view in views.iter().filter(|view| {
            functions.get(&view.physical_object.item.physical_object_type_id) == Some(&function_id)
        }) {
            match (view.origin, view.base_urban_object_id) {
                (Origin::Base, _) => {
                    tombstones.push((Some(view.urban_object_id), LinkPointers::tombstone()))
                }
                (Origin::Scenario, Some(_)) => hidden_links.push(view.urban_object_id),
                (Origin::Scenario, None) => removed_links.push(view.urban_object_id),
            }
        }
        self.insert_links(&tx, scenario_id, &tombstones).await?;
        for link_id in &hidden_links {
            self.update_link_pointers(&tx, *link_id, &LinkPointers::tombstone())
                .await?;
        }
        self.drop_link_buffers(&tx, &hidden_links).await?;
        self.delete_links(&tx, &removed_links).await?;
        self.delete_orphan_sub_objects(&tx, scenario_id).await?;
        log::debug!(
            "scenario {scenario_id}: function {function_id} replaced, {} hidden, {} overrides hidden, {} natives removed, {} added",
            tombstones.len(),
            hidden_links.len(),
            removed_links.len(),
            objects.len()
        );

        let created = self.insert_natives(&tx, &ctx, &objects).await?;
        self.maybe_failpoint("replace_objects_by_function")?;
        tx.commit().await?;
        let mut events: HashMap<i64, ChangeEvent> = HashMap::new();
        for id in tombstones
            .iter()
            .filter_map(|(base, _)| *base)
            .chain(hidden_links.iter().copied())
            .chain(removed_links.iter().copied())
            .chain(created.iter().map(|view| view.urban_object_id))
        {
            events.insert(
                id.0,
                ChangeEvent::scenario(scenario_id, ChangeKind::UrbanObject, id.0),
            );
        }
        let mut events: Vec<ChangeEvent> = events.into_values().collect();
        events.sort_by_key(|event| event.entity_id);
        self.publish(events).await;
        Ok(created)
    }
}
