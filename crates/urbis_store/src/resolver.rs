use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use geo::{BooleanOps, MultiPolygon};
use sea_orm::ConnectionTrait;
use sea_orm::sea_query::{Expr, ExprTrait, Query};

use crate::db::*;
use crate::store::{
    ScenarioContext, Tier, UrbisStore, base_object_select, col_name, query_all, read_base_object,
    read_geometry,
};
use crate::territory::Reach;
use urbis_core::access::Access;
use urbis_core::geometry::{clip_to, intersects, to_multi_polygon};
use urbis_core::*;

type FunctionMap = HashMap<PhysicalObjectTypeId, PhysicalObjectFunctionId>;

struct ContextArea {
    territories: HashSet<TerritoryId>,
    boundary: MultiPolygon<f64>,
}

impl ContextArea {
    fn cut(&self, territory_id: Option<TerritoryId>, geometry: &Geometry) -> UrbisResult<Option<Geometry>> {
        let in_territory = territory_id.is_some_and(|id| self.territories.contains(&id));
        if !in_territory && !intersects(geometry, &self.boundary) {
            return Ok(None);
        }
        let clipped = clip_to(geometry, &self.boundary)?;
        if clipped.geometry.is_empty() {
            Ok(None)
        } else {
            Ok(Some(clipped.geometry))
        }
    }

    fn cut_object_geometry(&self, geometry: &mut ObjectGeometry) -> UrbisResult<bool> {
        match self.cut(Some(geometry.territory_id), &geometry.geometry)? {
            Some(clipped) => {
                if let Some(centre) = clipped.centroid() {
                    geometry.centre_point = centre;
                }
                geometry.geometry = clipped;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl UrbisStore {
    pub(crate) async fn load_base_objects<C: ConnectionTrait>(
        &self,
        conn: &C,
        ids: &[UrbanObjectId],
    ) -> UrbisResult<HashMap<UrbanObjectId, BaseUrbanObject>> {
        let raw: Vec<i64> = ids.iter().map(|id| id.0).collect();
        let mut found = HashMap::new();
        for chunk in raw.chunks(self.limits.max_in_params) {
            let select = base_object_select()
                .and_where(
                    Expr::col((UrbanObjects::Table, UrbanObjects::UrbanObjectId))
                        .is_in(chunk.iter().copied()),
                )
                .to_owned();
            for row in query_all(conn, &select).await? {
                let object = read_base_object(&row)?;
                found.insert(object.urban_object_id, object);
            }
        }
        Ok(found)
    }

    pub(crate) async fn base_objects_containing<C: ConnectionTrait>(
        &self,
        conn: &C,
        column: UrbanObjects,
        id: i64,
    ) -> UrbisResult<Vec<BaseUrbanObject>> {
        let select = base_object_select()
            .and_where(Expr::col((UrbanObjects::Table, column)).eq(id))
            .to_owned();
        query_all(conn, &select)
            .await?
            .iter()
            .map(read_base_object)
            .collect()
    }

    pub(crate) async fn materialize_links<C: ConnectionTrait>(
        &self,
        conn: &C,
        links: &[OverlayLink],
    ) -> UrbisResult<Vec<UrbanObjectView>> {
        let mut live = Vec::with_capacity(links.len());
        for link in links {
            let shape = link.shape()?;
            if !matches!(shape, LinkShape::Tombstone(_)) {
                live.push((link, shape));
            }
        }

        let mut ids: HashMap<(Tier, u8), Vec<i64>> = HashMap::new();
        let mut base_ids = Vec::new();
        for (link, shape) in &live {
            collect_pointer(&mut ids, 0, link.pointers.physical_object);
            collect_pointer(&mut ids, 1, link.pointers.object_geometry);
            collect_pointer(&mut ids, 2, link.pointers.service);
            if let Some(base) = shape.base() {
                base_ids.push(base);
            }
        }
        let ids_of = |tier: Tier, slot: u8| ids.get(&(tier, slot)).cloned().unwrap_or_default();
        let base_physical = self
            .load_physical_objects(conn, Tier::Base, &ids_of(Tier::Base, 0))
            .await?;
        let local_physical = self
            .load_physical_objects(conn, Tier::Scenario, &ids_of(Tier::Scenario, 0))
            .await?;
        let base_geometries = self
            .load_object_geometries(conn, Tier::Base, &ids_of(Tier::Base, 1))
            .await?;
        let local_geometries = self
            .load_object_geometries(conn, Tier::Scenario, &ids_of(Tier::Scenario, 1))
            .await?;
        let base_services = self
            .load_services(conn, Tier::Base, &ids_of(Tier::Base, 2))
            .await?;
        let local_services = self
            .load_services(conn, Tier::Scenario, &ids_of(Tier::Scenario, 2))
            .await?;
        let mut bases = self.load_base_objects(conn, &base_ids).await?;

        let mut views = Vec::with_capacity(live.len());
        for (link, shape) in live {
            let delta = OverlayDelta {
                link_id: link.link_id,
                physical_object: pick(
                    link.pointers.physical_object,
                    &base_physical,
                    &local_physical,
                    "physical object",
                )?,
                object_geometry: pick(
                    link.pointers.object_geometry,
                    &base_geometries,
                    &local_geometries,
                    "object geometry",
                )?,
                service: pick(link.pointers.service, &base_services, &local_services, "service")?,
            };
            let resolved = match shape.base() {
                None => Resolved::Native(delta),
                Some(base_id) => {
                    let base = bases.remove(&base_id).ok_or_else(|| {
                        log::error!(
                            "scenario {} links missing base urban object {base_id}",
                            link.scenario_id
                        );
                        UrbisError::internal(format!("base urban object {base_id} not found"))
                    })?;
                    Resolved::Overridden { base, delta }
                }
            };
            views.push(resolved.materialize()?);
        }
        Ok(views)
    }

    pub(crate) async fn view_for_link<C: ConnectionTrait>(
        &self,
        conn: &C,
        link: &OverlayLink,
    ) -> UrbisResult<UrbanObjectView> {
        self.materialize_links(conn, std::slice::from_ref(link))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| UrbisError::not_found_by_id("scenario urban object", link.link_id.0))
    }

    pub(crate) async fn base_views<C: ConnectionTrait>(
        &self,
        conn: &C,
        territories: &[TerritoryId],
        keep: impl Fn(&BaseUrbanObject) -> bool,
        excluded: &HashSet<UrbanObjectId>,
        query: &ResolveQuery,
    ) -> UrbisResult<Vec<UrbanObjectView>> {
        let raw: Vec<i64> = territories.iter().map(|id| id.0).collect();
        let mut views = Vec::new();
        for chunk in raw.chunks(self.limits.max_in_params.saturating_sub(8).max(1)) {
            let mut select = base_object_select();
            select.and_where(
                Expr::col((ObjectGeometries::Table, ObjectGeometries::TerritoryId))
                    .is_in(chunk.iter().copied()),
            );
            push_down(&mut select, query);
            for row in query_all(conn, &select).await? {
                let object = read_base_object(&row)?;
                if excluded.contains(&object.urban_object_id) || !keep(&object) {
                    continue;
                }
                views.push(Resolved::Base(object).materialize()?);
            }
        }
        Ok(views)
    }

    pub(crate) async fn collect_views<C: ConnectionTrait>(
        &self,
        conn: &C,
        ctx: &ScenarioContext,
        query: &ResolveQuery,
    ) -> UrbisResult<(Vec<UrbanObjectView>, FunctionMap)> {
        let links = self.load_links(conn, ctx.source).await?;
        let excluded: HashSet<UrbanObjectId> =
            links.iter().filter_map(|link| link.base_urban_object_id).collect();
        let reach: Reach = self.reach(conn, ctx, query.cities_only).await?;
        let mut views = self
            .base_views(
                conn,
                &reach.territories,
                |object| reach.admits(&object.object_geometry),
                &excluded,
                query,
            )
            .await?;
        let base_count = views.len();
        let scenario_views = self.materialize_links(conn, &links).await?;
        log::debug!(
            "scenario {} (source {}): {base_count} base rows, {} scenario rows",
            ctx.scenario_id(),
            ctx.source,
            scenario_views.len()
        );
        views.extend(scenario_views);
        let functions = self.type_functions(conn).await?;
        views.retain(|view| prefilter(view, query, &functions));
        Ok((views, functions))
    }

    async fn buffers_for_views<C: ConnectionTrait>(
        &self,
        conn: &C,
        views: &[UrbanObjectView],
    ) -> UrbisResult<Vec<BufferRecord>> {
        let base_ids: Vec<i64> = views
            .iter()
            .filter(|view| view.origin == Origin::Base)
            .map(|view| view.urban_object_id.0)
            .collect();
        let link_ids: Vec<i64> = views
            .iter()
            .filter(|view| view.origin == Origin::Scenario)
            .map(|view| view.urban_object_id.0)
            .collect();
        let mut records = Vec::new();
        for chunk in base_ids.chunks(self.limits.max_in_params) {
            let select = Query::select()
                .from(Buffers::Table)
                .columns([
                    Buffers::BufferTypeId,
                    Buffers::UrbanObjectId,
                    Buffers::Geometry,
                    Buffers::IsCustom,
                ])
                .and_where(Expr::col(Buffers::UrbanObjectId).is_in(chunk.iter().copied()))
                .to_owned();
            for row in query_all(conn, &select).await? {
                records.push(BufferRecord {
                    buffer: Buffer {
                        buffer_type_id: BufferTypeId(
                            row.try_get("", &col_name(Buffers::BufferTypeId))?,
                        ),
                        urban_object_id: UrbanObjectId(
                            row.try_get("", &col_name(Buffers::UrbanObjectId))?,
                        ),
                        geometry: read_geometry(&row, &col_name(Buffers::Geometry))?,
                        is_custom: row.try_get("", &col_name(Buffers::IsCustom))?,
                        is_cut: false,
                    },
                    is_scenario_object: false,
                    origin: Origin::Base,
                });
            }
        }
        for chunk in link_ids.chunks(self.limits.max_in_params) {
            records.extend(self.scenario_buffers(conn, chunk).await?);
        }
        Ok(records)
    }

    pub(crate) async fn scenario_buffers<C: ConnectionTrait>(
        &self,
        conn: &C,
        link_ids: &[i64],
    ) -> UrbisResult<Vec<BufferRecord>> {
        let select = Query::select()
            .from(ScenarioBuffers::Table)
            .columns([
                ScenarioBuffers::BufferTypeId,
                ScenarioBuffers::UrbanObjectId,
                ScenarioBuffers::Geometry,
                ScenarioBuffers::IsCustom,
                ScenarioBuffers::IsCut,
            ])
            .and_where(Expr::col(ScenarioBuffers::UrbanObjectId).is_in(link_ids.iter().copied()))
            .to_owned();
        query_all(conn, &select)
            .await?
            .iter()
            .map(|row| {
                Ok(BufferRecord {
                    buffer: Buffer {
                        buffer_type_id: BufferTypeId(
                            row.try_get("", &col_name(ScenarioBuffers::BufferTypeId))?,
                        ),
                        urban_object_id: UrbanObjectId(
                            row.try_get("", &col_name(ScenarioBuffers::UrbanObjectId))?,
                        ),
                        geometry: read_geometry(row, &col_name(ScenarioBuffers::Geometry))?,
                        is_custom: row.try_get("", &col_name(ScenarioBuffers::IsCustom))?,
                        is_cut: row.try_get("", &col_name(ScenarioBuffers::IsCut))?,
                    },
                    is_scenario_object: true,
                    origin: Origin::Scenario,
                })
            })
            .collect()
    }

    async fn read_context(
        &self,
        scenario_id: ScenarioId,
        actor: Option<&Actor>,
    ) -> UrbisResult<ScenarioContext> {
        self.load_context(&self.conn, scenario_id, actor, Access::Read)
            .await
    }

    async fn resolve_kind(
        &self,
        ctx: &ScenarioContext,
        kind: ResolveKind,
        query: &ResolveQuery,
    ) -> UrbisResult<Vec<ResolvedRecord>> {
        let conn = &self.conn;
        let records = match kind {
            ResolveKind::FunctionalZone => {
                ctx.require_project_scenario()?;
                let zones = self.load_scenario_functional_zones(conn, ctx.source).await?;
                let records = zones
                    .into_iter()
                    .map(|functional_zone| FunctionalZoneRecord {
                        functional_zone,
                        is_scenario_object: true,
                        origin: Origin::Scenario,
                    })
                    .collect();
                query
                    .apply(records)
                    .into_iter()
                    .map(ResolvedRecord::FunctionalZone)
                    .collect()
            }
            ResolveKind::IndicatorValue => {
                let values = self
                    .load_scenario_indicator_values(conn, ctx.source, None)
                    .await?;
                let records = values
                    .into_iter()
                    .map(|value| IndicatorValueRecord {
                        value,
                        origin: Origin::Scenario,
                    })
                    .collect();
                query
                    .apply(records)
                    .into_iter()
                    .map(ResolvedRecord::IndicatorValue)
                    .collect()
            }
            _ => {
                let (views, functions) = self.collect_views(conn, ctx, query).await?;
                self.project(conn, kind, &views, &functions, query).await?
            }
        };
        Ok(records)
    }

    async fn project<C: ConnectionTrait>(
        &self,
        conn: &C,
        kind: ResolveKind,
        views: &[UrbanObjectView],
        functions: &FunctionMap,
        query: &ResolveQuery,
    ) -> UrbisResult<Vec<ResolvedRecord>> {
        let records = match kind {
            ResolveKind::PhysicalObject => query
                .apply(project_physical_objects(views, functions))
                .into_iter()
                .map(ResolvedRecord::PhysicalObject)
                .collect(),
            ResolveKind::PhysicalObjectWithGeometry => query
                .apply(project_physical_objects_with_geometry(views, functions))
                .into_iter()
                .map(ResolvedRecord::PhysicalObjectWithGeometry)
                .collect(),
            ResolveKind::Service => query
                .apply(project_services(views))
                .into_iter()
                .map(ResolvedRecord::Service)
                .collect(),
            ResolveKind::ServiceWithGeometry => query
                .apply(project_services_with_geometry(views))
                .into_iter()
                .map(ResolvedRecord::ServiceWithGeometry)
                .collect(),
            ResolveKind::Geometry => query
                .apply(project_geometries(views))
                .into_iter()
                .map(ResolvedRecord::Geometry)
                .collect(),
            ResolveKind::Buffer => query
                .apply(self.buffers_for_views(conn, views).await?)
                .into_iter()
                .map(ResolvedRecord::Buffer)
                .collect(),
            ResolveKind::FunctionalZone | ResolveKind::IndicatorValue => {
                return Err(UrbisError::internal(format!(
                    "{kind:?} records are not projected from urban objects"
                )));
            }
        };
        Ok(records)
    }

    async fn context_area<C: ConnectionTrait>(
        &self,
        conn: &C,
        ctx: &ScenarioContext,
        query: &ContextQuery,
    ) -> UrbisResult<ContextArea> {
        let tree = self.territory_tree(conn).await?;
        let mut territories = HashSet::new();
        for root in &ctx.project.context_territories {
            territories.extend(tree.subtree(*root, query.query.cities_only));
        }
        let boundary = match &query.boundary {
            Some(boundary) => {
                boundary.validate(urbis_core::geometry::KindRule::Only(GeometryKind::Area))?;
                to_multi_polygon(boundary)
            }
            None => {
                let shapes = self
                    .load_territories(conn, &ctx.project.context_territories)
                    .await?;
                shapes
                    .iter()
                    .map(|territory| to_multi_polygon(&territory.geometry))
                    .fold(MultiPolygon::new(Vec::new()), |acc, shape| acc.union(&shape))
            }
        };
        Ok(ContextArea {
            territories,
            boundary,
        })
    }

    pub(crate) async fn regional_based_scenario<C: ConnectionTrait>(
        &self,
        conn: &C,
        region_id: TerritoryId,
    ) -> UrbisResult<Option<ScenarioId>> {
        let select = Query::select()
            .from(Scenarios::Table)
            .column((Scenarios::Table, Scenarios::ScenarioId))
            .inner_join(
                Projects::Table,
                Expr::col((Projects::Table, Projects::ProjectId))
                    .equals((Scenarios::Table, Scenarios::ProjectId)),
            )
            .and_where(Expr::col((Projects::Table, Projects::RegionId)).eq(region_id.0))
            .and_where(Expr::col((Projects::Table, Projects::IsRegional)).eq(true))
            .and_where(Expr::col((Scenarios::Table, Scenarios::IsBased)).eq(true))
            .order_by((Scenarios::Table, Scenarios::ScenarioId), sea_orm::sea_query::Order::Asc)
            .to_owned();
        match crate::store::query_one(conn, &select).await? {
            Some(row) => Ok(Some(ScenarioId(
                row.try_get("", &col_name(Scenarios::ScenarioId))?,
            ))),
            None => Ok(None),
        }
    }

    async fn resolve_context_kind(
        &self,
        ctx: &ScenarioContext,
        kind: ResolveKind,
        query: &ContextQuery,
    ) -> UrbisResult<Vec<ResolvedRecord>> {
        if ctx.is_regional() {
            return Err(UrbisError::NotAllowedInRegionalProject);
        }
        let conn = &self.conn;
        let area = self.context_area(conn, ctx, query).await?;
        let filter = &query.query;
        match kind {
            ResolveKind::IndicatorValue => Err(UrbisError::invalid(
                "indicator values have no context view",
            )),
            ResolveKind::FunctionalZone => {
                let tree = self.territory_tree(conn).await?;
                let region = tree.subtree(ctx.project.region_id, false);
                let zones = self.base_functional_zones(conn, &region).await?;
                let mut records = Vec::new();
                for mut zone in zones {
                    if let Some(clipped) = area.cut(zone.territory_id, &zone.geometry)? {
                        zone.geometry = clipped;
                        records.push(FunctionalZoneRecord {
                            functional_zone: zone,
                            is_scenario_object: false,
                            origin: Origin::Base,
                        });
                    }
                }
                Ok(filter
                    .apply(records)
                    .into_iter()
                    .map(ResolvedRecord::FunctionalZone)
                    .collect())
            }
            _ => {
                let source = self
                    .regional_based_scenario(conn, ctx.project.region_id)
                    .await?;
                let links = match source {
                    Some(source) => self.load_links(conn, source).await?,
                    None => Vec::new(),
                };
                let excluded: HashSet<UrbanObjectId> =
                    links.iter().filter_map(|link| link.base_urban_object_id).collect();
                let tree = self.territory_tree(conn).await?;
                let region = tree.subtree(ctx.project.region_id, filter.cities_only);
                let mut views = self
                    .base_views(conn, &region, |_| true, &excluded, filter)
                    .await?;
                views.extend(self.materialize_links(conn, &links).await?);
                let mut kept = Vec::with_capacity(views.len());
                for mut view in views {
                    if area.cut_object_geometry(&mut view.object_geometry.item)? {
                        kept.push(view);
                    }
                }
                let functions = self.type_functions(conn).await?;
                kept.retain(|view| prefilter(view, filter, &functions));
                log::debug!(
                    "context of scenario {}: {} rows around the project",
                    ctx.scenario_id(),
                    kept.len()
                );
                let mut records = self.project(conn, kind, &kept, &functions, filter).await?;
                if kind == ResolveKind::Buffer {
                    let mut cut = Vec::with_capacity(records.len());
                    for record in records {
                        if let ResolvedRecord::Buffer(mut buffer) = record {
                            if let Some(clipped) = area.cut(None, &buffer.buffer.geometry)? {
                                buffer.buffer.geometry = clipped;
                                cut.push(ResolvedRecord::Buffer(buffer));
                            }
                        }
                    }
                    records = cut;
                }
                Ok(records)
            }
        }
    }

    pub(crate) async fn base_functional_zones<C: ConnectionTrait>(
        &self,
        conn: &C,
        territories: &[TerritoryId],
    ) -> UrbisResult<Vec<FunctionalZone>> {
        let raw: Vec<i64> = territories.iter().map(|id| id.0).collect();
        let mut zones = Vec::new();
        for chunk in raw.chunks(self.limits.max_in_params) {
            let select = Query::select()
                .from(FunctionalZones::Table)
                .columns(crate::store::ZONE_COLUMNS)
                .and_where(Expr::col(FunctionalZones::TerritoryId).is_in(chunk.iter().copied()))
                .to_owned();
            for row in query_all(conn, &select).await? {
                zones.push(crate::store::read_functional_zone(&row)?);
            }
        }
        Ok(zones)
    }
}

fn collect_pointer<I: Into<i64>>(
    ids: &mut HashMap<(Tier, u8), Vec<i64>>,
    slot: u8,
    pointer: Pointer<I>,
) {
    match pointer {
        Pointer::Base(id) => ids.entry((Tier::Base, slot)).or_default().push(id.into()),
        Pointer::Local(id) => ids.entry((Tier::Scenario, slot)).or_default().push(id.into()),
        Pointer::None => {}
    }
}

fn pick<I: Copy + Into<i64>, T: Clone>(
    pointer: Pointer<I>,
    base: &HashMap<i64, T>,
    local: &HashMap<i64, T>,
    entity: &'static str,
) -> UrbisResult<Option<Tiered<T>>> {
    let missing = |tier: &str, id: i64| {
        log::error!("scenario link points at missing {tier} {entity} {id}");
        UrbisError::internal(format!("{tier} {entity} {id} not found"))
    };
    match pointer {
        Pointer::Base(id) => {
            let id = id.into();
            base.get(&id)
                .cloned()
                .map(|item| Some(Tiered::base(item)))
                .ok_or_else(|| missing("base", id))
        }
        Pointer::Local(id) => {
            let id = id.into();
            local
                .get(&id)
                .cloned()
                .map(|item| Some(Tiered::local(item)))
                .ok_or_else(|| missing("scenario", id))
        }
        Pointer::None => Ok(None),
    }
}

fn push_down(select: &mut sea_orm::sea_query::SelectStatement, query: &ResolveQuery) {
    for predicate in &query.predicates {
        match predicate {
            Predicate::PhysicalObjectType(id) => {
                select.and_where(
                    Expr::col((PhysicalObjects::Table, PhysicalObjects::PhysicalObjectTypeId))
                        .eq(id.0),
                );
            }
            Predicate::PhysicalObjectFunction(id) => {
                let types = Query::select()
                    .from(PhysicalObjectTypes::Table)
                    .column(PhysicalObjectTypes::PhysicalObjectTypeId)
                    .and_where(Expr::col(PhysicalObjectTypes::FunctionId).eq(id.0))
                    .to_owned();
                select.and_where(
                    Expr::col((PhysicalObjects::Table, PhysicalObjects::PhysicalObjectTypeId))
                        .in_subquery(types),
                );
            }
            Predicate::ServiceType(id) => {
                select.and_where(Expr::col((Services::Table, Services::ServiceTypeId)).eq(id.0));
            }
            _ => {}
        }
    }
}

fn prefilter(view: &UrbanObjectView, query: &ResolveQuery, functions: &FunctionMap) -> bool {
    let physical = &view.physical_object.item;
    query.predicates.iter().all(|predicate| match predicate {
        Predicate::PhysicalObjectType(id) => physical.physical_object_type_id == *id,
        Predicate::PhysicalObjectFunction(id) => {
            functions.get(&physical.physical_object_type_id) == Some(id)
        }
        Predicate::ServiceType(id) => view
            .service
            .as_ref()
            .is_some_and(|service| service.item.service_type_id == *id),
        Predicate::Territory(id) => view.object_geometry.item.territory_id == *id,
        _ => true,
    })
}

#[async_trait]
impl OverlayReadApi for UrbisStore {
    async fn resolve(
        &self,
        scenario_id: ScenarioId,
        actor: Option<&Actor>,
        kind: ResolveKind,
        query: &ResolveQuery,
    ) -> UrbisResult<Vec<ResolvedRecord>> {
        let ctx = self.read_context(scenario_id, actor).await?;
        self.resolve_kind(&ctx, kind, query).await
    }

    async fn resolve_context(
        &self,
        scenario_id: ScenarioId,
        actor: Option<&Actor>,
        kind: ResolveKind,
        query: &ContextQuery,
    ) -> UrbisResult<Vec<ResolvedRecord>> {
        let ctx = self.read_context(scenario_id, actor).await?;
        self.resolve_context_kind(&ctx, kind, query).await
    }

    async fn urban_objects(
        &self,
        scenario_id: ScenarioId,
        actor: Option<&Actor>,
        query: &ResolveQuery,
    ) -> UrbisResult<Vec<UrbanObjectView>> {
        let ctx = self.read_context(scenario_id, actor).await?;
        let (mut views, _) = self.collect_views(&self.conn, &ctx, query).await?;
        views.retain(|view| query.matches(view));
        views.sort_by_key(|view| (view.urban_object_id, view.origin));
        let iter = views.into_iter().skip(query.offset);
        Ok(match query.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        })
    }

    async fn physical_objects(
        &self,
        scenario_id: ScenarioId,
        actor: Option<&Actor>,
        query: &ResolveQuery,
    ) -> UrbisResult<Vec<PhysicalObjectRecord>> {
        let records = self
            .resolve(scenario_id, actor, ResolveKind::PhysicalObject, query)
            .await?;
        Ok(records
            .into_iter()
            .filter_map(|record| match record {
                ResolvedRecord::PhysicalObject(record) => Some(record),
                _ => None,
            })
            .collect())
    }

    async fn physical_objects_with_geometry(
        &self,
        scenario_id: ScenarioId,
        actor: Option<&Actor>,
        query: &ResolveQuery,
    ) -> UrbisResult<Vec<PhysicalObjectWithGeometryRecord>> {
        let records = self
            .resolve(scenario_id, actor, ResolveKind::PhysicalObjectWithGeometry, query)
            .await?;
        Ok(records
            .into_iter()
            .filter_map(|record| match record {
                ResolvedRecord::PhysicalObjectWithGeometry(record) => Some(record),
                _ => None,
            })
            .collect())
    }

    async fn services(
        &self,
        scenario_id: ScenarioId,
        actor: Option<&Actor>,
        query: &ResolveQuery,
    ) -> UrbisResult<Vec<ServiceRecord>> {
        let records = self
            .resolve(scenario_id, actor, ResolveKind::Service, query)
            .await?;
        Ok(records
            .into_iter()
            .filter_map(|record| match record {
                ResolvedRecord::Service(record) => Some(record),
                _ => None,
            })
            .collect())
    }

    async fn services_with_geometry(
        &self,
        scenario_id: ScenarioId,
        actor: Option<&Actor>,
        query: &ResolveQuery,
    ) -> UrbisResult<Vec<ServiceWithGeometryRecord>> {
        let records = self
            .resolve(scenario_id, actor, ResolveKind::ServiceWithGeometry, query)
            .await?;
        Ok(records
            .into_iter()
            .filter_map(|record| match record {
                ResolvedRecord::ServiceWithGeometry(record) => Some(record),
                _ => None,
            })
            .collect())
    }

    async fn geometries(
        &self,
        scenario_id: ScenarioId,
        actor: Option<&Actor>,
        query: &ResolveQuery,
    ) -> UrbisResult<Vec<GeometryRecord>> {
        let records = self
            .resolve(scenario_id, actor, ResolveKind::Geometry, query)
            .await?;
        Ok(records
            .into_iter()
            .filter_map(|record| match record {
                ResolvedRecord::Geometry(record) => Some(record),
                _ => None,
            })
            .collect())
    }

    async fn buffers(
        &self,
        scenario_id: ScenarioId,
        actor: Option<&Actor>,
        query: &ResolveQuery,
    ) -> UrbisResult<Vec<BufferRecord>> {
        let records = self
            .resolve(scenario_id, actor, ResolveKind::Buffer, query)
            .await?;
        Ok(records
            .into_iter()
            .filter_map(|record| match record {
                ResolvedRecord::Buffer(record) => Some(record),
                _ => None,
            })
            .collect())
    }

    async fn functional_zones(
        &self,
        scenario_id: ScenarioId,
        actor: Option<&Actor>,
        query: &ResolveQuery,
    ) -> UrbisResult<Vec<FunctionalZoneRecord>> {
        let records = self
            .resolve(scenario_id, actor, ResolveKind::FunctionalZone, query)
            .await?;
        Ok(records
            .into_iter()
            .filter_map(|record| match record {
                ResolvedRecord::FunctionalZone(record) => Some(record),
                _ => None,
            })
            .collect())
    }

    async fn indicator_values(
        &self,
        scenario_id: ScenarioId,
        actor: Option<&Actor>,
        query: &ResolveQuery,
    ) -> UrbisResult<Vec<IndicatorValueRecord>> {
        let records = self
            .resolve(scenario_id, actor, ResolveKind::IndicatorValue, query)
            .await?;
        Ok(records
            .into_iter()
            .filter_map(|record| match record {
                ResolvedRecord::IndicatorValue(record) => Some(record),
                _ => None,
            })
            .collect())
    }
}
