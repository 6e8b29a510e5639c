use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sea_orm::sea_query;
use sea_orm::sea_query::{
    Alias, DynIden, Expr, ExprTrait, InsertStatement, IntoIden, PostgresQueryBuilder, Query,
    QueryStatementWriter, SelectStatement, SqliteQueryBuilder, Value as SeaValue,
};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, QueryResult,
    Statement,
};
use sea_orm_migration::MigratorTrait;
use serde_json::Value as JsonValue;

use crate::db::*;
use crate::migration::Migrator;
use crate::{MAX_INSERT_BATCH, UrbisConfig};
use urbis_core::access::{Access, AccessPolicy, OwnershipPolicy};
use urbis_core::events::{ChangeEvent, EventSink, NoopEventSink};
use urbis_core::{
    Actor, BaseUrbanObject, FunctionalZone, FunctionalZoneId, Geometry, LinkPointers, ObjectGeometry,
    ObjectGeometryId, OverlayLink, PhysicalObject, PhysicalObjectId, PhysicalObjectTypeId,
    Pointer, Project, ProjectId, Scenario, ScenarioId, Service, ServiceId, ServiceTypeId,
    TerritoryId, Timestamp, UrbanObjectId, UrbisError, UrbisResult, UserId,
};

#[derive(Clone)]
pub struct UrbisStore {
    pub(crate) conn: DatabaseConnection,
    pub(crate) backend: DatabaseBackend,
    pub(crate) limits: StoreLimits,
    pub(crate) geometry: GeometrySettings,
    failpoints: HashSet<String>,
    events: Arc<dyn EventSink>,
    access: Arc<dyn AccessPolicy>,
}

#[derive(Clone, Copy, Debug)]
pub struct BackendCapabilities {
    pub returning: bool,
    pub transactional_ddl: bool,
    pub json_types: bool,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct StoreLimits {
    pub max_insert_batch: usize,
    pub max_in_params: usize,
}

impl StoreLimits {
    fn from_config(config: &UrbisConfig) -> Self {
        let defaults = crate::LimitsConfig::with_defaults();
        let limits = config.limits.clone().unwrap_or(defaults);
        Self {
            max_insert_batch: limits
                .max_insert_batch
                .unwrap_or(MAX_INSERT_BATCH)
                .clamp(1, MAX_INSERT_BATCH),
            max_in_params: limits.max_in_params.unwrap_or(900).max(1),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct GeometrySettings {
    pub meters_per_unit: f64,
    pub context_buffer_meters: f64,
    pub crop_min_share: f64,
    pub region_level: i32,
}

impl GeometrySettings {
    fn from_config(config: &UrbisConfig) -> Self {
        let defaults = crate::GeometryConfig::with_defaults();
        let geometry = config.geometry.clone().unwrap_or(defaults);
        Self {
            meters_per_unit: geometry.meters_per_unit.unwrap_or(111_320.0),
            context_buffer_meters: geometry.context_buffer_meters.unwrap_or(3_000.0),
            crop_min_share: geometry.crop_min_share.unwrap_or(0.1),
            region_level: geometry.region_level.unwrap_or(2),
        }
    }

    pub fn to_units(&self, meters: f64) -> f64 {
        meters / self.meters_per_unit
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub(crate) enum Tier {
    Base,
    Scenario,
}

impl Tier {
    pub fn of(is_scenario_object: bool) -> Self {
        if is_scenario_object {
            Tier::Scenario
        } else {
            Tier::Base
        }
    }

    pub fn physical_objects(self) -> DynIden {
        match self {
            Tier::Base => PhysicalObjects::Table.into_iden(),
            Tier::Scenario => ScenarioPhysicalObjects::Table.into_iden(),
        }
    }

    pub fn object_geometries(self) -> DynIden {
        match self {
            Tier::Base => ObjectGeometries::Table.into_iden(),
            Tier::Scenario => ScenarioObjectGeometries::Table.into_iden(),
        }
    }

    pub fn services(self) -> DynIden {
        match self {
            Tier::Base => Services::Table.into_iden(),
            Tier::Scenario => ScenarioServices::Table.into_iden(),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct ScenarioContext {
    pub scenario: Scenario,
    pub project: Project,
    pub source: ScenarioId,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub(crate) enum RowKind {
    Link,
    PhysicalObject,
    ObjectGeometry,
    Service,
    FunctionalZone,
}

impl RowKind {
    const ALL: [RowKind; 5] = [
        RowKind::Link,
        RowKind::PhysicalObject,
        RowKind::ObjectGeometry,
        RowKind::Service,
        RowKind::FunctionalZone,
    ];

    fn as_str(self) -> &'static str {
        match self {
            RowKind::Link => "link",
            RowKind::PhysicalObject => "physical_object",
            RowKind::ObjectGeometry => "object_geometry",
            RowKind::Service => "service",
            RowKind::FunctionalZone => "functional_zone",
        }
    }

    fn parse(raw: &str) -> UrbisResult<Self> {
        RowKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == raw)
            .ok_or_else(|| UrbisError::internal(format!("unknown row alias kind {raw}")))
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct RowMap {
    pub links: HashMap<i64, i64>,
    pub physical_objects: HashMap<i64, i64>,
    pub object_geometries: HashMap<i64, i64>,
    pub services: HashMap<i64, i64>,
    pub functional_zones: HashMap<i64, i64>,
}

impl RowMap {
    fn get(&self, kind: RowKind) -> &HashMap<i64, i64> {
        match kind {
            RowKind::Link => &self.links,
            RowKind::PhysicalObject => &self.physical_objects,
            RowKind::ObjectGeometry => &self.object_geometries,
            RowKind::Service => &self.services,
            RowKind::FunctionalZone => &self.functional_zones,
        }
    }
}

impl ScenarioContext {
    pub fn scenario_id(&self) -> ScenarioId {
        self.scenario.scenario_id
    }

    pub fn is_regional(&self) -> bool {
        self.project.is_regional
    }

    pub fn boundary(&self) -> Option<geo::MultiPolygon<f64>> {
        if self.project.is_regional {
            return None;
        }
        self.project
            .territory
            .as_ref()
            .map(urbis_core::geometry::to_multi_polygon)
    }

    pub fn require_project_scenario(&self) -> UrbisResult<()> {
        if self.project.is_regional {
            Err(UrbisError::NotAllowedInRegionalScenario)
        } else {
            Ok(())
        }
    }
}

impl UrbisStore {
    pub async fn connect(config: &UrbisConfig, base_dir: &Path) -> UrbisResult<Self> {
        let url = build_connection_url(config, base_dir)?;
        let mut options = ConnectOptions::new(url);
        if let Some(pool) = &config.pool {
            if let Some(max) = pool.max_connections {
                options.max_connections(max);
            }
            if let Some(min) = pool.min_connections {
                options.min_connections(min);
            }
            if let Some(timeout_ms) = pool.connect_timeout_ms {
                options.connect_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.acquire_timeout_ms {
                options.acquire_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.idle_timeout_ms {
                options.idle_timeout(Duration::from_millis(timeout_ms));
            }
        }
        let conn = Database::connect(options).await.map_err(UrbisError::from)?;
        let backend = conn.get_database_backend();
        let failpoints = config
            .failpoints
            .clone()
            .unwrap_or_default()
            .into_iter()
            .collect::<HashSet<_>>();
        let store = Self {
            conn,
            backend,
            limits: StoreLimits::from_config(config),
            geometry: GeometrySettings::from_config(config),
            failpoints,
            events: Arc::new(NoopEventSink),
            access: Arc::new(OwnershipPolicy),
        };
        Migrator::up(&store.conn, None)
            .await
            .map_err(UrbisError::from)?;
        Ok(store)
    }

    pub async fn connect_sqlite(path: &Path) -> UrbisResult<Self> {
        let config = UrbisConfig::default_sqlite(path.to_string_lossy());
        Self::connect(&config, path.parent().unwrap_or_else(|| Path::new("."))).await
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    pub fn with_access_policy(mut self, policy: Arc<dyn AccessPolicy>) -> Self {
        self.access = policy;
        self
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    pub fn capabilities(&self) -> BackendCapabilities {
        match self.backend {
            DatabaseBackend::Sqlite => BackendCapabilities {
                returning: true,
                transactional_ddl: false,
                json_types: false,
            },
            DatabaseBackend::Postgres => BackendCapabilities {
                returning: true,
                transactional_ddl: true,
                json_types: true,
            },
            _ => BackendCapabilities {
                returning: false,
                transactional_ddl: false,
                json_types: false,
            },
        }
    }

    pub(crate) fn maybe_failpoint(&self, key: &str) -> UrbisResult<()> {
        if self.failpoints.contains(key) {
            Err(UrbisError::storage(format!("failpoint {key}")))
        } else {
            Ok(())
        }
    }

    pub(crate) async fn publish(&self, events: Vec<ChangeEvent>) {
        for event in events {
            if let Err(err) = self.events.publish(event).await {
                log::warn!(
                    "change event {:?}/{:?} for {} not delivered: {err}",
                    event.scope,
                    event.kind,
                    event.entity_id
                );
            }
        }
    }

    pub(crate) fn check_access(
        &self,
        project: &Project,
        actor: Option<&Actor>,
        access: Access,
    ) -> UrbisResult<()> {
        self.access.check(project, actor, access)
    }

    pub(crate) async fn load_scenario<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario_id: ScenarioId,
    ) -> UrbisResult<Option<Scenario>> {
        let select = scenario_select()
            .and_where(Expr::col(Scenarios::ScenarioId).eq(scenario_id.0))
            .to_owned();
        query_one(conn, &select)
            .await?
            .map(|row| read_scenario(&row))
            .transpose()
    }

    pub(crate) async fn require_scenario<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario_id: ScenarioId,
    ) -> UrbisResult<Scenario> {
        self.load_scenario(conn, scenario_id)
            .await?
            .ok_or_else(|| UrbisError::not_found_by_id("scenario", scenario_id.0))
    }

    pub(crate) async fn load_project<C: ConnectionTrait>(
        &self,
        conn: &C,
        project_id: ProjectId,
    ) -> UrbisResult<Option<Project>> {
        let select = Query::select()
            .from(Projects::Table)
            .columns([
                Projects::ProjectId,
                Projects::UserId,
                Projects::Name,
                Projects::RegionId,
                Projects::IsRegional,
                Projects::IsPublic,
                Projects::ContextTerritories,
                Projects::CreatedAt,
                Projects::UpdatedAt,
            ])
            .and_where(Expr::col(Projects::ProjectId).eq(project_id.0))
            .to_owned();
        let Some(row) = query_one(conn, &select).await? else {
            return Ok(None);
        };
        let territory_select = Query::select()
            .from(ProjectTerritories::Table)
            .column(ProjectTerritories::Geometry)
            .and_where(Expr::col(ProjectTerritories::ProjectId).eq(project_id.0))
            .to_owned();
        let territory = match query_one(conn, &territory_select).await? {
            Some(row) => Some(read_geometry(&row, &col_name(ProjectTerritories::Geometry))?),
            None => None,
        };
        let context_raw: String = row.try_get("", &col_name(Projects::ContextTerritories))?;
        let context_territories: Vec<TerritoryId> = serde_json::from_str(&context_raw)?;
        Ok(Some(Project {
            project_id: ProjectId(row.try_get("", &col_name(Projects::ProjectId))?),
            user_id: UserId(row.try_get("", &col_name(Projects::UserId))?),
            name: row.try_get("", &col_name(Projects::Name))?,
            region_id: TerritoryId(row.try_get("", &col_name(Projects::RegionId))?),
            is_regional: row.try_get("", &col_name(Projects::IsRegional))?,
            is_public: row.try_get("", &col_name(Projects::IsPublic))?,
            territory,
            context_territories,
            created_at: Timestamp(row.try_get("", &col_name(Projects::CreatedAt))?),
            updated_at: Timestamp(row.try_get("", &col_name(Projects::UpdatedAt))?),
        }))
    }

    pub(crate) async fn load_context<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario_id: ScenarioId,
        actor: Option<&Actor>,
        access: Access,
    ) -> UrbisResult<ScenarioContext> {
        let scenario = self.require_scenario(conn, scenario_id).await?;
        let Some(project) = self.load_project(conn, scenario.project_id).await? else {
            log::error!(
                "scenario {} references missing project {}",
                scenario.scenario_id,
                scenario.project_id
            );
            return Err(UrbisError::internal(format!(
                "project {} of scenario {} not found",
                scenario.project_id, scenario.scenario_id
            )));
        };
        self.check_access(&project, actor, access)?;
        let source = self.effective_source(conn, &scenario).await?;
        Ok(ScenarioContext {
            scenario,
            project,
            source,
        })
    }

    async fn effective_source<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario: &Scenario,
    ) -> UrbisResult<ScenarioId> {
        let mut current = scenario.clone();
        let mut seen = HashSet::new();
        while current.is_attached {
            if !seen.insert(current.scenario_id) {
                log::error!("scenario {} has a cyclic parent chain", scenario.scenario_id);
                return Err(UrbisError::internal(format!(
                    "cyclic parent chain at scenario {}",
                    current.scenario_id
                )));
            }
            let Some(parent_id) = current.parent_id else {
                log::error!("scenario {} is attached without a parent", current.scenario_id);
                return Err(UrbisError::internal(format!(
                    "attached scenario {} has no parent",
                    current.scenario_id
                )));
            };
            current = self.load_scenario(conn, parent_id).await?.ok_or_else(|| {
                log::error!(
                    "scenario {} is attached to missing parent {parent_id}",
                    current.scenario_id
                );
                UrbisError::internal(format!("parent scenario {parent_id} not found"))
            })?;
        }
        Ok(current.scenario_id)
    }

    /// Makes the scenario own its rows and hands its current rows to every
    /// child still resolving through it, so neither side sees the other's write.
    pub(crate) async fn prepare_for_write<C: ConnectionTrait>(
        &self,
        conn: &C,
        ctx: &mut ScenarioContext,
    ) -> UrbisResult<()> {
        let scenario_id = ctx.scenario_id();
        if ctx.scenario.is_attached {
            self.materialize_rows(conn, ctx.source, scenario_id).await?;
            ctx.scenario.is_attached = false;
            ctx.source = scenario_id;
        }
        let children = Query::select()
            .from(Scenarios::Table)
            .column(Scenarios::ScenarioId)
            .and_where(Expr::col(Scenarios::ParentId).eq(scenario_id.0))
            .and_where(Expr::col(Scenarios::IsAttached).eq(true))
            .order_by(Scenarios::ScenarioId, sea_query::Order::Asc)
            .to_owned();
        for row in query_all(conn, &children).await? {
            let child = ScenarioId(row.try_get("", &col_name(Scenarios::ScenarioId))?);
            self.materialize_rows(conn, scenario_id, child).await?;
        }
        let touch = Query::update()
            .table(Scenarios::Table)
            .values([(Scenarios::UpdatedAt, Timestamp::now().as_millis().into())])
            .and_where(Expr::col(Scenarios::ScenarioId).eq(scenario_id.0))
            .to_owned();
        exec(conn, &touch).await?;
        Ok(())
    }

    pub(crate) async fn materialize_rows<C: ConnectionTrait>(
        &self,
        conn: &C,
        from: ScenarioId,
        to: ScenarioId,
    ) -> UrbisResult<()> {
        let copied = self.copy_scenario_rows(conn, from, to).await?;
        let mut aliases: Vec<(RowKind, i64, i64)> = RowKind::ALL
            .into_iter()
            .flat_map(|kind| copied.get(kind).iter().map(move |(old, new)| (kind, *old, *new)))
            .collect();
        // ids `from` itself inherited keep pointing at the same logical row
        let inherited = Query::select()
            .from(ScenarioRowAliases::Table)
            .columns([
                ScenarioRowAliases::Kind,
                ScenarioRowAliases::OldId,
                ScenarioRowAliases::NewId,
            ])
            .and_where(Expr::col(ScenarioRowAliases::ScenarioId).eq(from.0))
            .to_owned();
        for row in query_all(conn, &inherited).await? {
            let kind: String = row.try_get("", &col_name(ScenarioRowAliases::Kind))?;
            let kind = RowKind::parse(&kind)?;
            let old: i64 = row.try_get("", &col_name(ScenarioRowAliases::OldId))?;
            let via: i64 = row.try_get("", &col_name(ScenarioRowAliases::NewId))?;
            if let Some(new) = copied.get(kind).get(&via) {
                aliases.push((kind, old, *new));
            }
        }
        for chunk in aliases.chunks(self.limits.max_insert_batch) {
            let mut insert = Query::insert();
            insert.into_table(ScenarioRowAliases::Table).columns([
                ScenarioRowAliases::ScenarioId,
                ScenarioRowAliases::Kind,
                ScenarioRowAliases::OldId,
                ScenarioRowAliases::NewId,
            ]);
            for (kind, old, new) in chunk {
                push_values(
                    &mut insert,
                    vec![to.0.into(), kind.as_str().into(), (*old).into(), (*new).into()],
                )?;
            }
            exec(conn, &insert).await?;
        }
        set_attached(conn, to, false).await
    }

    pub(crate) async fn current_id<C, I>(
        &self,
        conn: &C,
        scenario_id: ScenarioId,
        kind: RowKind,
        id: i64,
    ) -> UrbisResult<I>
    where
        C: ConnectionTrait,
        I: From<i64>,
    {
        let select = Query::select()
            .from(ScenarioRowAliases::Table)
            .column(ScenarioRowAliases::NewId)
            .and_where(Expr::col(ScenarioRowAliases::ScenarioId).eq(scenario_id.0))
            .and_where(Expr::col(ScenarioRowAliases::Kind).eq(kind.as_str()))
            .and_where(Expr::col(ScenarioRowAliases::OldId).eq(id))
            .to_owned();
        let current = match query_one(conn, &select).await? {
            Some(row) => row.try_get("", &col_name(ScenarioRowAliases::NewId))?,
            None => id,
        };
        Ok(I::from(current))
    }

    pub(crate) async fn copy_scenario_rows<C: ConnectionTrait>(
        &self,
        conn: &C,
        from: ScenarioId,
        to: ScenarioId,
    ) -> UrbisResult<RowMap> {
        let physical = self.scenario_physical_rows(conn, from).await?;
        let old_physical: Vec<i64> = physical.iter().map(|(_, p)| p.physical_object_id.0).collect();
        let new_physical = self.insert_local_physical_objects(conn, to, &physical).await?;
        let physical_map: HashMap<i64, i64> = old_physical
            .into_iter()
            .zip(new_physical.iter().map(|p| p.physical_object_id.0))
            .collect();

        let geometries = self.scenario_geometry_rows(conn, from).await?;
        let old_geometries: Vec<i64> = geometries
            .iter()
            .map(|(_, g)| g.object_geometry_id.0)
            .collect();
        let new_geometries = self.insert_local_geometries(conn, to, &geometries).await?;
        let geometry_map: HashMap<i64, i64> = old_geometries
            .into_iter()
            .zip(new_geometries.iter().map(|g| g.object_geometry_id.0))
            .collect();

        let services = self.scenario_service_rows(conn, from).await?;
        let old_services: Vec<i64> = services.iter().map(|(_, s)| s.service_id.0).collect();
        let new_services = self.insert_local_services(conn, to, &services).await?;
        let service_map: HashMap<i64, i64> = old_services
            .into_iter()
            .zip(new_services.iter().map(|s| s.service_id.0))
            .collect();

        let links = self.load_links(conn, from).await?;
        let mut remapped = Vec::with_capacity(links.len());
        for link in &links {
            let pointers = LinkPointers {
                physical_object: remap(link.pointers.physical_object, &physical_map)?,
                object_geometry: remap(link.pointers.object_geometry, &geometry_map)?,
                service: remap(link.pointers.service, &service_map)?,
            };
            remapped.push((link.base_urban_object_id, pointers));
        }
        let new_links = self.insert_links(conn, to, &remapped).await?;
        let link_map: HashMap<i64, i64> = links
            .iter()
            .map(|link| link.link_id.0)
            .zip(new_links.iter().map(|id| id.0))
            .collect();

        self.copy_scenario_buffers(conn, &link_map).await?;
        let zone_map = self.copy_scenario_functional_zones(conn, from, to).await?;
        self.copy_scenario_indicator_values(conn, from, to).await?;
        log::debug!(
            "copied scenario {from} into {to}: {} links, {} physical objects, {} geometries, {} services",
            links.len(),
            physical_map.len(),
            geometry_map.len(),
            service_map.len()
        );
        Ok(RowMap {
            links: link_map,
            physical_objects: physical_map,
            object_geometries: geometry_map,
            services: service_map,
            functional_zones: zone_map,
        })
    }

    async fn copy_scenario_buffers<C: ConnectionTrait>(
        &self,
        conn: &C,
        link_map: &HashMap<i64, i64>,
    ) -> UrbisResult<()> {
        let old_ids: Vec<i64> = link_map.keys().copied().collect();
        let mut rows = Vec::new();
        for chunk in old_ids.chunks(self.limits.max_in_params) {
            let select = Query::select()
                .from(ScenarioBuffers::Table)
                .columns([
                    ScenarioBuffers::BufferTypeId,
                    ScenarioBuffers::UrbanObjectId,
                    ScenarioBuffers::Geometry,
                    ScenarioBuffers::IsCustom,
                    ScenarioBuffers::IsCut,
                ])
                .and_where(Expr::col(ScenarioBuffers::UrbanObjectId).is_in(chunk.iter().copied()))
                .to_owned();
            for row in query_all(conn, &select).await? {
                let old: i64 = row.try_get("", &col_name(ScenarioBuffers::UrbanObjectId))?;
                let Some(new) = link_map.get(&old) else {
                    continue;
                };
                let buffer_type: i64 = row.try_get("", &col_name(ScenarioBuffers::BufferTypeId))?;
                let geometry: String = row.try_get("", &col_name(ScenarioBuffers::Geometry))?;
                let is_custom: bool = row.try_get("", &col_name(ScenarioBuffers::IsCustom))?;
                let is_cut: bool = row.try_get("", &col_name(ScenarioBuffers::IsCut))?;
                rows.push(vec![
                    buffer_type.into(),
                    (*new).into(),
                    geometry.into(),
                    is_custom.into(),
                    is_cut.into(),
                ]);
            }
        }
        for chunk in rows.chunks(self.limits.max_insert_batch) {
            let mut insert = Query::insert();
            insert.into_table(ScenarioBuffers::Table).columns([
                ScenarioBuffers::BufferTypeId,
                ScenarioBuffers::UrbanObjectId,
                ScenarioBuffers::Geometry,
                ScenarioBuffers::IsCustom,
                ScenarioBuffers::IsCut,
            ]);
            for row in chunk {
                push_values(&mut insert, row.clone())?;
            }
            exec(conn, &insert).await?;
        }
        Ok(())
    }

    async fn copy_scenario_functional_zones<C: ConnectionTrait>(
        &self,
        conn: &C,
        from: ScenarioId,
        to: ScenarioId,
    ) -> UrbisResult<HashMap<i64, i64>> {
        let zones = self.load_scenario_functional_zones(conn, from).await?;
        let copied = self.insert_scenario_functional_zones(conn, to, &zones).await?;
        Ok(zones
            .iter()
            .zip(copied.iter())
            .map(|(old, new)| (old.functional_zone_id.0, new.functional_zone_id.0))
            .collect())
    }

    async fn copy_scenario_indicator_values<C: ConnectionTrait>(
        &self,
        conn: &C,
        from: ScenarioId,
        to: ScenarioId,
    ) -> UrbisResult<()> {
        let columns = [
            ScenarioIndicatorValues::IndicatorId,
            ScenarioIndicatorValues::TerritoryId,
            ScenarioIndicatorValues::Value,
            ScenarioIndicatorValues::ValueType,
            ScenarioIndicatorValues::InformationSource,
            ScenarioIndicatorValues::Properties,
            ScenarioIndicatorValues::CreatedAt,
            ScenarioIndicatorValues::UpdatedAt,
        ];
        let select = Query::select()
            .from(ScenarioIndicatorValues::Table)
            .columns(columns)
            .and_where(Expr::col(ScenarioIndicatorValues::ScenarioId).eq(from.0))
            .order_by(ScenarioIndicatorValues::IndicatorValueId, sea_query::Order::Asc)
            .to_owned();
        let rows = query_all(conn, &select).await?;
        for chunk in rows.chunks(self.limits.max_insert_batch) {
            let mut insert = Query::insert();
            insert
                .into_table(ScenarioIndicatorValues::Table)
                .columns([ScenarioIndicatorValues::ScenarioId].into_iter().chain(columns));
            for row in chunk {
                let indicator: i64 =
                    row.try_get("", &col_name(ScenarioIndicatorValues::IndicatorId))?;
                let territory: Option<i64> =
                    row.try_get("", &col_name(ScenarioIndicatorValues::TerritoryId))?;
                let value: f64 = row.try_get("", &col_name(ScenarioIndicatorValues::Value))?;
                let value_type: String =
                    row.try_get("", &col_name(ScenarioIndicatorValues::ValueType))?;
                let source: String =
                    row.try_get("", &col_name(ScenarioIndicatorValues::InformationSource))?;
                let properties: String =
                    row.try_get("", &col_name(ScenarioIndicatorValues::Properties))?;
                let created: i64 = row.try_get("", &col_name(ScenarioIndicatorValues::CreatedAt))?;
                let updated: i64 = row.try_get("", &col_name(ScenarioIndicatorValues::UpdatedAt))?;
                push_values(
                    &mut insert,
                    vec![
                        to.0.into(),
                        indicator.into(),
                        territory.into(),
                        value.into(),
                        value_type.into(),
                        source.into(),
                        properties.into(),
                        created.into(),
                        updated.into(),
                    ],
                )?;
            }
            exec(conn, &insert).await?;
        }
        Ok(())
    }

    pub(crate) async fn load_links<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario_id: ScenarioId,
    ) -> UrbisResult<Vec<OverlayLink>> {
        let select = link_select()
            .and_where(Expr::col(ScenarioUrbanObjects::ScenarioId).eq(scenario_id.0))
            .order_by(ScenarioUrbanObjects::UrbanObjectId, sea_query::Order::Asc)
            .to_owned();
        query_all(conn, &select)
            .await?
            .iter()
            .map(read_link)
            .collect()
    }

    pub(crate) async fn load_link<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario_id: ScenarioId,
        link_id: UrbanObjectId,
    ) -> UrbisResult<Option<OverlayLink>> {
        let select = link_select()
            .and_where(Expr::col(ScenarioUrbanObjects::ScenarioId).eq(scenario_id.0))
            .and_where(Expr::col(ScenarioUrbanObjects::UrbanObjectId).eq(link_id.0))
            .to_owned();
        query_one(conn, &select)
            .await?
            .map(|row| read_link(&row))
            .transpose()
    }

    pub(crate) async fn link_for_base<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario_id: ScenarioId,
        base_id: UrbanObjectId,
    ) -> UrbisResult<Option<OverlayLink>> {
        let select = link_select()
            .and_where(Expr::col(ScenarioUrbanObjects::ScenarioId).eq(scenario_id.0))
            .and_where(Expr::col(ScenarioUrbanObjects::PublicUrbanObjectId).eq(base_id.0))
            .to_owned();
        query_one(conn, &select)
            .await?
            .map(|row| read_link(&row))
            .transpose()
    }

    pub(crate) async fn insert_links<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario_id: ScenarioId,
        links: &[(Option<UrbanObjectId>, LinkPointers)],
    ) -> UrbisResult<Vec<UrbanObjectId>> {
        let rows = links
            .iter()
            .map(|(base, pointers)| {
                let mut row: Vec<SeaValue> = vec![scenario_id.0.into(), base.map(|id| id.0).into()];
                row.extend(pointer_values(pointers));
                row
            })
            .collect();
        let ids = self
            .insert_rows_returning(
                conn,
                ScenarioUrbanObjects::Table.into_iden(),
                vec![
                    ScenarioUrbanObjects::ScenarioId.into_iden(),
                    ScenarioUrbanObjects::PublicUrbanObjectId.into_iden(),
                    ScenarioUrbanObjects::PhysicalObjectId.into_iden(),
                    ScenarioUrbanObjects::PublicPhysicalObjectId.into_iden(),
                    ScenarioUrbanObjects::ObjectGeometryId.into_iden(),
                    ScenarioUrbanObjects::PublicObjectGeometryId.into_iden(),
                    ScenarioUrbanObjects::ServiceId.into_iden(),
                    ScenarioUrbanObjects::PublicServiceId.into_iden(),
                ],
                rows,
                ScenarioUrbanObjects::UrbanObjectId,
            )
            .await?;
        Ok(ids.into_iter().map(UrbanObjectId).collect())
    }

    pub(crate) async fn claim_base_object<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario_id: ScenarioId,
        base_id: UrbanObjectId,
        pointers: LinkPointers,
    ) -> UrbisResult<UrbanObjectId> {
        self.insert_links(conn, scenario_id, &[(Some(base_id), pointers)])
            .await
            .map_err(|err| match err {
                UrbisError::AlreadyExists { .. } => {
                    UrbisError::already_edited("urban object", base_id.0)
                }
                other => other,
            })?
            .into_iter()
            .next()
            .ok_or_else(|| UrbisError::internal("link insert returned no id"))
    }

    pub(crate) async fn update_link_pointers<C: ConnectionTrait>(
        &self,
        conn: &C,
        link_id: UrbanObjectId,
        pointers: &LinkPointers,
    ) -> UrbisResult<()> {
        let values = pointer_values(pointers);
        let columns = [
            ScenarioUrbanObjects::PhysicalObjectId,
            ScenarioUrbanObjects::PublicPhysicalObjectId,
            ScenarioUrbanObjects::ObjectGeometryId,
            ScenarioUrbanObjects::PublicObjectGeometryId,
            ScenarioUrbanObjects::ServiceId,
            ScenarioUrbanObjects::PublicServiceId,
        ];
        let update = Query::update()
            .table(ScenarioUrbanObjects::Table)
            .values(columns.into_iter().zip(values.into_iter().map(Into::into)))
            .and_where(Expr::col(ScenarioUrbanObjects::UrbanObjectId).eq(link_id.0))
            .to_owned();
        exec(conn, &update).await
    }

    pub(crate) async fn delete_links<C: ConnectionTrait>(
        &self,
        conn: &C,
        link_ids: &[UrbanObjectId],
    ) -> UrbisResult<u64> {
        let ids: Vec<i64> = link_ids.iter().map(|id| id.0).collect();
        let mut removed = 0;
        for chunk in ids.chunks(self.limits.max_in_params) {
            let delete = Query::delete()
                .from_table(ScenarioUrbanObjects::Table)
                .and_where(Expr::col(ScenarioUrbanObjects::UrbanObjectId).is_in(chunk.iter().copied()))
                .to_owned();
            removed += exec_count(conn, &delete).await?;
        }
        Ok(removed)
    }

    pub(crate) async fn delete_orphan_sub_objects<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario_id: ScenarioId,
    ) -> UrbisResult<()> {
        let referenced = |column: ScenarioUrbanObjects| {
            Query::select()
                .from(ScenarioUrbanObjects::Table)
                .column(column)
                .and_where(Expr::col(ScenarioUrbanObjects::ScenarioId).eq(scenario_id.0))
                .and_where(Expr::col(column).is_not_null())
                .to_owned()
        };
        let physical = Query::delete()
            .from_table(ScenarioPhysicalObjects::Table)
            .and_where(Expr::col(ScenarioPhysicalObjects::ScenarioId).eq(scenario_id.0))
            .and_where(
                Expr::col(PhysicalObjects::PhysicalObjectId)
                    .not_in_subquery(referenced(ScenarioUrbanObjects::PhysicalObjectId)),
            )
            .to_owned();
        let geometries = Query::delete()
            .from_table(ScenarioObjectGeometries::Table)
            .and_where(Expr::col(ScenarioObjectGeometries::ScenarioId).eq(scenario_id.0))
            .and_where(
                Expr::col(ObjectGeometries::ObjectGeometryId)
                    .not_in_subquery(referenced(ScenarioUrbanObjects::ObjectGeometryId)),
            )
            .to_owned();
        let services = Query::delete()
            .from_table(ScenarioServices::Table)
            .and_where(Expr::col(ScenarioServices::ScenarioId).eq(scenario_id.0))
            .and_where(
                Expr::col(Services::ServiceId)
                    .not_in_subquery(referenced(ScenarioUrbanObjects::ServiceId)),
            )
            .to_owned();
        let removed = exec_count(conn, &physical).await?
            + exec_count(conn, &geometries).await?
            + exec_count(conn, &services).await?;
        if removed > 0 {
            log::debug!("scenario {scenario_id}: removed {removed} orphaned sub-objects");
        }
        Ok(())
    }

    pub(crate) async fn load_physical_objects<C: ConnectionTrait>(
        &self,
        conn: &C,
        tier: Tier,
        ids: &[i64],
    ) -> UrbisResult<HashMap<i64, PhysicalObject>> {
        let mut found = HashMap::new();
        for chunk in ids.chunks(self.limits.max_in_params) {
            let select = Query::select()
                .from(tier.physical_objects())
                .columns(PHYSICAL_COLUMNS)
                .and_where(Expr::col(PhysicalObjects::PhysicalObjectId).is_in(chunk.iter().copied()))
                .to_owned();
            for row in query_all(conn, &select).await? {
                let item = read_physical_object(&row, "")?;
                found.insert(item.physical_object_id.0, item);
            }
        }
        Ok(found)
    }

    pub(crate) async fn load_object_geometries<C: ConnectionTrait>(
        &self,
        conn: &C,
        tier: Tier,
        ids: &[i64],
    ) -> UrbisResult<HashMap<i64, ObjectGeometry>> {
        let mut found = HashMap::new();
        for chunk in ids.chunks(self.limits.max_in_params) {
            let mut select = Query::select();
            select
                .from(tier.object_geometries())
                .columns(GEOMETRY_COLUMNS)
                .and_where(
                    Expr::col(ObjectGeometries::ObjectGeometryId).is_in(chunk.iter().copied()),
                );
            if tier == Tier::Scenario {
                select.column(ScenarioObjectGeometries::IsCut);
            }
            for row in query_all(conn, &select).await? {
                let item = read_object_geometry(&row, "", tier == Tier::Scenario)?;
                found.insert(item.object_geometry_id.0, item);
            }
        }
        Ok(found)
    }

    pub(crate) async fn load_services<C: ConnectionTrait>(
        &self,
        conn: &C,
        tier: Tier,
        ids: &[i64],
    ) -> UrbisResult<HashMap<i64, Service>> {
        let mut found = HashMap::new();
        for chunk in ids.chunks(self.limits.max_in_params) {
            let select = Query::select()
                .from(tier.services())
                .columns(SERVICE_COLUMNS)
                .and_where(Expr::col(Services::ServiceId).is_in(chunk.iter().copied()))
                .to_owned();
            for row in query_all(conn, &select).await? {
                let item = read_service(&row, "")?;
                found.insert(item.service_id.0, item);
            }
        }
        Ok(found)
    }

    pub(crate) async fn owned_physical_object<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario_id: ScenarioId,
        id: PhysicalObjectId,
    ) -> UrbisResult<PhysicalObject> {
        let select = Query::select()
            .from(ScenarioPhysicalObjects::Table)
            .columns(PHYSICAL_COLUMNS)
            .and_where(Expr::col(PhysicalObjects::PhysicalObjectId).eq(id.0))
            .and_where(Expr::col(ScenarioPhysicalObjects::ScenarioId).eq(scenario_id.0))
            .to_owned();
        match query_one(conn, &select).await? {
            Some(row) => read_physical_object(&row, ""),
            None => Err(UrbisError::not_found_by_id("scenario physical object", id.0)),
        }
    }

    pub(crate) async fn owned_object_geometry<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario_id: ScenarioId,
        id: ObjectGeometryId,
    ) -> UrbisResult<ObjectGeometry> {
        let select = Query::select()
            .from(ScenarioObjectGeometries::Table)
            .columns(GEOMETRY_COLUMNS)
            .column(ScenarioObjectGeometries::IsCut)
            .and_where(Expr::col(ObjectGeometries::ObjectGeometryId).eq(id.0))
            .and_where(Expr::col(ScenarioObjectGeometries::ScenarioId).eq(scenario_id.0))
            .to_owned();
        match query_one(conn, &select).await? {
            Some(row) => read_object_geometry(&row, "", true),
            None => Err(UrbisError::not_found_by_id("scenario object geometry", id.0)),
        }
    }

    pub(crate) async fn owned_service<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario_id: ScenarioId,
        id: ServiceId,
    ) -> UrbisResult<Service> {
        let select = Query::select()
            .from(ScenarioServices::Table)
            .columns(SERVICE_COLUMNS)
            .and_where(Expr::col(Services::ServiceId).eq(id.0))
            .and_where(Expr::col(ScenarioServices::ScenarioId).eq(scenario_id.0))
            .to_owned();
        match query_one(conn, &select).await? {
            Some(row) => read_service(&row, ""),
            None => Err(UrbisError::not_found_by_id("scenario service", id.0)),
        }
    }

    async fn scenario_physical_rows<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario_id: ScenarioId,
    ) -> UrbisResult<Vec<(Option<i64>, PhysicalObject)>> {
        let select = Query::select()
            .from(ScenarioPhysicalObjects::Table)
            .columns(PHYSICAL_COLUMNS)
            .column(ScenarioPhysicalObjects::PublicPhysicalObjectId)
            .and_where(Expr::col(ScenarioPhysicalObjects::ScenarioId).eq(scenario_id.0))
            .order_by(PhysicalObjects::PhysicalObjectId, sea_query::Order::Asc)
            .to_owned();
        query_all(conn, &select)
            .await?
            .iter()
            .map(|row| {
                let public: Option<i64> =
                    row.try_get("", &col_name(ScenarioPhysicalObjects::PublicPhysicalObjectId))?;
                Ok((public, read_physical_object(row, "")?))
            })
            .collect()
    }

    async fn scenario_geometry_rows<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario_id: ScenarioId,
    ) -> UrbisResult<Vec<(Option<i64>, ObjectGeometry)>> {
        let select = Query::select()
            .from(ScenarioObjectGeometries::Table)
            .columns(GEOMETRY_COLUMNS)
            .column(ScenarioObjectGeometries::IsCut)
            .column(ScenarioObjectGeometries::PublicObjectGeometryId)
            .and_where(Expr::col(ScenarioObjectGeometries::ScenarioId).eq(scenario_id.0))
            .order_by(ObjectGeometries::ObjectGeometryId, sea_query::Order::Asc)
            .to_owned();
        query_all(conn, &select)
            .await?
            .iter()
            .map(|row| {
                let public: Option<i64> = row.try_get(
                    "",
                    &col_name(ScenarioObjectGeometries::PublicObjectGeometryId),
                )?;
                Ok((public, read_object_geometry(row, "", true)?))
            })
            .collect()
    }

    async fn scenario_service_rows<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario_id: ScenarioId,
    ) -> UrbisResult<Vec<(Option<i64>, Service)>> {
        let select = Query::select()
            .from(ScenarioServices::Table)
            .columns(SERVICE_COLUMNS)
            .column(ScenarioServices::PublicServiceId)
            .and_where(Expr::col(ScenarioServices::ScenarioId).eq(scenario_id.0))
            .order_by(Services::ServiceId, sea_query::Order::Asc)
            .to_owned();
        query_all(conn, &select)
            .await?
            .iter()
            .map(|row| {
                let public: Option<i64> =
                    row.try_get("", &col_name(ScenarioServices::PublicServiceId))?;
                Ok((public, read_service(row, "")?))
            })
            .collect()
    }

    pub(crate) async fn insert_local_physical_objects<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario_id: ScenarioId,
        items: &[(Option<i64>, PhysicalObject)],
    ) -> UrbisResult<Vec<PhysicalObject>> {
        let rows = items
            .iter()
            .map(|(public, item)| {
                vec![
                    scenario_id.0.into(),
                    (*public).into(),
                    item.physical_object_type_id.0.into(),
                    item.name.clone().into(),
                    item.properties.to_string().into(),
                    item.created_at.as_millis().into(),
                    item.updated_at.as_millis().into(),
                ]
            })
            .collect();
        let ids = self
            .insert_rows_returning(
                conn,
                ScenarioPhysicalObjects::Table.into_iden(),
                vec![
                    ScenarioPhysicalObjects::ScenarioId.into_iden(),
                    ScenarioPhysicalObjects::PublicPhysicalObjectId.into_iden(),
                    PhysicalObjects::PhysicalObjectTypeId.into_iden(),
                    PhysicalObjects::Name.into_iden(),
                    PhysicalObjects::Properties.into_iden(),
                    PhysicalObjects::CreatedAt.into_iden(),
                    PhysicalObjects::UpdatedAt.into_iden(),
                ],
                rows,
                PhysicalObjects::PhysicalObjectId,
            )
            .await?;
        Ok(items
            .iter()
            .zip(ids)
            .map(|((_, item), id)| PhysicalObject {
                physical_object_id: PhysicalObjectId(id),
                ..item.clone()
            })
            .collect())
    }

    pub(crate) async fn insert_local_geometries<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario_id: ScenarioId,
        items: &[(Option<i64>, ObjectGeometry)],
    ) -> UrbisResult<Vec<ObjectGeometry>> {
        let mut rows = Vec::with_capacity(items.len());
        for (public, item) in items {
            rows.push(vec![
                scenario_id.0.into(),
                (*public).into(),
                item.territory_id.0.into(),
                item.geometry.to_json()?.into(),
                item.centre_point.to_json()?.into(),
                item.address.clone().into(),
                item.is_cut.into(),
                item.created_at.as_millis().into(),
                item.updated_at.as_millis().into(),
            ]);
        }
        let ids = self
            .insert_rows_returning(
                conn,
                ScenarioObjectGeometries::Table.into_iden(),
                vec![
                    ScenarioObjectGeometries::ScenarioId.into_iden(),
                    ScenarioObjectGeometries::PublicObjectGeometryId.into_iden(),
                    ObjectGeometries::TerritoryId.into_iden(),
                    ObjectGeometries::Geometry.into_iden(),
                    ObjectGeometries::CentrePoint.into_iden(),
                    ObjectGeometries::Address.into_iden(),
                    ScenarioObjectGeometries::IsCut.into_iden(),
                    ObjectGeometries::CreatedAt.into_iden(),
                    ObjectGeometries::UpdatedAt.into_iden(),
                ],
                rows,
                ObjectGeometries::ObjectGeometryId,
            )
            .await?;
        Ok(items
            .iter()
            .zip(ids)
            .map(|((_, item), id)| ObjectGeometry {
                object_geometry_id: ObjectGeometryId(id),
                ..item.clone()
            })
            .collect())
    }

    pub(crate) async fn insert_local_services<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario_id: ScenarioId,
        items: &[(Option<i64>, Service)],
    ) -> UrbisResult<Vec<Service>> {
        let rows = items
            .iter()
            .map(|(public, item)| {
                vec![
                    scenario_id.0.into(),
                    (*public).into(),
                    item.service_type_id.0.into(),
                    item.name.clone().into(),
                    item.capacity.into(),
                    item.properties.to_string().into(),
                    item.created_at.as_millis().into(),
                    item.updated_at.as_millis().into(),
                ]
            })
            .collect();
        let ids = self
            .insert_rows_returning(
                conn,
                ScenarioServices::Table.into_iden(),
                vec![
                    ScenarioServices::ScenarioId.into_iden(),
                    ScenarioServices::PublicServiceId.into_iden(),
                    Services::ServiceTypeId.into_iden(),
                    Services::Name.into_iden(),
                    Services::Capacity.into_iden(),
                    Services::Properties.into_iden(),
                    Services::CreatedAt.into_iden(),
                    Services::UpdatedAt.into_iden(),
                ],
                rows,
                Services::ServiceId,
            )
            .await?;
        Ok(items
            .iter()
            .zip(ids)
            .map(|((_, item), id)| Service {
                service_id: ServiceId(id),
                ..item.clone()
            })
            .collect())
    }

    pub(crate) async fn load_scenario_functional_zones<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario_id: ScenarioId,
    ) -> UrbisResult<Vec<FunctionalZone>> {
        let select = Query::select()
            .from(ScenarioFunctionalZones::Table)
            .columns(ZONE_COLUMNS)
            .and_where(Expr::col(ScenarioFunctionalZones::ScenarioId).eq(scenario_id.0))
            .order_by(FunctionalZones::FunctionalZoneId, sea_query::Order::Asc)
            .to_owned();
        query_all(conn, &select)
            .await?
            .iter()
            .map(read_functional_zone)
            .collect()
    }

    pub(crate) async fn insert_scenario_functional_zones<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario_id: ScenarioId,
        zones: &[FunctionalZone],
    ) -> UrbisResult<Vec<FunctionalZone>> {
        let mut rows = Vec::with_capacity(zones.len());
        for zone in zones {
            rows.push(vec![
                scenario_id.0.into(),
                zone.functional_zone_type_id.0.into(),
                zone.name.clone().into(),
                zone.territory_id.map(|id| id.0).into(),
                zone.geometry.to_json()?.into(),
                zone.year.into(),
                zone.source.clone().into(),
                zone.properties.to_string().into(),
                zone.created_at.as_millis().into(),
                zone.updated_at.as_millis().into(),
            ]);
        }
        let ids = self
            .insert_rows_returning(
                conn,
                ScenarioFunctionalZones::Table.into_iden(),
                vec![
                    ScenarioFunctionalZones::ScenarioId.into_iden(),
                    FunctionalZones::FunctionalZoneTypeId.into_iden(),
                    FunctionalZones::Name.into_iden(),
                    FunctionalZones::TerritoryId.into_iden(),
                    FunctionalZones::Geometry.into_iden(),
                    FunctionalZones::Year.into_iden(),
                    FunctionalZones::Source.into_iden(),
                    FunctionalZones::Properties.into_iden(),
                    FunctionalZones::CreatedAt.into_iden(),
                    FunctionalZones::UpdatedAt.into_iden(),
                ],
                rows,
                FunctionalZones::FunctionalZoneId,
            )
            .await?;
        Ok(zones
            .iter()
            .zip(ids)
            .map(|(zone, id)| FunctionalZone {
                functional_zone_id: urbis_core::FunctionalZoneId(id),
                ..zone.clone()
            })
            .collect())
    }

    /// Multi-row insert in chunks of at most `max_insert_batch` rows, returning the new ids
    /// in input order.
    pub(crate) async fn insert_rows_returning<C, I>(
        &self,
        conn: &C,
        table: DynIden,
        columns: Vec<DynIden>,
        rows: Vec<Vec<SeaValue>>,
        id_col: I,
    ) -> UrbisResult<Vec<i64>>
    where
        C: ConnectionTrait,
        I: sea_query::Iden + Copy + 'static,
    {
        let mut ids = Vec::with_capacity(rows.len());
        for chunk in rows.chunks(self.limits.max_insert_batch) {
            let mut insert = Query::insert();
            insert.into_table(table.clone()).columns(columns.clone());
            for row in chunk {
                push_values(&mut insert, row.clone())?;
            }
            insert.returning_col(id_col);
            let mut chunk_ids = Vec::with_capacity(chunk.len());
            for row in query_all(conn, &insert).await? {
                chunk_ids.push(row.try_get::<i64>("", &col_name(id_col))?);
            }
            if chunk_ids.len() != chunk.len() {
                return Err(UrbisError::internal(format!(
                    "insert returned {} ids for {} rows",
                    chunk_ids.len(),
                    chunk.len()
                )));
            }
            // auto-increment ids grow with row order inside one statement
            chunk_ids.sort_unstable();
            ids.extend(chunk_ids);
        }
        if rows.len() > self.limits.max_insert_batch {
            log::debug!(
                "inserted {} rows in chunks of {}",
                rows.len(),
                self.limits.max_insert_batch
            );
        }
        Ok(ids)
    }

    pub(crate) async fn type_exists<C: ConnectionTrait>(
        &self,
        conn: &C,
        type_id: PhysicalObjectTypeId,
    ) -> UrbisResult<()> {
        let select = Query::select()
            .from(PhysicalObjectTypes::Table)
            .column(PhysicalObjectTypes::PhysicalObjectTypeId)
            .and_where(Expr::col(PhysicalObjectTypes::PhysicalObjectTypeId).eq(type_id.0))
            .to_owned();
        match query_one(conn, &select).await? {
            Some(_) => Ok(()),
            None => Err(UrbisError::not_found_by_id("physical object type", type_id.0)),
        }
    }

    pub(crate) async fn service_type_exists<C: ConnectionTrait>(
        &self,
        conn: &C,
        type_id: ServiceTypeId,
    ) -> UrbisResult<()> {
        let select = Query::select()
            .from(ServiceTypes::Table)
            .column(ServiceTypes::ServiceTypeId)
            .and_where(Expr::col(ServiceTypes::ServiceTypeId).eq(type_id.0))
            .to_owned();
        match query_one(conn, &select).await? {
            Some(_) => Ok(()),
            None => Err(UrbisError::not_found_by_id("service type", type_id.0)),
        }
    }

    pub(crate) async fn territory_exists<C: ConnectionTrait>(
        &self,
        conn: &C,
        territory_id: TerritoryId,
    ) -> UrbisResult<()> {
        let select = Query::select()
            .from(Territories::Table)
            .column(Territories::TerritoryId)
            .and_where(Expr::col(Territories::TerritoryId).eq(territory_id.0))
            .to_owned();
        match query_one(conn, &select).await? {
            Some(_) => Ok(()),
            None => Err(UrbisError::not_found_by_id("territory", territory_id.0)),
        }
    }

    pub(crate) async fn type_functions<C: ConnectionTrait>(
        &self,
        conn: &C,
    ) -> UrbisResult<HashMap<PhysicalObjectTypeId, urbis_core::PhysicalObjectFunctionId>> {
        let select = Query::select()
            .from(PhysicalObjectTypes::Table)
            .columns([
                PhysicalObjectTypes::PhysicalObjectTypeId,
                PhysicalObjectTypes::FunctionId,
            ])
            .to_owned();
        let mut map = HashMap::new();
        for row in query_all(conn, &select).await? {
            let type_id: i64 =
                row.try_get("", &col_name(PhysicalObjectTypes::PhysicalObjectTypeId))?;
            let function_id: i64 = row.try_get("", &col_name(PhysicalObjectTypes::FunctionId))?;
            map.insert(
                PhysicalObjectTypeId(type_id),
                urbis_core::PhysicalObjectFunctionId(function_id),
            );
        }
        Ok(map)
    }
}

pub(crate) const PHYSICAL_COLUMNS: [PhysicalObjects; 6] = [
    PhysicalObjects::PhysicalObjectId,
    PhysicalObjects::PhysicalObjectTypeId,
    PhysicalObjects::Name,
    PhysicalObjects::Properties,
    PhysicalObjects::CreatedAt,
    PhysicalObjects::UpdatedAt,
];

pub(crate) const GEOMETRY_COLUMNS: [ObjectGeometries; 7] = [
    ObjectGeometries::ObjectGeometryId,
    ObjectGeometries::TerritoryId,
    ObjectGeometries::Geometry,
    ObjectGeometries::CentrePoint,
    ObjectGeometries::Address,
    ObjectGeometries::CreatedAt,
    ObjectGeometries::UpdatedAt,
];

pub(crate) const SERVICE_COLUMNS: [Services; 7] = [
    Services::ServiceId,
    Services::ServiceTypeId,
    Services::Name,
    Services::Capacity,
    Services::Properties,
    Services::CreatedAt,
    Services::UpdatedAt,
];

pub(crate) const ZONE_COLUMNS: [FunctionalZones; 10] = [
    FunctionalZones::FunctionalZoneId,
    FunctionalZones::FunctionalZoneTypeId,
    FunctionalZones::Name,
    FunctionalZones::TerritoryId,
    FunctionalZones::Geometry,
    FunctionalZones::Year,
    FunctionalZones::Source,
    FunctionalZones::Properties,
    FunctionalZones::CreatedAt,
    FunctionalZones::UpdatedAt,
];

const BASE_PHYSICAL: &str = "po_";
const BASE_GEOMETRY: &str = "og_";
const BASE_SERVICE: &str = "s_";
const BASE_URBAN_OBJECT_ID: &str = "uo_urban_object_id";

pub(crate) fn base_object_select() -> SelectStatement {
    let mut select = Query::select();
    select
        .from(UrbanObjects::Table)
        .expr_as(
            Expr::col((UrbanObjects::Table, UrbanObjects::UrbanObjectId)),
            Alias::new(BASE_URBAN_OBJECT_ID),
        )
        .inner_join(
            PhysicalObjects::Table,
            Expr::col((PhysicalObjects::Table, PhysicalObjects::PhysicalObjectId))
                .equals((UrbanObjects::Table, UrbanObjects::PhysicalObjectId)),
        )
        .inner_join(
            ObjectGeometries::Table,
            Expr::col((ObjectGeometries::Table, ObjectGeometries::ObjectGeometryId))
                .equals((UrbanObjects::Table, UrbanObjects::ObjectGeometryId)),
        )
        .left_join(
            Services::Table,
            Expr::col((Services::Table, Services::ServiceId))
                .equals((UrbanObjects::Table, UrbanObjects::ServiceId)),
        );
    for column in PHYSICAL_COLUMNS {
        select.expr_as(
            Expr::col((PhysicalObjects::Table, column)),
            Alias::new(field(BASE_PHYSICAL, column)),
        );
    }
    for column in GEOMETRY_COLUMNS {
        select.expr_as(
            Expr::col((ObjectGeometries::Table, column)),
            Alias::new(field(BASE_GEOMETRY, column)),
        );
    }
    for column in SERVICE_COLUMNS {
        select.expr_as(
            Expr::col((Services::Table, column)),
            Alias::new(field(BASE_SERVICE, column)),
        );
    }
    select
        .order_by((UrbanObjects::Table, UrbanObjects::UrbanObjectId), sea_query::Order::Asc)
        .to_owned()
}

pub(crate) fn read_base_object(row: &QueryResult) -> UrbisResult<BaseUrbanObject> {
    let service_id: Option<i64> = row.try_get("", &field(BASE_SERVICE, Services::ServiceId))?;
    let service = match service_id {
        Some(_) => Some(read_service(row, BASE_SERVICE)?),
        None => None,
    };
    Ok(BaseUrbanObject {
        urban_object_id: UrbanObjectId(row.try_get("", BASE_URBAN_OBJECT_ID)?),
        physical_object: read_physical_object(row, BASE_PHYSICAL)?,
        object_geometry: read_object_geometry(row, BASE_GEOMETRY, false)?,
        service,
    })
}

fn scenario_select() -> SelectStatement {
    Query::select()
        .from(Scenarios::Table)
        .columns([
            Scenarios::ScenarioId,
            Scenarios::ProjectId,
            Scenarios::ParentId,
            Scenarios::Name,
            Scenarios::IsBased,
            Scenarios::IsAttached,
            Scenarios::CreatedAt,
            Scenarios::UpdatedAt,
        ])
        .to_owned()
}

pub(crate) fn scenarios_select() -> SelectStatement {
    scenario_select()
}

pub(crate) fn read_scenario(row: &QueryResult) -> UrbisResult<Scenario> {
    let parent_id: Option<i64> = row.try_get("", &col_name(Scenarios::ParentId))?;
    Ok(Scenario {
        scenario_id: ScenarioId(row.try_get("", &col_name(Scenarios::ScenarioId))?),
        project_id: ProjectId(row.try_get("", &col_name(Scenarios::ProjectId))?),
        parent_id: parent_id.map(ScenarioId),
        name: row.try_get("", &col_name(Scenarios::Name))?,
        is_based: row.try_get("", &col_name(Scenarios::IsBased))?,
        is_attached: row.try_get("", &col_name(Scenarios::IsAttached))?,
        created_at: Timestamp(row.try_get("", &col_name(Scenarios::CreatedAt))?),
        updated_at: Timestamp(row.try_get("", &col_name(Scenarios::UpdatedAt))?),
    })
}

async fn set_attached<C: ConnectionTrait>(
    conn: &C,
    scenario_id: ScenarioId,
    attached: bool,
) -> UrbisResult<()> {
    let update = Query::update()
        .table(Scenarios::Table)
        .values([(Scenarios::IsAttached, attached.into())])
        .and_where(Expr::col(Scenarios::ScenarioId).eq(scenario_id.0))
        .to_owned();
    exec(conn, &update).await
}

fn link_select() -> SelectStatement {
    Query::select()
        .from(ScenarioUrbanObjects::Table)
        .columns([
            ScenarioUrbanObjects::UrbanObjectId,
            ScenarioUrbanObjects::ScenarioId,
            ScenarioUrbanObjects::PublicUrbanObjectId,
            ScenarioUrbanObjects::PhysicalObjectId,
            ScenarioUrbanObjects::PublicPhysicalObjectId,
            ScenarioUrbanObjects::ObjectGeometryId,
            ScenarioUrbanObjects::PublicObjectGeometryId,
            ScenarioUrbanObjects::ServiceId,
            ScenarioUrbanObjects::PublicServiceId,
        ])
        .to_owned()
}

fn read_link(row: &QueryResult) -> UrbisResult<OverlayLink> {
    let get = |column: ScenarioUrbanObjects| -> UrbisResult<Option<i64>> {
        Ok(row.try_get("", &col_name(column))?)
    };
    let base: Option<i64> = get(ScenarioUrbanObjects::PublicUrbanObjectId)?;
    Ok(OverlayLink {
        link_id: UrbanObjectId(row.try_get("", &col_name(ScenarioUrbanObjects::UrbanObjectId))?),
        scenario_id: ScenarioId(row.try_get("", &col_name(ScenarioUrbanObjects::ScenarioId))?),
        base_urban_object_id: base.map(UrbanObjectId),
        pointers: LinkPointers {
            physical_object: Pointer::from_columns(
                get(ScenarioUrbanObjects::PhysicalObjectId)?,
                get(ScenarioUrbanObjects::PublicPhysicalObjectId)?,
            )?,
            object_geometry: Pointer::from_columns(
                get(ScenarioUrbanObjects::ObjectGeometryId)?,
                get(ScenarioUrbanObjects::PublicObjectGeometryId)?,
            )?,
            service: Pointer::from_columns(
                get(ScenarioUrbanObjects::ServiceId)?,
                get(ScenarioUrbanObjects::PublicServiceId)?,
            )?,
        },
    })
}

fn pointer_values(pointers: &LinkPointers) -> Vec<SeaValue> {
    let (physical_local, physical_public) = pointers.physical_object.to_columns();
    let (geometry_local, geometry_public) = pointers.object_geometry.to_columns();
    let (service_local, service_public) = pointers.service.to_columns();
    vec![
        physical_local.into(),
        physical_public.into(),
        geometry_local.into(),
        geometry_public.into(),
        service_local.into(),
        service_public.into(),
    ]
}

fn remap<I>(pointer: Pointer<I>, map: &HashMap<i64, i64>) -> UrbisResult<Pointer<I>>
where
    I: Copy + From<i64> + Into<i64>,
{
    match pointer {
        Pointer::Local(id) => {
            let old: i64 = id.into();
            map.get(&old)
                .map(|new| Pointer::Local(I::from(*new)))
                .ok_or_else(|| {
                    UrbisError::internal(format!("scenario link points at missing local row {old}"))
                })
        }
        other => Ok(other),
    }
}

pub(crate) fn read_physical_object(row: &QueryResult, prefix: &str) -> UrbisResult<PhysicalObject> {
    Ok(PhysicalObject {
        physical_object_id: PhysicalObjectId(
            row.try_get("", &field(prefix, PhysicalObjects::PhysicalObjectId))?,
        ),
        physical_object_type_id: PhysicalObjectTypeId(
            row.try_get("", &field(prefix, PhysicalObjects::PhysicalObjectTypeId))?,
        ),
        name: row.try_get("", &field(prefix, PhysicalObjects::Name))?,
        properties: read_json(row, &field(prefix, PhysicalObjects::Properties))?,
        created_at: Timestamp(row.try_get("", &field(prefix, PhysicalObjects::CreatedAt))?),
        updated_at: Timestamp(row.try_get("", &field(prefix, PhysicalObjects::UpdatedAt))?),
    })
}

pub(crate) fn read_object_geometry(
    row: &QueryResult,
    prefix: &str,
    with_cut: bool,
) -> UrbisResult<ObjectGeometry> {
    let is_cut = if with_cut {
        row.try_get("", &field(prefix, ScenarioObjectGeometries::IsCut))?
    } else {
        false
    };
    Ok(ObjectGeometry {
        object_geometry_id: ObjectGeometryId(
            row.try_get("", &field(prefix, ObjectGeometries::ObjectGeometryId))?,
        ),
        territory_id: TerritoryId(row.try_get("", &field(prefix, ObjectGeometries::TerritoryId))?),
        geometry: read_geometry(row, &field(prefix, ObjectGeometries::Geometry))?,
        centre_point: read_geometry(row, &field(prefix, ObjectGeometries::CentrePoint))?,
        address: row.try_get("", &field(prefix, ObjectGeometries::Address))?,
        is_cut,
        created_at: Timestamp(row.try_get("", &field(prefix, ObjectGeometries::CreatedAt))?),
        updated_at: Timestamp(row.try_get("", &field(prefix, ObjectGeometries::UpdatedAt))?),
    })
}

pub(crate) fn read_service(row: &QueryResult, prefix: &str) -> UrbisResult<Service> {
    Ok(Service {
        service_id: ServiceId(row.try_get("", &field(prefix, Services::ServiceId))?),
        service_type_id: ServiceTypeId(row.try_get("", &field(prefix, Services::ServiceTypeId))?),
        name: row.try_get("", &field(prefix, Services::Name))?,
        capacity: row.try_get("", &field(prefix, Services::Capacity))?,
        properties: read_json(row, &field(prefix, Services::Properties))?,
        created_at: Timestamp(row.try_get("", &field(prefix, Services::CreatedAt))?),
        updated_at: Timestamp(row.try_get("", &field(prefix, Services::UpdatedAt))?),
    })
}

pub(crate) fn read_functional_zone(row: &QueryResult) -> UrbisResult<FunctionalZone> {
    let territory_id: Option<i64> = row.try_get("", &col_name(FunctionalZones::TerritoryId))?;
    Ok(FunctionalZone {
        functional_zone_id: urbis_core::FunctionalZoneId(
            row.try_get("", &col_name(FunctionalZones::FunctionalZoneId))?,
        ),
        functional_zone_type_id: urbis_core::FunctionalZoneTypeId(
            row.try_get("", &col_name(FunctionalZones::FunctionalZoneTypeId))?,
        ),
        name: row.try_get("", &col_name(FunctionalZones::Name))?,
        territory_id: territory_id.map(TerritoryId),
        geometry: read_geometry(row, &col_name(FunctionalZones::Geometry))?,
        year: row.try_get("", &col_name(FunctionalZones::Year))?,
        source: row.try_get("", &col_name(FunctionalZones::Source))?,
        properties: read_json(row, &col_name(FunctionalZones::Properties))?,
        created_at: Timestamp(row.try_get("", &col_name(FunctionalZones::CreatedAt))?),
        updated_at: Timestamp(row.try_get("", &col_name(FunctionalZones::UpdatedAt))?),
    })
}

pub(crate) fn read_geometry(row: &QueryResult, column: &str) -> UrbisResult<Geometry> {
    let raw: String = row.try_get("", column)?;
    Geometry::from_json(&raw)
}

pub(crate) fn read_json(row: &QueryResult, column: &str) -> UrbisResult<JsonValue> {
    let raw: String = row.try_get("", column)?;
    Ok(serde_json::from_str(&raw)?)
}

pub(crate) fn push_values(insert: &mut InsertStatement, row: Vec<SeaValue>) -> UrbisResult<()> {
    insert
        .values(row.into_iter().map(Into::into))
        .map_err(|err| UrbisError::internal(format!("insert row shape: {err}")))?;
    Ok(())
}

fn field(prefix: &str, column: impl sea_query::Iden) -> String {
    format!("{prefix}{}", col_name(column))
}

pub(crate) fn col_name(column: impl sea_query::Iden) -> String {
    column.to_string()
}

pub(crate) fn build_stmt<S: QueryStatementWriter>(
    backend: DatabaseBackend,
    stmt: &S,
) -> (String, sea_orm::sea_query::Values) {
    match backend {
        DatabaseBackend::Sqlite => stmt.build(SqliteQueryBuilder),
        DatabaseBackend::Postgres => stmt.build(PostgresQueryBuilder),
        _ => stmt.build(SqliteQueryBuilder),
    }
}

pub(crate) async fn exec<C, S>(conn: &C, stmt: &S) -> UrbisResult<()>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    exec_count(conn, stmt).await.map(|_| ())
}

pub(crate) async fn exec_count<C, S>(conn: &C, stmt: &S) -> UrbisResult<u64>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let result = conn
        .execute_raw(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn query_all<C, S>(conn: &C, stmt: &S) -> UrbisResult<Vec<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let rows = conn
        .query_all_raw(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(rows)
}

pub(crate) async fn query_one<C, S>(conn: &C, stmt: &S) -> UrbisResult<Option<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let row = conn
        .query_one_raw(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(row)
}

pub(crate) async fn insert_returning_id<C, I>(
    conn: &C,
    mut insert: InsertStatement,
    id_col: I,
) -> UrbisResult<i64>
where
    C: ConnectionTrait,
    I: sea_query::Iden + Copy + 'static,
{
    insert.returning_col(id_col);
    let row = query_one(conn, &insert)
        .await?
        .ok_or_else(|| UrbisError::internal("insert returned no id"))?;
    Ok(row.try_get("", &col_name(id_col))?)
}

fn build_connection_url(config: &UrbisConfig, base_dir: &Path) -> UrbisResult<String> {
    match &config.database {
        crate::DatabaseConfig::Sqlite { .. } => {
            let path = config.sqlite_path(base_dir)?;
            Ok(format!("sqlite://{}?mode=rwc", path.display()))
        }
        crate::DatabaseConfig::Postgres { url } => Ok(url.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use urbis_core::{
        BaseLayerApi, NewProject, NewTerritory, NewUrbanObject, ObjectGeometryInput,
        PhysicalObjectInput, ScenarioApi,
    };

    fn territory(parent_id: Option<TerritoryId>, name: &str) -> NewTerritory {
        NewTerritory {
            parent_id,
            name: name.into(),
            geometry: Geometry::rect(0.0, 0.0, 10.0, 10.0),
            centre_point: None,
            is_city: false,
        }
    }

    #[tokio::test]
    async fn second_claim_on_a_base_object_is_already_edited() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = UrbisConfig::default_sqlite(dir.path().join("urbis.sqlite").to_string_lossy());
        let store = UrbisStore::connect(&config, dir.path()).await.expect("connect");
        let country = store.add_territory(territory(None, "country")).await.expect("country");
        let region = store
            .add_territory(territory(Some(country.territory_id), "region"))
            .await
            .expect("region");
        let function = store
            .add_physical_object_function("residential".into())
            .await
            .expect("function");
        let building = store
            .add_physical_object_type(function.function_id, "house".into())
            .await
            .expect("type");
        let house = BaseLayerApi::add_urban_object(
            &store,
            NewUrbanObject {
                physical_object: PhysicalObjectInput {
                    physical_object_type_id: building.physical_object_type_id,
                    name: Some("house".into()),
                    properties: serde_json::json!({}),
                },
                geometry: ObjectGeometryInput {
                    territory_id: region.territory_id,
                    geometry: Geometry::rect(1.0, 1.0, 2.0, 2.0),
                    centre_point: None,
                    address: None,
                    non_clippable: false,
                },
                service: None,
            },
        )
        .await
        .expect("base object");
        let created = store
            .create_project(
                &Actor::user("planner"),
                NewProject {
                    name: "regional plan".into(),
                    region_id: region.territory_id,
                    is_regional: true,
                    is_public: false,
                    territory: None,
                },
            )
            .await
            .expect("project");
        let scenario_id = created.based_scenario.scenario_id;

        store
            .claim_base_object(
                &store.conn,
                scenario_id,
                house.urban_object_id,
                LinkPointers::tombstone(),
            )
            .await
            .expect("first claim");
        let second = store
            .claim_base_object(
                &store.conn,
                scenario_id,
                house.urban_object_id,
                LinkPointers::tombstone(),
            )
            .await;
        assert!(matches!(
            second,
            Err(UrbisError::AlreadyEdited { entity: "urban object", id })
                if id == house.urban_object_id.0
        ));
    }
}
