use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::filter::{ContextQuery, ResolveQuery};
use crate::geometry::Geometry;
use crate::ids::*;
use crate::model::*;
use crate::overlay::{
    BufferRecord, FunctionalZoneRecord, GeometryRecord, IndicatorValueRecord,
    PhysicalObjectRecord, PhysicalObjectWithGeometryRecord, ResolveKind, ResolvedRecord,
    ServiceRecord, ServiceWithGeometryRecord, UrbanObjectView,
};
use crate::UrbisResult;

/// Administrative writes to the shared base layer, outside any scenario.
#[async_trait]
pub trait BaseLayerApi {
    async fn add_territory(&self, input: NewTerritory) -> UrbisResult<Territory>;
    async fn get_territory(&self, territory_id: TerritoryId) -> UrbisResult<Territory>;
    async fn add_physical_object_function(
        &self,
        name: String,
    ) -> UrbisResult<PhysicalObjectFunction>;
    async fn add_physical_object_type(
        &self,
        function_id: PhysicalObjectFunctionId,
        name: String,
    ) -> UrbisResult<PhysicalObjectType>;
    async fn add_service_type(&self, name: String) -> UrbisResult<ServiceType>;
    async fn add_functional_zone_type(&self, name: String) -> UrbisResult<FunctionalZoneType>;
    async fn add_buffer_type(&self, name: String) -> UrbisResult<BufferType>;
    async fn put_default_buffer_value(
        &self,
        value: DefaultBufferValue,
    ) -> UrbisResult<DefaultBufferValue>;
    async fn add_urban_object(&self, input: NewUrbanObject) -> UrbisResult<UrbanObjectView>;
    async fn add_base_buffer(
        &self,
        urban_object_id: UrbanObjectId,
        buffer_type_id: BufferTypeId,
        geometry: Option<Geometry>,
    ) -> UrbisResult<Buffer>;
    async fn add_functional_zone(&self, input: FunctionalZoneInput) -> UrbisResult<FunctionalZone>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreatedProject {
    pub project: Project,
    pub based_scenario: Scenario,
}

#[async_trait]
pub trait ScenarioApi {
    async fn create_project(&self, actor: &Actor, input: NewProject)
    -> UrbisResult<CreatedProject>;
    async fn get_project(
        &self,
        actor: Option<&Actor>,
        project_id: ProjectId,
    ) -> UrbisResult<Project>;
    async fn get_scenario(
        &self,
        actor: Option<&Actor>,
        scenario_id: ScenarioId,
    ) -> UrbisResult<Scenario>;
    async fn list_scenarios(
        &self,
        actor: Option<&Actor>,
        project_id: ProjectId,
    ) -> UrbisResult<Vec<Scenario>>;
    async fn fork_scenario(
        &self,
        actor: &Actor,
        parent_id: ScenarioId,
        name: String,
    ) -> UrbisResult<Scenario>;
    async fn copy_scenario(
        &self,
        actor: &Actor,
        source_id: ScenarioId,
        name: String,
    ) -> UrbisResult<Scenario>;
    async fn delete_scenario(&self, actor: &Actor, scenario_id: ScenarioId) -> UrbisResult<()>;
}

#[async_trait]
pub trait OverlayReadApi {
    async fn resolve(
        &self,
        scenario_id: ScenarioId,
        actor: Option<&Actor>,
        kind: ResolveKind,
        query: &ResolveQuery,
    ) -> UrbisResult<Vec<ResolvedRecord>>;

    /// Same kinds, scoped to the area around a non-regional project instead of inside it.
    async fn resolve_context(
        &self,
        scenario_id: ScenarioId,
        actor: Option<&Actor>,
        kind: ResolveKind,
        query: &ContextQuery,
    ) -> UrbisResult<Vec<ResolvedRecord>>;

    async fn urban_objects(
        &self,
        scenario_id: ScenarioId,
        actor: Option<&Actor>,
        query: &ResolveQuery,
    ) -> UrbisResult<Vec<UrbanObjectView>>;
    async fn physical_objects(
        &self,
        scenario_id: ScenarioId,
        actor: Option<&Actor>,
        query: &ResolveQuery,
    ) -> UrbisResult<Vec<PhysicalObjectRecord>>;
    async fn physical_objects_with_geometry(
        &self,
        scenario_id: ScenarioId,
        actor: Option<&Actor>,
        query: &ResolveQuery,
    ) -> UrbisResult<Vec<PhysicalObjectWithGeometryRecord>>;
    async fn services(
        &self,
        scenario_id: ScenarioId,
        actor: Option<&Actor>,
        query: &ResolveQuery,
    ) -> UrbisResult<Vec<ServiceRecord>>;
    async fn services_with_geometry(
        &self,
        scenario_id: ScenarioId,
        actor: Option<&Actor>,
        query: &ResolveQuery,
    ) -> UrbisResult<Vec<ServiceWithGeometryRecord>>;
    async fn geometries(
        &self,
        scenario_id: ScenarioId,
        actor: Option<&Actor>,
        query: &ResolveQuery,
    ) -> UrbisResult<Vec<GeometryRecord>>;
    async fn buffers(
        &self,
        scenario_id: ScenarioId,
        actor: Option<&Actor>,
        query: &ResolveQuery,
    ) -> UrbisResult<Vec<BufferRecord>>;
    async fn functional_zones(
        &self,
        scenario_id: ScenarioId,
        actor: Option<&Actor>,
        query: &ResolveQuery,
    ) -> UrbisResult<Vec<FunctionalZoneRecord>>;
    async fn indicator_values(
        &self,
        scenario_id: ScenarioId,
        actor: Option<&Actor>,
        query: &ResolveQuery,
    ) -> UrbisResult<Vec<IndicatorValueRecord>>;
}

#[async_trait]
pub trait OverlayWriteApi {
    /// Create-native.
    async fn add_urban_object(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        input: NewUrbanObject,
    ) -> UrbisResult<UrbanObjectView>;
    async fn add_existing_physical_object(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        input: ExistingPhysicalObject,
    ) -> UrbisResult<UrbanObjectView>;
    /// Promote-on-edit for a whole identity.
    async fn edit_urban_object(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        urban_object_id: UrbanObjectId,
        is_scenario_object: bool,
        edit: UrbanObjectEdit,
    ) -> UrbisResult<UrbanObjectView>;
    async fn put_physical_object(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        physical_object_id: PhysicalObjectId,
        is_scenario_object: bool,
        input: PhysicalObjectInput,
    ) -> UrbisResult<PhysicalObjectRecord>;
    async fn patch_physical_object(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        physical_object_id: PhysicalObjectId,
        is_scenario_object: bool,
        patch: PhysicalObjectPatch,
    ) -> UrbisResult<PhysicalObjectRecord>;
    async fn put_service(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        service_id: ServiceId,
        is_scenario_object: bool,
        input: ServiceInput,
    ) -> UrbisResult<ServiceRecord>;
    async fn patch_service(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        service_id: ServiceId,
        is_scenario_object: bool,
        patch: ServicePatch,
    ) -> UrbisResult<ServiceRecord>;
    async fn put_object_geometry(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        object_geometry_id: ObjectGeometryId,
        is_scenario_object: bool,
        input: ObjectGeometryInput,
    ) -> UrbisResult<GeometryRecord>;
    async fn patch_object_geometry(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        object_geometry_id: ObjectGeometryId,
        is_scenario_object: bool,
        patch: ObjectGeometryPatch,
    ) -> UrbisResult<GeometryRecord>;
    /// Hide-on-delete for a whole identity.
    async fn delete_urban_object(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        urban_object_id: UrbanObjectId,
        is_scenario_object: bool,
    ) -> UrbisResult<()>;
    /// Drops a tombstone so the base identity is inherited again.
    async fn restore_urban_object(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        base_urban_object_id: UrbanObjectId,
    ) -> UrbisResult<()>;
    async fn delete_physical_object(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        physical_object_id: PhysicalObjectId,
        is_scenario_object: bool,
    ) -> UrbisResult<()>;
    async fn delete_service(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        service_id: ServiceId,
        is_scenario_object: bool,
    ) -> UrbisResult<()>;
    async fn delete_object_geometry(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        object_geometry_id: ObjectGeometryId,
        is_scenario_object: bool,
    ) -> UrbisResult<()>;
    async fn replace_objects_by_function(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        function_id: PhysicalObjectFunctionId,
        objects: Vec<NewUrbanObject>,
    ) -> UrbisResult<Vec<UrbanObjectView>>;
}

#[async_trait]
pub trait BufferApi {
    async fn put_buffer(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        input: BufferInput,
    ) -> UrbisResult<BufferRecord>;
    async fn delete_buffer(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        urban_object_id: UrbanObjectId,
        is_scenario_object: bool,
        buffer_type_id: BufferTypeId,
    ) -> UrbisResult<()>;
}

#[async_trait]
pub trait FunctionalZoneApi {
    async fn add_functional_zones(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        zones: Vec<FunctionalZoneInput>,
    ) -> UrbisResult<Vec<FunctionalZoneRecord>>;
    async fn put_functional_zone(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        functional_zone_id: FunctionalZoneId,
        input: FunctionalZoneInput,
    ) -> UrbisResult<FunctionalZoneRecord>;
    async fn delete_functional_zone(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        functional_zone_id: FunctionalZoneId,
    ) -> UrbisResult<()>;
    async fn delete_functional_zones(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
    ) -> UrbisResult<()>;
}

#[async_trait]
pub trait IndicatorApi {
    async fn add_indicator(&self, input: NewIndicator) -> UrbisResult<Indicator>;
    async fn get_indicators_by_parent(
        &self,
        query: &IndicatorTreeQuery,
    ) -> UrbisResult<Vec<Indicator>>;
    async fn add_indicator_value(&self, input: IndicatorValueInput) -> UrbisResult<IndicatorValue>;
    async fn put_indicator_value(&self, input: IndicatorValueInput) -> UrbisResult<IndicatorValue>;
    async fn get_indicator_values_by_territory(
        &self,
        territory_id: TerritoryId,
        query: &IndicatorValuesQuery,
    ) -> UrbisResult<Vec<BinnedIndicatorValue>>;
    async fn put_territory_indicator_bind(
        &self,
        bind: TerritoryIndicatorBind,
    ) -> UrbisResult<TerritoryIndicatorBind>;
    async fn get_territory_indicator_binds(
        &self,
        territory_id: TerritoryId,
        indicator_id: Option<IndicatorId>,
    ) -> UrbisResult<Vec<TerritoryIndicatorBind>>;
    async fn put_scenario_indicator_value(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        input: ScenarioIndicatorValueInput,
    ) -> UrbisResult<ScenarioIndicatorValue>;
    async fn delete_scenario_indicator_values(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        indicator_id: Option<IndicatorId>,
    ) -> UrbisResult<()>;
}
